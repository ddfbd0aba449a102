use std::str::FromStr;

use anyhow::{Result, anyhow, bail};

use crate::params::ParamKind;

/// Control input delivered to the frame loop between ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Move one slider.
    Set(ParamKind, f32),
    /// Switch the active source; parameters reset to its defaults.
    SelectSource(String),
    /// Restore the active source's defaults.
    Reset,
    /// Log the current parameter values.
    Show,
}

impl FromStr for ControlCommand {
    type Err = anyhow::Error;

    /// Accepts `set <knob> <value>`, `<knob> <value>`, `source <name>`,
    /// `reset` and `show`.
    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let head = words.next().ok_or_else(|| anyhow!("empty command"))?;
        let command = match head.to_ascii_lowercase().as_str() {
            "reset" => Self::Reset,
            "show" | "params" => Self::Show,
            "source" | "format" => {
                let name = words
                    .next()
                    .ok_or_else(|| anyhow!("'{head}' needs a source name"))?;
                Self::SelectSource(name.to_string())
            }
            "set" => {
                let kind = words
                    .next()
                    .ok_or_else(|| anyhow!("'set' needs a parameter name"))?;
                parse_set(kind, words.next())?
            }
            other => parse_set(other, words.next())?,
        };
        if let Some(extra) = words.next() {
            bail!("unexpected trailing input '{extra}'");
        }
        Ok(command)
    }
}

fn parse_set(kind: &str, value: Option<&str>) -> Result<ControlCommand> {
    let kind: ParamKind = kind.parse()?;
    let raw = value.ok_or_else(|| anyhow!("'{kind}' needs a value"))?;
    let value: f32 = raw
        .parse()
        .map_err(|_| anyhow!("'{raw}' is not a number"))?;
    Ok(ControlCommand::Set(kind, value))
}
