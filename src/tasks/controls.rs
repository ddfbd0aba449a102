use std::io::{self, BufRead, IsTerminal};
use std::thread;

use anyhow::Result;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::ControlCommand;
use crate::frame::ImageSource;
use crate::params::Controls;

/// Applies one command to the live control state.
pub fn apply_command<S: ImageSource>(controls: &mut Controls<S>, command: &ControlCommand) -> Result<()> {
    match command {
        ControlCommand::Set(kind, value) => {
            let stored = controls.set(*kind, *value);
            if (stored - value).abs() > f32::EPSILON {
                info!(param = %kind, requested = value, stored, "value snapped to slider step and range");
            }
        }
        ControlCommand::SelectSource(name) => controls.select_source(name)?,
        ControlCommand::Reset => {
            controls.reset();
            info!(source = controls.active_name(), "parameters reset to source defaults");
        }
        ControlCommand::Show => {
            info!(
                source = controls.active_name(),
                params = ?controls.parameters(),
                "current parameters"
            );
        }
    }
    Ok(())
}

/// Reads control commands from stdin, one per line, until EOF or `cancel`.
///
/// Runs on a plain thread so a pending read never holds up runtime
/// shutdown. EOF (Ctrl-D) cancels the session when stdin is a terminal.
pub fn spawn_stdin_reader(to_loop: Sender<ControlCommand>, cancel: CancellationToken) {
    let interactive = io::stdin().is_terminal();
    let spawned = thread::Builder::new()
        .name("stdin-controls".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                if cancel.is_cancelled() {
                    return;
                }
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("stdin reader failed: {err}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ControlCommand>() {
                    Ok(command) => {
                        debug!(?command, "control command received");
                        if to_loop.blocking_send(command).is_err() {
                            return;
                        }
                    }
                    Err(err) => warn!("ignoring control input '{}': {err}", line.trim()),
                }
            }
            if interactive {
                info!("stdin closed; initiating shutdown");
                cancel.cancel();
            }
        });
    if let Err(err) = spawned {
        warn!("failed to spawn stdin reader: {err}");
    }
}
