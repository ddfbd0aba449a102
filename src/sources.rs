use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::Configuration;
use crate::frame::ImageSource;
use crate::params::Controls;
use crate::processing::develop::DevelopFilter;

/// Decodes every configured source and activates `initial-source` (or the
/// first one) with its defaults.
pub fn open_sources(cfg: &Configuration) -> Result<Controls<DevelopFilter>> {
    let filters = cfg
        .sources
        .iter()
        .map(|source| {
            DevelopFilter::open(
                source.name.clone(),
                &source.path,
                cfg.develop.working_max_dim,
                source.defaults,
            )
            .with_context(|| format!("failed to open source '{}'", source.name))
        })
        .collect::<Result<Vec<_>>>()?;
    for filter in &filters {
        debug!(
            source = filter.name(),
            path = ?filter.path(),
            working = ?filter.working_size(),
            "source registered",
        );
    }
    let mut controls = Controls::new(filters)?;
    if let Some(initial) = cfg.initial_source.as_deref() {
        controls.select_source(initial)?;
    }
    info!(
        sources = ?controls.source_names().collect::<Vec<_>>(),
        active = controls.active_name(),
        "sources ready"
    );
    Ok(controls)
}
