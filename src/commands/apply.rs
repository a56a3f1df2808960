use std::path::Path;

use anyhow::Result;

use crate::dsl::include;
use crate::engine::Engine;
use crate::providers::{default_registry, CancelToken, Status};

/// Run the apply command: converge the live system to the configured state.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, the engine cannot
/// proceed, or at least one resource finishes in `failed` status.
pub fn run(config: &Path, verbose: bool) -> Result<()> {
    tracing::info!(target: "converge::stage", "Applying configuration");

    let resources = include::load_config(config)?;
    let engine = Engine::new(default_registry());
    let results = engine.apply(&CancelToken::new(), resources)?;

    let mut changed = 0;
    let mut unchanged = 0;
    let mut failed = 0;

    for (id, state) in &results {
        match state.status {
            Status::Created | Status::Updated | Status::Deleted => {
                tracing::info!("✓ {id}: {}", state.status);
                changed += 1;
            }
            Status::Unchanged => {
                if verbose {
                    tracing::info!("- {id}: unchanged");
                }
                unchanged += 1;
            }
            Status::Failed => {
                tracing::error!(
                    "✗ {id}: failed ({})",
                    state.error.as_deref().unwrap_or("unknown error")
                );
                failed += 1;
            }
            Status::Planned => {}
        }
    }

    tracing::info!(
        target: "converge::stage",
        "Applied {} resources: {changed} changed, {unchanged} unchanged, {failed} failed",
        results.len()
    );

    if failed > 0 {
        anyhow::bail!("{failed} resource(s) failed to apply");
    }
    Ok(())
}
