use std::path::Path;

use anyhow::Result;

use crate::dsl::include;
use crate::engine::{Action, Engine};
use crate::providers::{default_registry, CancelToken};

/// Run the plan command: report the diff against the live system without
/// mutating it.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the engine
/// cannot proceed (parse, validation, cycle, or missing-provider error).
pub fn run(config: &Path, verbose: bool) -> Result<()> {
    tracing::info!(target: "converge::stage", "Planning configuration changes");

    let resources = include::load_config(config)?;
    let engine = Engine::new(default_registry());
    let plan = engine.plan(&CancelToken::new(), resources)?;

    let mut add = 0;
    let mut change = 0;
    let mut destroy = 0;

    for (id, action) in &plan {
        match action.action {
            Action::Create => {
                tracing::info!("+ create: {id}");
                add += 1;
            }
            Action::Update => {
                tracing::info!("~ update: {id}");
                change += 1;
            }
            Action::Delete => {
                tracing::info!("- delete: {id}");
                destroy += 1;
            }
            Action::NoOp => {
                if verbose {
                    tracing::info!("  no-op: {id}");
                }
            }
            Action::Error => {
                tracing::error!("! {id}: {}", action.details);
            }
        }
        if verbose && action.action != Action::NoOp {
            tracing::debug!("    {}", action.details);
        }
    }

    tracing::info!(
        target: "converge::stage",
        "Plan: {add} to add, {change} to change, {destroy} to destroy"
    );
    Ok(())
}
