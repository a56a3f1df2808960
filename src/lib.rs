//! Declarative configuration management engine.
//!
//! Cross-platform tool that converges a machine to a desired end-state
//! described in a small block-structured DSL: files and directories with
//! content and permissions, installed packages, running services, and
//! Windows features.
//!
//! The public API is organised as a single forward pipeline:
//!
//! - **[`dsl`]** — lexer, parser, and the include processor that resolves
//!   variables, templates, and file inclusion
//! - **[`engine`]** — dependency graph, topological ordering, platform
//!   gating, and the two-phase plan/apply driver
//! - **[`providers`]** — the validate/plan/apply contract plus the concrete
//!   file, package, service, and Windows-feature providers
//! - **[`commands`]** — top-level orchestration for `--plan` and `--apply`
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod dsl;
pub mod engine;
pub mod error;
pub mod exec;
pub mod logging;
pub mod platform;
pub mod providers;
