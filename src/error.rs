//! Domain-specific error types for the configuration pipeline.
//!
//! This module provides a structured error hierarchy using [`thiserror`].
//! The front-end stages return typed errors; command handlers at the CLI
//! boundary convert them to [`anyhow::Error`] via the standard `?` operator.
//!
//! Parse diagnostics are deliberately non-fatal and accumulate — a config
//! file with one bad block still yields its well-formed siblings, together
//! with a composite [`ParseFailure`]. Include, graph, and validation errors
//! are fatal at the first occurrence.

use std::path::PathBuf;

use thiserror::Error;

/// A single lex or parse diagnostic with its source position.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}, column {column}: {message}")]
pub struct Diagnostic {
    /// 1-based line of the offending token.
    pub line: usize,
    /// 1-based column of the offending token.
    pub column: usize,
    /// Human-readable description of the problem.
    pub message: String,
}

/// Composite failure returned when a file parses with one or more errors.
#[derive(Error, Debug)]
#[error("parsing failed with {} error(s)", .0.len())]
pub struct ParseFailure(pub Vec<Diagnostic>);

/// Errors that arise while splicing included configuration files.
#[derive(Error, Debug)]
pub enum IncludeError {
    /// A config file could not be read.
    #[error("error reading config file {path}: {source}")]
    Read {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A config file was read but did not parse cleanly.
    #[error("error parsing config file {path}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        path: PathBuf,
        /// The accumulated parse diagnostics.
        source: ParseFailure,
    },

    /// An include pattern could not be compiled or walked.
    #[error("error resolving include pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },

    /// A `file("…")` reference named a file that could not be read.
    #[error("error reading file {path}: {source}")]
    FileRef {
        /// Path of the referenced file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Fatal errors raised by the execution engine before any apply.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A `depends_on` entry names a resource that does not exist.
    #[error("resource {resource} depends on non-existent resource {dependency}")]
    MissingDependency {
        resource: String,
        dependency: String,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected involving resource {0}")]
    DependencyCycle(String),

    /// No provider is registered for a resource's type.
    #[error("no provider for resource {resource}: {source}")]
    MissingProvider {
        resource: String,
        source: RegistryError,
    },

    /// A provider rejected a resource's attributes.
    #[error("validation failed for resource {resource}: {message}")]
    Validation { resource: String, message: String },
}

/// Error returned by the provider registry for unknown resource types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no provider registered for resource type {0}")]
pub struct RegistryError(pub String);
