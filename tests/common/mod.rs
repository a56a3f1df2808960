//! Shared helpers for the integration test suite.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use converge::engine::Engine;
use converge::platform::{Os, Platform};
use converge::providers::default_registry;

/// Write a config fixture into the test directory, creating parents.
pub fn write_config(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("fixture parent dir should be creatable");
    }
    std::fs::write(&path, content).expect("fixture should be writable");
    path
}

/// An engine with the full built-in registry, gated as a Linux host so the
/// suite behaves identically on any Unix CI runner.
pub fn linux_engine() -> Engine {
    Engine::with_platform(default_registry(), Platform::with_os(Os::Linux))
}
