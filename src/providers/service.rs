//! Service convergence across init systems.
//!
//! Desired state is `running`, `stopped`, `restarted`, or `reloaded`, plus a
//! boot-enablement flag. The init system is auto-detected unless the
//! resource carries an explicit `provider` override. `restarted` and
//! `reloaded` always report a change.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};

use crate::dsl::AttrMap;
use crate::exec;
use crate::platform::Platform;

use super::{
    attr_str, ensure_not_cancelled, CancelToken, ResourceProvider, ResourceState, Status,
};

/// Running/enabled snapshot of a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ServiceStatus {
    running: bool,
    enabled: bool,
}

/// Converges system services.
#[derive(Debug)]
pub struct ServiceProvider {
    platform: Platform,
}

impl Default for ServiceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            platform: Platform::detect(),
        }
    }

    /// The init system to drive: an explicit `provider` attribute wins
    /// unless it is `auto`, otherwise the detected one.
    fn service_manager(&self, attributes: &AttrMap) -> String {
        match attr_str(attributes, "provider") {
            Some(provider) if provider != "auto" => provider.to_string(),
            _ => self.platform.init_system().to_string(),
        }
    }

    /// Probe the current running and boot-enablement state of a service.
    fn current_status(&self, manager: &str, name: &str) -> Result<ServiceStatus> {
        let mut status = ServiceStatus::default();

        match manager {
            "systemd" => {
                let unit = format!("{name}.service");
                status.running = exec::run_unchecked("systemctl", &["is-active", &unit])?.success;
                status.enabled = exec::run_unchecked("systemctl", &["is-enabled", &unit])?.success;
            }
            "upstart" => {
                let result = exec::run_unchecked("status", &[name])?;
                status.running = result.success && result.stdout.contains("start/running");
                status.enabled = Path::new(&format!("/etc/init/{name}.conf")).exists();
            }
            "sysvinit" => {
                status.running = exec::run_unchecked("service", &[name, "status"])?.success;
                status.enabled = sysvinit_enabled(name);
            }
            "launchd" => {
                let result = exec::run_unchecked("launchctl", &["list"])?;
                status.running = result.success && result.stdout.contains(name);
                status.enabled = launchd_plist_paths(name).iter().any(|p| p.exists());
            }
            "windows" => {
                let query = exec::run_unchecked("sc", &["query", name])?;
                status.running = query.success && query.stdout.contains("RUNNING");
                let config = exec::run_unchecked("sc", &["qc", name])?;
                status.enabled = config.success && config.stdout.contains("AUTO_START");
            }
            _ => {}
        }

        Ok(status)
    }

    fn start(&self, manager: &str, name: &str) -> Result<()> {
        match manager {
            "systemd" => run_service("systemctl", &["start", &format!("{name}.service")], "start", name),
            "upstart" => run_service("start", &[name], "start", name),
            "sysvinit" => run_service("service", &[name, "start"], "start", name),
            "launchd" => {
                // An unloaded launchd job has to be loaded before it can be
                // started.
                let status = self.current_status(manager, name)?;
                if !status.enabled {
                    let plist = find_plist(name)
                        .ok_or_else(|| anyhow!("could not find plist for service {name}"))?;
                    run_service("launchctl", &["load", &plist], "load", name)?;
                }
                run_service("launchctl", &["start", name], "start", name)
            }
            "windows" => run_service("sc", &["start", name], "start", name),
            _ => bail!("unsupported service provider: {manager}"),
        }
    }

    fn stop(&self, manager: &str, name: &str) -> Result<()> {
        match manager {
            "systemd" => run_service("systemctl", &["stop", &format!("{name}.service")], "stop", name),
            "upstart" => run_service("stop", &[name], "stop", name),
            "sysvinit" => run_service("service", &[name, "stop"], "stop", name),
            "launchd" => run_service("launchctl", &["stop", name], "stop", name),
            "windows" => run_service("sc", &["stop", name], "stop", name),
            _ => bail!("unsupported service provider: {manager}"),
        }
    }

    fn restart(&self, manager: &str, name: &str) -> Result<()> {
        match manager {
            "systemd" => {
                run_service("systemctl", &["restart", &format!("{name}.service")], "restart", name)
            }
            "upstart" => run_service("restart", &[name], "restart", name),
            "sysvinit" => run_service("service", &[name, "restart"], "restart", name),
            // Neither launchd nor the Windows SCM has a one-shot restart.
            "launchd" | "windows" => {
                self.stop(manager, name)?;
                self.start(manager, name)
            }
            _ => bail!("unsupported service provider: {manager}"),
        }
    }

    fn reload(&self, manager: &str, name: &str) -> Result<()> {
        match manager {
            "systemd" => {
                run_service("systemctl", &["reload", &format!("{name}.service")], "reload", name)
            }
            "upstart" => run_service("reload", &[name], "reload", name),
            "sysvinit" => run_service("service", &[name, "reload"], "reload", name),
            "launchd" => {
                let plist = find_plist(name)
                    .ok_or_else(|| anyhow!("could not find plist for service {name}"))?;
                run_service("launchctl", &["unload", &plist], "unload", name)?;
                run_service("launchctl", &["load", &plist], "load", name)
            }
            "windows" => self.restart(manager, name),
            _ => bail!("unsupported service provider: {manager}"),
        }
    }

    fn enable(&self, manager: &str, name: &str) -> Result<()> {
        match manager {
            "systemd" => {
                run_service("systemctl", &["enable", &format!("{name}.service")], "enable", name)
            }
            "upstart" => {
                // Upstart services are enabled by default once their .conf
                // exists.
                if !Path::new(&format!("/etc/init/{name}.conf")).exists() {
                    bail!("upstart service {name} not found");
                }
                Ok(())
            }
            "sysvinit" => run_service("update-rc.d", &[name, "defaults"], "enable", name),
            "launchd" => {
                let plist = find_plist(name)
                    .ok_or_else(|| anyhow!("could not find plist for service {name}"))?;
                run_service("launchctl", &["load", "-w", &plist], "enable", name)
            }
            "windows" => run_service("sc", &["config", name, "start=auto"], "enable", name),
            _ => bail!("unsupported service provider: {manager}"),
        }
    }

    fn disable(&self, manager: &str, name: &str) -> Result<()> {
        match manager {
            "systemd" => {
                run_service("systemctl", &["disable", &format!("{name}.service")], "disable", name)
            }
            "upstart" => {
                let override_path = format!("/etc/init/{name}.override");
                std::fs::write(&override_path, "manual")
                    .map_err(|e| anyhow!("failed to create upstart override file: {e}"))
            }
            "sysvinit" => run_service("update-rc.d", &[name, "disable"], "disable", name),
            "launchd" => {
                let plist = find_plist(name)
                    .ok_or_else(|| anyhow!("could not find plist for service {name}"))?;
                run_service("launchctl", &["unload", "-w", &plist], "disable", name)
            }
            "windows" => run_service("sc", &["config", name, "start=demand"], "disable", name),
            _ => bail!("unsupported service provider: {manager}"),
        }
    }
}

/// Plist locations consulted when probing whether a launchd job is enabled.
fn launchd_plist_paths(name: &str) -> Vec<PathBuf> {
    vec![
        PathBuf::from(format!("/Library/LaunchDaemons/{name}.plist")),
        PathBuf::from(format!("/Library/LaunchAgents/{name}.plist")),
        PathBuf::from(format!("/System/Library/LaunchDaemons/{name}.plist")),
        PathBuf::from(format!("/System/Library/LaunchAgents/{name}.plist")),
    ]
}

/// Locate the loadable plist for a launchd job (system plists are not
/// loadable and are excluded).
fn find_plist(name: &str) -> Option<String> {
    [
        format!("/Library/LaunchDaemons/{name}.plist"),
        format!("/Library/LaunchAgents/{name}.plist"),
    ]
    .into_iter()
    .find(|p| Path::new(p).exists())
}

/// Whether a SysV init service has a start symlink in any standard runlevel.
fn sysvinit_enabled(name: &str) -> bool {
    ["2", "3", "4", "5"].iter().any(|level| {
        std::fs::read_dir(format!("/etc/rc{level}.d"))
            .map(|entries| {
                entries.flatten().any(|entry| {
                    let file_name = entry.file_name();
                    let text = file_name.to_string_lossy();
                    text.starts_with('S') && text.ends_with(name)
                })
            })
            .unwrap_or(false)
    })
}

/// Run a service-management command, reporting the child's combined output
/// on failure.
fn run_service(program: &str, args: &[&str], action: &str, name: &str) -> Result<()> {
    let result = exec::run_unchecked(program, args)?;
    if !result.success {
        bail!(
            "failed to {action} service {name}: exit {}\noutput: {}",
            result.code.unwrap_or(-1),
            result.combined_output()
        );
    }
    Ok(())
}

fn service_name(attributes: &AttrMap) -> Result<&str> {
    attr_str(attributes, "name")
        .ok_or_else(|| anyhow!("service resource requires 'name' attribute"))
}

fn desired_enabled(attributes: &AttrMap) -> bool {
    attributes
        .get("enabled")
        .and_then(crate::dsl::Value::as_bool)
        .unwrap_or(false)
}

impl ResourceProvider for ServiceProvider {
    fn validate(&self, token: &CancelToken, attributes: &AttrMap) -> Result<()> {
        ensure_not_cancelled!(token);

        let name = attributes
            .get("name")
            .ok_or_else(|| anyhow!("service resource requires 'name' attribute"))?;
        if name.as_str().is_none() {
            bail!("service 'name' must be a string");
        }

        if let Some(state) = attr_str(attributes, "state") {
            if !matches!(state, "running" | "stopped" | "restarted" | "reloaded") {
                bail!("service 'state' must be one of: running, stopped, restarted, reloaded");
            }
        }

        if let Some(enabled) = attributes.get("enabled") {
            if enabled.as_bool().is_none() {
                bail!("service 'enabled' must be a boolean");
            }
        }

        if let Some(provider) = attr_str(attributes, "provider") {
            let detected = self.platform.init_system().to_string();
            if provider != detected && provider != "auto" {
                tracing::warn!(
                    "specified service provider '{provider}' differs from detected init system '{detected}'"
                );
            }
        }

        Ok(())
    }

    fn plan(
        &self,
        token: &CancelToken,
        _current: &AttrMap,
        desired: &AttrMap,
    ) -> Result<ResourceState> {
        ensure_not_cancelled!(token);

        let name = service_name(desired)?;
        let mut result = ResourceState::new("service", name, desired.clone());

        let manager = self.service_manager(desired);
        let current = self.current_status(&manager, name)?;

        let state_out_of_spec = match attr_str(desired, "state") {
            Some("running") => !current.running,
            Some("stopped") => current.running,
            // Intentionally non-idempotent: always a change.
            Some("restarted" | "reloaded") => true,
            _ => false,
        };

        if state_out_of_spec || desired_enabled(desired) != current.enabled {
            result.status = Status::Planned;
        }

        Ok(result)
    }

    fn apply(&self, token: &CancelToken, state: &ResourceState) -> Result<ResourceState> {
        ensure_not_cancelled!(token);

        let attributes = &state.attributes;
        let name = service_name(attributes)?;
        let mut result = ResourceState::new(&state.kind, &state.name, attributes.clone());

        let manager = self.service_manager(attributes);
        let current = self.current_status(&manager, name)?;

        match attr_str(attributes, "state") {
            Some("running") => {
                if !current.running {
                    self.start(&manager, name)?;
                    result.status = Status::Updated;
                }
            }
            Some("stopped") => {
                if current.running {
                    self.stop(&manager, name)?;
                    result.status = Status::Updated;
                }
            }
            Some("restarted") => {
                self.restart(&manager, name)?;
                result.status = Status::Updated;
            }
            Some("reloaded") => {
                self.reload(&manager, name)?;
                result.status = Status::Updated;
            }
            _ => {}
        }

        let enabled = desired_enabled(attributes);
        if enabled != current.enabled {
            if enabled {
                self.enable(&manager, name)?;
            } else {
                self.disable(&manager, name)?;
            }
            result.status = Status::Updated;
        }

        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dsl::Value;

    fn attrs(entries: &[(&str, &str)]) -> AttrMap {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::Scalar((*v).to_string())))
            .collect()
    }

    #[test]
    fn validate_requires_name() {
        let provider = ServiceProvider::new();
        let err = provider
            .validate(&CancelToken::new(), &AttrMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("requires 'name'"));
    }

    #[test]
    fn validate_rejects_unknown_state() {
        let provider = ServiceProvider::new();
        let err = provider
            .validate(
                &CancelToken::new(),
                &attrs(&[("name", "nginx"), ("state", "paused")]),
            )
            .unwrap_err();
        assert!(err.to_string().contains("must be one of"));
    }

    #[test]
    fn validate_rejects_non_boolean_enabled() {
        let provider = ServiceProvider::new();
        let err = provider
            .validate(
                &CancelToken::new(),
                &attrs(&[("name", "nginx"), ("enabled", "yes")]),
            )
            .unwrap_err();
        assert!(err.to_string().contains("must be a boolean"));
    }

    #[test]
    fn validate_accepts_boolean_enabled_strings() {
        let provider = ServiceProvider::new();
        provider
            .validate(
                &CancelToken::new(),
                &attrs(&[("name", "nginx"), ("enabled", "true")]),
            )
            .unwrap();
        provider
            .validate(
                &CancelToken::new(),
                &attrs(&[("name", "nginx"), ("enabled", "false")]),
            )
            .unwrap();
    }

    #[test]
    fn explicit_provider_override_wins() {
        let provider = ServiceProvider::new();
        let manager = provider.service_manager(&attrs(&[("provider", "sysvinit")]));
        assert_eq!(manager, "sysvinit");
    }

    #[test]
    fn auto_provider_falls_back_to_detection() {
        let provider = ServiceProvider::new();
        let detected = provider.platform.init_system().to_string();
        assert_eq!(provider.service_manager(&attrs(&[("provider", "auto")])), detected);
        assert_eq!(provider.service_manager(&AttrMap::new()), detected);
    }

    #[test]
    fn desired_enabled_defaults_to_false() {
        assert!(!desired_enabled(&AttrMap::new()));
        assert!(desired_enabled(&attrs(&[("enabled", "true")])));
        assert!(!desired_enabled(&attrs(&[("enabled", "false")])));
    }

    #[test]
    fn launchd_probe_paths_cover_daemons_and_agents() {
        let paths = launchd_plist_paths("myjob");
        assert_eq!(paths.len(), 4);
        assert!(paths[0].to_string_lossy().contains("LaunchDaemons"));
        assert!(paths[1].to_string_lossy().contains("LaunchAgents"));
    }

    #[test]
    fn unsupported_manager_errors_on_mutation() {
        let provider = ServiceProvider::new();
        let err = provider.start("unknown", "nginx").unwrap_err();
        assert!(err.to_string().contains("unsupported service provider"));
    }
}
