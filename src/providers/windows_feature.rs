//! Windows optional-feature convergence.
//!
//! Only valid on Windows. Prefers DISM when available, with a PowerShell
//! ServerManager fallback. Desired state is `installed` (default) or
//! `removed`.

use anyhow::{anyhow, bail, Result};

use crate::dsl::AttrMap;
use crate::exec;

use super::{
    attr_str, ensure_not_cancelled, CancelToken, ResourceProvider, ResourceState, Status,
};

/// Converges Windows optional features.
#[derive(Debug, Default)]
pub struct WindowsFeatureProvider;

impl WindowsFeatureProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn is_installed(&self, name: &str) -> Result<bool> {
        if dism_available() {
            self.is_installed_dism(name)
        } else {
            self.is_installed_powershell(name)
        }
    }

    fn is_installed_dism(&self, name: &str) -> Result<bool> {
        let result = exec::run_unchecked(
            "dism",
            &["/Online", "/Get-FeatureInfo", &format!("/FeatureName:{name}")],
        )?;
        if !result.success {
            bail!(
                "error checking feature with DISM: {}",
                result.combined_output()
            );
        }
        Ok(result.stdout.contains("State : Enabled"))
    }

    fn is_installed_powershell(&self, name: &str) -> Result<bool> {
        let command =
            format!("Get-WindowsFeature -Name {name} | Select-Object -ExpandProperty Installed");
        let result = exec::run_unchecked("powershell", &["-Command", &command])?;
        if !result.success {
            bail!(
                "error checking feature with PowerShell: {}",
                result.combined_output()
            );
        }
        Ok(result.stdout.trim() == "True")
    }

    fn install(&self, name: &str) -> Result<()> {
        if dism_available() {
            run_feature(
                "dism",
                &[
                    "/Online",
                    "/Enable-Feature",
                    &format!("/FeatureName:{name}"),
                    "/All",
                ],
                "installing",
            )
        } else {
            run_feature(
                "powershell",
                &["-Command", &format!("Install-WindowsFeature -Name {name}")],
                "installing",
            )
        }
    }

    fn remove(&self, name: &str) -> Result<()> {
        if dism_available() {
            run_feature(
                "dism",
                &[
                    "/Online",
                    "/Disable-Feature",
                    &format!("/FeatureName:{name}"),
                ],
                "removing",
            )
        } else {
            run_feature(
                "powershell",
                &["-Command", &format!("Uninstall-WindowsFeature -Name {name}")],
                "removing",
            )
        }
    }
}

fn dism_available() -> bool {
    exec::which("dism")
}

/// PowerShell with the ServerManager module, the fallback when DISM is
/// absent.
fn powershell_available() -> bool {
    exec::which("powershell")
        && exec::run_unchecked(
            "powershell",
            &["-Command", "Get-Module -ListAvailable -Name ServerManager"],
        )
        .is_ok_and(|r| r.success)
}

fn run_feature(program: &str, args: &[&str], action: &str) -> Result<()> {
    let result = exec::run_unchecked(program, args)?;
    if !result.success {
        bail!(
            "error {action} feature with {program}: exit {}\noutput: {}",
            result.code.unwrap_or(-1),
            result.combined_output()
        );
    }
    Ok(())
}

fn feature_name(attributes: &AttrMap) -> Result<&str> {
    attr_str(attributes, "name")
        .ok_or_else(|| anyhow!("windows_feature resource requires 'name' attribute"))
}

fn ensure_windows() -> Result<()> {
    if !cfg!(target_os = "windows") {
        bail!("windows_feature provider is only valid on Windows");
    }
    Ok(())
}

impl ResourceProvider for WindowsFeatureProvider {
    fn validate(&self, token: &CancelToken, attributes: &AttrMap) -> Result<()> {
        ensure_not_cancelled!(token);
        ensure_windows()?;

        let name = attributes
            .get("name")
            .ok_or_else(|| anyhow!("windows_feature resource requires 'name' attribute"))?;
        if name.as_str().is_none() {
            bail!("windows_feature 'name' must be a string");
        }

        if let Some(state) = attr_str(attributes, "state") {
            if !matches!(state, "installed" | "removed") {
                bail!("windows_feature 'state' must be one of: installed, removed");
            }
        }

        if !dism_available() && !powershell_available() {
            bail!("neither DISM nor PowerShell (with Server Manager module) are available");
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
        ensure_windows()?;

        let name = feature_name(desired)?;
        let state = attr_str(desired, "state").unwrap_or("installed");
        let mut result = ResourceState::new("windows_feature", name, desired.clone());
        result.status = Status::Planned;

        let installed = self.is_installed(name)?;
        if (state == "installed" && installed) || (state == "removed" && !installed) {
            result.status = Status::Unchanged;
        }

        Ok(result)
    }

    fn apply(&self, token: &CancelToken, state: &ResourceState) -> Result<ResourceState> {
        ensure_not_cancelled!(token);
        ensure_windows()?;

        let attributes = &state.attributes;
        let name = feature_name(attributes)?;
        let desired = attr_str(attributes, "state").unwrap_or("installed");
        let mut result = ResourceState::new(&state.kind, &state.name, attributes.clone());

        let installed = self.is_installed(name)?;

        if desired == "installed" && !installed {
            self.install(name)?;
            result.status = Status::Created;
        } else if desired == "removed" && installed {
            self.remove(name)?;
            result.status = Status::Deleted;
        }

        Ok(result)
    }
}
