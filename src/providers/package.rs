//! Package convergence through the detected system package manager.
//!
//! Desired state is `installed` (default), `removed`, or `latest`. Queries
//! and mutations route through the manager detected by the platform probe;
//! `latest` treats an installed package as always needing an upgrade call.

use anyhow::{anyhow, bail, Result};

use crate::dsl::AttrMap;
use crate::exec;
use crate::platform::{PackageManager, Platform};

use super::{
    attr_str, ensure_not_cancelled, CancelToken, ResourceProvider, ResourceState, Status,
};

/// Converges system packages.
#[derive(Debug)]
pub struct PackageProvider {
    platform: Platform,
}

impl Default for PackageProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            platform: Platform::detect(),
        }
    }

    fn manager(&self) -> Result<PackageManager> {
        let manager = self.platform.package_manager();
        if manager == PackageManager::Unknown {
            bail!("no supported package manager found on this system");
        }
        Ok(manager)
    }

    /// Whether the package is currently installed, per the manager's query
    /// command exit status.
    fn is_installed(&self, manager: PackageManager, name: &str) -> Result<bool> {
        let (program, args): (&str, Vec<&str>) = match manager {
            PackageManager::Apt => ("dpkg", vec!["-s", name]),
            PackageManager::Dnf => ("dnf", vec!["list", "installed", name]),
            PackageManager::Yum => ("yum", vec!["list", "installed", name]),
            PackageManager::Pacman => ("pacman", vec!["-Q", name]),
            PackageManager::Zypper => ("zypper", vec!["search", "--installed-only", name]),
            PackageManager::Apk => ("apk", vec!["info", "-e", name]),
            PackageManager::Brew => ("brew", vec!["list", "--versions", name]),
            PackageManager::Port => ("port", vec!["installed", name]),
            PackageManager::Choco => ("choco", vec!["list", "--local-only", name]),
            PackageManager::Winget => ("winget", vec!["list", "--exact", name]),
            PackageManager::Unknown => bail!("unsupported package manager: {manager}"),
        };

        Ok(exec::run_unchecked(program, &args)?.success)
    }

    fn install(&self, manager: PackageManager, name: &str, version: &str) -> Result<()> {
        let pkg = versioned_argument(manager, name, version);

        let (program, args): (&str, Vec<&str>) = match manager {
            PackageManager::Apt => ("apt-get", vec!["install", "-y", &pkg]),
            PackageManager::Dnf => ("dnf", vec!["install", "-y", &pkg]),
            PackageManager::Yum => ("yum", vec!["install", "-y", &pkg]),
            PackageManager::Pacman => ("pacman", vec!["-S", "--noconfirm", &pkg]),
            PackageManager::Zypper => ("zypper", vec!["install", "-y", &pkg]),
            PackageManager::Apk => ("apk", vec!["add", &pkg]),
            PackageManager::Brew => ("brew", vec!["install", &pkg]),
            PackageManager::Port => ("port", vec!["install", &pkg]),
            PackageManager::Choco => ("choco", vec!["install", "--yes", &pkg]),
            PackageManager::Winget => ("winget", vec!["install", "--exact", "--silent", &pkg]),
            PackageManager::Unknown => bail!("unsupported package manager: {manager}"),
        };

        run_manager(program, &args, "install", name)
    }

    fn remove(&self, manager: PackageManager, name: &str) -> Result<()> {
        let (program, args): (&str, Vec<&str>) = match manager {
            PackageManager::Apt => ("apt-get", vec!["remove", "-y", name]),
            PackageManager::Dnf => ("dnf", vec!["remove", "-y", name]),
            PackageManager::Yum => ("yum", vec!["remove", "-y", name]),
            PackageManager::Pacman => ("pacman", vec!["-R", "--noconfirm", name]),
            PackageManager::Zypper => ("zypper", vec!["remove", "-y", name]),
            PackageManager::Apk => ("apk", vec!["del", name]),
            PackageManager::Brew => ("brew", vec!["uninstall", name]),
            PackageManager::Port => ("port", vec!["uninstall", name]),
            PackageManager::Choco => ("choco", vec!["uninstall", "--yes", name]),
            PackageManager::Winget => ("winget", vec!["uninstall", "--exact", "--silent", name]),
            PackageManager::Unknown => bail!("unsupported package manager: {manager}"),
        };

        run_manager(program, &args, "remove", name)
    }

    fn upgrade(&self, manager: PackageManager, name: &str) -> Result<()> {
        let (program, args): (&str, Vec<&str>) = match manager {
            PackageManager::Apt => ("apt-get", vec!["install", "--only-upgrade", "-y", name]),
            PackageManager::Dnf => ("dnf", vec!["update", "-y", name]),
            PackageManager::Yum => ("yum", vec!["update", "-y", name]),
            PackageManager::Pacman => ("pacman", vec!["-Syu", "--noconfirm", name]),
            PackageManager::Zypper => ("zypper", vec!["update", "-y", name]),
            PackageManager::Apk => ("apk", vec!["upgrade", name]),
            PackageManager::Brew => ("brew", vec!["upgrade", name]),
            PackageManager::Port => ("port", vec!["upgrade", name]),
            PackageManager::Choco => ("choco", vec!["upgrade", "--yes", name]),
            PackageManager::Winget => ("winget", vec!["upgrade", "--exact", "--silent", name]),
            PackageManager::Unknown => bail!("unsupported package manager: {manager}"),
        };

        run_manager(program, &args, "update", name)
    }
}

/// The package argument with the manager's version-pinning syntax applied.
fn versioned_argument(manager: PackageManager, name: &str, version: &str) -> String {
    if version.is_empty() {
        return name.to_string();
    }

    match manager {
        PackageManager::Apt
        | PackageManager::Pacman
        | PackageManager::Zypper
        | PackageManager::Apk => format!("{name}={version}"),
        PackageManager::Dnf | PackageManager::Yum => format!("{name}-{version}"),
        PackageManager::Port => format!("{name}@{version}"),
        PackageManager::Choco => format!("{name} --version={version}"),
        PackageManager::Winget => format!("{name} --version {version}"),
        // Homebrew does not support installing specific versions directly.
        PackageManager::Brew | PackageManager::Unknown => name.to_string(),
    }
}

/// Run a package-manager mutation, reporting the child's combined output on
/// failure.
fn run_manager(program: &str, args: &[&str], action: &str, name: &str) -> Result<()> {
    let result = exec::run_unchecked(program, args)?;
    if !result.success {
        bail!(
            "failed to {action} package {name}: exit {}\noutput: {}",
            result.code.unwrap_or(-1),
            result.combined_output()
        );
    }
    Ok(())
}

fn package_name(attributes: &AttrMap) -> Result<&str> {
    attr_str(attributes, "name")
        .ok_or_else(|| anyhow!("package resource requires 'name' attribute"))
}

fn desired_state(attributes: &AttrMap) -> &str {
    attr_str(attributes, "state").unwrap_or("installed")
}

impl ResourceProvider for PackageProvider {
    fn validate(&self, token: &CancelToken, attributes: &AttrMap) -> Result<()> {
        ensure_not_cancelled!(token);

        let name = attributes
            .get("name")
            .ok_or_else(|| anyhow!("package resource requires 'name' attribute"))?;
        if name.as_str().is_none() {
            bail!("package 'name' must be a string");
        }

        if let Some(state) = attr_str(attributes, "state") {
            if !matches!(state, "installed" | "removed" | "latest") {
                bail!("package 'state' must be one of: installed, removed, latest");
            }
        }

        self.manager().map(|_| ())
    }

    fn plan(
        &self,
        token: &CancelToken,
        _current: &AttrMap,
        desired: &AttrMap,
    ) -> Result<ResourceState> {
        ensure_not_cancelled!(token);

        let name = package_name(desired)?;
        let mut result = ResourceState::new("package", name, desired.clone());

        let manager = self.manager()?;
        let installed = self.is_installed(manager, name)?;

        match desired_state(desired) {
            "removed" => {
                if installed {
                    result.status = Status::Planned;
                }
            }
            // `latest` always plans an upgrade call for an installed package.
            "latest" => result.status = Status::Planned,
            _ => {
                if !installed {
                    result.status = Status::Planned;
                }
            }
        }

        Ok(result)
    }

    fn apply(&self, token: &CancelToken, state: &ResourceState) -> Result<ResourceState> {
        ensure_not_cancelled!(token);

        let attributes = &state.attributes;
        let name = package_name(attributes)?;
        let version = attr_str(attributes, "version").unwrap_or("");
        let mut result = ResourceState::new(&state.kind, &state.name, attributes.clone());

        let manager = self.manager()?;
        let installed = self.is_installed(manager, name)?;

        match desired_state(attributes) {
            "removed" => {
                if installed {
                    self.remove(manager, name)?;
                    result.status = Status::Deleted;
                }
            }
            "latest" => {
                if installed {
                    self.upgrade(manager, name)?;
                    result.status = Status::Updated;
                } else {
                    self.install(manager, name, "")?;
                    result.status = Status::Created;
                }
            }
            _ => {
                if !installed {
                    self.install(manager, name, version)?;
                    result.status = Status::Created;
                }
            }
        }

        Ok(result)
    }
}
