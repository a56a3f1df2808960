use std::fmt;
use std::path::Path;

use crate::exec;

/// Detected operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
}

impl Os {
    /// The operating system this binary was compiled for.
    #[must_use]
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(target_os = "macos") {
            Os::Darwin
        } else {
            // Default to Linux for other Unix-like systems
            Os::Linux
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Os::Linux => write!(f, "linux"),
            Os::Darwin => write!(f, "darwin"),
            Os::Windows => write!(f, "windows"),
        }
    }
}

/// Detected service-management init system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitSystem {
    Systemd,
    Upstart,
    Sysvinit,
    Launchd,
    Windows,
    Unknown,
}

impl fmt::Display for InitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitSystem::Systemd => write!(f, "systemd"),
            InitSystem::Upstart => write!(f, "upstart"),
            InitSystem::Sysvinit => write!(f, "sysvinit"),
            InitSystem::Launchd => write!(f, "launchd"),
            InitSystem::Windows => write!(f, "windows"),
            InitSystem::Unknown => write!(f, "unknown"),
        }
    }
}

/// Detected system package manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
    Pacman,
    Zypper,
    Apk,
    Brew,
    Port,
    Choco,
    Winget,
    Unknown,
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageManager::Apt => write!(f, "apt"),
            PackageManager::Dnf => write!(f, "dnf"),
            PackageManager::Yum => write!(f, "yum"),
            PackageManager::Pacman => write!(f, "pacman"),
            PackageManager::Zypper => write!(f, "zypper"),
            PackageManager::Apk => write!(f, "apk"),
            PackageManager::Brew => write!(f, "brew"),
            PackageManager::Port => write!(f, "port"),
            PackageManager::Choco => write!(f, "choco"),
            PackageManager::Winget => write!(f, "winget"),
            PackageManager::Unknown => write!(f, "unknown"),
        }
    }
}

/// Platform information and probes for the current system.
#[derive(Debug, Clone)]
pub struct Platform {
    pub os: Os,
}

impl Platform {
    /// Detect the current platform.
    #[must_use]
    pub fn detect() -> Self {
        Self { os: Os::current() }
    }

    /// Create a platform with an explicit OS (for tests and gating overrides).
    #[must_use]
    pub const fn with_os(os: Os) -> Self {
        Self { os }
    }

    /// Check if the current platform is in the list of supported platforms.
    ///
    /// The token `unix` matches both Linux and macOS.
    #[must_use]
    pub fn is_supported(&self, platforms: &[String]) -> bool {
        platforms.iter().any(|platform| match platform.as_str() {
            "linux" => self.os == Os::Linux,
            "darwin" => self.os == Os::Darwin,
            "windows" => self.os == Os::Windows,
            "unix" => matches!(self.os, Os::Linux | Os::Darwin),
            _ => false,
        })
    }

    /// Detect the init system used for service management.
    ///
    /// On Linux the probe order is systemd, upstart, SysV init; macOS is
    /// always launchd and Windows always the service control manager.
    #[must_use]
    pub fn init_system(&self) -> InitSystem {
        match self.os {
            Os::Darwin => InitSystem::Launchd,
            Os::Windows => InitSystem::Windows,
            Os::Linux => {
                if Path::new("/run/systemd/system").exists() {
                    return InitSystem::Systemd;
                }

                if Path::new("/sbin/initctl").exists() {
                    let upstart = exec::run_unchecked("/sbin/initctl", &["--version"])
                        .is_ok_and(|r| r.success && r.stdout.contains("upstart"));
                    if upstart {
                        return InitSystem::Upstart;
                    }
                }

                if Path::new("/etc/init.d").exists() {
                    return InitSystem::Sysvinit;
                }

                InitSystem::Unknown
            }
        }
    }

    /// Detect the package manager on the system by probing for its binary.
    #[must_use]
    pub fn package_manager(&self) -> PackageManager {
        match self.os {
            Os::Darwin => {
                if exec::which("brew") {
                    PackageManager::Brew
                } else if exec::which("port") {
                    PackageManager::Port
                } else {
                    PackageManager::Unknown
                }
            }
            Os::Windows => {
                if exec::which("choco") {
                    PackageManager::Choco
                } else if exec::which("winget") {
                    PackageManager::Winget
                } else {
                    PackageManager::Unknown
                }
            }
            Os::Linux => {
                if exec::which("apt") || exec::which("apt-get") {
                    PackageManager::Apt
                } else if exec::which("dnf") {
                    PackageManager::Dnf
                } else if exec::which("yum") {
                    PackageManager::Yum
                } else if exec::which("pacman") {
                    PackageManager::Pacman
                } else if exec::which("zypper") {
                    PackageManager::Zypper
                } else if exec::which("apk") {
                    PackageManager::Apk
                } else {
                    PackageManager::Unknown
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn os_display() {
        assert_eq!(Os::Linux.to_string(), "linux");
        assert_eq!(Os::Darwin.to_string(), "darwin");
        assert_eq!(Os::Windows.to_string(), "windows");
    }

    #[test]
    fn init_system_display() {
        assert_eq!(InitSystem::Systemd.to_string(), "systemd");
        assert_eq!(InitSystem::Launchd.to_string(), "launchd");
        assert_eq!(InitSystem::Windows.to_string(), "windows");
    }

    #[test]
    fn package_manager_display() {
        assert_eq!(PackageManager::Apt.to_string(), "apt");
        assert_eq!(PackageManager::Winget.to_string(), "winget");
        assert_eq!(PackageManager::Unknown.to_string(), "unknown");
    }

    #[test]
    fn detect_returns_current_os() {
        let p = Platform::detect();
        assert_eq!(p.os, Os::current());
    }

    #[test]
    fn supported_exact_match() {
        let p = Platform::with_os(Os::Linux);
        assert!(p.is_supported(&strings(&["linux"])));
        assert!(p.is_supported(&strings(&["windows", "linux"])));
        assert!(!p.is_supported(&strings(&["windows"])));
    }

    #[test]
    fn supported_unix_alias_matches_linux_and_darwin() {
        assert!(Platform::with_os(Os::Linux).is_supported(&strings(&["unix"])));
        assert!(Platform::with_os(Os::Darwin).is_supported(&strings(&["unix"])));
        assert!(!Platform::with_os(Os::Windows).is_supported(&strings(&["unix"])));
    }

    #[test]
    fn unsupported_on_empty_or_unknown_list() {
        let p = Platform::with_os(Os::Linux);
        assert!(!p.is_supported(&[]));
        assert!(!p.is_supported(&strings(&["plan9"])));
    }

    #[test]
    fn darwin_and_windows_init_systems_are_fixed() {
        assert_eq!(
            Platform::with_os(Os::Darwin).init_system(),
            InitSystem::Launchd
        );
        assert_eq!(
            Platform::with_os(Os::Windows).init_system(),
            InitSystem::Windows
        );
    }
}
