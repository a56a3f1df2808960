//! File and directory convergence.
//!
//! Desired state is `present` (default), `absent`, or `directory`. Content
//! comes from a literal `content` attribute or a `source` path (mutually
//! exclusive); `content` is compared byte-for-byte, `source` by digest of
//! both ends. Owner, group, and mode are enforced on Unix and silently
//! skipped on Windows.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};

use crate::dsl::AttrMap;

use super::{
    attr_str, ensure_not_cancelled, CancelToken, ResourceProvider, ResourceState, Status,
};

/// Converges files and directories.
#[derive(Debug, Default)]
pub struct FileProvider;

impl FileProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn desired_state(attributes: &AttrMap) -> &str {
    attr_str(attributes, "state").unwrap_or("present")
}

fn target_path(attributes: &AttrMap) -> Result<&str> {
    attr_str(attributes, "path").ok_or_else(|| anyhow!("file resource requires 'path' attribute"))
}

/// Stat the target, mapping "not found" to `None`.
fn probe(path: &Path) -> Result<Option<fs::Metadata>> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to stat {}", path.display())),
    }
}

/// Lowercase hex digest of a file's contents, for `source` comparison.
fn file_digest(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};

    let mut file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}

/// Whether the on-disk content already matches the desired content or
/// source. `None` entries mean the attribute is absent.
fn content_in_sync(path: &Path, content: Option<&str>, source: Option<&str>) -> Result<bool> {
    if let Some(content) = content {
        let current = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(current == content.as_bytes())
    } else if let Some(source) = source {
        Ok(file_digest(path)? == file_digest(Path::new(source))?)
    } else {
        Ok(true)
    }
}

#[cfg(unix)]
fn owner_name(metadata: &fs::Metadata) -> Result<String> {
    use std::os::unix::fs::MetadataExt;

    let uid = nix::unistd::Uid::from_raw(metadata.uid());
    let user = nix::unistd::User::from_uid(uid)
        .with_context(|| format!("failed to look up uid {uid}"))?
        .ok_or_else(|| anyhow!("unknown uid {uid}"))?;
    Ok(user.name)
}

#[cfg(unix)]
fn group_name(metadata: &fs::Metadata) -> Result<String> {
    use std::os::unix::fs::MetadataExt;

    let gid = nix::unistd::Gid::from_raw(metadata.gid());
    let group = nix::unistd::Group::from_gid(gid)
        .with_context(|| format!("failed to look up gid {gid}"))?
        .ok_or_else(|| anyhow!("unknown gid {gid}"))?;
    Ok(group.name)
}

/// Whether the owner/group/mode triple already matches the requested
/// attributes. Always in sync on Windows, where the triple is skipped.
#[cfg(unix)]
fn permissions_in_sync(metadata: &fs::Metadata, attributes: &AttrMap) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(owner) = attr_str(attributes, "owner") {
        if owner_name(metadata)? != owner {
            return Ok(false);
        }
    }

    if let Some(group) = attr_str(attributes, "group") {
        if group_name(metadata)? != group {
            return Ok(false);
        }
    }

    if let Some(mode) = attr_str(attributes, "mode") {
        let desired = u32::from_str_radix(mode, 8)
            .with_context(|| format!("invalid file mode: {mode}"))?;
        if metadata.permissions().mode() & 0o7777 != desired {
            return Ok(false);
        }
    }

    Ok(true)
}

#[cfg(not(unix))]
fn permissions_in_sync(_metadata: &fs::Metadata, _attributes: &AttrMap) -> Result<bool> {
    Ok(true)
}

/// Enforce owner, group, and mode on the target. No-op on Windows.
#[cfg(unix)]
fn set_permissions(path: &Path, attributes: &AttrMap) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let owner = attr_str(attributes, "owner");
    let group = attr_str(attributes, "group");

    if owner.is_some() || group.is_some() {
        let uid = owner.map(lookup_uid).transpose()?;
        let gid = group.map(lookup_gid).transpose()?;
        nix::unistd::chown(path, uid, gid)
            .with_context(|| format!("failed to change ownership of {}", path.display()))?;
    }

    if let Some(mode) = attr_str(attributes, "mode") {
        let bits = u32::from_str_radix(mode, 8)
            .with_context(|| format!("invalid file mode: {mode}"))?;
        fs::set_permissions(path, fs::Permissions::from_mode(bits))
            .with_context(|| format!("failed to change mode of {}", path.display()))?;
    }

    Ok(())
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _attributes: &AttrMap) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn lookup_uid(owner: &str) -> Result<nix::unistd::Uid> {
    let user = nix::unistd::User::from_name(owner)
        .with_context(|| format!("failed to look up owner '{owner}'"))?
        .ok_or_else(|| anyhow!("unknown user '{owner}'"))?;
    Ok(user.uid)
}

#[cfg(unix)]
fn lookup_gid(group: &str) -> Result<nix::unistd::Gid> {
    let found = nix::unistd::Group::from_name(group)
        .with_context(|| format!("failed to look up group '{group}'"))?
        .ok_or_else(|| anyhow!("unknown group '{group}'"))?;
    Ok(found.gid)
}

/// Remove whatever is at `path`, file or tree.
fn remove_any(path: &Path, metadata: &fs::Metadata) -> Result<()> {
    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.with_context(|| format!("failed to remove {}", path.display()))
}

impl ResourceProvider for FileProvider {
    fn validate(&self, token: &CancelToken, attributes: &AttrMap) -> Result<()> {
        ensure_not_cancelled!(token);

        let path = attributes
            .get("path")
            .ok_or_else(|| anyhow!("file resource requires 'path' attribute"))?;
        if path.as_str().is_none() {
            bail!("file 'path' must be a string");
        }

        let content = attr_str(attributes, "content");
        let source = attr_str(attributes, "source");
        if content.is_some_and(|c| !c.is_empty()) && source.is_some_and(|s| !s.is_empty()) {
            bail!("file resource cannot have both 'content' and 'source' attributes");
        }

        if let Some(state) = attributes.get("state") {
            match state.as_str() {
                Some("present" | "absent" | "directory") => {}
                Some(_) => bail!("file 'state' must be one of: present, absent, directory"),
                None => bail!("file 'state' must be a string"),
            }
        }

        if let Some(mode) = attr_str(attributes, "mode") {
            u32::from_str_radix(mode, 8).map_err(|_| anyhow!("invalid file mode: {mode}"))?;
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

        let path_text = target_path(desired)?;
        let path = Path::new(path_text);
        let mut result = ResourceState::new("file", path_text, desired.clone());

        let metadata = probe(path)?;

        match desired_state(desired) {
            "absent" => {
                if metadata.is_some() {
                    result.status = Status::Planned;
                }
            }
            "directory" => match metadata {
                None => result.status = Status::Planned,
                Some(ref m) if !m.is_dir() => result.status = Status::Planned,
                Some(ref m) => {
                    if !permissions_in_sync(m, desired)? {
                        result.status = Status::Planned;
                    }
                }
            },
            _ => {
                let content = attr_str(desired, "content");
                let source = attr_str(desired, "source");

                match metadata {
                    None => result.status = Status::Planned,
                    Some(ref m) if m.is_dir() => result.status = Status::Planned,
                    Some(ref m) => {
                        if !content_in_sync(path, content, source)?
                            || !permissions_in_sync(m, desired)?
                        {
                            result.status = Status::Planned;
                        }
                    }
                }
            }
        }

        Ok(result)
    }

    fn apply(&self, token: &CancelToken, state: &ResourceState) -> Result<ResourceState> {
        ensure_not_cancelled!(token);

        let attributes = &state.attributes;
        let path_text = target_path(attributes)?;
        let path = Path::new(path_text);
        let mut result = ResourceState::new(&state.kind, &state.name, attributes.clone());

        let metadata = probe(path)?;

        match desired_state(attributes) {
            "absent" => {
                if let Some(ref m) = metadata {
                    remove_any(path, m)?;
                    result.status = Status::Deleted;
                }
            }
            "directory" => {
                match metadata {
                    None => {
                        fs::create_dir_all(path)
                            .with_context(|| format!("failed to create {}", path.display()))?;
                        result.status = Status::Created;
                    }
                    Some(ref m) if !m.is_dir() => {
                        remove_any(path, m)?;
                        fs::create_dir_all(path)
                            .with_context(|| format!("failed to create {}", path.display()))?;
                        result.status = Status::Updated;
                    }
                    Some(_) => {}
                }
                set_permissions(path, attributes)?;
            }
            _ => {
                let content = attr_str(attributes, "content");
                let source = attr_str(attributes, "source");
                let existed = metadata.is_some();

                let needs_update = match metadata {
                    None => true,
                    Some(ref m) if m.is_dir() => {
                        remove_any(path, m)?;
                        true
                    }
                    Some(_) => !content_in_sync(path, content, source)?,
                };

                if needs_update {
                    if let Some(parent) = path.parent() {
                        if !parent.as_os_str().is_empty() {
                            fs::create_dir_all(parent).with_context(|| {
                                format!("failed to create parent {}", parent.display())
                            })?;
                        }
                    }

                    if let Some(content) = content {
                        fs::write(path, content)
                            .with_context(|| format!("failed to write {}", path.display()))?;
                    } else if let Some(source) = source {
                        let data = fs::read(source)
                            .with_context(|| format!("failed to read source {source}"))?;
                        fs::write(path, data)
                            .with_context(|| format!("failed to write {}", path.display()))?;
                    } else {
                        // No content source at all: converge on an empty file
                        // so repeated applies report unchanged.
                        fs::write(path, "")
                            .with_context(|| format!("failed to write {}", path.display()))?;
                    }

                    result.status = if existed {
                        Status::Updated
                    } else {
                        Status::Created
                    };
                }

                set_permissions(path, attributes)?;
            }
        }

        Ok(result)
    }
}
