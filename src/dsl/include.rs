//! Include processing: file splicing, variables, templates, and globs.
//!
//! Driven by the absolute path of an initial config file. Maintains a set of
//! already-processed paths (cycle and duplicate-work prevention), a variable
//! table, and a template table. Meta resources (`include`,
//! `include_platform`, `variable`, `template`) are consumed here and never
//! reach the engine.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::IncludeError;
use crate::platform::Os;

use super::parser::Parser;
use super::{Resource, Value};

/// Bytes that make a path component a glob pattern rather than a literal.
const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Splices included files and resolves variable, template, and file
/// references.
#[derive(Debug)]
pub struct IncludeProcessor {
    base_dir: PathBuf,
    os: Os,
    processed: BTreeSet<PathBuf>,
    variables: BTreeMap<String, String>,
    templates: BTreeMap<String, String>,
}

impl IncludeProcessor {
    /// Create a processor rooted at the directory of the initial config file.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_os(base_dir, Os::current())
    }

    /// Create a processor that resolves `include_platform` blocks against an
    /// explicit OS rather than the detected one.
    pub fn with_os(base_dir: impl Into<PathBuf>, os: Os) -> Self {
        Self {
            base_dir: base_dir.into(),
            os,
            processed: BTreeSet::new(),
            variables: BTreeMap::new(),
            templates: BTreeMap::new(),
        }
    }

    /// Set a variable value.
    pub fn set_variable(&mut self, name: &str, value: &str) {
        self.variables.insert(name.to_string(), value.to_string());
    }

    /// Look up a variable value.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Set a template body. Bodies are stored literally; variable expansion
    /// happens when the template is referenced.
    pub fn set_template(&mut self, name: &str, content: &str) {
        self.templates.insert(name.to_string(), content.to_string());
    }

    /// Look up a template body.
    #[must_use]
    pub fn template(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    /// Replace every `$name` occurrence with the value of `name`, for all
    /// currently-defined variables. A flat, single-pass textual replace:
    /// substituted output is not re-expanded, and unknown references are
    /// left intact.
    #[must_use]
    pub fn expand_variables(&self, content: &str) -> String {
        let mut result = content.to_string();
        for (name, value) in &self.variables {
            result = result.replace(&format!("${name}"), value);
        }
        result
    }

    /// Process one config file and everything it transitively includes,
    /// returning the accumulated non-meta resources.
    ///
    /// Re-processing an already-seen file is silently a no-op.
    ///
    /// # Errors
    ///
    /// Fatal at the first unreadable or unparseable file, or unusable
    /// include pattern. A glob matching zero files is a warning, not an
    /// error.
    pub fn process_file(&mut self, config_file: &Path) -> Result<Vec<Resource>, IncludeError> {
        let mut collected = Vec::new();

        let canonical = std::fs::canonicalize(config_file)
            .unwrap_or_else(|_| absolutize(config_file));
        if !self.processed.insert(canonical) {
            return Ok(collected);
        }

        let content = std::fs::read_to_string(config_file).map_err(|source| IncludeError::Read {
            path: config_file.to_path_buf(),
            source,
        })?;

        let outcome = Parser::new(&content).parse();
        if !outcome.errors.is_empty() {
            for diagnostic in &outcome.errors {
                tracing::error!("parse error in {}: {diagnostic}", config_file.display());
            }
            return Err(IncludeError::Parse {
                path: config_file.to_path_buf(),
                source: crate::error::ParseFailure(outcome.errors),
            });
        }

        for resource in outcome.resources {
            match resource.kind.as_str() {
                "include" => {
                    if let Some(pattern) = resource.attributes.get("path").and_then(Value::as_str) {
                        let mut included = self.include_pattern(config_file, pattern)?;
                        collected.append(&mut included);
                    }
                }
                "include_platform" => {
                    let key = self.os.to_string();
                    if let Some(pattern) = resource.attributes.get(&key).and_then(Value::as_str) {
                        let mut included = self.include_pattern(config_file, pattern)?;
                        collected.append(&mut included);
                    }
                    // Patterns for other platforms are silently skipped.
                }
                "variable" => {
                    if let Some(value) = resource.attributes.get("value").and_then(Value::as_str) {
                        // Variables are resolved at definition time against
                        // already-set variables.
                        let resolved = self.expand_variables(value);
                        self.variables.insert(resource.name.clone(), resolved);
                    }
                }
                "template" => {
                    if let Some(content) =
                        resource.attributes.get("content").and_then(Value::as_str)
                    {
                        self.templates.insert(resource.name.clone(), content.to_string());
                    }
                }
                _ => {
                    collected.push(self.expand_resource(resource));
                }
            }
        }

        Ok(collected)
    }

    /// After all includes are processed, expand whole-string
    /// `template("NAME")` and `file("PATH")` attribute references.
    ///
    /// # Errors
    ///
    /// Returns an error if a `file("…")` reference cannot be read. An
    /// unknown template name leaves the attribute untouched.
    pub fn expand_references(
        &self,
        resources: Vec<Resource>,
    ) -> Result<Vec<Resource>, IncludeError> {
        let mut result = resources;

        for resource in &mut result {
            for value in resource.attributes.values_mut() {
                let replacement = match value {
                    Value::Scalar(text) => self.reference_replacement(text)?,
                    _ => None,
                };
                if let Some(expanded) = replacement {
                    *value = Value::Scalar(expanded);
                }
            }
        }

        Ok(result)
    }

    /// The expansion of a whole-string reference, or `None` when the text is
    /// not a recognised reference (including an unknown template name).
    fn reference_replacement(&self, text: &str) -> Result<Option<String>, IncludeError> {
        if let Some(name) = reference_target(text, "template(\"") {
            return Ok(self
                .templates
                .get(name)
                .map(|body| self.expand_variables(body)));
        }

        if let Some(path) = reference_target(text, "file(\"") {
            let resolved = resolve_path(&self.base_dir, path);
            let content = std::fs::read_to_string(&resolved).map_err(|source| {
                IncludeError::FileRef {
                    path: resolved.clone(),
                    source,
                }
            })?;
            return Ok(Some(self.expand_variables(&content)));
        }

        Ok(None)
    }

    /// Apply variable substitution to the name and every string attribute of
    /// an emitted resource.
    fn expand_resource(&self, mut resource: Resource) -> Resource {
        resource.name = self.expand_variables(&resource.name);
        for value in resource.attributes.values_mut() {
            if let Value::Scalar(text) = value {
                *text = self.expand_variables(text);
            }
        }
        resource
    }

    /// Expand an include pattern and recurse into every match.
    fn include_pattern(
        &mut self,
        config_file: &Path,
        pattern: &str,
    ) -> Result<Vec<Resource>, IncludeError> {
        let matches = self.expand_pattern(config_file, pattern)?;
        if matches.is_empty() {
            tracing::warn!("no files matched include pattern {pattern}");
            return Ok(Vec::new());
        }

        let mut collected = Vec::new();
        for path in matches {
            let mut included = self.process_file(&path)?;
            collected.append(&mut included);
        }
        Ok(collected)
    }

    /// Resolve an include pattern against the including file's directory and
    /// expand it with the glob matcher. Matches are sorted for deterministic
    /// order. A pattern with no glob metacharacters is a plain
    /// existence-checked path.
    fn expand_pattern(
        &self,
        config_file: &Path,
        pattern: &str,
    ) -> Result<Vec<PathBuf>, IncludeError> {
        let including_dir = config_file.parent().unwrap_or(&self.base_dir);
        let resolved = resolve_path(including_dir, pattern);

        if !resolved.to_string_lossy().contains(GLOB_META) {
            if resolved.exists() {
                return Ok(vec![resolved]);
            }
            return Ok(Vec::new());
        }

        // Split the literal directory prefix from the glob tail so the walk
        // root is a plain path.
        let mut root = PathBuf::new();
        let mut tail: Vec<String> = Vec::new();
        for component in resolved.components() {
            let text = component.as_os_str().to_string_lossy();
            if tail.is_empty() && !text.contains(GLOB_META) {
                root.push(component.as_os_str());
            } else {
                tail.push(text.into_owned());
            }
        }

        let glob_text = tail.join("/");
        let glob = wax::Glob::new(&glob_text).map_err(|e| IncludeError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        let mut matches: Vec<PathBuf> = glob
            .walk(&root)
            .filter_map(Result::ok)
            .map(|entry| entry.into_path())
            .collect();
        matches.sort();
        Ok(matches)
    }
}

/// Load a configuration file, process its includes, and expand template and
/// file references: the complete DSL front-end in one call.
///
/// # Errors
///
/// Returns an error if any transitively included file cannot be read or
/// parsed, or a `file("…")` reference is missing.
pub fn load_config(config_file: &Path) -> Result<Vec<Resource>, IncludeError> {
    let abs = absolutize(config_file);
    let base_dir = abs.parent().map_or_else(PathBuf::new, Path::to_path_buf);

    let mut processor = IncludeProcessor::new(base_dir);
    let resources = processor.process_file(&abs)?;
    processor.expand_references(resources)
}

/// A path relative to the containing config file's directory, or taken
/// verbatim when absolute.
fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}

/// Extract the target of a whole-string `prefix…")` reference, e.g.
/// `template("NAME")` or `file("PATH")`. Partial occurrences inside a larger
/// string are not recognised.
fn reference_target<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.strip_prefix(prefix)?.strip_suffix("\")")
}
