//! The configuration DSL front-end.
//!
//! A config file is a sequence of blocks of the form `type "name" { … }`.
//! The [`lexer`] turns bytes into tokens, the [`parser`] turns tokens into
//! [`Resource`] records, and the [`include`] processor splices included
//! files, resolves variables, and expands template and file references.

pub mod include;
pub mod lexer;
pub mod parser;
pub mod token;

use std::collections::BTreeMap;

/// An attribute value as written in the DSL.
///
/// Numbers are carried as their literal text — every consumer treats them as
/// strings. Booleans are spelled as the strings `"true"` / `"false"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A quoted string.
    Scalar(String),
    /// A numeric literal, kept verbatim.
    Number(String),
    /// A `["a", "b"]` string array.
    List(Vec<String>),
    /// A `{ key = "value", … }` block map.
    Map(BTreeMap<String, String>),
}

impl Value {
    /// Narrow to a string. Numbers narrow too, since consumers treat their
    /// literal text as a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) | Value::Number(s) => Some(s),
            _ => None,
        }
    }

    /// Narrow to a boolean spelled `"true"` or `"false"`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self.as_str() {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        }
    }

    /// Narrow to a string array.
    #[must_use]
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Narrow to a block map.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

/// Attribute mapping of a resource.
pub type AttrMap = BTreeMap<String, Value>;

/// A parsed resource block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resource {
    /// Resource type tag (`file`, `package`, …, or a meta type such as
    /// `include` or `variable`).
    pub kind: String,
    /// The quoted name from the block header.
    pub name: String,
    /// Attribute name → value.
    pub attributes: AttrMap,
    /// Dependency identifiers of the form `"type.name"`.
    pub depends_on: Vec<String>,
    /// Condition name → allowed values; only `platform` is consumed by the
    /// engine.
    pub conditions: BTreeMap<String, Vec<String>>,
}

impl Resource {
    /// The composite `"type.name"` identifier used in dependency references,
    /// graph keys, and result maps.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}.{}", self.kind, self.name)
    }

    /// Whether this is a meta resource consumed by the include processor and
    /// never handed to the engine.
    #[must_use]
    pub fn is_meta(&self) -> bool {
        matches!(
            self.kind.as_str(),
            "include" | "include_platform" | "variable" | "template"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_as_str_covers_scalar_and_number() {
        assert_eq!(Value::Scalar("x".to_string()).as_str(), Some("x"));
        assert_eq!(Value::Number("42".to_string()).as_str(), Some("42"));
        assert_eq!(Value::List(vec![]).as_str(), None);
    }

    #[test]
    fn value_as_bool() {
        assert_eq!(Value::Scalar("true".to_string()).as_bool(), Some(true));
        assert_eq!(Value::Scalar("false".to_string()).as_bool(), Some(false));
        assert_eq!(Value::Scalar("yes".to_string()).as_bool(), None);
    }

    #[test]
    fn resource_id_joins_kind_and_name() {
        let resource = Resource {
            kind: "file".to_string(),
            name: "motd".to_string(),
            ..Resource::default()
        };
        assert_eq!(resource.id(), "file.motd");
    }

    #[test]
    fn meta_kinds_are_recognised() {
        for kind in ["include", "include_platform", "variable", "template"] {
            let resource = Resource {
                kind: kind.to_string(),
                ..Resource::default()
            };
            assert!(resource.is_meta(), "{kind} should be a meta resource");
        }
        let file = Resource {
            kind: "file".to_string(),
            ..Resource::default()
        };
        assert!(!file.is_meta());
    }
}
