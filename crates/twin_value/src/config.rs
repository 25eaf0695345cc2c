//! Property schema.
//!
//! A [`Config`] describes one declared property of an entity: its type,
//! search/time-series flags, and a free-form `define` map holding
//! type-specific constraints. Declarations arrive as loosely typed key/value
//! maps (JSON objects decoded into [`Node`]s) and are parsed once with
//! [`Config::parse_from`]. Redeclaring a property replaces the whole config.

use std::collections::BTreeMap;

use crate::error::ValueError;
use crate::node::{Kind, Node};

/// Keys recognised in a property declaration.
pub mod keys {
    pub const ID: &str = "id";
    pub const TYPE: &str = "type";
    pub const WEIGHT: &str = "weight";
    pub const ENABLED: &str = "enabled";
    pub const ENABLED_SEARCH: &str = "enabled_search";
    pub const ENABLED_TIME_SERIES: &str = "enabled_time_series";
    pub const DESCRIPTION: &str = "description";
    pub const LAST_TIME: &str = "last_time";
    pub const DEFINE: &str = "define";
}

/// Constraint keys interpreted by [`Config::check`].
pub mod define {
    pub const MAX: &str = "max";
    pub const MIN: &str = "min";
    pub const MAX_LENGTH: &str = "max_length";
}

/// Declarative metadata for one entity property.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    /// Property identifier.
    pub id: String,
    /// Declared value type (`int`, `float`, `string`, `struct`, ...).
    pub kind: String,
    /// Relative ordering weight.
    pub weight: i64,
    /// Whether the property is enabled. Defaults to `false`.
    pub enabled: bool,
    /// Whether the property is indexed for search.
    pub enabled_search: bool,
    /// Whether the property is recorded as a time series.
    pub enabled_time_series: bool,
    /// Free-form description.
    pub description: String,
    /// Last modification time, epoch milliseconds.
    pub last_time: i64,
    /// Type-specific constraints, kept as declared.
    pub define: BTreeMap<String, Node>,
}

impl Config {
    /// Build a config from an untyped declaration map.
    ///
    /// Unknown keys are ignored and missing keys take their defaults. The
    /// `define` map is passed through without validation.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidConfig`] when a known key holds a value
    /// of the wrong kind.
    pub fn parse_from(map: &BTreeMap<String, Node>) -> Result<Self, ValueError> {
        let define = match map.get(keys::DEFINE) {
            None | Some(Node::Null) => BTreeMap::new(),
            Some(Node::Map(m)) => m.clone(),
            Some(other) => {
                return Err(ValueError::InvalidConfig {
                    key: keys::DEFINE,
                    expected: "map",
                    got: other.kind(),
                });
            }
        };

        Ok(Self {
            id: string_field(map, keys::ID)?,
            kind: string_field(map, keys::TYPE)?,
            weight: int_field(map, keys::WEIGHT)?,
            enabled: bool_field(map, keys::ENABLED)?,
            enabled_search: bool_field(map, keys::ENABLED_SEARCH)?,
            enabled_time_series: bool_field(map, keys::ENABLED_TIME_SERIES)?,
            description: string_field(map, keys::DESCRIPTION)?,
            last_time: int_field(map, keys::LAST_TIME)?,
            define,
        })
    }

    /// Build a config from a [`Node::Map`].
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidConfig`] if `node` is not a map or a key
    /// holds a value of the wrong kind.
    pub fn from_node(node: &Node) -> Result<Self, ValueError> {
        match node {
            Node::Map(map) => Self::parse_from(map),
            other => Err(ValueError::InvalidConfig {
                key: keys::ID,
                expected: "map",
                got: other.kind(),
            }),
        }
    }

    /// Serialise back into a declaration map. Every field is emitted.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, Node> {
        BTreeMap::from([
            (keys::ID.to_string(), Node::from(self.id.as_str())),
            (keys::TYPE.to_string(), Node::from(self.kind.as_str())),
            (keys::WEIGHT.to_string(), Node::Int(self.weight)),
            (keys::ENABLED.to_string(), Node::Bool(self.enabled)),
            (keys::ENABLED_SEARCH.to_string(), Node::Bool(self.enabled_search)),
            (
                keys::ENABLED_TIME_SERIES.to_string(),
                Node::Bool(self.enabled_time_series),
            ),
            (
                keys::DESCRIPTION.to_string(),
                Node::from(self.description.as_str()),
            ),
            (keys::LAST_TIME.to_string(), Node::Int(self.last_time)),
            (keys::DEFINE.to_string(), Node::Map(self.define.clone())),
        ])
    }

    /// Check a value against the declared type and the constraints in
    /// `define`. `null` always passes (the property is unset).
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::ConstraintViolation`] describing the first
    /// failed check.
    pub fn check(&self, value: &Node) -> Result<(), ValueError> {
        if value.is_null() {
            return Ok(());
        }

        let accepted = match self.kind.as_str() {
            "int" | "integer" => matches!(value.kind(), Kind::Int),
            "float" | "double" | "number" => matches!(value.kind(), Kind::Int | Kind::Float),
            "bool" | "boolean" => matches!(value.kind(), Kind::Bool),
            "string" => matches!(value.kind(), Kind::String),
            "array" => matches!(value.kind(), Kind::Array),
            "struct" | "object" | "map" => matches!(value.kind(), Kind::Map),
            _ => true,
        };
        if !accepted {
            return Err(self.violation(format!("expected {}, got {}", self.kind, value.kind())));
        }

        if let Some(v) = value.as_f64() {
            if let Some(max) = self.define.get(define::MAX).and_then(Node::as_f64)
                && v > max
            {
                return Err(self.violation(format!("{v} exceeds max {max}")));
            }
            if let Some(min) = self.define.get(define::MIN).and_then(Node::as_f64)
                && v < min
            {
                return Err(self.violation(format!("{v} is below min {min}")));
            }
        }

        if let (Some(s), Some(limit)) = (
            value.as_str(),
            self.define.get(define::MAX_LENGTH).and_then(Node::as_i64),
        ) && s.chars().count() as i64 > limit
        {
            return Err(self.violation(format!("length exceeds max_length {limit}")));
        }

        Ok(())
    }

    fn violation(&self, reason: String) -> ValueError {
        ValueError::ConstraintViolation {
            id: self.id.clone(),
            reason,
        }
    }
}

fn string_field(map: &BTreeMap<String, Node>, key: &'static str) -> Result<String, ValueError> {
    match map.get(key) {
        None | Some(Node::Null) => Ok(String::new()),
        Some(Node::String(s)) => Ok(s.clone()),
        Some(other) => Err(ValueError::InvalidConfig {
            key,
            expected: "string",
            got: other.kind(),
        }),
    }
}

fn int_field(map: &BTreeMap<String, Node>, key: &'static str) -> Result<i64, ValueError> {
    match map.get(key) {
        None | Some(Node::Null) => Ok(0),
        Some(node) => node.as_i64().ok_or(ValueError::InvalidConfig {
            key,
            expected: "integer",
            got: node.kind(),
        }),
    }
}

fn bool_field(map: &BTreeMap<String, Node>, key: &'static str) -> Result<bool, ValueError> {
    match map.get(key) {
        None | Some(Node::Null) => Ok(false),
        Some(Node::Bool(b)) => Ok(*b),
        Some(other) => Err(ValueError::InvalidConfig {
            key,
            expected: "bool",
            got: other.kind(),
        }),
    }
}
