//! Typed preference values.

use serde::{Deserialize, Serialize};

/// Key of the light/dark theme flag shared by the watch face and companion.
pub const PREF_LIGHT_THEME: &str = "pref_light_theme";

/// A preference value.
///
/// Only the three types the platform preference store and the data layer
/// both understand are representable. Integers are 32-bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Bool(bool),
    Int(i32),
    String(String),
}

impl PrefValue {
    /// Returns the name of the variant, used in log and error output.
    pub fn type_name(&self) -> &'static str {
        match self {
            PrefValue::Bool(_) => "bool",
            PrefValue::Int(_) => "int",
            PrefValue::String(_) => "string",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PrefValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            PrefValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PrefValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interprets command-line input.
    ///
    /// `true`/`false` become booleans, anything that parses as an `i32`
    /// becomes an integer, everything else is kept as a string.
    pub fn parse_cli(input: &str) -> Self {
        match input {
            "true" => PrefValue::Bool(true),
            "false" => PrefValue::Bool(false),
            _ => match input.parse::<i32>() {
                Ok(i) => PrefValue::Int(i),
                Err(_) => PrefValue::String(input.to_string()),
            },
        }
    }
}

impl std::fmt::Display for PrefValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrefValue::Bool(b) => write!(f, "{}", b),
            PrefValue::Int(i) => write!(f, "{}", i),
            PrefValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for PrefValue {
    fn from(value: bool) -> Self {
        PrefValue::Bool(value)
    }
}

impl From<i32> for PrefValue {
    fn from(value: i32) -> Self {
        PrefValue::Int(value)
    }
}

impl From<String> for PrefValue {
    fn from(value: String) -> Self {
        PrefValue::String(value)
    }
}

impl From<&str> for PrefValue {
    fn from(value: &str) -> Self {
        PrefValue::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cli() {
        assert_eq!(PrefValue::parse_cli("true"), PrefValue::Bool(true));
        assert_eq!(PrefValue::parse_cli("false"), PrefValue::Bool(false));
        assert_eq!(PrefValue::parse_cli("42"), PrefValue::Int(42));
        assert_eq!(PrefValue::parse_cli("-7"), PrefValue::Int(-7));
        assert_eq!(
            PrefValue::parse_cli("dark"),
            PrefValue::String("dark".to_string())
        );
        // Too large for an i32
        assert_eq!(
            PrefValue::parse_cli("3000000000"),
            PrefValue::String("3000000000".to_string())
        );
    }

    #[test]
    fn test_untagged_json_shape() {
        let json = serde_json::to_string(&PrefValue::Bool(true)).unwrap();
        assert_eq!(json, "true");

        let value: PrefValue = serde_json::from_str("12").unwrap();
        assert_eq!(value, PrefValue::Int(12));

        let value: PrefValue = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(value, PrefValue::String("x".to_string()));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(PrefValue::Bool(true).as_bool(), Some(true));
        assert_eq!(PrefValue::Int(3).as_bool(), None);
        assert_eq!(PrefValue::Int(3).as_int(), Some(3));
        assert_eq!(PrefValue::from("a").as_str(), Some("a"));
        assert_eq!(PrefValue::from(1).type_name(), "int");
    }
}
