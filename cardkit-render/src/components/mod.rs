//! Built-in card components.
//!
//! Each component is a pure template from props to a layout tree plus the
//! list of prop paths it wants coerced from numeric strings.

pub mod balance;
pub mod format;
pub mod leaderboard;
pub mod transfer;

use serde_json::Value;
use thiserror::Error;

/// Dark card palette shared by the built-in components.
pub(crate) mod palette {
    pub const BG_COLOR: &str = "#2B2D31";
    /// Card background when a banner shows through
    pub const BG_TRANSLUCENT: &str = "rgba(43,45,49,0.78)";
    pub const PANEL_BG: &str = "#1E1F22";
    pub const ACCENT: &str = "#5865F2";
    pub const ZEBRA_EVEN: &str = "#2B2D31";
    pub const ZEBRA_ODD: &str = "#2E3035";
    pub const TEXT_COLOR: &str = "#D2D5D9";
    pub const HEADER_TEXT: &str = "#FFFFFF";
    pub const MUTED: &str = "#949BA4";
    pub const POSITIVE: &str = "#23A55A";
    pub const BORDER_COLOR: &str = "#3B3D44";
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PropError {
    #[error("missing field `{0}`")]
    Missing(String),

    #[error("field `{field}` must be {expected}")]
    Type {
        field: String,
        expected: &'static str,
    },

    #[error("props must be an object")]
    NotAnObject,
}

/// Typed read access to a props object.
#[derive(Debug, Clone, Copy)]
pub struct Props<'a> {
    value: &'a Value,
}

impl<'a> Props<'a> {
    pub fn new(value: &'a Value) -> Result<Self, PropError> {
        if value.is_object() {
            Ok(Self { value })
        } else {
            Err(PropError::NotAnObject)
        }
    }

    fn field(&self, key: &str) -> Option<&'a Value> {
        self.value.get(key).filter(|v| !v.is_null())
    }

    pub fn str(&self, key: &str) -> Result<&'a str, PropError> {
        self.opt_str(key)?
            .ok_or_else(|| PropError::Missing(key.to_string()))
    }

    pub fn opt_str(&self, key: &str) -> Result<Option<&'a str>, PropError> {
        match self.field(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(PropError::Type {
                field: key.to_string(),
                expected: "a string",
            }),
        }
    }

    pub fn number(&self, key: &str) -> Result<f64, PropError> {
        self.opt_number(key)?
            .ok_or_else(|| PropError::Missing(key.to_string()))
    }

    pub fn opt_number(&self, key: &str) -> Result<Option<f64>, PropError> {
        match self.field(key) {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(_) => Err(PropError::Type {
                field: key.to_string(),
                expected: "a number",
            }),
        }
    }

    /// Objects of an array field; absent means empty.
    pub fn list(&self, key: &str) -> Result<Vec<Props<'a>>, PropError> {
        match self.field(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    Props::new(item).map_err(|_| PropError::Type {
                        field: key.to_string(),
                        expected: "an array of objects",
                    })
                })
                .collect(),
            Some(_) => Err(PropError::Type {
                field: key.to_string(),
                expected: "an array",
            }),
        }
    }

    /// Whether a banner will be composited under the card.
    pub fn has_banner(&self) -> bool {
        matches!(self.field("banner_url"), Some(Value::String(s)) if !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_props_accessors() {
        let value = json!({
            "name": "ada",
            "amount": 12.5,
            "entries": [{"score": 3}],
            "nothing": null,
        });
        let props = Props::new(&value).unwrap();
        assert_eq!(props.str("name").unwrap(), "ada");
        assert_eq!(props.number("amount").unwrap(), 12.5);
        assert_eq!(props.list("entries").unwrap().len(), 1);
        assert_eq!(props.opt_str("nothing").unwrap(), None);
        assert_eq!(
            props.number("missing"),
            Err(PropError::Missing("missing".into()))
        );
        assert!(matches!(props.number("name"), Err(PropError::Type { .. })));
    }

    #[test]
    fn test_numeric_string_is_not_a_number() {
        let value = json!({"amount": "12.50"});
        let props = Props::new(&value).unwrap();
        assert!(matches!(props.number("amount"), Err(PropError::Type { .. })));
    }

    #[test]
    fn test_non_object_props() {
        assert_eq!(Props::new(&json!([1])).unwrap_err(), PropError::NotAnObject);
    }
}
