use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scale factors applied at rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scaling {
    /// Multiplier from layout units to output pixels
    pub image: f32,
    /// Multiplier for emoji glyph resolution
    pub emoji: f32,
}

impl Default for Scaling {
    fn default() -> Self {
        Self {
            image: 1.0,
            emoji: 1.0,
        }
    }
}

/// One render job: a component name plus everything it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Correlation id echoed by every response frame
    pub id: String,
    pub component: String,
    #[serde(default)]
    pub props: Value,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub scaling: Scaling,
}

impl RenderRequest {
    pub fn new(component: impl Into<String>, props: Value, config: Value, scaling: Scaling) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            component: component.into(),
            props,
            config,
            scaling,
        }
    }
}

/// Encoded output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/gif")]
    Gif,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Png => "image/png",
            ContentType::Gif => "image/gif",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ContentType::Png => "png",
            ContentType::Gif => "gif",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Encoded image produced for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub content_type: ContentType,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_type_serialization() {
        assert_eq!(
            serde_json::to_value(ContentType::Png).unwrap(),
            json!("image/png")
        );
        let parsed: ContentType = serde_json::from_value(json!("image/gif")).unwrap();
        assert_eq!(parsed, ContentType::Gif);
    }

    #[test]
    fn test_request_defaults_missing_fields() {
        let request: RenderRequest =
            serde_json::from_value(json!({ "id": "r1", "component": "Balance" })).unwrap();
        assert_eq!(request.props, Value::Null);
        assert_eq!(request.scaling, Scaling::default());
    }

    #[test]
    fn test_new_requests_get_distinct_ids() {
        let a = RenderRequest::new("Balance", json!({}), json!({}), Scaling::default());
        let b = RenderRequest::new("Balance", json!({}), json!({}), Scaling::default());
        assert_ne!(a.id, b.id);
    }
}
