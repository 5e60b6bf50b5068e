use std::collections::BTreeMap;

use serde_json::Value;

use crate::components::{self, PropError, Props};
use crate::engine::RenderConfig;
use crate::error::{RenderError, TemplateError};
use crate::layout::Node;

/// Pure template: props in, layout tree out.
pub type Template = fn(&Props<'_>, &RenderConfig) -> Result<Node, PropError>;

#[derive(Debug, Clone, Copy)]
pub struct ComponentSpec {
    pub name: &'static str,
    pub template: Template,
    /// Prop paths coerced from numeric strings before the template runs
    pub numeric_fields: &'static [&'static str],
}

impl ComponentSpec {
    /// Run the template, tagging failures with the component name.
    pub fn build(&self, props: &Value, config: &RenderConfig) -> Result<Node, TemplateError> {
        let tagged = |e: PropError| TemplateError {
            component: self.name.to_string(),
            message: e.to_string(),
        };
        let props = Props::new(props).map_err(tagged)?;
        (self.template)(&props, config).map_err(tagged)
    }
}

/// Name → component map, fixed after startup.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    components: BTreeMap<&'static str, ComponentSpec>,
}

impl Registry {
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register(components::balance::SPEC);
        registry.register(components::transfer::SPEC);
        registry.register(components::leaderboard::SPEC);
        registry
    }

    pub fn register(&mut self, spec: ComponentSpec) {
        self.components.insert(spec.name, spec);
    }

    pub fn get(&self, name: &str) -> Result<&ComponentSpec, RenderError> {
        self.components
            .get(name)
            .ok_or_else(|| RenderError::UnknownComponent(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.components.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_names() {
        let registry = Registry::builtin();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["Balance", "Leaderboard", "Transfer"]
        );
    }

    #[test]
    fn test_unknown_component() {
        let registry = Registry::builtin();
        assert!(matches!(
            registry.get("Nope"),
            Err(RenderError::UnknownComponent(name)) if name == "Nope"
        ));
    }

    #[test]
    fn test_template_error_names_component() {
        let registry = Registry::builtin();
        let spec = registry.get("Transfer").unwrap();
        let err = spec
            .build(&json!({"from": "a"}), &RenderConfig::default())
            .unwrap_err();
        assert_eq!(err.component, "Transfer");
        assert_eq!(err.message, "missing field `to`");
    }

    #[test]
    fn test_register_custom_component() {
        fn blank(_: &Props<'_>, _: &RenderConfig) -> Result<Node, PropError> {
            Ok(Node::frame(crate::layout::Style::column().size(10.0, 10.0)))
        }
        let mut registry = Registry::default();
        registry.register(ComponentSpec {
            name: "Blank",
            template: blank,
            numeric_fields: &[],
        });
        assert!(registry.get("Blank").is_ok());
        assert!(registry.get("Balance").is_err());
    }
}
