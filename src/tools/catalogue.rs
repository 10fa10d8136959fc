//! Name-indexed tool collection.

use serde_json::Value;

use super::definition::ToolDefinition;

/// Tools available to one conversation. Names are unique; registering a
/// name again replaces the earlier definition in place.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalogue {
    tools: Vec<ToolDefinition>,
}

impl ToolCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: ToolDefinition) {
        match self.tools.iter_mut().find(|tool| tool.name == definition.name) {
            Some(slot) => *slot = definition,
            None => self.tools.push(definition),
        }
    }

    pub fn with(mut self, definition: ToolDefinition) -> Self {
        self.register(definition);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<ToolDefinition> {
        let index = self.tools.iter().position(|tool| tool.name == name)?;
        Some(self.tools.remove(index))
    }

    pub fn clear(&mut self) {
        self.tools.clear();
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ToolDefinition> {
        self.tools.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_str()).collect()
    }

    /// Vendor-neutral definitions in registration order.
    pub fn schemas(&self) -> Vec<Value> {
        self.tools.iter().map(ToolDefinition::schema).collect()
    }
}

impl Extend<ToolDefinition> for ToolCatalogue {
    fn extend<T: IntoIterator<Item = ToolDefinition>>(&mut self, iter: T) {
        for definition in iter {
            self.register(definition);
        }
    }
}

impl FromIterator<ToolDefinition> for ToolCatalogue {
    fn from_iter<T: IntoIterator<Item = ToolDefinition>>(iter: T) -> Self {
        let mut catalogue = Self::new();
        catalogue.extend(iter);
        catalogue
    }
}

impl IntoIterator for ToolCatalogue {
    type Item = ToolDefinition;
    type IntoIter = std::vec::IntoIter<ToolDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.tools.into_iter()
    }
}

impl<'a> IntoIterator for &'a ToolCatalogue {
    type Item = &'a ToolDefinition;
    type IntoIter = std::slice::Iter<'a, ToolDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.tools.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolParameters;
    use serde_json::json;

    fn tool(name: &str, description: &str) -> ToolDefinition {
        ToolDefinition::inline(name, description, ToolParameters::empty(), |_| async {
            Ok(json!(null))
        })
    }

    #[test]
    fn last_registration_wins_and_keeps_position() {
        let mut catalogue = ToolCatalogue::new();
        catalogue.register(tool("a", "first"));
        catalogue.register(tool("b", "second"));
        catalogue.register(tool("a", "replaced"));

        assert_eq!(catalogue.names(), vec!["a", "b"]);
        assert_eq!(catalogue.get("a").map(|t| t.description.as_str()), Some("replaced"));
    }

    #[test]
    fn extending_with_a_catalogue_replaces_shared_names() {
        let mut catalogue = ToolCatalogue::new().with(tool("a", "old")).with(tool("b", "kept"));
        let incoming = ToolCatalogue::new().with(tool("c", "new")).with(tool("a", "new"));
        catalogue.extend(incoming);

        assert_eq!(catalogue.names(), vec!["a", "b", "c"]);
        assert_eq!(catalogue.get("a").map(|t| t.description.as_str()), Some("new"));
    }

    #[test]
    fn schemas_use_neutral_shape() {
        let catalogue: ToolCatalogue = vec![tool("a", "desc")].into_iter().collect();
        assert_eq!(
            catalogue.schemas(),
            vec![json!({
                "name": "a",
                "description": "desc",
                "parameters": {"type": "object", "properties": {}, "required": []}
            })]
        );
    }
}
