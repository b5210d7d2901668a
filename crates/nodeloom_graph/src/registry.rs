// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node type registry: resolves a type name to a constructible node.
//!
//! Resolution failure is recoverable. Loading a record with an unknown type
//! produces an inert placeholder node that keeps the original serialized form,
//! so re-saving the file loses nothing.

use indexmap::IndexMap;

use crate::node::{InputSlot, Node, OutputSlot};
use crate::serialization::SerialisedNode;

/// A named, typed slot template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDef {
    /// Slot name
    pub name: String,
    /// Data-type tag; empty matches any
    pub data_type: String,
}

impl SlotDef {
    /// Create a slot template.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Definition of a registered node type.
#[derive(Debug, Clone)]
pub struct NodeTypeDef {
    /// Registry key, e.g. `math/sum`
    pub type_name: String,
    /// Default display title
    pub title: String,
    /// Input slot templates
    pub inputs: Vec<SlotDef>,
    /// Output slot templates
    pub outputs: Vec<SlotDef>,
    /// Default execution priority for instances; lower runs earlier
    pub priority: i32,
    /// Optional hook run on each freshly built instance
    pub builder: Option<fn(&mut Node)>,
}

impl NodeTypeDef {
    /// Start a definition with the given key and title.
    pub fn new(type_name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            title: title.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            priority: 0,
            builder: None,
        }
    }

    /// Append an input slot template.
    pub fn with_input(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.inputs.push(SlotDef::new(name, data_type));
        self
    }

    /// Append an output slot template.
    pub fn with_output(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.outputs.push(SlotDef::new(name, data_type));
        self
    }

    /// Set the default execution priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the per-instance build hook.
    pub fn with_builder(mut self, builder: fn(&mut Node)) -> Self {
        self.builder = Some(builder);
        self
    }
}

/// Maps type names to node definitions.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    types: IndexMap<String, NodeTypeDef>,
}

impl NodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type definition, replacing any previous one under the key.
    pub fn register(&mut self, def: NodeTypeDef) {
        if self.types.contains_key(&def.type_name) {
            tracing::debug!(type_name = %def.type_name, "replacing registered node type");
        }
        self.types.insert(def.type_name.clone(), def);
    }

    /// Look up a type definition.
    pub fn get(&self, type_name: &str) -> Option<&NodeTypeDef> {
        self.types.get(type_name)
    }

    /// Whether a type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Registered type names, in registration order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Build a fresh node of the given type. `None` when unregistered.
    pub fn create(&self, type_name: &str) -> Option<Node> {
        let def = self.types.get(type_name)?;
        let mut node = Node::new(&def.type_name, &def.title);
        node.priority = def.priority;
        node.inputs = def
            .inputs
            .iter()
            .map(|slot| InputSlot::new(&slot.name, &slot.data_type))
            .collect();
        node.outputs = def
            .outputs
            .iter()
            .map(|slot| OutputSlot::new(&slot.name, &slot.data_type))
            .collect();
        node.size = node.compute_size();
        if let Some(builder) = def.builder {
            builder(&mut node);
        }
        Some(node)
    }

    /// Build an inert placeholder for a record whose type is unknown.
    ///
    /// The placeholder carries the record's slots so existing links keep their
    /// endpoints, and retains the full record for lossless re-save.
    pub fn create_placeholder(record: &SerialisedNode) -> Node {
        let mut node = Node::new(&record.type_name, format!("{} (missing)", record.type_name));
        node.has_errors = true;
        node.inputs = record
            .inputs
            .iter()
            .map(|slot| InputSlot::new(&slot.name, &slot.data_type))
            .collect();
        node.outputs = record
            .outputs
            .iter()
            .map(|slot| OutputSlot::new(&slot.name, &slot.data_type))
            .collect();
        node.last_serialization = Some(record.clone());
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum_def() -> NodeTypeDef {
        NodeTypeDef::new("math/sum", "Sum")
            .with_input("a", "number")
            .with_input("b", "number")
            .with_output("sum", "number")
    }

    #[test]
    fn test_create_from_definition() {
        let mut registry = NodeRegistry::new();
        registry.register(sum_def().with_priority(5));

        let node = registry.create("math/sum").unwrap();
        assert_eq!(node.title, "Sum");
        assert_eq!(node.inputs.len(), 2);
        assert_eq!(node.outputs.len(), 1);
        assert_eq!(node.priority, 5);
        assert!(!node.has_errors);

        assert!(registry.create("math/unknown").is_none());
    }

    #[test]
    fn test_builder_hook_runs() {
        let mut registry = NodeRegistry::new();
        registry.register(sum_def().with_builder(|node| node.title = "Custom".into()));
        assert_eq!(registry.create("math/sum").unwrap().title, "Custom");
    }

    #[test]
    fn test_placeholder_keeps_record() {
        let record: SerialisedNode = serde_json::from_str(
            r#"{"id": 3, "type": "gone/type", "pos": [1.0, 2.0],
                "inputs": [{"name": "in", "type": "number", "link": 7}]}"#,
        )
        .unwrap();
        let mut node = NodeRegistry::create_placeholder(&record);
        node.configure(&record);
        assert!(node.has_errors);
        assert_eq!(node.inputs[0].link, Some(7));
        assert_eq!(node.as_serialisable(), record);
    }
}
