use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type NodeId = String;

/// Output slot of another node. Serialized as `["<node-id>", <slot>]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef(pub NodeId, pub u32);

impl NodeRef {
    pub fn new(node: impl Into<NodeId>, slot: u32) -> Self {
        Self(node.into(), slot)
    }

    pub fn node(&self) -> &str {
        &self.0
    }

    pub fn slot(&self) -> u32 {
        self.1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Link(NodeRef),
    Literal(Value),
}

impl InputValue {
    pub fn link(node: impl Into<NodeId>, slot: u32) -> Self {
        Self::Link(NodeRef::new(node, slot))
    }

    pub fn as_link(&self) -> Option<&NodeRef> {
        match self {
            Self::Link(link) => Some(link),
            Self::Literal(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Literal(Value::String(text)) => Some(text.as_str()),
            _ => None,
        }
    }
}

impl From<NodeRef> for InputValue {
    fn from(value: NodeRef) -> Self {
        Self::Link(value)
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        Self::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        Self::Literal(Value::String(value))
    }
}

impl From<i64> for InputValue {
    fn from(value: i64) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<f64> for InputValue {
    fn from(value: f64) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<bool> for InputValue {
    fn from(value: bool) -> Self {
        Self::Literal(Value::Bool(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProperties {
    #[serde(rename = "Node name for S&R")]
    pub display_name: String,
}

/// One processing node: a remote class type plus its named inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub class_type: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<NodeProperties>,
}

impl NodeSpec {
    pub fn new(class_type: impl Into<String>) -> Self {
        let class_type = class_type.into();
        Self {
            properties: Some(NodeProperties {
                display_name: class_type.clone(),
            }),
            class_type,
            inputs: BTreeMap::new(),
        }
    }

    pub fn input(mut self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    pub fn references(&self) -> impl Iterator<Item = (&str, &NodeRef)> {
        self.inputs
            .iter()
            .filter_map(|(name, value)| value.as_link().map(|link| (name.as_str(), link)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("workflow graph has no nodes")]
    Empty,
    #[error("node '{node}' input '{input}' references missing node '{target}'")]
    DanglingReference {
        node: String,
        input: String,
        target: String,
    },
    #[error("workflow graph contains a cycle through node '{node}'")]
    Cycle { node: String },
}

/// Node-id keyed job graph, evaluated by the remote engine as a DAG.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowGraph {
    nodes: BTreeMap<NodeId, NodeSpec>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<NodeId>, node: NodeSpec) -> Option<NodeSpec> {
        self.nodes.insert(id.into(), node)
    }

    pub fn get(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &NodeSpec)> {
        self.nodes.iter().map(|(id, node)| (id.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        self.topological_order().map(|_| ())
    }

    /// Kahn ordering; ties resolve by node id so the result is deterministic.
    pub fn topological_order(&self) -> Result<Vec<&str>, GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut indegree: BTreeMap<&str, usize> =
            self.nodes.keys().map(|id| (id.as_str(), 0)).collect();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (id, node) in &self.nodes {
            for (input, link) in node.references() {
                if !self.nodes.contains_key(link.node()) {
                    return Err(GraphError::DanglingReference {
                        node: id.clone(),
                        input: input.to_string(),
                        target: link.node().to_string(),
                    });
                }
                *indegree.entry(id.as_str()).or_default() += 1;
                dependents.entry(link.node()).or_default().push(id.as_str());
            }
        }

        let mut ready: VecDeque<&str> = indegree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(degree) = indegree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(*dependent);
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let node = indegree
                .iter()
                .find(|(_, degree)| **degree > 0)
                .map(|(id, _)| id.to_string())
                .unwrap_or_default();
            return Err(GraphError::Cycle { node });
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn chain() -> WorkflowGraph {
        let mut graph = WorkflowGraph::new();
        graph.insert("2", NodeSpec::new("TensorArt_LoadImage").input("image", "res-1"));
        graph.insert(
            "7",
            NodeSpec::new("PreviewImage").input("images", InputValue::link("2", 0)),
        );
        graph
    }

    #[test]
    fn links_serialize_as_id_slot_pairs() -> anyhow::Result<()> {
        let value = serde_json::to_value(chain())?;
        assert_eq!(value["7"]["classType"], json!("PreviewImage"));
        assert_eq!(value["7"]["inputs"]["images"], json!(["2", 0]));
        assert_eq!(value["2"]["inputs"]["image"], json!("res-1"));
        assert_eq!(
            value["2"]["properties"]["Node name for S&R"],
            json!("TensorArt_LoadImage")
        );
        Ok(())
    }

    #[test]
    fn deserializes_links_and_literals() -> anyhow::Result<()> {
        let graph: WorkflowGraph = serde_json::from_value(json!({
            "1": {"classType": "A", "inputs": {"threshold": 0.3, "flag": true}},
            "2": {"classType": "B", "inputs": {"mask": ["1", 1]}},
        }))?;
        let node = graph.get("2").expect("node 2");
        assert_eq!(node.inputs["mask"], InputValue::link("1", 1));
        assert_eq!(
            graph.get("1").expect("node 1").inputs["flag"],
            InputValue::from(true)
        );
        graph.validate()?;
        Ok(())
    }

    #[test]
    fn topological_order_puts_producers_first() -> anyhow::Result<()> {
        let graph = chain();
        assert_eq!(graph.topological_order()?, vec!["2", "7"]);
        Ok(())
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let mut graph = chain();
        graph.insert(
            "8",
            NodeSpec::new("MaskToImage").input("mask", InputValue::link("1", 1)),
        );
        assert_eq!(
            graph.validate(),
            Err(GraphError::DanglingReference {
                node: "8".to_string(),
                input: "mask".to_string(),
                target: "1".to_string(),
            })
        );
    }

    #[test]
    fn cycles_are_rejected() {
        let mut graph = WorkflowGraph::new();
        graph.insert("a", NodeSpec::new("X").input("in", InputValue::link("b", 0)));
        graph.insert("b", NodeSpec::new("Y").input("in", InputValue::link("a", 0)));
        assert!(matches!(graph.validate(), Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let mut graph = WorkflowGraph::new();
        graph.insert("a", NodeSpec::new("X").input("in", InputValue::link("a", 0)));
        assert_eq!(
            graph.validate(),
            Err(GraphError::Cycle {
                node: "a".to_string()
            })
        );
    }

    #[test]
    fn empty_graph_is_rejected() {
        assert_eq!(WorkflowGraph::new().validate(), Err(GraphError::Empty));
    }
}
