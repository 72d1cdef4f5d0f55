//! The inspectable/persistable interchange format: a module snapshot hosts
//! can write to disk, diff across runs, or hand to other tooling. JSON via
//! `serde_json`; map keys are node-id strings and every container is
//! ordered, so identical IR serializes byte-identically.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ir::{Cfg, Export, IrModule, ModuleMetadata, Node, NodeId, schema};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interchange {
    pub schema_version: u32,
    pub module: ModuleEnvelope,
    pub nodes: BTreeMap<NodeId, Node>,
    pub control_flow_graphs: BTreeMap<NodeId, Cfg>,
}

/// The module container minus its node arena and CFGs, which serialize as
/// their own top-level sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleEnvelope {
    pub id: String,
    pub source: String,
    pub directives: Vec<String>,
    pub body: Vec<NodeId>,
    pub exports: Vec<Export>,
    pub metadata: ModuleMetadata,
}

impl Interchange {
    pub fn new(module: &IrModule) -> Self {
        Self {
            schema_version: schema::SCHEMA_VERSION,
            module: ModuleEnvelope {
                id: module.id.clone(),
                source: module.source.clone(),
                directives: module.directives.clone(),
                body: module.body.clone(),
                exports: module.exports.clone(),
                metadata: module.metadata.clone(),
            },
            nodes: module.nodes.clone(),
            control_flow_graphs: module.cfgs.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Rebuilds a module from the snapshot. The id generator resumes past
    /// the highest id present, so later transforms stay collision-free.
    pub fn into_module(self) -> IrModule {
        let next = self
            .nodes
            .keys()
            .map(|id| id.0 + 1)
            .max()
            .unwrap_or(1);
        let mut module = IrModule::new(self.module.id, next);
        module.source = self.module.source;
        module.directives = self.module.directives;
        module.body = self.module.body;
        module.exports = self.module.exports;
        module.metadata = self.module.metadata;
        module.nodes = self.nodes;
        module.cfgs = self.control_flow_graphs;
        module
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::common::Span;
    use crate::ast::expressions::LiteralValue;
    use crate::ir::NodeKind;

    fn sample_module() -> IrModule {
        let mut module = IrModule::new("sample.src", 1);
        let value = module.insert(
            NodeKind::Literal {
                value: LiteralValue::Number(42.0),
            },
            Span::default(),
        );
        let binding = module.insert(
            NodeKind::Binding {
                name: "answer".into(),
                init: Some(value),
                mutable: false,
            },
            Span::default(),
        );
        module.body.push(binding);
        module
    }

    #[test]
    fn snapshot_round_trips() {
        let module = sample_module();
        let json = Interchange::new(&module).to_json().expect("serializes");
        let back = Interchange::from_json(&json).expect("parses").into_module();
        assert_eq!(back.body, module.body);
        assert_eq!(back.nodes, module.nodes);
    }

    #[test]
    fn identical_modules_serialize_identically() {
        let a = Interchange::new(&sample_module()).to_json().unwrap();
        let b = Interchange::new(&sample_module()).to_json().unwrap();
        assert_eq!(a, b);
    }
}
