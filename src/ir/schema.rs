//! Structural shape checks for the closed node-kind set. The Rust type
//! system already pins each kind's fields; what remains are the constraints
//! a well-formed node must satisfy beyond its type: identifier validity,
//! arity of runtime helper calls, single `default` arms, finite numbers.

use crate::ast::expressions::LiteralValue;

use super::{Node, NodeKind, RuntimeHelper};

/// Version of the node-kind set. Bumped whenever a kind is added, removed
/// or reshaped; the interchange format embeds it.
pub const SCHEMA_VERSION: u32 = 1;

/// Returns every shape violation for one node. Empty means conformant.
pub fn check_node(node: &Node) -> Vec<String> {
    let mut issues = Vec::new();
    match &node.kind {
        NodeKind::Binding { name, .. } => {
            check_ident(name, "binding name", &mut issues);
        }
        NodeKind::Function(func) => {
            for param in &func.params {
                check_ident(param, "parameter name", &mut issues);
            }
            let mut sorted = func.params.clone();
            sorted.sort();
            sorted.dedup();
            if sorted.len() != func.params.len() {
                issues.push("duplicate parameter name".to_string());
            }
            if func.is_generator && func.is_async {
                issues.push("a function cannot be both async and a generator".to_string());
            }
        }
        NodeKind::TypeDeclaration(decl) => {
            check_ident(&decl.name, "type name", &mut issues);
            if let Some(superclass) = &decl.superclass {
                check_ident(superclass, "superclass name", &mut issues);
            }
            let mut seen = Vec::new();
            for member in &decl.members {
                check_ident(&member.name, "member name", &mut issues);
                let key = (member.name.clone(), member.kind, member.is_static);
                if seen.contains(&key) {
                    issues.push(format!("duplicate member {:?}", member.name));
                }
                seen.push(key);
            }
        }
        NodeKind::IteratorLoop { binding, .. } => {
            check_ident(binding, "loop binding", &mut issues);
        }
        NodeKind::Try {
            handler_param,
            handler,
            finalizer,
            ..
        } => {
            if handler_param.is_some() && handler.is_none() {
                issues.push("handler binding without a handler block".to_string());
            }
            if let Some(param) = handler_param {
                check_ident(param, "handler binding", &mut issues);
            }
            if handler.is_none() && finalizer.is_none() {
                issues.push("try statement with neither handler nor finalizer".to_string());
            }
        }
        NodeKind::Switch { cases, .. } => {
            let defaults = cases.iter().filter(|c| c.test.is_none()).count();
            if defaults > 1 {
                issues.push(format!("{defaults} default arms, at most one allowed"));
            }
        }
        NodeKind::NameRef { name, .. } => {
            check_ident(name, "name reference", &mut issues);
        }
        NodeKind::Literal { value } => {
            if let LiteralValue::Number(n) = value {
                if !n.is_finite() {
                    issues.push("non-finite number literal".to_string());
                }
            }
        }
        NodeKind::RuntimeCall { helper, args } => {
            let ok = match helper {
                RuntimeHelper::At | RuntimeHelper::SliceFrom => args.len() == 2,
                RuntimeHelper::OmitKeys => !args.is_empty(),
                RuntimeHelper::ToStr => args.len() == 1,
            };
            if !ok {
                issues.push(format!(
                    "runtime helper {:?} called with {} argument(s)",
                    helper.name(),
                    args.len()
                ));
            }
        }
        NodeKind::Template { parts } => {
            if parts.is_empty() {
                issues.push("template with no parts".to_string());
            }
        }
        _ => {}
    }
    issues
}

fn check_ident(name: &str, what: &str, issues: &mut Vec<String>) {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$');
    let tail_ok = chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if !head_ok || !tail_ok {
        issues.push(format!("{what} {name:?} is not a valid identifier"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::common::Span;
    use crate::ir::{NodeId, SwitchArm};

    fn node(kind: NodeKind) -> Node {
        Node {
            id: NodeId(1),
            kind,
            span: Span::default(),
        }
    }

    #[test]
    fn empty_binding_name_is_flagged() {
        let issues = check_node(&node(NodeKind::Binding {
            name: String::new(),
            init: None,
            mutable: false,
        }));
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn two_default_arms_are_flagged() {
        let issues = check_node(&node(NodeKind::Switch {
            discriminant: NodeId(2),
            cases: vec![
                SwitchArm {
                    test: None,
                    body: vec![],
                },
                SwitchArm {
                    test: None,
                    body: vec![],
                },
            ],
        }));
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn non_finite_number_is_flagged() {
        let issues = check_node(&node(NodeKind::Literal {
            value: LiteralValue::Number(f64::NAN),
        }));
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn helper_arity_is_checked() {
        let issues = check_node(&node(NodeKind::RuntimeCall {
            helper: RuntimeHelper::At,
            args: vec![NodeId(2)],
        }));
        assert_eq!(issues.len(), 1);
    }
}
