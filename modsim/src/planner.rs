//! Dependency planner (spec.md §4.4): derives a per-tick evaluation
//! order via Kahn's algorithm over the graph induced by Expression
//! references and Accumulator sources, tie-breaking ready nodes by
//! ascending address for a deterministic, reproducible order.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::ConfigError;
use crate::expr;
use crate::schema::{RegisterSchema, Role};

/// Compute the evaluation order for `registers`, or a `ConfigError`
/// naming every register left in an unresolved cycle.
pub fn plan(registers: &[RegisterSchema]) -> Result<Vec<String>, ConfigError> {
    let address_of: HashMap<&str, u16> =
        registers.iter().map(|r| (r.name.as_str(), r.address)).collect();
    let by_name: HashMap<&str, &str> =
        registers.iter().map(|r| (r.name.as_str(), r.name.as_str())).collect();

    // dependents[x] = registers that must be evaluated after x.
    let mut dependents: HashMap<&str, HashSet<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> =
        registers.iter().map(|r| (r.name.as_str(), 0)).collect();

    let mut add_dependency = |from: &'_ str, to: &'_ str| {
        if from == to {
            return;
        }
        let newly_added = dependents.entry(from).or_default().insert(to);
        if newly_added {
            *in_degree.get_mut(to).unwrap() += 1;
        }
    };

    for r in registers {
        match &r.role {
            Role::Accumulator { source } => {
                add_dependency(source.as_str(), r.name.as_str());
            }
            Role::Expression { tree, .. } => {
                let mut ids = Vec::new();
                expr::identifiers(tree, &mut ids);
                for id in ids {
                    // Only direct register-name references gate ordering.
                    // References that resolve solely via a Writable's
                    // `variable_name` don't need an edge: the globals
                    // table is refreshed at the start of every tick
                    // (spec.md §4.5 step 2, design note in spec.md §9),
                    // so a Writable's current value is already fresh
                    // regardless of where it sits in `eval_order`.
                    if let Some(&canonical) = by_name.get(id.as_str()) {
                        add_dependency(canonical, r.name.as_str());
                    }
                }
            }
            _ => {}
        }
    }

    // Ready set ordered by (address, name) for a deterministic,
    // reproducible tie-break among simultaneously-ready nodes.
    let mut ready: BTreeSet<(u16, &str)> = registers
        .iter()
        .filter(|r| in_degree[r.name.as_str()] == 0)
        .map(|r| (r.address, r.name.as_str()))
        .collect();

    let mut order: Vec<String> = Vec::with_capacity(registers.len());
    while let Some(&(addr, name)) = ready.iter().next() {
        ready.remove(&(addr, name));
        order.push(name.to_string());
        if let Some(deps) = dependents.get(name) {
            for &dep in deps {
                let entry = in_degree.get_mut(dep).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    ready.insert((address_of[dep], dep));
                }
            }
        }
    }

    if order.len() != registers.len() {
        let processed: HashSet<&str> = order.iter().map(|s| s.as_str()).collect();
        let cyclic: Vec<String> = registers
            .iter()
            .filter(|r| !processed.contains(r.name.as_str()))
            .map(|r| r.name.clone())
            .collect();
        return Err(ConfigError::DependencyCycle { registers: cyclic });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::NumericType;
    use crate::schema::RegisterSchema;
    use std::sync::Arc;

    fn writable(name: &str, address: u16) -> RegisterSchema {
        RegisterSchema {
            name: name.to_string(),
            address,
            numeric_type: NumericType::U16,
            scale: 1.0,
            role: Role::Writable {
                base_value: 0.0,
                min_value: None,
                max_value: None,
            },
            variable_name: Some(format!("{name}_var")),
            description: String::new(),
        }
    }

    fn expression(name: &str, address: u16, expr_str: &str) -> RegisterSchema {
        RegisterSchema {
            name: name.to_string(),
            address,
            numeric_type: NumericType::U16,
            scale: 1.0,
            role: Role::Expression {
                expression: expr_str.to_string(),
                tree: Arc::new(expr::parse(expr_str).unwrap()),
            },
            variable_name: None,
            description: String::new(),
        }
    }

    #[test]
    fn orders_dependents_after_dependencies() {
        let a = writable("a", 0);
        let b = expression("b", 1, "a + 1");
        let c = expression("c", 2, "b + 1");
        let order = plan(&[c.clone(), a.clone(), b.clone()]).unwrap();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn ties_broken_by_ascending_address() {
        let a = writable("a", 5);
        let b = writable("b", 1);
        let order = plan(&[a, b]).unwrap();
        assert_eq!(order, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn detects_two_node_cycle() {
        let a = expression("a", 0, "b + 1");
        let b = expression("b", 1, "a + 1");
        let err = plan(&[a, b]).unwrap_err();
        match err {
            ConfigError::DependencyCycle { registers } => {
                assert_eq!(registers.len(), 2);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }
}
