//! Validated, frozen register descriptions (spec.md §3, §4.1).
//!
//! `validate` is the single entry point: it takes the raw deserialized
//! config and either returns a frozen `Vec<RegisterSchema>` plus the
//! planner's evaluation order, or a `ConfigError` naming the offending
//! register and rule. No partial schema is ever exposed.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{RegisterConfig, SimulationConfig};
use crate::error::ConfigError;
use crate::expr::{self, Expr};
use crate::numeric::NumericType;
use crate::planner;

/// One register's update rule and its role-specific parameters
/// (spec.md §3, "Role parameters").
#[derive(Debug, Clone)]
pub enum Role {
    Constant {
        base_value: f64,
    },
    Random {
        base_value: f64,
        fluctuation: f64,
    },
    Accumulator {
        source: String,
    },
    Expression {
        expression: String,
        tree: Arc<Expr>,
    },
    Writable {
        base_value: f64,
        min_value: Option<f64>,
        max_value: Option<f64>,
    },
}

impl Role {
    pub fn is_writable(&self) -> bool {
        matches!(self, Role::Writable { .. })
    }

    /// The initial `scaled` value before the forced first tick
    /// (spec.md §3, "Lifecycle").
    pub fn initial_scaled(&self) -> f64 {
        match self {
            Role::Constant { base_value }
            | Role::Random { base_value, .. }
            | Role::Writable { base_value, .. } => *base_value,
            Role::Accumulator { .. } | Role::Expression { .. } => 0.0,
        }
    }
}

/// A single, immutable, validated register description (spec.md §3).
#[derive(Debug, Clone)]
pub struct RegisterSchema {
    pub name: String,
    pub address: u16,
    pub numeric_type: NumericType,
    pub scale: f64,
    pub role: Role,
    pub variable_name: Option<String>,
    pub description: String,
}

impl RegisterSchema {
    pub fn width(&self) -> u16 {
        self.numeric_type.width() as u16
    }
}

/// The result of successful validation: the frozen schema list (in
/// the order registers were declared) and the per-tick evaluation
/// order the dependency planner derived from it.
pub struct ValidatedSchema {
    pub registers: Vec<RegisterSchema>,
    pub eval_order: Vec<String>,
}

/// Validate an entire simulation's register list (spec.md §4.1).
/// Per-register checks run first; invariants 1-4 (address
/// disjointness, name/variable uniqueness, reference closure,
/// acyclicity) are global and run only once every register passes
/// individually.
pub fn validate(config: &SimulationConfig) -> Result<ValidatedSchema, ConfigError> {
    let mut registers = Vec::with_capacity(config.registers.len());
    for raw in &config.registers {
        registers.push(validate_one(raw)?);
    }

    check_unique_names(&registers)?;
    check_unique_variable_names(&registers)?;
    check_address_disjointness(&registers)?;
    check_reference_closure(&registers)?;

    let eval_order = planner::plan(&registers)?;

    Ok(ValidatedSchema {
        registers,
        eval_order,
    })
}

fn validate_one(raw: &RegisterConfig) -> Result<RegisterSchema, ConfigError> {
    let name = raw.name.clone();
    let invalid = |reason: &str| ConfigError::InvalidRegister {
        name: name.clone(),
        reason: reason.to_string(),
    };

    if raw.name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if raw.scale <= 0.0 {
        return Err(invalid("scale must be strictly positive"));
    }
    let width = raw.numeric_type.width() as u32;
    if raw.address as u32 + width > u16::MAX as u32 + 1 {
        return Err(invalid("address + width exceeds the 16-bit address space"));
    }

    let roles_set = [raw.randomize, raw.accumulate, raw.expression.is_some(), raw.writable]
        .into_iter()
        .filter(|set| *set)
        .count();
    if roles_set > 1 {
        return Err(ConfigError::RoleConflict { name: name.clone() });
    }

    let role = if raw.writable {
        let base_value = raw
            .base_value
            .ok_or_else(|| invalid("writable register requires base_value"))?;
        let variable_name = raw
            .variable_name
            .clone()
            .ok_or_else(|| invalid("writable register requires variable_name"))?;
        if variable_name.is_empty() {
            return Err(invalid("variable_name must not be empty"));
        }
        if let Some(min) = raw.min_value {
            let max = raw
                .max_value
                .ok_or_else(|| invalid("min_value set without max_value"))?;
            if min > max {
                return Err(invalid("min_value must be <= max_value"));
            }
            if base_value < min || base_value > max {
                return Err(invalid("base_value must lie within [min_value, max_value]"));
            }
        } else if raw.max_value.is_some() {
            return Err(invalid("max_value set without min_value"));
        }
        Role::Writable {
            base_value,
            min_value: raw.min_value,
            max_value: raw.max_value,
        }
    } else if raw.randomize {
        let base_value = raw
            .base_value
            .ok_or_else(|| invalid("random register requires base_value"))?;
        let fluctuation = raw
            .fluctuation
            .ok_or_else(|| invalid("random register requires fluctuation"))?;
        if !(fluctuation > 0.0 && fluctuation <= 1.0) {
            return Err(invalid("fluctuation must be in (0, 1]"));
        }
        Role::Random {
            base_value,
            fluctuation,
        }
    } else if raw.accumulate {
        let source = raw
            .source
            .clone()
            .ok_or_else(|| invalid("accumulator register requires source"))?;
        if source.is_empty() {
            return Err(invalid("source must not be empty"));
        }
        Role::Accumulator { source }
    } else if let Some(expression) = &raw.expression {
        let tree = expr::parse(expression).map_err(|source| ConfigError::InvalidExpression {
            register: name.clone(),
            source,
        })?;
        Role::Expression {
            expression: expression.clone(),
            tree: Arc::new(tree),
        }
    } else {
        let base_value = raw
            .base_value
            .ok_or_else(|| invalid("constant register requires base_value"))?;
        Role::Constant { base_value }
    };

    if !raw.writable && raw.variable_name.is_some() {
        return Err(invalid("variable_name is only valid on writable registers"));
    }

    Ok(RegisterSchema {
        name,
        address: raw.address,
        numeric_type: raw.numeric_type,
        scale: raw.scale,
        role,
        variable_name: raw.variable_name.clone(),
        description: raw.description.clone(),
    })
}

fn check_unique_names(registers: &[RegisterSchema]) -> Result<(), ConfigError> {
    let mut seen = HashMap::new();
    for r in registers {
        if seen.insert(r.name.clone(), ()).is_some() {
            return Err(ConfigError::DuplicateName { name: r.name.clone() });
        }
    }
    Ok(())
}

fn check_unique_variable_names(registers: &[RegisterSchema]) -> Result<(), ConfigError> {
    let mut seen: HashMap<String, String> = HashMap::new();
    for r in registers {
        if let Some(variable_name) = &r.variable_name {
            if let Some(first) = seen.get(variable_name) {
                return Err(ConfigError::DuplicateVariableName {
                    variable_name: variable_name.clone(),
                    first: first.clone(),
                    second: r.name.clone(),
                });
            }
            seen.insert(variable_name.clone(), r.name.clone());
        }
    }
    Ok(())
}

fn check_address_disjointness(registers: &[RegisterSchema]) -> Result<(), ConfigError> {
    // Widened to u32: a register at address 65535 with a 2-word type spans
    // up to the exclusive bound 65536, which doesn't fit back into a u16
    // (validate_one already rejects anything wider than that).
    let mut spans: Vec<(&str, u32, u32)> = registers
        .iter()
        .map(|r| (r.name.as_str(), r.address as u32, r.address as u32 + r.width() as u32))
        .collect();
    spans.sort_by_key(|(_, start, _)| *start);
    for pair in spans.windows(2) {
        let (a, a_start, a_end) = pair[0];
        let (b, b_start, b_end) = pair[1];
        if a_start < b_end && b_start < a_end {
            return Err(ConfigError::AddressOverlap {
                a: a.to_string(),
                a_start,
                a_end,
                b: b.to_string(),
                b_start,
                b_end,
            });
        }
    }
    Ok(())
}

fn check_reference_closure(registers: &[RegisterSchema]) -> Result<(), ConfigError> {
    let names: std::collections::HashSet<&str> =
        registers.iter().map(|r| r.name.as_str()).collect();
    let variable_names: std::collections::HashSet<&str> = registers
        .iter()
        .filter_map(|r| r.variable_name.as_deref())
        .collect();

    for r in registers {
        match &r.role {
            Role::Accumulator { source } => {
                if !names.contains(source.as_str()) {
                    return Err(ConfigError::DanglingReference {
                        register: r.name.clone(),
                        identifier: source.clone(),
                    });
                }
            }
            Role::Expression { tree, .. } => {
                let mut ids = Vec::new();
                expr::identifiers(tree, &mut ids);
                for id in ids {
                    if !names.contains(id.as_str()) && !variable_names.contains(id.as_str()) {
                        return Err(ConfigError::DanglingReference {
                            register: r.name.clone(),
                            identifier: id,
                        });
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Defaults;
    use std::net::Ipv4Addr;

    fn cfg(registers: Vec<RegisterConfig>) -> SimulationConfig {
        SimulationConfig {
            defaults: Defaults {
                ip: Ipv4Addr::new(127, 0, 0, 1),
                port: 502,
                slave_id: 1,
            },
            registers,
        }
    }

    fn reg(name: &str, address: u16) -> RegisterConfig {
        RegisterConfig {
            name: name.to_string(),
            address,
            numeric_type: NumericType::U16,
            scale: 1.0,
            description: String::new(),
            variable_name: None,
            base_value: Some(0.0),
            randomize: false,
            fluctuation: None,
            accumulate: false,
            source: None,
            expression: None,
            writable: false,
            min_value: None,
            max_value: None,
        }
    }

    #[test]
    fn rejects_role_conflict() {
        let mut r = reg("a", 0);
        r.writable = true;
        r.variable_name = Some("a_var".into());
        r.randomize = true;
        r.fluctuation = Some(0.1);
        let err = validate(&cfg(vec![r])).unwrap_err();
        assert!(matches!(err, ConfigError::RoleConflict { .. }));
    }

    #[test]
    fn rejects_overlapping_addresses() {
        let mut wide = reg("a", 0);
        wide.numeric_type = NumericType::U32;
        let overlapping = reg("b", 1);
        let err = validate(&cfg(vec![wide, overlapping])).unwrap_err();
        assert!(matches!(err, ConfigError::AddressOverlap { .. }));
    }

    #[test]
    fn rejects_address_span_overflowing_16_bits() {
        let mut wide = reg("a", u16::MAX);
        wide.numeric_type = NumericType::U32;
        let err = validate(&cfg(vec![wide])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRegister { .. }));
    }

    #[test]
    fn accepts_address_span_exactly_filling_16_bits() {
        let mut wide = reg("a", u16::MAX - 1);
        wide.numeric_type = NumericType::U32;
        assert!(validate(&cfg(vec![wide])).is_ok());
    }

    #[test]
    fn rejects_writable_base_value_outside_its_own_bounds() {
        let mut r = reg("setpoint", 0);
        r.writable = true;
        r.variable_name = Some("sp".into());
        r.base_value = Some(200.0);
        r.min_value = Some(0.0);
        r.max_value = Some(100.0);
        let err = validate(&cfg(vec![r])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRegister { .. }));
    }

    #[test]
    fn rejects_dangling_expression_reference() {
        let mut r = reg("a", 0);
        r.base_value = None;
        r.expression = Some("b + 1".to_string());
        let err = validate(&cfg(vec![r])).unwrap_err();
        assert!(matches!(err, ConfigError::DanglingReference { .. }));
    }

    #[test]
    fn rejects_cycle() {
        let mut a = reg("a", 0);
        a.base_value = None;
        a.expression = Some("b + 1".to_string());
        let mut b = reg("b", 1);
        b.base_value = None;
        b.expression = Some("a + 1".to_string());
        let err = validate(&cfg(vec![a, b])).unwrap_err();
        match err {
            ConfigError::DependencyCycle { registers } => {
                assert_eq!(registers.len(), 2);
                assert!(registers.contains(&"a".to_string()));
                assert!(registers.contains(&"b".to_string()));
            }
            other => panic!("expected DependencyCycle, got {other:?}"),
        }
    }

    #[test]
    fn accepts_setpoint_coupling_scenario() {
        let mut setpoint = reg("setpoint", 0);
        setpoint.writable = true;
        setpoint.variable_name = Some("sp".into());
        setpoint.base_value = Some(25.0);

        let mut power_l1 = reg("power_l1", 2);
        power_l1.numeric_type = NumericType::U32;
        power_l1.base_value = Some(0.0);

        let mut adjusted = reg("adjusted_power", 4);
        adjusted.numeric_type = NumericType::U32;
        adjusted.base_value = None;
        adjusted.expression = Some("power_l1 * (sp / 100.0)".to_string());

        let validated = validate(&cfg(vec![setpoint, power_l1, adjusted])).unwrap();
        assert_eq!(validated.registers.len(), 3);
        assert_eq!(validated.eval_order.last().unwrap(), "adjusted_power");
    }
}
