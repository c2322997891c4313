//! End-to-end scenarios from spec.md §8, driven directly against
//! `schema::validate`, `RegisterBank`, `UpdateLoop` and `Supervisor` —
//! no live TCP connection. Per-rule edge cases (clamping, illegal
//! address, dependency cycles) already have focused unit tests next to
//! the code they exercise; these tests check the pieces wired
//! together the way a simulation actually runs.

use std::net::Ipv4Addr;
use std::time::Duration;

use modsim::{Defaults, NumericType, RegisterConfig, SimulationConfig, Supervisor};
use pretty_assertions::assert_eq;

fn defaults(port: u16) -> Defaults {
    Defaults {
        ip: Ipv4Addr::new(127, 0, 0, 1),
        port,
        slave_id: 1,
    }
}

fn base_register(name: &str, address: u16, numeric_type: NumericType) -> RegisterConfig {
    RegisterConfig {
        name: name.to_string(),
        address,
        numeric_type,
        scale: 1.0,
        description: String::new(),
        variable_name: None,
        base_value: None,
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

fn constant(name: &str, address: u16, numeric_type: NumericType, scale: f64, base_value: f64) -> RegisterConfig {
    RegisterConfig {
        scale,
        base_value: Some(base_value),
        ..base_register(name, address, numeric_type)
    }
}

fn expression(name: &str, address: u16, numeric_type: NumericType, scale: f64, expression: &str) -> RegisterConfig {
    RegisterConfig {
        scale,
        expression: Some(expression.to_string()),
        ..base_register(name, address, numeric_type)
    }
}

fn writable(
    name: &str,
    address: u16,
    numeric_type: NumericType,
    variable_name: &str,
    base_value: f64,
    min_value: Option<f64>,
    max_value: Option<f64>,
) -> RegisterConfig {
    RegisterConfig {
        variable_name: Some(variable_name.to_string()),
        base_value: Some(base_value),
        writable: true,
        min_value,
        max_value,
        ..base_register(name, address, numeric_type)
    }
}

fn accumulator(name: &str, address: u16, numeric_type: NumericType, scale: f64, source: &str) -> RegisterConfig {
    RegisterConfig {
        scale,
        accumulate: true,
        source: Some(source.to_string()),
        ..base_register(name, address, numeric_type)
    }
}

/// Scenario 1 (spec.md §8): two constants feed an expression, and the
/// forced first tick encodes the product onto the wire as the
/// round-trip-correct big-endian word pair.
#[test]
fn scenario_1_derived_power() {
    let config = SimulationConfig {
        defaults: defaults(15021),
        registers: vec![
            constant("voltage_l1_n", 0, NumericType::U16, 1.0, 230.0),
            constant("current_l1", 1, NumericType::U16, 1.0, 5.0),
            expression(
                "power_l1",
                2,
                NumericType::U32,
                1000.0,
                "voltage_l1_n * current_l1",
            ),
        ],
    };

    let validated = modsim::validate(&config).unwrap();
    let bank = std::sync::Arc::new(modsim::RegisterBank::new(validated.registers));
    let update_loop =
        modsim::UpdateLoop::new(bank.clone(), validated.eval_order, modsim::DEFAULT_TICK_INTERVAL);

    update_loop.tick_with_dt(0.0);

    assert_eq!(bank.get_scaled("power_l1"), Some(1150.0));
    // 1150.0 * 1000.0 = 1_150_000 = (17 << 16) | 35_888.
    assert_eq!(bank.read_words(2, 2).unwrap(), vec![17, 35_888]);
}

/// Scenario 2 (spec.md §8): writing a new setpoint changes a
/// dependent expression's value on the next tick, via the writable
/// register's `variable_name` in the globals table.
#[test]
fn scenario_2_setpoint_coupling() {
    let config = SimulationConfig {
        defaults: defaults(15022),
        registers: vec![
            writable("setpoint", 0, NumericType::U16, "sp", 25.0, Some(0.0), Some(100.0)),
            constant("power_l1", 1, NumericType::U32, 1.0, 1150.0),
            expression(
                "adjusted_power",
                3,
                NumericType::U32,
                1.0,
                "power_l1 * (sp / 100.0)",
            ),
        ],
    };

    let validated = modsim::validate(&config).unwrap();
    let bank = std::sync::Arc::new(modsim::RegisterBank::new(validated.registers));
    let update_loop =
        modsim::UpdateLoop::new(bank.clone(), validated.eval_order, modsim::DEFAULT_TICK_INTERVAL);

    update_loop.tick_with_dt(0.0);
    assert_eq!(bank.get_scaled("adjusted_power"), Some(287.5));

    // FC6-equivalent write: setpoint -> 50.
    bank.write_words(0, &[50]).unwrap();
    update_loop.tick_with_dt(0.0);
    assert_eq!(bank.get_scaled("adjusted_power"), Some(575.0));
}

/// Scenario 3 (spec.md §8): an accumulator sourced from a steady rate
/// advances by rate * dt/3600 over a simulated hour. Covered directly
/// against `UpdateLoop::tick_with_dt` in `update_loop.rs`'s own test
/// module; this test checks the same behavior through
/// `schema::validate`'s config-driven path.
#[test]
fn scenario_3_accumulator_through_validated_config() {
    let config = SimulationConfig {
        defaults: defaults(15023),
        registers: vec![
            constant("power_kw", 0, NumericType::U16, 1.0, 2500.0),
            accumulator("total_kwh", 1, NumericType::U32, 1000.0, "power_kw"),
        ],
    };

    let validated = modsim::validate(&config).unwrap();
    let bank = std::sync::Arc::new(modsim::RegisterBank::new(validated.registers));
    let update_loop =
        modsim::UpdateLoop::new(bank.clone(), validated.eval_order, modsim::DEFAULT_TICK_INTERVAL);

    update_loop.tick_with_dt(3600.0);
    assert_eq!(bank.get_scaled("total_kwh"), Some(2500.0));

    // A second hour at the same rate accumulates, it doesn't reset.
    update_loop.tick_with_dt(3600.0);
    assert_eq!(bank.get_scaled("total_kwh"), Some(5000.0));
}

/// Scenario 6 (spec.md §8), validated through the full config path
/// rather than hand-built schemas: a two-register cycle is rejected
/// and both register names appear in the error.
#[test]
fn scenario_6_cycle_rejected_through_validated_config() {
    let config = SimulationConfig {
        defaults: defaults(15024),
        registers: vec![
            expression("a", 0, NumericType::U16, 1.0, "b + 1"),
            expression("b", 1, NumericType::U16, 1.0, "a + 1"),
        ],
    };

    let err = modsim::validate(&config).unwrap_err();
    match err {
        modsim::ConfigError::DependencyCycle { registers } => {
            assert_eq!(registers.len(), 2);
            assert!(registers.contains(&"a".to_string()));
            assert!(registers.contains(&"b".to_string()));
        }
        other => panic!("expected DependencyCycle, got {other:?}"),
    }
}

/// Invariants (spec.md §8): F32 round-trips exactly through
/// encode/decode via a constant register, since IEEE-754 bit patterns
/// carry no scale-rounding error.
#[test]
fn invariant_f32_register_round_trips_exactly() {
    let config = SimulationConfig {
        defaults: defaults(15025),
        registers: vec![constant("temperature", 0, NumericType::F32, 1.0, 21.5)],
    };

    let validated = modsim::validate(&config).unwrap();
    let bank = modsim::RegisterBank::new(validated.registers);
    assert_eq!(bank.get_scaled("temperature"), Some(21.5));

    let words = bank.read_words(0, 2).unwrap();
    let bits = ((words[0] as u32) << 16) | words[1] as u32;
    assert_eq!(f32::from_bits(bits), 21.5f32);
}

/// Supervisor lifecycle: `add` binds, validates, forces a first tick,
/// and starts both background tasks before returning; `list` and
/// `snapshot` reflect it; `remove` cancels and frees the endpoint.
#[tokio::test]
async fn supervisor_add_snapshot_remove_lifecycle() {
    let supervisor = Supervisor::new(Duration::from_millis(50));

    let config = SimulationConfig {
        defaults: defaults(15026),
        registers: vec![constant("k", 0, NumericType::U16, 1.0, 7.0)],
    };

    let id = supervisor.add(&config).await.unwrap();

    let listed = supervisor.list().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].port, 15026);

    let snapshot = supervisor.snapshot(id).await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].name, "k");
    assert_eq!(snapshot[0].scaled, 7.0);

    supervisor.remove(id).await.unwrap();
    assert!(supervisor.list().await.is_empty());

    // The port is free again: a second simulation can bind it.
    let second = supervisor.add(&config).await.unwrap();
    assert_ne!(second, id);
    supervisor.shutdown_all().await;
}

/// `add` fails fast on a bind collision, before any simulation state
/// is constructed: the supervisor's simulation count stays at one.
#[tokio::test]
async fn supervisor_rejects_duplicate_bind() {
    let supervisor = Supervisor::new(Duration::from_millis(50));

    let config = SimulationConfig {
        defaults: defaults(15027),
        registers: vec![constant("k", 0, NumericType::U16, 1.0, 1.0)],
    };

    let _first = supervisor.add(&config).await.unwrap();
    let err = supervisor.add(&config).await.unwrap_err();
    assert!(matches!(err, modsim::SupervisorError::Bind(_)));
    assert_eq!(supervisor.list().await.len(), 1);

    supervisor.shutdown_all().await;
}

/// Globals never leak across simulations (spec.md §9): two
/// simulations can both declare a writable with the same
/// `variable_name` without interfering with each other's expressions.
#[tokio::test]
async fn supervisor_simulations_do_not_share_globals() {
    let supervisor = Supervisor::new(Duration::from_millis(50));

    let make_config = |port: u16| SimulationConfig {
        defaults: defaults(port),
        registers: vec![
            writable("setpoint", 0, NumericType::U16, "sp", 10.0, None, None),
            expression("doubled", 2, NumericType::U32, 1.0, "sp * 2"),
        ],
    };

    let first = supervisor.add(&make_config(15028)).await.unwrap();
    let second = supervisor.add(&make_config(15029)).await.unwrap();

    let first_snapshot = supervisor.snapshot(first).await.unwrap();
    let second_snapshot = supervisor.snapshot(second).await.unwrap();
    let doubled = |snapshot: &[modsim::RegisterSnapshot]| {
        snapshot.iter().find(|r| r.name == "doubled").unwrap().scaled
    };
    assert_eq!(doubled(&first_snapshot), 20.0);
    assert_eq!(doubled(&second_snapshot), 20.0);

    supervisor.shutdown_all().await;
}
