//! The register bank (spec.md §3, §4.2): a typed value store
//! addressable both by name and by Modbus address, plus the globals
//! table expressions read from.
//!
//! Concurrency follows the teacher workspace's lock choice
//! (`parking_lot`, not the async-aware `tokio::sync::RwLock`): every
//! critical section here — a tick's walk-and-reencode, a word-range
//! read, a write — runs to completion without ever `.await`ing, so a
//! synchronous lock is both simpler and strictly faster (spec.md §5).

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::warn;

use crate::error::{InternalError, ProtocolError};
use crate::expr::Environment;
use crate::numeric::{decode_raw, encode};
use crate::schema::{RegisterSchema, Role};

/// A snapshot of one register's present-tick state, as handed to the
/// dashboard collaborator (spec.md §4.2, §6).
#[derive(Debug, Clone)]
pub struct RegisterSnapshot {
    pub name: String,
    pub address: u16,
    pub scaled: f64,
    pub raw_words: Vec<u16>,
    pub description: String,
    pub writable: bool,
}

struct Inner {
    registers: Vec<RegisterSchema>,
    /// index into `registers`, by name
    index_by_name: HashMap<String, usize>,
    /// index into `registers`, by starting address
    index_by_address: HashMap<u16, usize>,
    scaled: Vec<f64>,
    raw: Vec<u16>,
    globals: HashMap<String, f64>,
    last_update_time: Option<Instant>,
}

impl Inner {
    fn encode_register(&mut self, idx: usize) {
        let r = &self.registers[idx];
        let words = encode(self.scaled[idx], r.scale, r.numeric_type);
        let addr = r.address as usize;
        self.raw[addr] = words[0];
        if r.width() == 2 {
            self.raw[addr + 1] = words[1];
        }
    }

    fn refresh_globals(&mut self) {
        for (idx, r) in self.registers.iter().enumerate() {
            if let Some(variable_name) = &r.variable_name {
                self.globals.insert(variable_name.clone(), self.scaled[idx]);
            }
        }
    }

    fn clamp_for(&self, idx: usize, value: f64) -> f64 {
        match &self.registers[idx].role {
            Role::Writable {
                min_value: Some(min),
                max_value: Some(max),
                ..
            } => value.clamp(*min, *max),
            _ => value,
        }
    }
}

/// Per-simulation store of register values plus the wire-level word
/// array (spec.md GLOSSARY, "Bank").
pub struct RegisterBank {
    inner: RwLock<Inner>,
}

struct EnvView<'a> {
    scaled: &'a HashMap<String, f64>,
    globals: &'a HashMap<String, f64>,
}

impl Environment for EnvView<'_> {
    fn lookup(&self, name: &str) -> Option<f64> {
        self.scaled.get(name).copied().or_else(|| self.globals.get(name).copied())
    }
}

impl RegisterBank {
    /// Build a bank from a validated schema list. `scaled` is
    /// initialized per-role and `raw` encoded from it, but no tick has
    /// run yet — the update loop forces one before the server accepts
    /// traffic (spec.md §3, "Lifecycle").
    pub fn new(registers: Vec<RegisterSchema>) -> Self {
        // Widened to u32: a register at address 65535 with a 2-word type
        // spans up to the exclusive bound 65536, which doesn't fit a u16.
        // `schema::validate` rejects any register wider than that before a
        // bank is ever built from it, so this never truncates in practice.
        let max_address = registers
            .iter()
            .map(|r| r.address as u32 + r.width() as u32)
            .max()
            .unwrap_or(0);

        let mut index_by_name = HashMap::new();
        let mut index_by_address = HashMap::new();
        let mut scaled = Vec::with_capacity(registers.len());
        for (idx, r) in registers.iter().enumerate() {
            index_by_name.insert(r.name.clone(), idx);
            index_by_address.insert(r.address, idx);
            scaled.push(r.role.initial_scaled());
        }

        let mut inner = Inner {
            registers,
            index_by_name,
            index_by_address,
            scaled,
            raw: vec![0u16; max_address as usize],
            globals: HashMap::new(),
            last_update_time: None,
        };
        // A Writable's base_value is already bounds-checked against its own
        // min/max at validation time (schema::validate_one), but clamp here
        // too so invariant 6 (spec.md §3) holds from construction even if a
        // future caller builds a bank from an unvalidated schema list.
        for idx in 0..inner.registers.len() {
            inner.scaled[idx] = inner.clamp_for(idx, inner.scaled[idx]);
        }
        inner.refresh_globals();
        for idx in 0..inner.registers.len() {
            inner.encode_register(idx);
        }

        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Total number of addressable words, used by the server to bound
    /// FC3/6/16 requests (spec.md §4.6).
    pub fn word_count(&self) -> u16 {
        self.inner.read().raw.len() as u16
    }

    /// Read `count` words starting at `start`, atomic with respect to
    /// a tick (spec.md §4.2).
    pub fn read_words(&self, start: u16, count: u16) -> Result<Vec<u16>, ProtocolError> {
        let inner = self.inner.read();
        let end = start as usize + count as usize;
        if end > inner.raw.len() {
            return Err(ProtocolError::IllegalDataAddress);
        }
        Ok(inner.raw[start as usize..end].to_vec())
    }

    /// Write `words` starting at `start`. Accepted only if every
    /// touched address belongs to a single Writable register or a
    /// consecutive, fully-covered run of Writable registers (spec.md
    /// §4.2, §4.6).
    pub fn write_words(&self, start: u16, words: &[u16]) -> Result<(), ProtocolError> {
        let mut inner = self.inner.write();
        let end = start as usize + words.len();
        if end > inner.raw.len() {
            return Err(ProtocolError::IllegalDataAddress);
        }

        let mut cursor = start as usize;
        let mut touched = Vec::new();
        while cursor < end {
            let idx = *inner
                .index_by_address
                .get(&(cursor as u16))
                .ok_or(ProtocolError::IllegalDataAddress)?;
            let r = &inner.registers[idx];
            if !r.role.is_writable() {
                return Err(ProtocolError::IllegalDataAddress);
            }
            let width = r.width() as usize;
            if cursor + width > end {
                // A register only partially covered by this write
                // (e.g. FC6 targeting the low word of a U32 Writable).
                return Err(ProtocolError::IllegalDataAddress);
            }
            touched.push((idx, cursor - start as usize, width));
            cursor += width;
        }

        for (idx, offset, width) in touched {
            let word_slice = &words[offset..offset + width];
            let r = &inner.registers[idx];
            let numeric = decode_raw(word_slice, r.numeric_type);
            let requested = numeric / r.scale;
            let clamped = inner.clamp_for(idx, requested);
            if clamped != requested {
                warn!(
                    register = %inner.registers[idx].name,
                    requested,
                    clamped,
                    "write coerced into declared min/max bounds"
                );
            }
            inner.scaled[idx] = clamped;
            inner.encode_register(idx);
        }
        inner.refresh_globals();
        Ok(())
    }

    /// Current scaled value of a named register, used by the update
    /// loop and by Accumulator evaluation.
    pub fn get_scaled(&self, name: &str) -> Option<f64> {
        let inner = self.inner.read();
        inner.index_by_name.get(name).map(|&idx| inner.scaled[idx])
    }

    /// Set a register's scaled value directly, clamping per-type and
    /// per-writable bounds and re-encoding `raw` (spec.md §4.2). Used
    /// by the update loop for Random/Expression/Accumulator results.
    /// Returns `Err` if `name` is unknown (an `InternalError`, since a
    /// validated eval_order never names an unknown register).
    pub fn set_scaled(&self, name: &str, value: f64) -> Result<(), InternalError> {
        let mut inner = self.inner.write();
        let idx = *inner
            .index_by_name
            .get(name)
            .ok_or_else(|| InternalError(format!("unknown register {name:?}")))?;
        let clamped = inner.clamp_for(idx, value);
        inner.scaled[idx] = clamped;
        inner.encode_register(idx);
        Ok(())
    }

    /// `dt` in seconds since the previous tick; `None` marks the first
    /// tick (spec.md §4.5 step 1).
    pub fn elapsed_since_last_tick(&self, now: Instant) -> Option<f64> {
        let last = self.inner.read().last_update_time?;
        Some(now.saturating_duration_since(last).as_secs_f64())
    }

    pub fn set_last_update_time(&self, now: Instant) {
        self.inner.write().last_update_time = Some(now);
    }

    /// Run `f` once per register in `eval_order`, in order, with a
    /// view of the current scaled values and globals for expression
    /// evaluation. `f` returns the register's new scaled value (or
    /// `None` to leave it unchanged, e.g. on an `EvalError`). The
    /// globals refresh (spec.md §4.5 step 2), the walk, and the
    /// re-encode all happen under one write-lock acquisition, so
    /// readers never see a torn intermediate state (spec.md §4.5 step
    /// 4, §5, §9 "Tick atomicity").
    pub fn apply_tick<F>(&self, eval_order: &[String], mut f: F)
    where
        F: FnMut(&str, &Role, &dyn Environment) -> Option<f64>,
    {
        let mut inner = self.inner.write();
        inner.refresh_globals();
        let scaled_by_name: HashMap<String, f64> = inner
            .index_by_name
            .iter()
            .map(|(name, &idx)| (name.clone(), inner.scaled[idx]))
            .collect();

        let mut updates: Vec<(usize, f64)> = Vec::new();
        {
            let mut live_scaled = scaled_by_name.clone();
            for name in eval_order {
                let idx = inner.index_by_name[name];
                let role = inner.registers[idx].role.clone();
                let env = EnvView {
                    scaled: &live_scaled,
                    globals: &inner.globals,
                };
                if let Some(new_value) = f(name, &role, &env) {
                    live_scaled.insert(name.clone(), new_value);
                    updates.push((idx, new_value));
                }
            }
        }

        for (idx, value) in updates {
            let clamped = inner.clamp_for(idx, value);
            inner.scaled[idx] = clamped;
            inner.encode_register(idx);
        }
    }

    /// A read-only view of every register's current scaled value, for
    /// the dashboard collaborator (spec.md §4.2, §6).
    pub fn snapshot(&self) -> Vec<RegisterSnapshot> {
        let inner = self.inner.read();
        inner
            .registers
            .iter()
            .enumerate()
            .map(|(idx, r)| {
                let addr = r.address as usize;
                let raw_words = if r.width() == 2 {
                    vec![inner.raw[addr], inner.raw[addr + 1]]
                } else {
                    vec![inner.raw[addr]]
                };
                RegisterSnapshot {
                    name: r.name.clone(),
                    address: r.address,
                    scaled: inner.scaled[idx],
                    raw_words,
                    description: r.description.clone(),
                    writable: r.role.is_writable(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::NumericType;
    use pretty_assertions::assert_eq;

    fn writable_schema(name: &str, address: u16, min: Option<f64>, max: Option<f64>) -> RegisterSchema {
        writable_schema_with_base(name, address, 25.0, min, max)
    }

    fn writable_schema_with_base(
        name: &str,
        address: u16,
        base_value: f64,
        min: Option<f64>,
        max: Option<f64>,
    ) -> RegisterSchema {
        RegisterSchema {
            name: name.to_string(),
            address,
            numeric_type: NumericType::U16,
            scale: 1.0,
            role: Role::Writable {
                base_value,
                min_value: min,
                max_value: max,
            },
            variable_name: Some(format!("{name}_var")),
            description: String::new(),
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let bank = RegisterBank::new(vec![writable_schema("setpoint", 0, Some(0.0), Some(100.0))]);
        bank.write_words(0, &[42]).unwrap();
        assert_eq!(bank.read_words(0, 1).unwrap(), vec![42]);
        assert_eq!(bank.get_scaled("setpoint"), Some(42.0));
    }

    #[test]
    fn write_clamps_to_bounds() {
        let bank = RegisterBank::new(vec![writable_schema("setpoint", 0, Some(0.0), Some(100.0))]);
        bank.write_words(0, &[250]).unwrap();
        assert_eq!(bank.get_scaled("setpoint"), Some(100.0));
        assert_eq!(bank.read_words(0, 1).unwrap(), vec![100]);
    }

    #[test]
    fn construction_clamps_a_base_value_outside_bounds() {
        // `schema::validate` rejects this combination outright, but the
        // bank clamps defensively too (spec.md §3 invariant 6) so it can
        // never start life with an out-of-bounds scaled value even if a
        // caller builds it from an unvalidated schema list.
        let bank = RegisterBank::new(vec![writable_schema_with_base(
            "setpoint",
            0,
            200.0,
            Some(0.0),
            Some(100.0),
        )]);
        assert_eq!(bank.get_scaled("setpoint"), Some(100.0));
        assert_eq!(bank.read_words(0, 1).unwrap(), vec![100]);
    }

    #[test]
    fn illegal_address_on_out_of_range_read() {
        let bank = RegisterBank::new(vec![writable_schema("setpoint", 0, None, None)]);
        assert_eq!(
            bank.read_words(50, 2).unwrap_err(),
            ProtocolError::IllegalDataAddress
        );
    }

    #[test]
    fn rejects_partial_overlap_write_on_wide_register() {
        let wide = RegisterSchema {
            name: "wide".to_string(),
            address: 0,
            numeric_type: NumericType::U32,
            scale: 1.0,
            role: Role::Writable {
                base_value: 0.0,
                min_value: None,
                max_value: None,
            },
            variable_name: Some("wide_var".to_string()),
            description: String::new(),
        };
        let bank = RegisterBank::new(vec![wide]);
        // Single-word write (FC 6 semantics) targeting only the low word.
        assert_eq!(
            bank.write_words(1, &[5]).unwrap_err(),
            ProtocolError::IllegalDataAddress
        );
    }

    #[test]
    fn rejects_write_to_non_writable_register() {
        let constant = RegisterSchema {
            name: "k".to_string(),
            address: 0,
            numeric_type: NumericType::U16,
            scale: 1.0,
            role: Role::Constant { base_value: 7.0 },
            variable_name: None,
            description: String::new(),
        };
        let bank = RegisterBank::new(vec![constant]);
        assert_eq!(
            bank.write_words(0, &[1]).unwrap_err(),
            ProtocolError::IllegalDataAddress
        );
    }
}
