//! Trigger definitions (spec.md §3/§4.9): a threshold comparison against one
//! aggregate, evaluated periodically by the owning multilog's monitor tick.
//! Grounded on `original_source/.../trigger.h` for the fields; the tick loop
//! itself lives on `Multilog::run_monitor_tick`/`spawn_monitor` (it needs
//! direct access to the owning multilog's filters and aggregates), shaped
//! after `rpglotd/src/main.rs`'s `while running.load(...) { tick(); sleep() }`.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ConfluoError, Result};
use crate::expr::ast::RelOp;
use crate::types::Numeric;

pub struct Trigger {
    pub name: String,
    pub filter_id: usize,
    pub aggregate_id: usize,
    pub agg_name: String,
    pub op: RelOp,
    pub threshold: Numeric,
    pub periodicity_ms: u64,
    valid: AtomicBool,
}

impl Trigger {
    pub fn new(
        name: String,
        filter_id: usize,
        aggregate_id: usize,
        agg_name: String,
        op: RelOp,
        threshold: Numeric,
        periodicity_ms: u64,
    ) -> Trigger {
        Trigger { name, filter_id, aggregate_id, agg_name, op, threshold, periodicity_ms, valid: AtomicBool::new(true) }
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    /// Tests `value` (the current aggregate read) against this trigger.
    pub fn fires(&self, value: &Numeric) -> Result<bool> {
        let ord = value.relop(&self.threshold)?;
        Ok(match self.op {
            RelOp::Eq => ord == std::cmp::Ordering::Equal,
            RelOp::Neq => ord != std::cmp::Ordering::Equal,
            RelOp::Lt => ord == std::cmp::Ordering::Less,
            RelOp::Le => ord != std::cmp::Ordering::Greater,
            RelOp::Gt => ord == std::cmp::Ordering::Greater,
            RelOp::Ge => ord != std::cmp::Ordering::Less,
        })
    }

    pub fn expr_string(&self) -> String {
        format!("{} {} {}", self.agg_name, self.op.as_str(), self.threshold.format())
    }
}

/// A trigger's periodicity must be a positive multiple of the monitor tick
/// (spec.md §4.8's `install_trigger` contract).
pub fn validate_periodicity(periodicity_ms: u64, monitor_tick_ms: u64) -> Result<()> {
    if periodicity_ms == 0 || periodicity_ms % monitor_tick_ms != 0 {
        return Err(ConfluoError::ManagementError(format!(
            "periodicity {periodicity_ms}ms must be a positive multiple of the monitor tick ({monitor_tick_ms}ms)"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_on_threshold_crossing() {
        let t = Trigger::new("t1".into(), 0, 0, "agg1".into(), RelOp::Ge, Numeric::from_long(10), 10);
        assert!(t.fires(&Numeric::from_long(10)).unwrap());
        assert!(t.fires(&Numeric::from_long(32)).unwrap());
        assert!(!t.fires(&Numeric::from_long(9)).unwrap());
    }

    #[test]
    fn periodicity_must_be_multiple_of_tick() {
        assert!(validate_periodicity(10, 1).is_ok());
        assert!(validate_periodicity(0, 1).is_err());
        assert!(validate_periodicity(3, 2).is_err());
    }
}
