//! Timing and net-state primitives.
//!
//! These expose engine state (elapsed time, cancellation, latched
//! exceptions) as ordinary dataflow values, so timeouts and cancellation
//! handling are expressed in the same graph as everything else — not as
//! asynchronous interrupts.

use rcm_common::error::{ConfigError, ExceptionKind, PrimitiveFault};
use rcm_common::value::{RtValue, ValueType};

use crate::port::{PortId, PortStore};
use crate::primitive::{CycleContext, PortSpec, Primitive};

// ─── Clock ──────────────────────────────────────────────────────────

/// Outputs the net's elapsed time [s] (cycle counter × period).
#[derive(Debug, Clone)]
pub struct Clock {
    out: PortId,
}

impl Clock {
    pub fn new(out: PortId) -> Self {
        Self { out }
    }
}

impl Primitive for Clock {
    fn type_name(&self) -> &'static str {
        "core::clock"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![],
            outputs: vec![(self.out, ValueType::Double)],
        }
    }

    fn remap_ports(&mut self, map: &mut dyn FnMut(PortId) -> PortId) {
        self.out = map(self.out);
    }

    fn update(
        &mut self,
        ports: &mut PortStore,
        cx: &CycleContext<'_>,
    ) -> Result<(), PrimitiveFault> {
        ports.set(self.type_name(), self.out, RtValue::Double(cx.elapsed_s))
    }
}

// ─── CancelSense ────────────────────────────────────────────────────

/// Exposes the net's cancellation flag as a boolean output.
///
/// Once the flag has been observed true the output stays true, so
/// downstream ramp-down logic never sees it flap.
#[derive(Debug, Clone)]
pub struct CancelSense {
    out: PortId,
    latched: bool,
}

impl CancelSense {
    pub fn new(out: PortId) -> Self {
        Self {
            out,
            latched: false,
        }
    }
}

impl Primitive for CancelSense {
    fn type_name(&self) -> &'static str {
        "core::cancel"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![],
            outputs: vec![(self.out, ValueType::Bool)],
        }
    }

    fn remap_ports(&mut self, map: &mut dyn FnMut(PortId) -> PortId) {
        self.out = map(self.out);
    }

    fn update(
        &mut self,
        ports: &mut PortStore,
        cx: &CycleContext<'_>,
    ) -> Result<(), PrimitiveFault> {
        self.latched |= cx.cancelled;
        ports.set(self.type_name(), self.out, RtValue::Bool(self.latched))
    }
}

// ─── ExceptionSense ─────────────────────────────────────────────────

/// True while an exception of the given kind is latched in this net.
///
/// The latch snapshot handed to `update` reflects the previous cycle's
/// watcher pass, so the post-fault cycle observes the fault.
#[derive(Debug, Clone)]
pub struct ExceptionSense {
    kind: ExceptionKind,
    out: PortId,
}

impl ExceptionSense {
    pub fn new(kind: ExceptionKind, out: PortId) -> Self {
        Self { kind, out }
    }
}

impl Primitive for ExceptionSense {
    fn type_name(&self) -> &'static str {
        "core::exception"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![],
            outputs: vec![(self.out, ValueType::Bool)],
        }
    }

    fn remap_ports(&mut self, map: &mut dyn FnMut(PortId) -> PortId) {
        self.out = map(self.out);
    }

    fn update(
        &mut self,
        ports: &mut PortStore,
        cx: &CycleContext<'_>,
    ) -> Result<(), PrimitiveFault> {
        let active = cx.latched.contains_kind(self.kind);
        ports.set(self.type_name(), self.out, RtValue::Bool(active))
    }
}

// ─── IntervalCheck ──────────────────────────────────────────────────

/// `out = min <= input <= max`.
#[derive(Debug, Clone)]
pub struct IntervalCheck {
    input: PortId,
    min: f64,
    max: f64,
    out: PortId,
}

impl IntervalCheck {
    pub fn new(input: PortId, min: f64, max: f64, out: PortId) -> Self {
        Self {
            input,
            min,
            max,
            out,
        }
    }
}

impl Primitive for IntervalCheck {
    fn type_name(&self) -> &'static str {
        "core::interval"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![(self.input, ValueType::Double)],
            outputs: vec![(self.out, ValueType::Bool)],
        }
    }

    fn remap_ports(&mut self, map: &mut dyn FnMut(PortId) -> PortId) {
        self.input = map(self.input);
        self.out = map(self.out);
    }

    fn check_parameters(&self) -> Result<(), ConfigError> {
        if !(self.min <= self.max) {
            return Err(ConfigError::ParameterOutOfRange {
                primitive: self.type_name(),
                parameter: "min/max",
                detail: format!("[{}, {}] is empty", self.min, self.max),
            });
        }
        Ok(())
    }

    fn update(
        &mut self,
        ports: &mut PortStore,
        _cx: &CycleContext<'_>,
    ) -> Result<(), PrimitiveFault> {
        let x = ports.double_at(self.type_name(), self.input)?;
        let inside = x >= self.min && x <= self.max;
        ports.set(self.type_name(), self.out, RtValue::Bool(inside))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ExceptionLatch;
    use rcm_common::error::{CommandId, RtException};

    fn cx<'a>(latch: &'a ExceptionLatch, cycle: u64, cancelled: bool) -> CycleContext<'a> {
        CycleContext {
            cycle,
            elapsed_s: cycle as f64 * 0.001,
            period_s: 0.001,
            cancelled,
            latched: latch,
        }
    }

    #[test]
    fn clock_tracks_elapsed() {
        let mut store = PortStore::from_types(&[ValueType::Double]);
        let mut p = Clock::new(PortId(0));
        let latch = ExceptionLatch::default();
        p.update(&mut store, &cx(&latch, 5, false)).unwrap();
        assert_eq!(store.double_at("t", PortId(0)).unwrap(), 0.005);
    }

    #[test]
    fn cancel_sense_latches() {
        let mut store = PortStore::from_types(&[ValueType::Bool]);
        let mut p = CancelSense::new(PortId(0));
        let latch = ExceptionLatch::default();

        p.update(&mut store, &cx(&latch, 1, false)).unwrap();
        assert_eq!(store.bool_at("t", PortId(0)).unwrap(), false);

        p.update(&mut store, &cx(&latch, 2, true)).unwrap();
        assert_eq!(store.bool_at("t", PortId(0)).unwrap(), true);

        // Flag cleared in context; output holds.
        p.update(&mut store, &cx(&latch, 3, false)).unwrap();
        assert_eq!(store.bool_at("t", PortId(0)).unwrap(), true);
    }

    #[test]
    fn exception_sense_reads_latch() {
        let mut store = PortStore::from_types(&[ValueType::Bool]);
        let mut p = ExceptionSense::new(ExceptionKind::TIMEOUT, PortId(0));
        let mut latch = ExceptionLatch::default();

        p.update(&mut store, &cx(&latch, 1, false)).unwrap();
        assert_eq!(store.bool_at("t", PortId(0)).unwrap(), false);

        latch.insert(RtException::new(ExceptionKind::TIMEOUT, CommandId(1)));
        p.update(&mut store, &cx(&latch, 2, false)).unwrap();
        assert_eq!(store.bool_at("t", PortId(0)).unwrap(), true);
    }

    #[test]
    fn interval_check_bounds() {
        let mut store = PortStore::from_types(&[ValueType::Double, ValueType::Bool]);
        let mut p = IntervalCheck::new(PortId(0), -1.0, 1.0, PortId(1));
        let latch = ExceptionLatch::default();

        store.set("t", PortId(0), RtValue::Double(0.5)).unwrap();
        p.update(&mut store, &cx(&latch, 1, false)).unwrap();
        assert_eq!(store.bool_at("t", PortId(1)).unwrap(), true);

        store.set("t", PortId(0), RtValue::Double(1.5)).unwrap();
        p.update(&mut store, &cx(&latch, 2, false)).unwrap();
        assert_eq!(store.bool_at("t", PortId(1)).unwrap(), false);
    }

    #[test]
    fn empty_interval_rejected() {
        let p = IntervalCheck::new(PortId(0), 2.0, 1.0, PortId(1));
        assert!(matches!(
            p.check_parameters(),
            Err(ConfigError::ParameterOutOfRange { .. })
        ));
    }
}
