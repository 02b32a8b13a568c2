//! Boolean primitives: combinators, latch, edge detection.

use rcm_common::error::PrimitiveFault;
use rcm_common::ops::BoolOp;
use rcm_common::value::{RtValue, ValueType};

use crate::port::{PortId, PortStore};
use crate::primitive::{CycleContext, PortSpec, Primitive};

// ─── BoolBinary ─────────────────────────────────────────────────────

/// `out = a <op> b` on booleans.
#[derive(Debug, Clone)]
pub struct BoolBinary {
    op: BoolOp,
    a: PortId,
    b: PortId,
    out: PortId,
}

impl BoolBinary {
    pub fn new(op: BoolOp, a: PortId, b: PortId, out: PortId) -> Self {
        Self { op, a, b, out }
    }
}

impl Primitive for BoolBinary {
    fn type_name(&self) -> &'static str {
        "core::bool"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![(self.a, ValueType::Bool), (self.b, ValueType::Bool)],
            outputs: vec![(self.out, ValueType::Bool)],
        }
    }

    fn remap_ports(&mut self, map: &mut dyn FnMut(PortId) -> PortId) {
        self.a = map(self.a);
        self.b = map(self.b);
        self.out = map(self.out);
    }

    fn update(
        &mut self,
        ports: &mut PortStore,
        _cx: &CycleContext<'_>,
    ) -> Result<(), PrimitiveFault> {
        let a = ports.bool_at(self.type_name(), self.a)?;
        let b = ports.bool_at(self.type_name(), self.b)?;
        ports.set(
            self.type_name(),
            self.out,
            RtValue::Bool(self.op.apply(a, b)),
        )
    }
}

// ─── BoolNot ────────────────────────────────────────────────────────

/// `out = !input`.
#[derive(Debug, Clone)]
pub struct BoolNot {
    input: PortId,
    out: PortId,
}

impl BoolNot {
    pub fn new(input: PortId, out: PortId) -> Self {
        Self { input, out }
    }
}

impl Primitive for BoolNot {
    fn type_name(&self) -> &'static str {
        "core::not"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![(self.input, ValueType::Bool)],
            outputs: vec![(self.out, ValueType::Bool)],
        }
    }

    fn remap_ports(&mut self, map: &mut dyn FnMut(PortId) -> PortId) {
        self.input = map(self.input);
        self.out = map(self.out);
    }

    fn update(
        &mut self,
        ports: &mut PortStore,
        _cx: &CycleContext<'_>,
    ) -> Result<(), PrimitiveFault> {
        let x = ports.bool_at(self.type_name(), self.input)?;
        ports.set(self.type_name(), self.out, RtValue::Bool(!x))
    }
}

// ─── BoolLatch ──────────────────────────────────────────────────────

/// Once the input was true, the output stays true for the life of the
/// net.
#[derive(Debug, Clone)]
pub struct BoolLatch {
    input: PortId,
    out: PortId,
    state: bool,
}

impl BoolLatch {
    pub fn new(input: PortId, out: PortId) -> Self {
        Self {
            input,
            out,
            state: false,
        }
    }
}

impl Primitive for BoolLatch {
    fn type_name(&self) -> &'static str {
        "core::latch"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![(self.input, ValueType::Bool)],
            outputs: vec![(self.out, ValueType::Bool)],
        }
    }

    fn remap_ports(&mut self, map: &mut dyn FnMut(PortId) -> PortId) {
        self.input = map(self.input);
        self.out = map(self.out);
    }

    fn update(
        &mut self,
        ports: &mut PortStore,
        _cx: &CycleContext<'_>,
    ) -> Result<(), PrimitiveFault> {
        self.state |= ports.bool_at(self.type_name(), self.input)?;
        ports.set(self.type_name(), self.out, RtValue::Bool(self.state))
    }
}

// ─── EdgeDetect ─────────────────────────────────────────────────────

/// True for exactly the cycles where the input rises false → true.
#[derive(Debug, Clone)]
pub struct EdgeDetect {
    input: PortId,
    out: PortId,
    prev: bool,
}

impl EdgeDetect {
    pub fn new(input: PortId, out: PortId) -> Self {
        Self {
            input,
            out,
            prev: false,
        }
    }
}

impl Primitive for EdgeDetect {
    fn type_name(&self) -> &'static str {
        "core::edge"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![(self.input, ValueType::Bool)],
            outputs: vec![(self.out, ValueType::Bool)],
        }
    }

    fn remap_ports(&mut self, map: &mut dyn FnMut(PortId) -> PortId) {
        self.input = map(self.input);
        self.out = map(self.out);
    }

    fn update(
        &mut self,
        ports: &mut PortStore,
        _cx: &CycleContext<'_>,
    ) -> Result<(), PrimitiveFault> {
        let now = ports.bool_at(self.type_name(), self.input)?;
        let rising = now && !self.prev;
        self.prev = now;
        ports.set(self.type_name(), self.out, RtValue::Bool(rising))
    }
}
