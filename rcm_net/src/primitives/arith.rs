//! Scalar arithmetic and comparison primitives.

use rcm_common::error::{ConfigError, PrimitiveFault};
use rcm_common::ops::{BinaryOp, CmpOp, UnaryOp};
use rcm_common::value::{RtValue, ValueType};

use crate::port::{PortId, PortStore};
use crate::primitive::{CycleContext, PortSpec, Primitive};

// ─── UnaryDouble ────────────────────────────────────────────────────

/// `out = op(input)` on doubles.
#[derive(Debug, Clone)]
pub struct UnaryDouble {
    op: UnaryOp,
    input: PortId,
    out: PortId,
}

impl UnaryDouble {
    pub fn new(op: UnaryOp, input: PortId, out: PortId) -> Self {
        Self { op, input, out }
    }
}

impl Primitive for UnaryDouble {
    fn type_name(&self) -> &'static str {
        "core::unary"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![(self.input, ValueType::Double)],
            outputs: vec![(self.out, ValueType::Double)],
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
        let x = ports.double_at(self.type_name(), self.input)?;
        ports.set(self.type_name(), self.out, RtValue::Double(self.op.apply(x)))
    }
}

// ─── BinaryDouble ───────────────────────────────────────────────────

/// `out = op(a, b)` on doubles.
#[derive(Debug, Clone)]
pub struct BinaryDouble {
    op: BinaryOp,
    a: PortId,
    b: PortId,
    out: PortId,
}

impl BinaryDouble {
    pub fn new(op: BinaryOp, a: PortId, b: PortId, out: PortId) -> Self {
        Self { op, a, b, out }
    }
}

impl Primitive for BinaryDouble {
    fn type_name(&self) -> &'static str {
        "core::binary"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![
                (self.a, ValueType::Double),
                (self.b, ValueType::Double),
            ],
            outputs: vec![(self.out, ValueType::Double)],
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
        let a = ports.double_at(self.type_name(), self.a)?;
        let b = ports.double_at(self.type_name(), self.b)?;
        ports.set(
            self.type_name(),
            self.out,
            RtValue::Double(self.op.apply(a, b)),
        )
    }
}

// ─── Compare ────────────────────────────────────────────────────────

/// `out = a <op> b` on doubles, boolean output. `Eq` compares within
/// `epsilon`.
#[derive(Debug, Clone)]
pub struct Compare {
    op: CmpOp,
    a: PortId,
    b: PortId,
    epsilon: f64,
    out: PortId,
}

impl Compare {
    pub fn new(op: CmpOp, a: PortId, b: PortId, epsilon: f64, out: PortId) -> Self {
        Self {
            op,
            a,
            b,
            epsilon,
            out,
        }
    }
}

impl Primitive for Compare {
    fn type_name(&self) -> &'static str {
        "core::compare"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![
                (self.a, ValueType::Double),
                (self.b, ValueType::Double),
            ],
            outputs: vec![(self.out, ValueType::Bool)],
        }
    }

    fn remap_ports(&mut self, map: &mut dyn FnMut(PortId) -> PortId) {
        self.a = map(self.a);
        self.b = map(self.b);
        self.out = map(self.out);
    }

    fn check_parameters(&self) -> Result<(), ConfigError> {
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(ConfigError::ParameterOutOfRange {
                primitive: self.type_name(),
                parameter: "epsilon",
                detail: format!("{} (must be finite and >= 0)", self.epsilon),
            });
        }
        Ok(())
    }

    fn update(
        &mut self,
        ports: &mut PortStore,
        _cx: &CycleContext<'_>,
    ) -> Result<(), PrimitiveFault> {
        let a = ports.double_at(self.type_name(), self.a)?;
        let b = ports.double_at(self.type_name(), self.b)?;
        ports.set(
            self.type_name(),
            self.out,
            RtValue::Bool(self.op.apply(a, b, self.epsilon)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ExceptionLatch;

    fn cx(latch: &ExceptionLatch) -> CycleContext<'_> {
        CycleContext {
            cycle: 1,
            elapsed_s: 0.001,
            period_s: 0.001,
            cancelled: false,
            latched: latch,
        }
    }

    #[test]
    fn binary_add() {
        let mut store = PortStore::from_types(&[
            ValueType::Double,
            ValueType::Double,
            ValueType::Double,
        ]);
        store.set("t", PortId(0), RtValue::Double(1.5)).unwrap();
        store.set("t", PortId(1), RtValue::Double(2.0)).unwrap();
        let mut p = BinaryDouble::new(BinaryOp::Add, PortId(0), PortId(1), PortId(2));
        let latch = ExceptionLatch::default();
        p.update(&mut store, &cx(&latch)).unwrap();
        assert_eq!(store.double_at("t", PortId(2)).unwrap(), 3.5);
    }

    #[test]
    fn unary_is_pure_across_cycles() {
        let mut store = PortStore::from_types(&[ValueType::Double, ValueType::Double]);
        store.set("t", PortId(0), RtValue::Double(-4.0)).unwrap();
        let mut p = UnaryDouble::new(UnaryOp::Abs, PortId(0), PortId(1));
        let latch = ExceptionLatch::default();
        p.update(&mut store, &cx(&latch)).unwrap();
        let first = store.double_at("t", PortId(1)).unwrap();
        p.update(&mut store, &cx(&latch)).unwrap();
        let second = store.double_at("t", PortId(1)).unwrap();
        assert_eq!(first, 4.0);
        assert_eq!(first, second);
    }

    #[test]
    fn compare_epsilon_validated() {
        let p = Compare::new(CmpOp::Eq, PortId(0), PortId(1), -1.0, PortId(2));
        assert!(matches!(
            p.check_parameters(),
            Err(ConfigError::ParameterOutOfRange { .. })
        ));
        let p = Compare::new(CmpOp::Gt, PortId(0), PortId(1), 0.0, PortId(2));
        assert!(p.check_parameters().is_ok());
    }
}
