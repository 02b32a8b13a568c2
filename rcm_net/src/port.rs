//! Ports: typed single-writer data cells.
//!
//! Ports live in an index-addressed store owned by their net. Each port
//! has exactly one writer (its owning primitive, or none for an
//! unconnected input) and any number of readers. A write overwrites the
//! cell; values are never queued. An unconnected input reads its type's
//! defined default.

use std::fmt;

use rcm_common::error::PrimitiveFault;
use rcm_common::value::{RtValue, ValueType};

/// Index of a port within one net (stable after build).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u32);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// One port cell.
#[derive(Debug, Clone)]
pub(crate) struct PortSlot {
    pub ty: ValueType,
    pub value: RtValue,
}

/// Value store for all ports of one net.
///
/// Pre-sized at build time; reads and writes are O(1) slot accesses with
/// no allocation.
#[derive(Debug, Default)]
pub struct PortStore {
    slots: Vec<PortSlot>,
}

impl PortStore {
    pub(crate) fn from_types(types: &[ValueType]) -> Self {
        Self {
            slots: types
                .iter()
                .map(|&ty| PortSlot {
                    ty,
                    value: ty.default_value(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Declared type of a port.
    pub fn port_type(&self, id: PortId) -> Option<ValueType> {
        self.slots.get(id.0 as usize).map(|s| s.ty)
    }

    /// Current value of a port.
    pub fn value(&self, id: PortId) -> Option<&RtValue> {
        self.slots.get(id.0 as usize).map(|s| &s.value)
    }

    /// Overwrite a port. The value type must match the declared type.
    pub fn set(
        &mut self,
        who: &'static str,
        id: PortId,
        value: RtValue,
    ) -> Result<(), PrimitiveFault> {
        let slot = self
            .slots
            .get_mut(id.0 as usize)
            .ok_or(PrimitiveFault::Internal {
                primitive: who,
                detail: "write to out-of-range port",
            })?;
        if value.value_type() != slot.ty {
            return Err(PrimitiveFault::PortValueType {
                primitive: who,
                port: id.0,
                expected: slot.ty,
                found: value.value_type(),
            });
        }
        slot.value = value;
        Ok(())
    }

    /// Read a boolean port.
    pub fn bool_at(&self, who: &'static str, id: PortId) -> Result<bool, PrimitiveFault> {
        match self.value(id) {
            Some(RtValue::Bool(b)) => Ok(*b),
            Some(v) => Err(PrimitiveFault::PortValueType {
                primitive: who,
                port: id.0,
                expected: ValueType::Bool,
                found: v.value_type(),
            }),
            None => Err(PrimitiveFault::Internal {
                primitive: who,
                detail: "read from out-of-range port",
            }),
        }
    }

    /// Read a double port.
    pub fn double_at(&self, who: &'static str, id: PortId) -> Result<f64, PrimitiveFault> {
        match self.value(id) {
            Some(RtValue::Double(d)) => Ok(*d),
            Some(v) => Err(PrimitiveFault::PortValueType {
                primitive: who,
                port: id.0,
                expected: ValueType::Double,
                found: v.value_type(),
            }),
            None => Err(PrimitiveFault::Internal {
                primitive: who,
                detail: "read from out-of-range port",
            }),
        }
    }

    /// Read an integer port.
    pub fn int_at(&self, who: &'static str, id: PortId) -> Result<i64, PrimitiveFault> {
        match self.value(id) {
            Some(RtValue::Int(i)) => Ok(*i),
            Some(v) => Err(PrimitiveFault::PortValueType {
                primitive: who,
                port: id.0,
                expected: ValueType::Int,
                found: v.value_type(),
            }),
            None => Err(PrimitiveFault::Internal {
                primitive: who,
                detail: "read from out-of-range port",
            }),
        }
    }
}
