//! Constant source primitive.

use rcm_common::error::PrimitiveFault;
use rcm_common::value::RtValue;

use crate::port::{PortId, PortStore};
use crate::primitive::{CycleContext, PortSpec, Primitive};

/// Writes a fixed value to its output port every cycle.
#[derive(Debug, Clone)]
pub struct Constant {
    value: RtValue,
    out: PortId,
}

impl Constant {
    pub fn new(value: RtValue, out: PortId) -> Self {
        Self { value, out }
    }
}

impl Primitive for Constant {
    fn type_name(&self) -> &'static str {
        "core::constant"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![],
            outputs: vec![(self.out, self.value.value_type())],
        }
    }

    fn remap_ports(&mut self, map: &mut dyn FnMut(PortId) -> PortId) {
        self.out = map(self.out);
    }

    fn update(
        &mut self,
        ports: &mut PortStore,
        _cx: &CycleContext<'_>,
    ) -> Result<(), PrimitiveFault> {
        ports.set(self.type_name(), self.out, self.value.clone())
    }
}
