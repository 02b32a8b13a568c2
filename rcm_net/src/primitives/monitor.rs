//! Monitoring primitives: axis feedback and bound checks.

use rcm_common::device::{DeviceSample, channels, interfaces};
use rcm_common::error::{ConfigError, PrimitiveFault};
use rcm_common::value::{RtValue, ValueType};

use crate::port::{PortId, PortStore};
use crate::primitive::{CycleContext, DeviceDependency, PortSpec, Primitive};

// ─── WheelMonitor ───────────────────────────────────────────────────

/// Exposes a wheel's position and velocity from one consistent device
/// sample as two double outputs.
pub struct WheelMonitor {
    dep: DeviceDependency,
    position: f64,
    velocity: f64,
    position_out: PortId,
    velocity_out: PortId,
}

impl WheelMonitor {
    pub fn new(device: impl Into<String>, position_out: PortId, velocity_out: PortId) -> Self {
        Self {
            dep: DeviceDependency::new(
                device,
                &[interfaces::POSITION_SENSOR, interfaces::VELOCITY_SENSOR],
            ),
            position: 0.0,
            velocity: 0.0,
            position_out,
            velocity_out,
        }
    }
}

impl Primitive for WheelMonitor {
    fn type_name(&self) -> &'static str {
        "core::wheel_monitor"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![],
            outputs: vec![
                (self.position_out, ValueType::Double),
                (self.velocity_out, ValueType::Double),
            ],
        }
    }

    fn remap_ports(&mut self, map: &mut dyn FnMut(PortId) -> PortId) {
        self.position_out = map(self.position_out);
        self.velocity_out = map(self.velocity_out);
    }

    fn device_dependency(&self) -> Option<&DeviceDependency> {
        Some(&self.dep)
    }

    fn needs_sensor(&self) -> bool {
        true
    }

    fn read_sensor(&mut self, sample: &DeviceSample) {
        if let Some(p) = sample.get(channels::POSITION) {
            self.position = p;
        }
        if let Some(v) = sample.get(channels::VELOCITY) {
            self.velocity = v;
        }
    }

    fn update(
        &mut self,
        ports: &mut PortStore,
        _cx: &CycleContext<'_>,
    ) -> Result<(), PrimitiveFault> {
        ports.set(
            self.type_name(),
            self.position_out,
            RtValue::Double(self.position),
        )?;
        ports.set(
            self.type_name(),
            self.velocity_out,
            RtValue::Double(self.velocity),
        )
    }
}

// ─── PositionCheck ──────────────────────────────────────────────────

/// Boolean error output: true when |actual − reference| exceeds the
/// bound.
///
/// A detected violation is a dataflow value, not control flow; attach a
/// watcher to the output to turn it into a real-time exception.
#[derive(Debug, Clone)]
pub struct PositionCheck {
    actual: PortId,
    reference: PortId,
    bound: f64,
    out: PortId,
}

impl PositionCheck {
    pub fn new(actual: PortId, reference: PortId, bound: f64, out: PortId) -> Self {
        Self {
            actual,
            reference,
            bound,
            out,
        }
    }
}

impl Primitive for PositionCheck {
    fn type_name(&self) -> &'static str {
        "core::position_check"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![
                (self.actual, ValueType::Double),
                (self.reference, ValueType::Double),
            ],
            outputs: vec![(self.out, ValueType::Bool)],
        }
    }

    fn remap_ports(&mut self, map: &mut dyn FnMut(PortId) -> PortId) {
        self.actual = map(self.actual);
        self.reference = map(self.reference);
        self.out = map(self.out);
    }

    fn check_parameters(&self) -> Result<(), ConfigError> {
        if !self.bound.is_finite() || self.bound <= 0.0 {
            return Err(ConfigError::ParameterOutOfRange {
                primitive: self.type_name(),
                parameter: "bound",
                detail: format!("{} (must be finite and > 0)", self.bound),
            });
        }
        Ok(())
    }

    fn update(
        &mut self,
        ports: &mut PortStore,
        _cx: &CycleContext<'_>,
    ) -> Result<(), PrimitiveFault> {
        let actual = ports.double_at(self.type_name(), self.actual)?;
        let reference = ports.double_at(self.type_name(), self.reference)?;
        let exceeded = (actual - reference).abs() > self.bound;
        ports.set(self.type_name(), self.out, RtValue::Bool(exceeded))
    }
}
