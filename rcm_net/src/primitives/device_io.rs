//! Device access primitives: sensor reads, error codes, actuator writes.

use std::sync::Weak;

use rcm_common::device::{Device, DeviceCommand, DeviceSample, interfaces};
use rcm_common::error::PrimitiveFault;
use rcm_common::value::{RtValue, ValueType};

use crate::port::{PortId, PortStore};
use crate::primitive::{CycleContext, DeviceDependency, PortSpec, Primitive};

// ─── SensorRead ─────────────────────────────────────────────────────

/// Reads one named channel from the net's cached device sample and
/// exposes it as a double output.
///
/// If the channel is missing from a sample the last read value is held.
pub struct SensorRead {
    dep: DeviceDependency,
    channel: &'static str,
    cached: f64,
    out: PortId,
}

impl SensorRead {
    pub fn new(
        device: impl Into<String>,
        interface: &'static str,
        channel: &'static str,
        out: PortId,
    ) -> Self {
        Self {
            dep: DeviceDependency::new(device, &[interface]),
            channel,
            cached: 0.0,
            out,
        }
    }
}

impl Primitive for SensorRead {
    fn type_name(&self) -> &'static str {
        "core::sensor"
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

    fn device_dependency(&self) -> Option<&DeviceDependency> {
        Some(&self.dep)
    }

    fn needs_sensor(&self) -> bool {
        true
    }

    fn read_sensor(&mut self, sample: &DeviceSample) {
        if let Some(v) = sample.get(self.channel) {
            self.cached = v;
        }
    }

    fn update(
        &mut self,
        ports: &mut PortStore,
        _cx: &CycleContext<'_>,
    ) -> Result<(), PrimitiveFault> {
        ports.set(self.type_name(), self.out, RtValue::Double(self.cached))
    }
}

// ─── ErrorCodeRead ──────────────────────────────────────────────────

/// Exposes the device's per-cycle error code as an integer output.
///
/// The code is data: downstream conditions decide whether a nonzero
/// value is a fault.
pub struct ErrorCodeRead {
    dep: DeviceDependency,
    cached: i32,
    out: PortId,
}

impl ErrorCodeRead {
    pub fn new(device: impl Into<String>, out: PortId) -> Self {
        Self {
            dep: DeviceDependency::new(device, &[interfaces::ERROR_CODE]),
            cached: 0,
            out,
        }
    }
}

impl Primitive for ErrorCodeRead {
    fn type_name(&self) -> &'static str {
        "core::error_code"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![],
            outputs: vec![(self.out, ValueType::Int)],
        }
    }

    fn remap_ports(&mut self, map: &mut dyn FnMut(PortId) -> PortId) {
        self.out = map(self.out);
    }

    fn device_dependency(&self) -> Option<&DeviceDependency> {
        Some(&self.dep)
    }

    fn needs_sensor(&self) -> bool {
        true
    }

    fn read_sensor(&mut self, sample: &DeviceSample) {
        self.cached = sample.error_code;
    }

    fn update(
        &mut self,
        ports: &mut PortStore,
        _cx: &CycleContext<'_>,
    ) -> Result<(), PrimitiveFault> {
        ports.set(self.type_name(), self.out, RtValue::Int(self.cached as i64))
    }
}

// ─── ActuatorWrite ──────────────────────────────────────────────────

/// Commands a device channel from a double input, gated on a boolean
/// enable input.
///
/// The write happens during `update`, after the enable and value inputs
/// for this cycle are final. If the device vanished mid-cycle the write
/// is skipped; the net's device sampling latches the unavailability
/// fault on the next cycle.
pub struct ActuatorWrite {
    dep: DeviceDependency,
    device: Option<Weak<dyn Device>>,
    channel: &'static str,
    enable: PortId,
    input: PortId,
}

impl ActuatorWrite {
    pub fn new(
        device: impl Into<String>,
        channel: &'static str,
        enable: PortId,
        input: PortId,
    ) -> Self {
        Self {
            dep: DeviceDependency::new(device, &[interfaces::ACTUATOR]),
            device: None,
            channel,
            enable,
            input,
        }
    }
}

impl Primitive for ActuatorWrite {
    fn type_name(&self) -> &'static str {
        "core::actuator"
    }

    fn ports(&self) -> PortSpec {
        PortSpec {
            inputs: vec![
                (self.enable, ValueType::Bool),
                (self.input, ValueType::Double),
            ],
            outputs: vec![],
        }
    }

    fn remap_ports(&mut self, map: &mut dyn FnMut(PortId) -> PortId) {
        self.enable = map(self.enable);
        self.input = map(self.input);
    }

    fn device_dependency(&self) -> Option<&DeviceDependency> {
        Some(&self.dep)
    }

    fn bind_device(&mut self, device: Weak<dyn Device>) {
        self.device = Some(device);
    }

    fn update(
        &mut self,
        ports: &mut PortStore,
        _cx: &CycleContext<'_>,
    ) -> Result<(), PrimitiveFault> {
        let enabled = ports.bool_at(self.type_name(), self.enable)?;
        if !enabled {
            return Ok(());
        }
        let value = ports.double_at(self.type_name(), self.input)?;
        if let Some(dev) = self.device.as_ref().and_then(Weak::upgrade) {
            dev.apply(&DeviceCommand::SetDouble {
                channel: self.channel,
                value,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ExceptionLatch;
    use rcm_common::device::channels;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        applied: Mutex<Vec<DeviceCommand>>,
    }

    impl Device for Recorder {
        fn name(&self) -> &str {
            "rec"
        }

        fn interfaces(&self) -> &[&'static str] {
            &[interfaces::ACTUATOR]
        }

        fn sample(&self) -> DeviceSample {
            DeviceSample::new()
        }

        fn apply(&self, cmd: &DeviceCommand) {
            self.applied.lock().expect("lock poisoned").push(cmd.clone());
        }
    }

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
    fn sensor_read_caches_channel() {
        let mut store = PortStore::from_types(&[ValueType::Double]);
        let mut p = SensorRead::new("wheel", interfaces::POSITION_SENSOR, channels::POSITION, PortId(0));
        let latch = ExceptionLatch::default();

        let mut sample = DeviceSample::new();
        sample.push_channel(channels::POSITION, 1.25);
        p.read_sensor(&sample);
        p.update(&mut store, &cx(&latch)).unwrap();
        assert_eq!(store.double_at("t", PortId(0)).unwrap(), 1.25);

        // Channel absent: last value held.
        p.read_sensor(&DeviceSample::new());
        p.update(&mut store, &cx(&latch)).unwrap();
        assert_eq!(store.double_at("t", PortId(0)).unwrap(), 1.25);
    }

    #[test]
    fn error_code_surfaced_as_data() {
        let mut store = PortStore::from_types(&[ValueType::Int]);
        let mut p = ErrorCodeRead::new("wheel", PortId(0));
        let latch = ExceptionLatch::default();

        let mut sample = DeviceSample::new();
        sample.error_code = 17;
        p.read_sensor(&sample);
        p.update(&mut store, &cx(&latch)).unwrap();
        assert_eq!(store.int_at("t", PortId(0)).unwrap(), 17);
    }

    #[test]
    fn actuator_write_gated_on_enable() {
        let dev = Arc::new(Recorder {
            applied: Mutex::new(Vec::new()),
        });
        let mut store = PortStore::from_types(&[ValueType::Bool, ValueType::Double]);
        let mut p = ActuatorWrite::new("rec", channels::TARGET, PortId(0), PortId(1));
        let weak_rec: Weak<Recorder> = Arc::downgrade(&dev);
        let weak: Weak<dyn Device> = weak_rec;
        p.bind_device(weak);
        let latch = ExceptionLatch::default();

        store.set("t", PortId(1), RtValue::Double(0.5)).unwrap();
        p.update(&mut store, &cx(&latch)).unwrap();
        assert!(dev.applied.lock().unwrap().is_empty());

        store.set("t", PortId(0), RtValue::Bool(true)).unwrap();
        p.update(&mut store, &cx(&latch)).unwrap();
        assert_eq!(
            dev.applied.lock().unwrap().as_slice(),
            &[DeviceCommand::SetDouble {
                channel: channels::TARGET,
                value: 0.5
            }]
        );
    }

    #[test]
    fn actuator_write_skips_vanished_device() {
        let dev = Arc::new(Recorder {
            applied: Mutex::new(Vec::new()),
        });
        let mut store = PortStore::from_types(&[ValueType::Bool, ValueType::Double]);
        let mut p = ActuatorWrite::new("rec", channels::TARGET, PortId(0), PortId(1));
        let weak_rec: Weak<Recorder> = Arc::downgrade(&dev);
        let weak: Weak<dyn Device> = weak_rec;
        p.bind_device(weak);
        drop(dev);
        let latch = ExceptionLatch::default();

        store.set("t", PortId(0), RtValue::Bool(true)).unwrap();
        // No panic, no dangling access.
        p.update(&mut store, &cx(&latch)).unwrap();
    }
}
