//! The `Primitive` trait: one computation node in a dataflow net.
//!
//! # Lifecycle
//!
//! 1. Constructed during compilation with its port ids and parameters.
//! 2. Devices resolved and bound, then `check_parameters()` exactly once
//!    (outside the RT loop; fails fast with a configuration error).
//! 3. Per cycle, in this order:
//!    - `read_sensor()` pulls the net's cached device sample into local
//!      fields; it must not touch ports.
//!    - `update()` computes all output ports from input ports and cached
//!      sensor state; pure with respect to the current cycle's inputs.
//!      Primitives that command a device perform the actuator write here,
//!      gated on their own enable input.
//! 4. Dropped with the owning net.
//!
//! Expected faults (position-check failure, device error codes) are
//! signaled through dedicated output ports. `update` returns `Err` only
//! for programming faults, which abort the owning net.

use std::sync::Weak;

use rcm_common::device::{Device, DeviceSample};
use rcm_common::error::{ConfigError, PrimitiveFault};
use rcm_common::value::ValueType;

use crate::net::ExceptionLatch;
use crate::port::{PortId, PortStore};

/// A primitive's requirement on a named device.
#[derive(Debug, Clone)]
pub struct DeviceDependency {
    /// Registry name of the device.
    pub device: String,
    /// Capability interface tags the device must satisfy.
    pub interfaces: Vec<&'static str>,
}

impl DeviceDependency {
    pub fn new(device: impl Into<String>, interfaces: &[&'static str]) -> Self {
        Self {
            device: device.into(),
            interfaces: interfaces.to_vec(),
        }
    }
}

/// Declared ports of a primitive, queried once when it is added to a
/// builder (wiring validation) — not on the cycle path.
#[derive(Debug, Clone, Default)]
pub struct PortSpec {
    pub inputs: Vec<(PortId, ValueType)>,
    pub outputs: Vec<(PortId, ValueType)>,
}

/// Per-cycle read-only context handed to every `update` call.
#[derive(Debug)]
pub struct CycleContext<'a> {
    /// Cycle counter, 1-based: the first executed cycle observes 1.
    pub cycle: u64,
    /// Elapsed net time [s] = cycle × period.
    pub elapsed_s: f64,
    /// Configured cycle period [s].
    pub period_s: f64,
    /// Cancellation flag as observed at the start of this cycle.
    pub cancelled: bool,
    /// Exceptions latched in this net up to the previous cycle's watcher
    /// pass.
    pub latched: &'a ExceptionLatch,
}

/// One computation node in a dataflow net.
pub trait Primitive: Send {
    /// Stable type name (e.g. `"core::add"`), also the registry key.
    fn type_name(&self) -> &'static str;

    /// Declared input/output ports with their types.
    fn ports(&self) -> PortSpec;

    /// Apply a port-id remapping (used when fragments are merged).
    fn remap_ports(&mut self, map: &mut dyn FnMut(PortId) -> PortId);

    /// Device requirement, if any.
    fn device_dependency(&self) -> Option<&DeviceDependency> {
        None
    }

    /// Receive the resolved device handle before `check_parameters`.
    fn bind_device(&mut self, _device: Weak<dyn Device>) {}

    /// Validate parameters after device binding. Runs once, outside the
    /// RT loop.
    fn check_parameters(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Whether this primitive consumes the per-cycle device sample.
    fn needs_sensor(&self) -> bool {
        false
    }

    /// Pull cached device state into local fields. Must not mutate ports.
    fn read_sensor(&mut self, _sample: &DeviceSample) {}

    /// Compute output ports from input ports and cached sensor state.
    fn update(&mut self, ports: &mut PortStore, cx: &CycleContext<'_>)
    -> Result<(), PrimitiveFault>;
}

impl std::fmt::Debug for dyn Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Primitive")
            .field("type_name", &self.type_name())
            .finish_non_exhaustive()
    }
}
