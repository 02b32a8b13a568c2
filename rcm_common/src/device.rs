//! Device capability contract.
//!
//! A device is a named, long-lived handle to physical or simulated
//! hardware, possibly shared by several concurrently running nets. The
//! engine core depends only on this trait, never on transport details
//! (fieldbus drivers live behind it).
//!
//! Capability checks are tag-based: a driver declares the interface tags
//! it satisfies at registration time and the core queries by tag. Sensor
//! state is pulled with one `sample()` call per net per cycle and cached,
//! so every consuming primitive in that net observes the same snapshot.

use std::fmt;

/// Maximum sensor channels in one device sample.
pub const MAX_SAMPLE_CHANNELS: usize = 16;

/// Well-known capability interface tags.
pub mod interfaces {
    /// Device exposes a `position` sample channel.
    pub const POSITION_SENSOR: &str = "position-sensor";
    /// Device exposes a `velocity` sample channel.
    pub const VELOCITY_SENSOR: &str = "velocity-sensor";
    /// Device reports an error code in its sample.
    pub const ERROR_CODE: &str = "error-code";
    /// Device accepts actuator commands.
    pub const ACTUATOR: &str = "actuator";
}

/// Well-known sample/command channel names.
pub mod channels {
    pub const POSITION: &str = "position";
    pub const VELOCITY: &str = "velocity";
    pub const TARGET: &str = "target";
}

// ─── DeviceSample ───────────────────────────────────────────────────

/// One per-cycle snapshot of a device's sensor state.
///
/// Fixed-capacity, copied by value into the net's device cache; reading
/// a sample never allocates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSample {
    channels: heapless::Vec<(&'static str, f64), MAX_SAMPLE_CHANNELS>,
    /// Driver error code; 0 = no error. Data, not control flow.
    pub error_code: i32,
}

impl DeviceSample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel. Returns `false` (and drops the channel) if the
    /// sample is full.
    pub fn push_channel(&mut self, name: &'static str, value: f64) -> bool {
        self.channels.push((name, value)).is_ok()
    }

    /// Look up a channel by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.channels
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

// ─── DeviceCommand ──────────────────────────────────────────────────

/// An actuator write issued by a primitive during its update phase.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    SetDouble { channel: &'static str, value: f64 },
    SetBool { channel: &'static str, value: bool },
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetDouble { channel, value } => write!(f, "{channel}={value}"),
            Self::SetBool { channel, value } => write!(f, "{channel}={value}"),
        }
    }
}

// ─── Device trait ───────────────────────────────────────────────────

/// Capability contract implemented by device drivers.
///
/// # Lifecycle
///
/// Drivers register an `Arc<dyn Device>` in the device registry when they
/// become available and unregister it when they become unavailable. Nets
/// hold only `Weak` references; a net whose device vanished faults
/// cleanly on its next cycle instead of dereferencing a dangling handle.
///
/// # Timing contracts
///
/// | Operation  | RT constraint                                     |
/// |------------|---------------------------------------------------|
/// | `sample()` | called once per net per cycle; must not block     |
/// | `apply()`  | called from `update` phases; must not block       |
///
/// Implementations synchronize their own internal state; the core calls
/// both methods from the executor thread.
pub trait Device: Send + Sync {
    /// Unique device name used for registry lookup.
    fn name(&self) -> &str;

    /// Capability interface tags this device satisfies.
    fn interfaces(&self) -> &[&'static str];

    /// Read all sensor channels and the error code in one consistent
    /// snapshot.
    fn sample(&self) -> DeviceSample;

    /// Apply an actuator command. Devices without the `actuator`
    /// capability may ignore this.
    fn apply(&self, _cmd: &DeviceCommand) {}
}

/// Tag-membership check against a device's self-declared interfaces.
pub fn declares_interface(device: &dyn Device, interface: &str) -> bool {
    device.interfaces().iter().any(|i| *i == interface)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;

    impl Device for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn interfaces(&self) -> &[&'static str] {
            &[interfaces::POSITION_SENSOR, interfaces::ERROR_CODE]
        }

        fn sample(&self) -> DeviceSample {
            let mut s = DeviceSample::new();
            s.push_channel(channels::POSITION, 4.25);
            s.error_code = 0;
            s
        }
    }

    #[test]
    fn sample_lookup() {
        let s = Probe.sample();
        assert_eq!(s.get(channels::POSITION), Some(4.25));
        assert_eq!(s.get(channels::VELOCITY), None);
        assert_eq!(s.error_code, 0);
        assert_eq!(s.channel_count(), 1);
    }

    #[test]
    fn sample_capacity_bounded() {
        let mut s = DeviceSample::new();
        for _ in 0..MAX_SAMPLE_CHANNELS {
            assert!(s.push_channel("c", 0.0));
        }
        assert!(!s.push_channel("overflow", 1.0));
        assert_eq!(s.channel_count(), MAX_SAMPLE_CHANNELS);
    }

    #[test]
    fn interface_declaration() {
        let p = Probe;
        assert!(declares_interface(&p, interfaces::POSITION_SENSOR));
        assert!(!declares_interface(&p, interfaces::ACTUATOR));
    }
}
