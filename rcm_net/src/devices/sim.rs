//! Simulated wheel device.
//!
//! Software-emulated single-axis device: integrates position from a
//! commanded velocity, exposes position/velocity sensor channels and an
//! injectable error code. No physical hardware required.

use std::sync::Mutex;

use rcm_common::device::{Device, DeviceCommand, DeviceSample, channels, interfaces};

#[derive(Debug, Clone, Copy, Default)]
struct WheelState {
    position: f64,
    velocity: f64,
    error_code: i32,
}

/// A simulated wheel: velocity commands take effect immediately,
/// position integrates on [`SimulatedWheel::tick`].
pub struct SimulatedWheel {
    name: String,
    state: Mutex<WheelState>,
}

impl SimulatedWheel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(WheelState::default()),
        }
    }

    /// Force the sensor state (test setup).
    pub fn set_state(&self, position: f64, velocity: f64) {
        let mut state = self.state.lock().expect("wheel state lock poisoned");
        state.position = position;
        state.velocity = velocity;
    }

    /// Inject a driver error code (0 clears).
    pub fn set_error(&self, code: i32) {
        self.state.lock().expect("wheel state lock poisoned").error_code = code;
    }

    /// Advance the simulation by `dt` seconds.
    pub fn tick(&self, dt: f64) {
        let mut state = self.state.lock().expect("wheel state lock poisoned");
        state.position += state.velocity * dt;
    }

    pub fn position(&self) -> f64 {
        self.state.lock().expect("wheel state lock poisoned").position
    }

    pub fn velocity(&self) -> f64 {
        self.state.lock().expect("wheel state lock poisoned").velocity
    }
}

impl Device for SimulatedWheel {
    fn name(&self) -> &str {
        &self.name
    }

    fn interfaces(&self) -> &[&'static str] {
        &[
            interfaces::POSITION_SENSOR,
            interfaces::VELOCITY_SENSOR,
            interfaces::ERROR_CODE,
            interfaces::ACTUATOR,
        ]
    }

    fn sample(&self) -> DeviceSample {
        let state = *self.state.lock().expect("wheel state lock poisoned");
        let mut sample = DeviceSample::new();
        sample.push_channel(channels::POSITION, state.position);
        sample.push_channel(channels::VELOCITY, state.velocity);
        sample.error_code = state.error_code;
        sample
    }

    fn apply(&self, cmd: &DeviceCommand) {
        if let DeviceCommand::SetDouble {
            channel: channels::TARGET,
            value,
        } = cmd
        {
            self.state
                .lock()
                .expect("wheel state lock poisoned")
                .velocity = *value;
        }
    }
}
