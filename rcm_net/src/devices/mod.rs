//! Simulation devices for development and tests.
//!
//! Hardware drivers live outside the core; this module provides the
//! software-emulated devices used by the demo runner and the test
//! suites.

pub mod sim;

pub use sim::SimulatedWheel;
