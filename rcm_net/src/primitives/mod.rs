//! Builtin primitive library.
//!
//! The standard set every net compiles against: constants, scalar and
//! boolean operators, comparisons, latches, timing sources, device
//! sensor/actuator access and monitoring checks.

pub mod arith;
pub mod constant;
pub mod device_io;
pub mod logic;
pub mod monitor;
pub mod timing;

pub use arith::{BinaryDouble, Compare, UnaryDouble};
pub use constant::Constant;
pub use device_io::{ActuatorWrite, ErrorCodeRead, SensorRead};
pub use logic::{BoolBinary, BoolLatch, BoolNot, EdgeDetect};
pub use monitor::{PositionCheck, WheelMonitor};
pub use timing::{CancelSense, Clock, ExceptionSense, IntervalCheck};
