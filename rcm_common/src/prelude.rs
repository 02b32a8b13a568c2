//! Common re-exports.

pub use crate::config::EngineConfig;
pub use crate::device::{Device, DeviceCommand, DeviceSample};
pub use crate::error::{
    CommandId, ConfigError, ExceptionKind, MappingError, PrimitiveFault, RtException,
    UnhandledExceptions,
};
pub use crate::math::{Frame, Rotation, Twist, Vector3};
pub use crate::ops::{BinaryOp, BoolOp, CmpOp, UnaryOp};
pub use crate::value::{EnumValue, RtValue, ValueType};
