//! Error taxonomy.
//!
//! Three distinct layers, never mixed:
//!
//! - [`ConfigError`] and [`MappingError`] are compile-time failures,
//!   reported synchronously before a net ever runs.
//! - [`RtException`] is a real-time fault value: a plain `{kind, command}`
//!   tag compared by value, latched by the engine with no allocation and
//!   no stack capture on the hot path.
//! - [`PrimitiveFault`] marks a programming fault inside one primitive;
//!   it aborts only the owning net.
//!
//! Device error codes are data (an `i32` in the device sample), not errors.

use std::fmt;

use thiserror::Error;

use crate::value::ValueType;

// ─── Identifiers ────────────────────────────────────────────────────

/// Unique id of one application-level command. Part of real-time
/// exception identity: the same kind raised by two different commands is
/// two distinct faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

/// Kind tag of a real-time exception.
///
/// Kinds below [`ExceptionKind::APP_BASE`] are reserved for the core;
/// applications allocate their own kinds at or above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExceptionKind(pub u16);

impl ExceptionKind {
    /// A device bound by the net was removed from the registry.
    pub const DEVICE_UNAVAILABLE: Self = Self(1);
    /// A position-check primitive reported its bound exceeded.
    pub const POSITION_BOUND: Self = Self(2);
    /// An elapsed-time guard fired.
    pub const TIMEOUT: Self = Self(3);
    /// A device reported a nonzero error code.
    pub const DEVICE_ERROR: Self = Self(4);
    /// First kind value available to applications.
    pub const APP_BASE: Self = Self(64);
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DEVICE_UNAVAILABLE => f.write_str("device-unavailable"),
            Self::POSITION_BOUND => f.write_str("position-bound"),
            Self::TIMEOUT => f.write_str("timeout"),
            Self::DEVICE_ERROR => f.write_str("device-error"),
            Self(k) => write!(f, "kind#{k}"),
        }
    }
}

// ─── Real-time exception value ──────────────────────────────────────

/// A latched real-time fault. Compared by value; repeated raising of the
/// same `{kind, command}` pair coalesces into one logical fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RtException {
    pub kind: ExceptionKind,
    pub command: CommandId,
}

impl RtException {
    pub const fn new(kind: ExceptionKind, command: CommandId) -> Self {
        Self { kind, command }
    }
}

impl fmt::Display for RtException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.command)
    }
}

// ─── Compile-time errors ────────────────────────────────────────────

/// Configuration error: detected while building a net, before the RT
/// loop. Fatal to the compile step; never occurs mid-cycle.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// No device registered under this name.
    #[error("device not found: '{0}'")]
    DeviceNotFound(String),

    /// The named device does not implement a required capability.
    #[error("device '{device}' does not implement interface '{interface}'")]
    MissingCapability { device: String, interface: String },

    /// A primitive parameter is out of its valid range.
    #[error("primitive '{primitive}': parameter '{parameter}' out of range: {detail}")]
    ParameterOutOfRange {
        primitive: &'static str,
        parameter: &'static str,
        detail: String,
    },

    /// A registry entry with this name already exists.
    #[error("duplicate registration: '{0}'")]
    DuplicateName(String),

    /// File I/O error while loading configuration.
    #[error("config I/O error: {0}")]
    Io(String),

    /// TOML parse error.
    #[error("config parse error: {0}")]
    Parse(String),

    /// Semantic validation failure.
    #[error("config validation: {0}")]
    Validation(String),
}

/// Mapping error: the command compiler could not lower a value graph to
/// primitives. Fatal to compilation.
#[derive(Debug, Error)]
pub enum MappingError {
    /// No fragment factory registered for a value-node kind.
    #[error("no mapper registered for value kind '{0}'")]
    NoMapper(String),

    /// Fragment composition produced inconsistent port types.
    #[error("port type mismatch in {context}: expected {expected}, found {found}")]
    PortType {
        context: &'static str,
        expected: ValueType,
        found: ValueType,
    },

    /// A port would have two writers.
    #[error("port {port} already has a writer (in {context})")]
    MultipleWriters { context: &'static str, port: u32 },

    /// A port id referenced a slot outside the builder.
    #[error("port {port} out of range (in {context})")]
    PortOutOfRange { context: &'static str, port: u32 },

    /// Wrong number of operands for a value node or primitive factory.
    #[error("arity mismatch in {context}: expected {expected}, found {found}")]
    Arity {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    /// No primitive factory registered under this type name.
    #[error("unknown primitive type '{0}'")]
    UnknownPrimitive(String),

    /// A required factory parameter is missing or has the wrong type.
    #[error("primitive '{primitive}': bad parameter '{parameter}'")]
    Parameter {
        primitive: String,
        parameter: &'static str,
    },

    /// The finished net contains a dependency cycle.
    #[error("dependency cycle involving primitive '{0}'")]
    DependencyCycle(String),

    /// A configuration error surfaced during mapping (device lookup,
    /// parameter checks).
    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ─── Runtime fault values ───────────────────────────────────────────

/// Programming fault inside a primitive's `update`. Terminates the owning
/// net with a fatal status; other nets are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrimitiveFault {
    /// A port held a value of an unexpected type.
    #[error("primitive '{primitive}': port {port} held {found}, expected {expected}")]
    PortValueType {
        primitive: &'static str,
        port: u32,
        expected: ValueType,
        found: ValueType,
    },

    /// Internal invariant violated.
    #[error("primitive '{primitive}': {detail}")]
    Internal {
        primitive: &'static str,
        detail: &'static str,
    },
}

/// Aggregate failure surfaced to the command's caller when a net faults
/// with one or more real-time exceptions no handler consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnhandledExceptions {
    pub exceptions: Vec<RtException>,
}

impl std::error::Error for UnhandledExceptions {}

impl fmt::Display for UnhandledExceptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} unhandled real-time exception(s):", self.exceptions.len())?;
        for e in &self.exceptions {
            write!(f, " [{e}]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_value_equality() {
        let a = RtException::new(ExceptionKind::TIMEOUT, CommandId(1));
        let b = RtException::new(ExceptionKind::TIMEOUT, CommandId(1));
        let c = RtException::new(ExceptionKind::TIMEOUT, CommandId(2));
        let d = RtException::new(ExceptionKind::POSITION_BOUND, CommandId(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn exception_kind_display() {
        assert_eq!(ExceptionKind::TIMEOUT.to_string(), "timeout");
        assert_eq!(ExceptionKind(99).to_string(), "kind#99");
    }

    #[test]
    fn config_error_display() {
        let e = ConfigError::MissingCapability {
            device: "wheel".into(),
            interface: "position-sensor".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("wheel"));
        assert!(msg.contains("position-sensor"));
    }

    #[test]
    fn aggregate_display_lists_all() {
        let agg = UnhandledExceptions {
            exceptions: vec![
                RtException::new(ExceptionKind::TIMEOUT, CommandId(3)),
                RtException::new(ExceptionKind::POSITION_BOUND, CommandId(3)),
            ],
        };
        let msg = agg.to_string();
        assert!(msg.starts_with("2 unhandled"));
        assert!(msg.contains("timeout"));
        assert!(msg.contains("position-bound"));
    }

    #[test]
    fn mapping_error_from_config() {
        let m: MappingError = ConfigError::DeviceNotFound("x".into()).into();
        assert!(matches!(m, MappingError::Config(_)));
    }
}
