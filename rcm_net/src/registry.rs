//! Process-wide registries: devices, capability interfaces, primitive
//! factories.
//!
//! All three are plain tables populated at startup (constructor
//! injection, shared behind `Arc` where several threads need them) and
//! queried at compile time. The engine core needs only "a populated
//! registry when a net is built" — no observer machinery.
//!
//! Devices have an explicit lifecycle: drivers register when available
//! and unregister when gone. Nets keep `Weak` handles, so a net whose
//! device was removed faults cleanly on its next cycle instead of
//! dereferencing a dangling device.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use tracing::info;

use rcm_common::device::{Device, declares_interface, interfaces};
use rcm_common::error::{ConfigError, ExceptionKind, MappingError};
use rcm_common::ops::{BinaryOp, BoolOp, CmpOp, UnaryOp};
use rcm_common::value::RtValue;

use crate::port::PortId;
use crate::primitive::Primitive;
use crate::primitives::{
    ActuatorWrite, BinaryDouble, BoolBinary, BoolLatch, BoolNot, CancelSense, Clock, Compare,
    Constant, EdgeDetect, ErrorCodeRead, ExceptionSense, IntervalCheck, PositionCheck, SensorRead,
    UnaryDouble, WheelMonitor,
};

// ─── DeviceRegistry ─────────────────────────────────────────────────

/// Named table of live devices.
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Arc<dyn Device>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Register a device under a unique name.
    pub fn register(&self, name: &str, device: Arc<dyn Device>) -> Result<(), ConfigError> {
        let mut devices = self.devices.write().expect("device registry lock poisoned");
        if devices.contains_key(name) {
            return Err(ConfigError::DuplicateName(name.to_string()));
        }
        info!(device = name, "device registered");
        devices.insert(name.to_string(), device);
        Ok(())
    }

    /// Remove a device (driver became unavailable). Nets holding the
    /// device fault on their next cycle once the last `Arc` is dropped.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Device>> {
        let removed = self
            .devices
            .write()
            .expect("device registry lock poisoned")
            .remove(name);
        if removed.is_some() {
            info!(device = name, "device unregistered");
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.devices
            .read()
            .expect("device registry lock poisoned")
            .contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .devices
            .read()
            .expect("device registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Resolve a device and verify it satisfies every required
    /// capability tag (directly declared or granted by a registered
    /// interface predicate). Compile-time only.
    pub fn lookup(
        &self,
        name: &str,
        required: &[&'static str],
        interfaces: &InterfaceRegistry,
    ) -> Result<Weak<dyn Device>, ConfigError> {
        let devices = self.devices.read().expect("device registry lock poisoned");
        let device = devices
            .get(name)
            .ok_or_else(|| ConfigError::DeviceNotFound(name.to_string()))?;
        for tag in required {
            if !declares_interface(device.as_ref(), tag)
                && !interfaces.satisfies(tag, device.as_ref())
            {
                return Err(ConfigError::MissingCapability {
                    device: name.to_string(),
                    interface: tag.to_string(),
                });
            }
        }
        Ok(Arc::downgrade(device))
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── InterfaceRegistry ──────────────────────────────────────────────

/// Predicate deciding whether a device satisfies a named capability.
pub type InterfacePredicate = Box<dyn Fn(&dyn Device) -> bool + Send + Sync>;

/// Table of capability predicates declared by external code, consulted
/// when a device does not directly declare a required tag.
pub struct InterfaceRegistry {
    predicates: RwLock<HashMap<String, InterfacePredicate>>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self {
            predicates: RwLock::new(HashMap::new()),
        }
    }

    /// Declare which devices satisfy the named capability.
    pub fn register(
        &self,
        name: &str,
        predicate: InterfacePredicate,
    ) -> Result<(), ConfigError> {
        let mut predicates = self
            .predicates
            .write()
            .expect("interface registry lock poisoned");
        if predicates.contains_key(name) {
            return Err(ConfigError::DuplicateName(name.to_string()));
        }
        predicates.insert(name.to_string(), predicate);
        Ok(())
    }

    /// Remove a capability declaration (extension shutdown).
    pub fn unregister(&self, name: &str) -> bool {
        self.predicates
            .write()
            .expect("interface registry lock poisoned")
            .remove(name)
            .is_some()
    }

    pub fn satisfies(&self, name: &str, device: &dyn Device) -> bool {
        self.predicates
            .read()
            .expect("interface registry lock poisoned")
            .get(name)
            .is_some_and(|predicate| predicate(device))
    }
}

impl Default for InterfaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── PrimitiveParams ────────────────────────────────────────────────

/// Parameter map handed to string-keyed primitive factories.
#[derive(Debug, Default)]
pub struct PrimitiveParams {
    values: HashMap<String, RtValue>,
    ports: HashMap<String, PortId>,
}

impl PrimitiveParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&mut self, key: &str, value: RtValue) -> &mut Self {
        self.values.insert(key.to_string(), value);
        self
    }

    pub fn set_port(&mut self, key: &str, port: PortId) -> &mut Self {
        self.ports.insert(key.to_string(), port);
        self
    }

    pub fn port(&self, primitive: &str, key: &'static str) -> Result<PortId, MappingError> {
        self.ports
            .get(key)
            .copied()
            .ok_or_else(|| MappingError::Parameter {
                primitive: primitive.to_string(),
                parameter: key,
            })
    }

    pub fn double(&self, primitive: &str, key: &'static str) -> Result<f64, MappingError> {
        match self.values.get(key) {
            Some(RtValue::Double(d)) => Ok(*d),
            _ => Err(MappingError::Parameter {
                primitive: primitive.to_string(),
                parameter: key,
            }),
        }
    }

    pub fn int(&self, primitive: &str, key: &'static str) -> Result<i64, MappingError> {
        match self.values.get(key) {
            Some(RtValue::Int(i)) => Ok(*i),
            _ => Err(MappingError::Parameter {
                primitive: primitive.to_string(),
                parameter: key,
            }),
        }
    }

    pub fn string(&self, primitive: &str, key: &'static str) -> Result<String, MappingError> {
        match self.values.get(key) {
            Some(RtValue::Str(s)) => Ok(s.to_string()),
            _ => Err(MappingError::Parameter {
                primitive: primitive.to_string(),
                parameter: key,
            }),
        }
    }

    pub fn value(&self, primitive: &str, key: &'static str) -> Result<RtValue, MappingError> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| MappingError::Parameter {
                primitive: primitive.to_string(),
                parameter: key,
            })
    }
}

// ─── PrimitiveRegistry ──────────────────────────────────────────────

/// Factory function constructing a primitive from parameters.
pub type PrimitiveFactory = fn(&PrimitiveParams) -> Result<Box<dyn Primitive>, MappingError>;

/// String-keyed primitive factory table, so primitive types can be added
/// by external extensions without recompiling the engine.
pub struct PrimitiveRegistry {
    factories: RwLock<HashMap<&'static str, PrimitiveFactory>>,
}

impl PrimitiveRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with all builtin primitive types registered.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for &(name, factory) in BUILTIN_FACTORIES {
            registry.register(name, factory);
        }
        registry
    }

    /// Register a factory.
    ///
    /// # Panics
    /// Panics if a factory with the same name is already registered.
    pub fn register(&self, name: &'static str, factory: PrimitiveFactory) {
        let mut factories = self
            .factories
            .write()
            .expect("primitive registry lock poisoned");
        if factories.contains_key(name) {
            panic!("primitive type '{name}' is already registered");
        }
        factories.insert(name, factory);
    }

    /// Remove a factory (extension shutdown).
    pub fn unregister(&self, name: &str) -> bool {
        self.factories
            .write()
            .expect("primitive registry lock poisoned")
            .remove(name)
            .is_some()
    }

    /// Construct a primitive by type name.
    pub fn create(
        &self,
        name: &str,
        params: &PrimitiveParams,
    ) -> Result<Box<dyn Primitive>, MappingError> {
        let factory = {
            let factories = self
                .factories
                .read()
                .expect("primitive registry lock poisoned");
            factories
                .get(name)
                .copied()
                .ok_or_else(|| MappingError::UnknownPrimitive(name.to_string()))?
        };
        factory(params)
    }

    /// All registered type names, sorted.
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .factories
            .read()
            .expect("primitive registry lock poisoned")
            .keys()
            .copied()
            .collect();
        names.sort_unstable();
        names
    }
}

impl Default for PrimitiveRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ─── Builtin factories ──────────────────────────────────────────────

fn intern_interface(name: &str) -> Option<&'static str> {
    match name {
        "position-sensor" => Some(interfaces::POSITION_SENSOR),
        "velocity-sensor" => Some(interfaces::VELOCITY_SENSOR),
        "error-code" => Some(interfaces::ERROR_CODE),
        "actuator" => Some(interfaces::ACTUATOR),
        _ => None,
    }
}

fn intern_channel(name: &str) -> Option<&'static str> {
    use rcm_common::device::channels;
    match name {
        "position" => Some(channels::POSITION),
        "velocity" => Some(channels::VELOCITY),
        "target" => Some(channels::TARGET),
        _ => None,
    }
}

fn binary(p: &PrimitiveParams, op: BinaryOp) -> Result<Box<dyn Primitive>, MappingError> {
    Ok(Box::new(BinaryDouble::new(
        op,
        p.port("core::binary", "a")?,
        p.port("core::binary", "b")?,
        p.port("core::binary", "out")?,
    )))
}

fn compare(p: &PrimitiveParams, op: CmpOp) -> Result<Box<dyn Primitive>, MappingError> {
    let epsilon = p.double("core::compare", "epsilon").unwrap_or(0.0);
    Ok(Box::new(Compare::new(
        op,
        p.port("core::compare", "a")?,
        p.port("core::compare", "b")?,
        epsilon,
        p.port("core::compare", "out")?,
    )))
}

fn boolean(p: &PrimitiveParams, op: BoolOp) -> Result<Box<dyn Primitive>, MappingError> {
    Ok(Box::new(BoolBinary::new(
        op,
        p.port("core::bool", "a")?,
        p.port("core::bool", "b")?,
        p.port("core::bool", "out")?,
    )))
}

fn unary(p: &PrimitiveParams, op: UnaryOp) -> Result<Box<dyn Primitive>, MappingError> {
    Ok(Box::new(UnaryDouble::new(
        op,
        p.port("core::unary", "in")?,
        p.port("core::unary", "out")?,
    )))
}

fn make_constant(p: &PrimitiveParams) -> Result<Box<dyn Primitive>, MappingError> {
    Ok(Box::new(Constant::new(
        p.value("core::constant", "value")?,
        p.port("core::constant", "out")?,
    )))
}

fn make_not(p: &PrimitiveParams) -> Result<Box<dyn Primitive>, MappingError> {
    Ok(Box::new(BoolNot::new(
        p.port("core::not", "in")?,
        p.port("core::not", "out")?,
    )))
}

fn make_latch(p: &PrimitiveParams) -> Result<Box<dyn Primitive>, MappingError> {
    Ok(Box::new(BoolLatch::new(
        p.port("core::latch", "in")?,
        p.port("core::latch", "out")?,
    )))
}

fn make_edge(p: &PrimitiveParams) -> Result<Box<dyn Primitive>, MappingError> {
    Ok(Box::new(EdgeDetect::new(
        p.port("core::edge", "in")?,
        p.port("core::edge", "out")?,
    )))
}

fn make_clock(p: &PrimitiveParams) -> Result<Box<dyn Primitive>, MappingError> {
    Ok(Box::new(Clock::new(p.port("core::clock", "out")?)))
}

fn make_cancel(p: &PrimitiveParams) -> Result<Box<dyn Primitive>, MappingError> {
    Ok(Box::new(CancelSense::new(p.port("core::cancel", "out")?)))
}

fn make_exception(p: &PrimitiveParams) -> Result<Box<dyn Primitive>, MappingError> {
    let kind = p.int("core::exception", "kind")?;
    Ok(Box::new(ExceptionSense::new(
        ExceptionKind(kind as u16),
        p.port("core::exception", "out")?,
    )))
}

fn make_interval(p: &PrimitiveParams) -> Result<Box<dyn Primitive>, MappingError> {
    Ok(Box::new(IntervalCheck::new(
        p.port("core::interval", "in")?,
        p.double("core::interval", "min")?,
        p.double("core::interval", "max")?,
        p.port("core::interval", "out")?,
    )))
}

fn make_sensor(p: &PrimitiveParams) -> Result<Box<dyn Primitive>, MappingError> {
    let name = "core::sensor";
    let interface = p.string(name, "interface")?;
    let channel = p.string(name, "channel")?;
    let interface = intern_interface(&interface).ok_or(MappingError::Parameter {
        primitive: name.to_string(),
        parameter: "interface",
    })?;
    let channel = intern_channel(&channel).ok_or(MappingError::Parameter {
        primitive: name.to_string(),
        parameter: "channel",
    })?;
    Ok(Box::new(SensorRead::new(
        p.string(name, "device")?,
        interface,
        channel,
        p.port(name, "out")?,
    )))
}

fn make_error_code(p: &PrimitiveParams) -> Result<Box<dyn Primitive>, MappingError> {
    Ok(Box::new(ErrorCodeRead::new(
        p.string("core::error_code", "device")?,
        p.port("core::error_code", "out")?,
    )))
}

fn make_actuator(p: &PrimitiveParams) -> Result<Box<dyn Primitive>, MappingError> {
    let name = "core::actuator";
    let channel = p.string(name, "channel")?;
    let channel = intern_channel(&channel).ok_or(MappingError::Parameter {
        primitive: name.to_string(),
        parameter: "channel",
    })?;
    Ok(Box::new(ActuatorWrite::new(
        p.string(name, "device")?,
        channel,
        p.port(name, "enable")?,
        p.port(name, "in")?,
    )))
}

fn make_wheel_monitor(p: &PrimitiveParams) -> Result<Box<dyn Primitive>, MappingError> {
    let name = "core::wheel_monitor";
    Ok(Box::new(WheelMonitor::new(
        p.string(name, "device")?,
        p.port(name, "position")?,
        p.port(name, "velocity")?,
    )))
}

fn make_position_check(p: &PrimitiveParams) -> Result<Box<dyn Primitive>, MappingError> {
    let name = "core::position_check";
    Ok(Box::new(PositionCheck::new(
        p.port(name, "actual")?,
        p.port(name, "reference")?,
        p.double(name, "bound")?,
        p.port(name, "out")?,
    )))
}

macro_rules! op_factory {
    ($fn_name:ident, $helper:ident, $op:expr) => {
        fn $fn_name(p: &PrimitiveParams) -> Result<Box<dyn Primitive>, MappingError> {
            $helper(p, $op)
        }
    };
}

op_factory!(make_add, binary, BinaryOp::Add);
op_factory!(make_sub, binary, BinaryOp::Sub);
op_factory!(make_mul, binary, BinaryOp::Mul);
op_factory!(make_div, binary, BinaryOp::Div);
op_factory!(make_min, binary, BinaryOp::Min);
op_factory!(make_max, binary, BinaryOp::Max);
op_factory!(make_gt, compare, CmpOp::Gt);
op_factory!(make_ge, compare, CmpOp::Ge);
op_factory!(make_lt, compare, CmpOp::Lt);
op_factory!(make_le, compare, CmpOp::Le);
op_factory!(make_eq, compare, CmpOp::Eq);
op_factory!(make_and, boolean, BoolOp::And);
op_factory!(make_or, boolean, BoolOp::Or);
op_factory!(make_xor, boolean, BoolOp::Xor);
op_factory!(make_neg, unary, UnaryOp::Neg);
op_factory!(make_abs, unary, UnaryOp::Abs);
op_factory!(make_sqrt, unary, UnaryOp::Sqrt);

/// Builtin `(type name, factory)` table.
const BUILTIN_FACTORIES: &[(&str, PrimitiveFactory)] = &[
    ("core::constant", make_constant),
    ("core::add", make_add),
    ("core::sub", make_sub),
    ("core::mul", make_mul),
    ("core::div", make_div),
    ("core::min", make_min),
    ("core::max", make_max),
    ("core::gt", make_gt),
    ("core::ge", make_ge),
    ("core::lt", make_lt),
    ("core::le", make_le),
    ("core::eq", make_eq),
    ("core::and", make_and),
    ("core::or", make_or),
    ("core::xor", make_xor),
    ("core::neg", make_neg),
    ("core::abs", make_abs),
    ("core::sqrt", make_sqrt),
    ("core::not", make_not),
    ("core::latch", make_latch),
    ("core::edge", make_edge),
    ("core::clock", make_clock),
    ("core::cancel", make_cancel),
    ("core::exception", make_exception),
    ("core::interval", make_interval),
    ("core::sensor", make_sensor),
    ("core::error_code", make_error_code),
    ("core::actuator", make_actuator),
    ("core::wheel_monitor", make_wheel_monitor),
    ("core::position_check", make_position_check),
];
