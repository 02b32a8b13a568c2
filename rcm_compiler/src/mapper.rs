//! Kind-indexed fragment factory registry.
//!
//! `MapperRegistry` associates each reactive-value node kind with a
//! factory realizing it as primitives. Runtime extension modules
//! register additional mappings at startup (for `KindTag::Extension`
//! kinds) and may unregister them symmetrically at shutdown.
//!
//! Factories fail fast: device-backed kinds resolve their device and
//! required capabilities against the registries *here*, so a missing
//! capability is a compile-time configuration error, never a runtime
//! dangle.

use std::collections::HashMap;
use std::sync::RwLock;

use rcm_common::device::interfaces;
use rcm_common::error::{ConfigError, MappingError};
use rcm_common::value::ValueType;
use rcm_net::builder::NetBuilder;
use rcm_net::primitives::{
    BinaryDouble, BoolBinary, BoolNot, CancelSense, Clock, Compare, Constant, ErrorCodeRead,
    ExceptionSense, SensorRead, UnaryDouble,
};
use rcm_net::registry::{DeviceRegistry, InterfaceRegistry, PrimitiveRegistry};

use crate::fragment::Fragment;
use crate::graph::{KindTag, NodeId, ValueGraph, ValueKind};

/// Registries a factory may consult while building a fragment.
pub struct MapperCtx<'a> {
    pub devices: &'a DeviceRegistry,
    pub interfaces: &'a InterfaceRegistry,
    pub primitives: &'a PrimitiveRegistry,
}

/// Builds the fragment for one value node. Child fragments are composed
/// by the caller; the factory only declares `inputs` ports for them.
pub type FragmentFactory = Box<
    dyn Fn(&MapperCtx<'_>, &ValueGraph, NodeId) -> Result<Fragment, MappingError> + Send + Sync,
>;

/// Kind-indexed factory table.
pub struct MapperRegistry {
    factories: RwLock<HashMap<KindTag, FragmentFactory>>,
}

impl MapperRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with every builtin value kind registered.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.install_builtins();
        registry
    }

    /// Associate a value kind with a fragment factory.
    pub fn register(&self, tag: KindTag, factory: FragmentFactory) -> Result<(), ConfigError> {
        let mut factories = self
            .factories
            .write()
            .expect("mapper registry lock poisoned");
        if factories.contains_key(&tag) {
            return Err(ConfigError::DuplicateName(tag.to_string()));
        }
        factories.insert(tag, factory);
        Ok(())
    }

    /// Remove a mapping (extension shutdown).
    pub fn unregister(&self, tag: KindTag) -> bool {
        self.factories
            .write()
            .expect("mapper registry lock poisoned")
            .remove(&tag)
            .is_some()
    }

    /// Build the fragment for one node.
    pub fn build_fragment(
        &self,
        ctx: &MapperCtx<'_>,
        graph: &ValueGraph,
        id: NodeId,
    ) -> Result<Fragment, MappingError> {
        let tag = graph.kind(id).tag();
        let factories = self
            .factories
            .read()
            .expect("mapper registry lock poisoned");
        let factory = factories
            .get(&tag)
            .ok_or_else(|| MappingError::NoMapper(tag.to_string()))?;
        factory(ctx, graph, id)
    }

    fn install_builtins(&self) {
        let builtins: [(KindTag, FragmentFactory); 11] = [
            (KindTag::Constant, Box::new(map_constant)),
            (KindTag::Derived, Box::new(map_derived)),
            (KindTag::Combined, Box::new(map_combined)),
            (KindTag::Compare, Box::new(map_compare)),
            (KindTag::BoolCombine, Box::new(map_bool_combine)),
            (KindTag::BoolNot, Box::new(map_bool_not)),
            (KindTag::DeviceSensor, Box::new(map_device_sensor)),
            (KindTag::DeviceError, Box::new(map_device_error)),
            (KindTag::ExceptionActive, Box::new(map_exception_active)),
            (KindTag::Clock, Box::new(map_clock)),
            (KindTag::CancelRequested, Box::new(map_cancel)),
        ];
        for (tag, factory) in builtins {
            // Builtins install into a fresh registry; duplicates cannot
            // occur here.
            let _ = self.register(tag, factory);
        }
    }
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ─── Builtin factories ──────────────────────────────────────────────

fn kind_mismatch(tag: KindTag) -> MappingError {
    MappingError::NoMapper(format!("factory invoked with wrong node kind: {tag}"))
}

fn map_constant(
    _ctx: &MapperCtx<'_>,
    graph: &ValueGraph,
    id: NodeId,
) -> Result<Fragment, MappingError> {
    let ValueKind::Constant(value) = graph.kind(id) else {
        return Err(kind_mismatch(KindTag::Constant));
    };
    let mut net = NetBuilder::new("frag::constant");
    let out = net.port(value.value_type());
    net.add(Constant::new(value.clone(), out))?;
    Ok(Fragment::leaf(net, vec![out]))
}

fn map_derived(
    _ctx: &MapperCtx<'_>,
    graph: &ValueGraph,
    id: NodeId,
) -> Result<Fragment, MappingError> {
    let ValueKind::Derived { op, .. } = graph.kind(id) else {
        return Err(kind_mismatch(KindTag::Derived));
    };
    let mut net = NetBuilder::new("frag::derived");
    let input = net.port(ValueType::Double);
    let out = net.port(ValueType::Double);
    net.add(UnaryDouble::new(*op, input, out))?;
    Ok(Fragment::new(net, vec![input], vec![out]))
}

fn map_combined(
    _ctx: &MapperCtx<'_>,
    graph: &ValueGraph,
    id: NodeId,
) -> Result<Fragment, MappingError> {
    let ValueKind::Combined { op, .. } = graph.kind(id) else {
        return Err(kind_mismatch(KindTag::Combined));
    };
    let mut net = NetBuilder::new("frag::combined");
    let a = net.port(ValueType::Double);
    let b = net.port(ValueType::Double);
    let out = net.port(ValueType::Double);
    net.add(BinaryDouble::new(*op, a, b, out))?;
    Ok(Fragment::new(net, vec![a, b], vec![out]))
}

fn map_compare(
    _ctx: &MapperCtx<'_>,
    graph: &ValueGraph,
    id: NodeId,
) -> Result<Fragment, MappingError> {
    let ValueKind::Compare { op, epsilon, .. } = graph.kind(id) else {
        return Err(kind_mismatch(KindTag::Compare));
    };
    let mut net = NetBuilder::new("frag::compare");
    let a = net.port(ValueType::Double);
    let b = net.port(ValueType::Double);
    let out = net.port(ValueType::Bool);
    net.add(Compare::new(*op, a, b, *epsilon, out))?;
    Ok(Fragment::new(net, vec![a, b], vec![out]))
}

fn map_bool_combine(
    _ctx: &MapperCtx<'_>,
    graph: &ValueGraph,
    id: NodeId,
) -> Result<Fragment, MappingError> {
    let ValueKind::BoolCombine { op, .. } = graph.kind(id) else {
        return Err(kind_mismatch(KindTag::BoolCombine));
    };
    let mut net = NetBuilder::new("frag::bool");
    let a = net.port(ValueType::Bool);
    let b = net.port(ValueType::Bool);
    let out = net.port(ValueType::Bool);
    net.add(BoolBinary::new(*op, a, b, out))?;
    Ok(Fragment::new(net, vec![a, b], vec![out]))
}

fn map_bool_not(
    _ctx: &MapperCtx<'_>,
    graph: &ValueGraph,
    id: NodeId,
) -> Result<Fragment, MappingError> {
    let ValueKind::BoolNot { .. } = graph.kind(id) else {
        return Err(kind_mismatch(KindTag::BoolNot));
    };
    let mut net = NetBuilder::new("frag::not");
    let input = net.port(ValueType::Bool);
    let out = net.port(ValueType::Bool);
    net.add(BoolNot::new(input, out))?;
    Ok(Fragment::new(net, vec![input], vec![out]))
}

fn map_device_sensor(
    ctx: &MapperCtx<'_>,
    graph: &ValueGraph,
    id: NodeId,
) -> Result<Fragment, MappingError> {
    let ValueKind::DeviceSensor {
        device,
        interface,
        channel,
    } = graph.kind(id)
    else {
        return Err(kind_mismatch(KindTag::DeviceSensor));
    };
    // Factory precondition: the device must exist and satisfy the
    // capability now, at compile time.
    ctx.devices.lookup(device, &[*interface], ctx.interfaces)?;
    let mut net = NetBuilder::new("frag::sensor");
    let out = net.port(ValueType::Double);
    net.add(SensorRead::new(device.clone(), *interface, *channel, out))?;
    Ok(Fragment::leaf(net, vec![out]))
}

fn map_device_error(
    ctx: &MapperCtx<'_>,
    graph: &ValueGraph,
    id: NodeId,
) -> Result<Fragment, MappingError> {
    let ValueKind::DeviceError { device } = graph.kind(id) else {
        return Err(kind_mismatch(KindTag::DeviceError));
    };
    ctx.devices
        .lookup(device, &[interfaces::ERROR_CODE], ctx.interfaces)?;
    let mut net = NetBuilder::new("frag::error_code");
    let out = net.port(ValueType::Int);
    net.add(ErrorCodeRead::new(device.clone(), out))?;
    Ok(Fragment::leaf(net, vec![out]))
}

fn map_exception_active(
    _ctx: &MapperCtx<'_>,
    graph: &ValueGraph,
    id: NodeId,
) -> Result<Fragment, MappingError> {
    let ValueKind::ExceptionActive { kind } = graph.kind(id) else {
        return Err(kind_mismatch(KindTag::ExceptionActive));
    };
    let mut net = NetBuilder::new("frag::exception");
    let out = net.port(ValueType::Bool);
    net.add(ExceptionSense::new(*kind, out))?;
    Ok(Fragment::leaf(net, vec![out]))
}

fn map_clock(
    _ctx: &MapperCtx<'_>,
    graph: &ValueGraph,
    id: NodeId,
) -> Result<Fragment, MappingError> {
    let ValueKind::Clock = graph.kind(id) else {
        return Err(kind_mismatch(KindTag::Clock));
    };
    let mut net = NetBuilder::new("frag::clock");
    let out = net.port(ValueType::Double);
    net.add(Clock::new(out))?;
    Ok(Fragment::leaf(net, vec![out]))
}

fn map_cancel(
    _ctx: &MapperCtx<'_>,
    graph: &ValueGraph,
    id: NodeId,
) -> Result<Fragment, MappingError> {
    let ValueKind::CancelRequested = graph.kind(id) else {
        return Err(kind_mismatch(KindTag::CancelRequested));
    };
    let mut net = NetBuilder::new("frag::cancel");
    let out = net.port(ValueType::Bool);
    net.add(CancelSense::new(out))?;
    Ok(Fragment::leaf(net, vec![out]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcm_common::ops::BinaryOp;
    use rcm_common::value::RtValue;

    fn ctx_parts() -> (DeviceRegistry, InterfaceRegistry, PrimitiveRegistry) {
        (
            DeviceRegistry::new(),
            InterfaceRegistry::new(),
            PrimitiveRegistry::with_builtins(),
        )
    }

    #[test]
    fn builtin_fragments_expose_child_inputs() {
        let (devices, interfaces, primitives) = ctx_parts();
        let ctx = MapperCtx {
            devices: &devices,
            interfaces: &interfaces,
            primitives: &primitives,
        };
        let registry = MapperRegistry::with_builtins();

        let mut g = ValueGraph::new();
        let clock = g.clock();
        let limit = g.constant(RtValue::Double(1.0));
        let sum = g.combined(BinaryOp::Add, clock, limit).unwrap();

        let frag = registry.build_fragment(&ctx, &g, sum).unwrap();
        assert_eq!(frag.inputs.len(), 2);
        assert_eq!(frag.outputs.len(), 1);

        let leaf = registry.build_fragment(&ctx, &g, clock).unwrap();
        assert!(leaf.inputs.is_empty());
        assert_eq!(leaf.outputs.len(), 1);
    }

    #[test]
    fn unregistered_kind_is_mapping_error() {
        let (devices, interfaces, primitives) = ctx_parts();
        let ctx = MapperCtx {
            devices: &devices,
            interfaces: &interfaces,
            primitives: &primitives,
        };
        let registry = MapperRegistry::with_builtins();

        let mut g = ValueGraph::new();
        let ext = g.extension("vendor::gain", vec![], None, ValueType::Double);
        let err = registry.build_fragment(&ctx, &g, ext).unwrap_err();
        assert!(matches!(err, MappingError::NoMapper(_)));
    }

    #[test]
    fn device_sensor_factory_checks_capability() {
        let (devices, interfaces, primitives) = ctx_parts();
        let ctx = MapperCtx {
            devices: &devices,
            interfaces: &interfaces,
            primitives: &primitives,
        };
        let registry = MapperRegistry::with_builtins();

        let mut g = ValueGraph::new();
        let sensor = g.device_sensor("ghost", "position-sensor", "position");
        let err = registry.build_fragment(&ctx, &g, sensor).unwrap_err();
        assert!(matches!(err, MappingError::Config(_)));
    }

    #[test]
    fn extension_register_unregister() {
        let registry = MapperRegistry::with_builtins();
        let tag = KindTag::Extension("vendor::gain");
        registry
            .register(
                tag,
                Box::new(|_, _, _| {
                    let mut net = NetBuilder::new("frag::gain");
                    let input = net.port(ValueType::Double);
                    let out = net.port(ValueType::Double);
                    net.add(UnaryDouble::new(rcm_common::ops::UnaryOp::Neg, input, out))?;
                    Ok(Fragment::new(net, vec![input], vec![out]))
                }),
            )
            .unwrap();

        // Duplicate rejected.
        assert!(registry.register(tag, Box::new(map_clock)).is_err());
        // Symmetric removal.
        assert!(registry.unregister(tag));
        assert!(!registry.unregister(tag));
    }
}
