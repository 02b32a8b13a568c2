//! Reactive value expression graph.
//!
//! Immutable expression nodes in an arena, hash-consed on insertion:
//! interning a node structurally equal to an existing one (same kind,
//! same children, same parameters) returns the existing `NodeId`.
//! Structural sharing therefore happens at construction time, and the
//! fragment compiler's per-node memoization guarantees each subtree is
//! lowered to primitives exactly once.
//!
//! Index-based storage keeps the graph acyclic by construction (children
//! must exist before their parent) and avoids shared-pointer ownership
//! cycles.

use std::collections::HashMap;
use std::fmt;

use rcm_common::error::{ExceptionKind, MappingError};
use rcm_common::ops::{BinaryOp, BoolOp, CmpOp, UnaryOp};
use rcm_common::value::{RtValue, ValueType};

/// Index of a node within one [`ValueGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A reactive value node.
#[derive(Debug, Clone)]
pub enum ValueKind {
    /// A fixed value.
    Constant(RtValue),
    /// Pure unary function of one double value.
    Derived { op: UnaryOp, input: NodeId },
    /// Pure binary function of two double values.
    Combined {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    /// Double comparison producing a boolean.
    Compare {
        op: CmpOp,
        lhs: NodeId,
        rhs: NodeId,
        epsilon: f64,
    },
    /// Boolean combinator.
    BoolCombine {
        op: BoolOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    /// Boolean negation.
    BoolNot { input: NodeId },
    /// A device sensor channel, read once per cycle.
    DeviceSensor {
        device: String,
        interface: &'static str,
        channel: &'static str,
    },
    /// A device's per-cycle error code.
    DeviceError { device: String },
    /// True while an exception of this kind is latched in the net.
    ExceptionActive { kind: ExceptionKind },
    /// Elapsed net time [s].
    Clock,
    /// The net's cancellation flag.
    CancelRequested,
    /// Extension node realized by an externally registered mapper.
    Extension {
        tag: &'static str,
        children: Vec<NodeId>,
        param: Option<RtValue>,
    },
}

/// Discriminant used as the mapper registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindTag {
    Constant,
    Derived,
    Combined,
    Compare,
    BoolCombine,
    BoolNot,
    DeviceSensor,
    DeviceError,
    ExceptionActive,
    Clock,
    CancelRequested,
    Extension(&'static str),
}

impl fmt::Display for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant => f.write_str("constant"),
            Self::Derived => f.write_str("derived"),
            Self::Combined => f.write_str("combined"),
            Self::Compare => f.write_str("compare"),
            Self::BoolCombine => f.write_str("bool-combine"),
            Self::BoolNot => f.write_str("bool-not"),
            Self::DeviceSensor => f.write_str("device-sensor"),
            Self::DeviceError => f.write_str("device-error"),
            Self::ExceptionActive => f.write_str("exception-active"),
            Self::Clock => f.write_str("clock"),
            Self::CancelRequested => f.write_str("cancel-requested"),
            Self::Extension(tag) => write!(f, "extension:{tag}"),
        }
    }
}

impl ValueKind {
    pub fn tag(&self) -> KindTag {
        match self {
            Self::Constant(_) => KindTag::Constant,
            Self::Derived { .. } => KindTag::Derived,
            Self::Combined { .. } => KindTag::Combined,
            Self::Compare { .. } => KindTag::Compare,
            Self::BoolCombine { .. } => KindTag::BoolCombine,
            Self::BoolNot { .. } => KindTag::BoolNot,
            Self::DeviceSensor { .. } => KindTag::DeviceSensor,
            Self::DeviceError { .. } => KindTag::DeviceError,
            Self::ExceptionActive { .. } => KindTag::ExceptionActive,
            Self::Clock => KindTag::Clock,
            Self::CancelRequested => KindTag::CancelRequested,
            Self::Extension { tag, .. } => KindTag::Extension(tag),
        }
    }

    /// Child nodes in mapper input order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Self::Derived { input, .. } | Self::BoolNot { input } => vec![*input],
            Self::Combined { lhs, rhs, .. }
            | Self::Compare { lhs, rhs, .. }
            | Self::BoolCombine { lhs, rhs, .. } => vec![*lhs, *rhs],
            Self::Extension { children, .. } => children.clone(),
            _ => Vec::new(),
        }
    }
}

// ─── Structural keys ────────────────────────────────────────────────

/// Canonical hashable encoding of an `RtValue` (doubles by bit
/// pattern).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ValueKey {
    ty: ValueType,
    words: Vec<u64>,
    text: Option<String>,
}

fn value_key(v: &RtValue) -> ValueKey {
    let (words, text) = match v {
        RtValue::Bool(b) => (vec![*b as u64], None),
        RtValue::Int(i) => (vec![*i as u64], None),
        RtValue::Double(d) => (vec![d.to_bits()], None),
        RtValue::Str(s) => (Vec::new(), Some(s.to_string())),
        RtValue::Vector(v) => (vec![v.x.to_bits(), v.y.to_bits(), v.z.to_bits()], None),
        RtValue::Rotation(r) => (
            vec![r.w.to_bits(), r.x.to_bits(), r.y.to_bits(), r.z.to_bits()],
            None,
        ),
        RtValue::Frame(f) => (
            vec![
                f.rotation.w.to_bits(),
                f.rotation.x.to_bits(),
                f.rotation.y.to_bits(),
                f.rotation.z.to_bits(),
                f.translation.x.to_bits(),
                f.translation.y.to_bits(),
                f.translation.z.to_bits(),
            ],
            None,
        ),
        RtValue::Twist(t) => (
            vec![
                t.linear.x.to_bits(),
                t.linear.y.to_bits(),
                t.linear.z.to_bits(),
                t.angular.x.to_bits(),
                t.angular.y.to_bits(),
                t.angular.z.to_bits(),
            ],
            None,
        ),
        RtValue::Enum(e) => (vec![e.ordinal as u64], Some(e.type_tag.to_string())),
        RtValue::DoubleArray(a) => (a.iter().map(|d| d.to_bits()).collect(), None),
    };
    ValueKey {
        ty: v.value_type(),
        words,
        text,
    }
}

/// Structural identity of a node: kind tag, parameters (doubles by bit
/// pattern) and child ids. Since children are themselves hash-consed,
/// equal keys mean structurally equal subtrees.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NodeKey {
    Constant(ValueKey),
    Derived(UnaryOp, u32),
    Combined(BinaryOp, u32, u32),
    Compare(CmpOp, u32, u32, u64),
    BoolCombine(BoolOp, u32, u32),
    BoolNot(u32),
    DeviceSensor(String, &'static str, &'static str),
    DeviceError(String),
    ExceptionActive(ExceptionKind),
    Clock,
    CancelRequested,
    Extension(&'static str, Vec<u32>, Option<ValueKey>),
}

fn node_key(kind: &ValueKind) -> NodeKey {
    match kind {
        ValueKind::Constant(v) => NodeKey::Constant(value_key(v)),
        ValueKind::Derived { op, input } => NodeKey::Derived(*op, input.0),
        ValueKind::Combined { op, lhs, rhs } => NodeKey::Combined(*op, lhs.0, rhs.0),
        ValueKind::Compare {
            op,
            lhs,
            rhs,
            epsilon,
        } => NodeKey::Compare(*op, lhs.0, rhs.0, epsilon.to_bits()),
        ValueKind::BoolCombine { op, lhs, rhs } => NodeKey::BoolCombine(*op, lhs.0, rhs.0),
        ValueKind::BoolNot { input } => NodeKey::BoolNot(input.0),
        ValueKind::DeviceSensor {
            device,
            interface,
            channel,
        } => NodeKey::DeviceSensor(device.clone(), interface, channel),
        ValueKind::DeviceError { device } => NodeKey::DeviceError(device.clone()),
        ValueKind::ExceptionActive { kind } => NodeKey::ExceptionActive(*kind),
        ValueKind::Clock => NodeKey::Clock,
        ValueKind::CancelRequested => NodeKey::CancelRequested,
        ValueKind::Extension {
            tag,
            children,
            param,
        } => NodeKey::Extension(
            tag,
            children.iter().map(|c| c.0).collect(),
            param.as_ref().map(value_key),
        ),
    }
}

// ─── ValueGraph ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Node {
    kind: ValueKind,
    ty: ValueType,
}

/// Hash-consed arena of reactive value nodes.
#[derive(Debug, Clone, Default)]
pub struct ValueGraph {
    nodes: Vec<Node>,
    index: HashMap<NodeKey, NodeId>,
}

impl ValueGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind(&self, id: NodeId) -> &ValueKind {
        &self.nodes[id.0 as usize].kind
    }

    /// Value type the node produces.
    pub fn ty(&self, id: NodeId) -> ValueType {
        self.nodes[id.0 as usize].ty
    }

    fn intern(&mut self, kind: ValueKind, ty: ValueType) -> NodeId {
        let key = node_key(&kind);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, ty });
        self.index.insert(key, id);
        id
    }

    fn expect_ty(
        &self,
        context: &'static str,
        id: NodeId,
        expected: ValueType,
    ) -> Result<(), MappingError> {
        let found = self.ty(id);
        if found != expected {
            return Err(MappingError::PortType {
                context,
                expected,
                found,
            });
        }
        Ok(())
    }

    // ── Constructors ───────────────────────────────────────────────

    pub fn constant(&mut self, value: RtValue) -> NodeId {
        let ty = value.value_type();
        self.intern(ValueKind::Constant(value), ty)
    }

    pub fn derived(&mut self, op: UnaryOp, input: NodeId) -> Result<NodeId, MappingError> {
        self.expect_ty("derived", input, ValueType::Double)?;
        Ok(self.intern(ValueKind::Derived { op, input }, ValueType::Double))
    }

    pub fn combined(
        &mut self,
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<NodeId, MappingError> {
        self.expect_ty("combined", lhs, ValueType::Double)?;
        self.expect_ty("combined", rhs, ValueType::Double)?;
        Ok(self.intern(ValueKind::Combined { op, lhs, rhs }, ValueType::Double))
    }

    pub fn compare(
        &mut self,
        op: CmpOp,
        lhs: NodeId,
        rhs: NodeId,
        epsilon: f64,
    ) -> Result<NodeId, MappingError> {
        self.expect_ty("compare", lhs, ValueType::Double)?;
        self.expect_ty("compare", rhs, ValueType::Double)?;
        Ok(self.intern(
            ValueKind::Compare {
                op,
                lhs,
                rhs,
                epsilon,
            },
            ValueType::Bool,
        ))
    }

    pub fn bool_combine(
        &mut self,
        op: BoolOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<NodeId, MappingError> {
        self.expect_ty("bool-combine", lhs, ValueType::Bool)?;
        self.expect_ty("bool-combine", rhs, ValueType::Bool)?;
        Ok(self.intern(ValueKind::BoolCombine { op, lhs, rhs }, ValueType::Bool))
    }

    pub fn not_(&mut self, input: NodeId) -> Result<NodeId, MappingError> {
        self.expect_ty("bool-not", input, ValueType::Bool)?;
        Ok(self.intern(ValueKind::BoolNot { input }, ValueType::Bool))
    }

    pub fn device_sensor(
        &mut self,
        device: impl Into<String>,
        interface: &'static str,
        channel: &'static str,
    ) -> NodeId {
        self.intern(
            ValueKind::DeviceSensor {
                device: device.into(),
                interface,
                channel,
            },
            ValueType::Double,
        )
    }

    pub fn device_error(&mut self, device: impl Into<String>) -> NodeId {
        self.intern(
            ValueKind::DeviceError {
                device: device.into(),
            },
            ValueType::Int,
        )
    }

    pub fn exception_active(&mut self, kind: ExceptionKind) -> NodeId {
        self.intern(ValueKind::ExceptionActive { kind }, ValueType::Bool)
    }

    pub fn clock(&mut self) -> NodeId {
        self.intern(ValueKind::Clock, ValueType::Double)
    }

    pub fn cancel_requested(&mut self) -> NodeId {
        self.intern(ValueKind::CancelRequested, ValueType::Bool)
    }

    pub fn extension(
        &mut self,
        tag: &'static str,
        children: Vec<NodeId>,
        param: Option<RtValue>,
        ty: ValueType,
    ) -> NodeId {
        self.intern(
            ValueKind::Extension {
                tag,
                children,
                param,
            },
            ty,
        )
    }
}
