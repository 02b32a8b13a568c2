//! Runtime port value types.
//!
//! Every port in a dataflow net carries one `RtValue` of a fixed
//! `ValueType`. Values are overwritten each cycle, never queued; an
//! unconnected input reads the type's defined default.
//!
//! String and array payloads use fixed-capacity `heapless` storage so that
//! copying a value inside the RT cycle never touches the heap.

use std::fmt;

use static_assertions::const_assert;

use crate::math::{Frame, Rotation, Twist, Vector3};

/// Maximum length of a string port value.
pub const MAX_STR_LEN: usize = 32;
/// Maximum element count of an array port value.
pub const MAX_ARRAY_LEN: usize = 16;

/// Inline string payload.
pub type RtString = heapless::String<MAX_STR_LEN>;
/// Inline double-array payload.
pub type RtDoubleArray = heapless::Vec<f64, MAX_ARRAY_LEN>;

/// A named enumeration value: the declaring type's tag plus the
/// variant ordinal. Two enum values are interchangeable only when both
/// match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub type_tag: &'static str,
    pub ordinal: u16,
}

impl EnumValue {
    pub const fn new(type_tag: &'static str, ordinal: u16) -> Self {
        Self { type_tag, ordinal }
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_tag, self.ordinal)
    }
}

// ─── ValueType ──────────────────────────────────────────────────────

/// Type tag of a port value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Double,
    Str,
    Vector,
    Rotation,
    Frame,
    Twist,
    Enum,
    DoubleArray,
}

impl ValueType {
    /// The defined default an unconnected input port of this type reads.
    pub fn default_value(self) -> RtValue {
        match self {
            Self::Bool => RtValue::Bool(false),
            Self::Int => RtValue::Int(0),
            Self::Double => RtValue::Double(0.0),
            Self::Str => RtValue::Str(RtString::new()),
            Self::Vector => RtValue::Vector(Vector3::ZERO),
            Self::Rotation => RtValue::Rotation(Rotation::IDENTITY),
            Self::Frame => RtValue::Frame(Frame::IDENTITY),
            Self::Twist => RtValue::Twist(Twist::ZERO),
            Self::Enum => RtValue::Enum(EnumValue::new("", 0)),
            Self::DoubleArray => RtValue::DoubleArray(RtDoubleArray::new()),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Double => "double",
            Self::Str => "string",
            Self::Vector => "vector",
            Self::Rotation => "rotation",
            Self::Frame => "frame",
            Self::Twist => "twist",
            Self::Enum => "enum",
            Self::DoubleArray => "double[]",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── RtValue ────────────────────────────────────────────────────────

/// A value held in a dataflow port.
#[derive(Debug, Clone, PartialEq)]
pub enum RtValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(RtString),
    Vector(Vector3),
    Rotation(Rotation),
    Frame(Frame),
    Twist(Twist),
    Enum(EnumValue),
    DoubleArray(RtDoubleArray),
}

// Copying a value per cycle must stay cheap; keep the payload inline and
// bounded.
const_assert!(std::mem::size_of::<RtValue>() <= 152);

impl RtValue {
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Double(_) => ValueType::Double,
            Self::Str(_) => ValueType::Str,
            Self::Vector(_) => ValueType::Vector,
            Self::Rotation(_) => ValueType::Rotation,
            Self::Frame(_) => ValueType::Frame,
            Self::Twist(_) => ValueType::Twist,
            Self::Enum(_) => ValueType::Enum,
            Self::DoubleArray(_) => ValueType::DoubleArray,
        }
    }

    #[inline]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Build a string value, truncating at [`MAX_STR_LEN`] bytes.
    pub fn str_from(s: &str) -> Self {
        let mut out = RtString::new();
        for ch in s.chars() {
            if out.push(ch).is_err() {
                break;
            }
        }
        Self::Str(out)
    }
}

impl fmt::Display for RtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Vector(v) => write!(f, "({}, {}, {})", v.x, v.y, v.z),
            Self::Rotation(r) => write!(f, "q({}, {}, {}, {})", r.w, r.x, r.y, r.z),
            Self::Frame(fr) => write!(
                f,
                "frame(t=({}, {}, {}))",
                fr.translation.x, fr.translation.y, fr.translation.z
            ),
            Self::Twist(t) => write!(
                f,
                "twist(v=({}, {}, {}))",
                t.linear.x, t.linear.y, t.linear.z
            ),
            Self::Enum(e) => write!(f, "{e}"),
            Self::DoubleArray(a) => write!(f, "{a:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_match_types() {
        for ty in [
            ValueType::Bool,
            ValueType::Int,
            ValueType::Double,
            ValueType::Str,
            ValueType::Vector,
            ValueType::Rotation,
            ValueType::Frame,
            ValueType::Twist,
            ValueType::Enum,
            ValueType::DoubleArray,
        ] {
            assert_eq!(ty.default_value().value_type(), ty);
        }
    }

    #[test]
    fn accessors() {
        assert_eq!(RtValue::Bool(true).as_bool(), Some(true));
        assert_eq!(RtValue::Int(7).as_int(), Some(7));
        assert_eq!(RtValue::Double(1.5).as_double(), Some(1.5));
        assert_eq!(RtValue::Bool(true).as_double(), None);
        assert_eq!(RtValue::Double(0.0).as_bool(), None);
    }

    #[test]
    fn str_from_truncates() {
        let long = "x".repeat(100);
        let v = RtValue::str_from(&long);
        match v {
            RtValue::Str(s) => assert_eq!(s.len(), MAX_STR_LEN),
            _ => panic!("expected string value"),
        }
    }

    #[test]
    fn display_is_stable() {
        assert_eq!(RtValue::Double(2.5).to_string(), "2.5");
        assert_eq!(RtValue::Bool(false).to_string(), "false");
        assert_eq!(ValueType::DoubleArray.to_string(), "double[]");
    }

    #[test]
    fn enum_values_compare_by_tag_and_ordinal() {
        let a = EnumValue::new("gear", 2);
        let b = EnumValue::new("gear", 2);
        let c = EnumValue::new("gear", 3);
        let d = EnumValue::new("mode", 2);
        assert_eq!(RtValue::Enum(a), RtValue::Enum(b));
        assert_ne!(RtValue::Enum(a), RtValue::Enum(c));
        assert_ne!(RtValue::Enum(a), RtValue::Enum(d));
        assert_eq!(RtValue::Enum(a).to_string(), "gear#2");
    }
}
