//! Cartesian math types carried through dataflow ports.
//!
//! Plain value types: `Vector3`, `Rotation` (unit quaternion), `Frame`
//! (rotation + translation), `Twist` (linear + angular velocity).
//! All operations are allocation-free and usable inside the RT cycle.

// ─── Vector3 ────────────────────────────────────────────────────────

/// 3-dimensional Cartesian vector [user units].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn add(&self, other: &Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    #[inline]
    pub fn sub(&self, other: &Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    #[inline]
    pub fn scale(&self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    #[inline]
    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Euclidean norm.
    #[inline]
    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }
}

// ─── Rotation ───────────────────────────────────────────────────────

/// Spatial rotation as a unit quaternion (w, x, y, z).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Rotation {
    pub const IDENTITY: Self = Self {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Rotation of `angle` radians around a (non-zero) axis.
    pub fn from_axis_angle(axis: Vector3, angle: f64) -> Self {
        let n = axis.norm();
        if n < f64::EPSILON {
            return Self::IDENTITY;
        }
        let half = angle * 0.5;
        let s = half.sin() / n;
        Self {
            w: half.cos(),
            x: axis.x * s,
            y: axis.y * s,
            z: axis.z * s,
        }
    }

    /// Hamilton product `self * other` (apply `other` first, then `self`).
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            w: self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
            x: self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            y: self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            z: self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
        }
    }

    /// Inverse rotation (conjugate; valid for unit quaternions).
    #[inline]
    pub fn inverse(&self) -> Self {
        Self {
            w: self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    /// Rotate a vector.
    pub fn apply(&self, v: &Vector3) -> Vector3 {
        // q * (0, v) * q⁻¹, expanded.
        let u = Vector3::new(self.x, self.y, self.z);
        let uv = u.cross(v);
        let uuv = u.cross(&uv);
        v.add(&uv.scale(2.0 * self.w)).add(&uuv.scale(2.0))
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ─── Frame ──────────────────────────────────────────────────────────

/// Rigid transformation: rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frame {
    pub rotation: Rotation,
    pub translation: Vector3,
}

impl Frame {
    pub const IDENTITY: Self = Self {
        rotation: Rotation::IDENTITY,
        translation: Vector3::ZERO,
    };

    pub const fn new(rotation: Rotation, translation: Vector3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Compose `self * other` (apply `other` first).
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            rotation: self.rotation.compose(&other.rotation),
            translation: self
                .translation
                .add(&self.rotation.apply(&other.translation)),
        }
    }

    /// Transform a point.
    pub fn apply(&self, p: &Vector3) -> Vector3 {
        self.rotation.apply(p).add(&self.translation)
    }
}

// ─── Twist ──────────────────────────────────────────────────────────

/// Cartesian velocity: linear [units/s] and angular [rad/s] components.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

impl Twist {
    pub const ZERO: Self = Self {
        linear: Vector3::ZERO,
        angular: Vector3::ZERO,
    };

    pub const fn new(linear: Vector3, angular: Vector3) -> Self {
        Self { linear, angular }
    }

    #[inline]
    pub fn add(&self, other: &Self) -> Self {
        Self {
            linear: self.linear.add(&other.linear),
            angular: self.angular.add(&other.angular),
        }
    }

    #[inline]
    pub fn scale(&self, s: f64) -> Self {
        Self {
            linear: self.linear.scale(s),
            angular: self.angular.scale(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_basic_ops() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(4.0, 5.0, 6.0);
        assert_eq!(a.add(&b), Vector3::new(5.0, 7.0, 9.0));
        assert_eq!(a.sub(&b), Vector3::new(-3.0, -3.0, -3.0));
        assert_eq!(a.scale(2.0), Vector3::new(2.0, 4.0, 6.0));
        assert_eq!(a.dot(&b), 32.0);
        assert_eq!(a.cross(&b), Vector3::new(-3.0, 6.0, -3.0));
        assert!((Vector3::new(3.0, 4.0, 0.0).norm() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn rotation_identity_apply() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        let r = Rotation::IDENTITY;
        assert_eq!(r.apply(&v), v);
    }

    #[test]
    fn rotation_quarter_turn_z() {
        let r = Rotation::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), std::f64::consts::FRAC_PI_2);
        let v = r.apply(&Vector3::new(1.0, 0.0, 0.0));
        assert!((v.x - 0.0).abs() < 1e-12);
        assert!((v.y - 1.0).abs() < 1e-12);
        assert!((v.z - 0.0).abs() < 1e-12);
    }

    #[test]
    fn rotation_inverse_roundtrip() {
        let r = Rotation::from_axis_angle(Vector3::new(1.0, 1.0, 0.0), 0.7);
        let v = Vector3::new(0.3, -0.4, 0.5);
        let back = r.inverse().apply(&r.apply(&v));
        assert!((back.x - v.x).abs() < 1e-12);
        assert!((back.y - v.y).abs() < 1e-12);
        assert!((back.z - v.z).abs() < 1e-12);
    }

    #[test]
    fn frame_compose_apply() {
        let f = Frame::new(
            Rotation::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), std::f64::consts::PI),
            Vector3::new(1.0, 0.0, 0.0),
        );
        let p = f.apply(&Vector3::new(1.0, 0.0, 0.0));
        assert!((p.x - 0.0).abs() < 1e-12);
        assert!((p.y - 0.0).abs() < 1e-12);

        let id = Frame::IDENTITY.compose(&Frame::IDENTITY);
        assert_eq!(id, Frame::IDENTITY);
    }

    #[test]
    fn twist_ops() {
        let t = Twist::new(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 2.0));
        let d = t.add(&t).scale(0.5);
        assert_eq!(d, t);
    }
}
