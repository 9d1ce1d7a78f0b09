//! 2D Vector
//!
//! Continuous world-space vector used for object positions, camera offsets
//! and view interpolation. Serializes with an explicit `Vector2` type tag so
//! snapshots stay self-describing.

use std::fmt;
use std::ops::{Add, Sub, Neg, Mul};
use serde::{Serialize, Deserialize, Serializer, Deserializer};
use serde::de::Error as _;

use super::tagged::VECTOR2_TAG;

/// 2D vector with `f64` components.
#[derive(Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
}

impl Vec2 {
    /// Zero vector
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Unit vector pointing right (+X)
    pub const RIGHT: Self = Self { x: 1.0, y: 0.0 };

    /// Unit vector pointing up (+Y)
    pub const UP: Self = Self { x: 0.0, y: 1.0 };

    /// Unit vector pointing left (-X)
    pub const LEFT: Self = Self { x: -1.0, y: 0.0 };

    /// Unit vector pointing down (-Y)
    pub const DOWN: Self = Self { x: 0.0, y: -1.0 };

    /// Create a new vector.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Scale by a scalar.
    #[inline]
    pub fn scale(self, scalar: f64) -> Self {
        Self { x: self.x * scalar, y: self.y * scalar }
    }

    /// Squared length.
    #[inline]
    pub fn length_squared(self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Length (magnitude).
    #[inline]
    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(self, other: Self) -> f64 {
        (self - other).length()
    }

    /// Normalize to unit length. Returns ZERO if length is zero.
    #[inline]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            return Self::ZERO;
        }
        self.scale(1.0 / len)
    }

    /// Dot product.
    #[inline]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Rotate counter-clockwise by `angle` radians.
    #[inline]
    pub fn rotated(self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }

    /// Linear interpolation. `t = 0` returns self, `t = 1` returns other.
    #[inline]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

impl Add for Vec2 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: f64) -> Self {
        self.scale(rhs)
    }
}

impl Neg for Vec2 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl fmt::Debug for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vec2({:.3}, {:.3})", self.x, self.y)
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

// =============================================================================
// SERDE: {"_type": "Vector2", "x": .., "y": ..}
// =============================================================================

#[derive(Serialize, Deserialize)]
struct TaggedVec2 {
    #[serde(rename = "_type")]
    kind: String,
    x: f64,
    y: f64,
}

impl Serialize for Vec2 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TaggedVec2 { kind: VECTOR2_TAG.to_string(), x: self.x, y: self.y }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Vec2 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tagged = TaggedVec2::deserialize(deserializer)?;
        if tagged.kind != VECTOR2_TAG {
            return Err(D::Error::custom(format!(
                "expected _type {VECTOR2_TAG}, found {}",
                tagged.kind
            )));
        }
        Ok(Vec2::new(tagged.x, tagged.y))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec2_arithmetic() {
        let a = Vec2::new(3.0, 4.0);
        let b = Vec2::new(1.0, 2.0);
        assert_eq!(a + b, Vec2::new(4.0, 6.0));
        assert_eq!(a - b, Vec2::new(2.0, 2.0));
        assert_eq!(a * 2.0, Vec2::new(6.0, 8.0));
        assert_eq!(-b, Vec2::new(-1.0, -2.0));
        assert_eq!(a.length(), 5.0);
        assert_eq!(a.dot(b), 11.0);
    }

    #[test]
    fn test_vec2_lerp() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, -10.0);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
        assert_eq!(a.lerp(b, 0.5), Vec2::new(5.0, -5.0));
    }

    #[test]
    fn test_vec2_normalize_zero() {
        assert_eq!(Vec2::ZERO.normalize(), Vec2::ZERO);
        let n = Vec2::new(0.0, 3.0).normalize();
        assert!((n.length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_vec2_tagged_json() {
        let json = serde_json::to_value(Vec2::new(1.5, -2.0)).unwrap();
        assert_eq!(json, serde_json::json!({"_type": "Vector2", "x": 1.5, "y": -2.0}));

        let back: Vec2 = serde_json::from_value(json).unwrap();
        assert_eq!(back, Vec2::new(1.5, -2.0));
    }

    #[test]
    fn test_vec2_rejects_wrong_tag() {
        let json = serde_json::json!({"_type": "set", "x": 1.0, "y": 2.0});
        assert!(serde_json::from_value::<Vec2>(json).is_err());
    }
}
