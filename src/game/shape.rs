//! Collision Shapes
//!
//! Geometric primitives attached to an object. Only the collision type is
//! consulted by the grid physics; geometry is carried for renderers and
//! snapshot fidelity.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;

/// Tag selecting the collision callback for a pair of shapes.
pub type CollisionType = u32;

/// Collision type of plain solid shapes.
pub const COLLISION_DEFAULT: CollisionType = 1;

/// Collision type of sensor shapes (never block on their own).
pub const COLLISION_SENSOR: CollisionType = 2;

/// Shape geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Geometry {
    /// Circle centred on the owner.
    Circle {
        /// Radius in world units
        radius: f64,
    },
    /// Convex polygon, vertices relative to the owner.
    Polygon {
        /// Vertices in winding order
        vertices: Vec<Vec2>,
    },
    /// Thick segment.
    Line {
        /// Start point
        a: Vec2,
        /// End point
        b: Vec2,
        /// Half thickness
        radius: f64,
    },
}

/// A shape owned by exactly one object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    /// Label, unique within the owner's shape group
    pub label: String,
    /// Collision type tag
    pub collision_type: CollisionType,
    /// Sensor shapes report overlap but are not solid
    pub sensor: bool,
    /// Geometry
    pub geometry: Geometry,
}

impl Shape {
    /// Shape with the default label and collision type.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            label: "default".to_string(),
            collision_type: COLLISION_DEFAULT,
            sensor: false,
            geometry,
        }
    }

    /// Circle of `radius`.
    pub fn circle(radius: f64) -> Self {
        Self::new(Geometry::Circle { radius })
    }

    /// Axis-aligned rectangle centred on `center`.
    pub fn rectangle(center: Vec2, width: f64, height: f64) -> Self {
        let w = width / 2.0;
        let h = height / 2.0;
        Self::new(Geometry::Polygon {
            vertices: vec![
                Vec2::new(center.x - w, center.y + h),
                Vec2::new(center.x + w, center.y + h),
                Vec2::new(center.x + w, center.y - h),
                Vec2::new(center.x - w, center.y - h),
            ],
        })
    }

    /// Segment from `a` to `b`.
    pub fn line(a: Vec2, b: Vec2, radius: f64) -> Self {
        Self::new(Geometry::Line { a, b, radius })
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the collision type. The sensor type also marks the shape as a sensor.
    pub fn with_collision_type(mut self, collision_type: CollisionType) -> Self {
        self.collision_type = collision_type;
        if collision_type == COLLISION_SENSOR {
            self.sensor = true;
        }
        self
    }
}

/// Shapes of one object, keyed by label.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeGroup {
    shapes: BTreeMap<String, Shape>,
}

impl ShapeGroup {
    /// Add a shape, replacing any shape with the same label.
    pub fn add(&mut self, shape: Shape) {
        self.shapes.insert(shape.label.clone(), shape);
    }

    /// Remove by label.
    pub fn remove(&mut self, label: &str) -> Option<Shape> {
        self.shapes.remove(label)
    }

    /// Shape by label.
    pub fn get(&self, label: &str) -> Option<&Shape> {
        self.shapes.get(label)
    }

    /// All shapes in label order.
    pub fn iter(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.values()
    }

    /// Collision types present in the group, in label order.
    pub fn collision_types(&self) -> Vec<CollisionType> {
        self.shapes.values().map(|s| s.collision_type).collect()
    }

    /// Number of shapes.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// True when the group has no shapes.
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}
