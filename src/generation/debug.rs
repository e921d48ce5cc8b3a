//! Debug drawing sink for the generation pipeline.
//!
//! The driver reports intermediate geometry (feature curves, placed surface
//! points, faces boundary recovery could not restore) through
//! [`DebugRenderer`]. Nothing in the pipeline reads back from the sink, so
//! [`NullDebugRenderer`] produces the same mesh as any other renderer.

use nalgebra::Point3;

/// Linear RGB color.
pub type Color = [f32; 3];

pub const RED: Color = [1.0, 0.0, 0.0];
pub const GREEN: Color = [0.0, 1.0, 0.0];
pub const BLUE: Color = [0.0, 0.0, 1.0];

/// Receiver of debug geometry.
pub trait DebugRenderer {
    fn line(&mut self, a: &Point3<f64>, b: &Point3<f64>, color: Color);
    fn triangle(&mut self, a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, color: Color);
    fn point(&mut self, p: &Point3<f64>, color: Color);
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDebugRenderer;

impl DebugRenderer for NullDebugRenderer {
    fn line(&mut self, _: &Point3<f64>, _: &Point3<f64>, _: Color) {}
    fn triangle(&mut self, _: &Point3<f64>, _: &Point3<f64>, _: &Point3<f64>, _: Color) {}
    fn point(&mut self, _: &Point3<f64>, _: Color) {}
}

/// A recorded draw call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DebugPrimitive {
    Line([Point3<f64>; 2], Color),
    Triangle([Point3<f64>; 3], Color),
    Point(Point3<f64>, Color),
}

/// Keeps every draw call in order, for tests and offline inspection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordingDebugRenderer {
    pub primitives: Vec<DebugPrimitive>,
}

impl RecordingDebugRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn number_of_lines(&self) -> usize {
        self.primitives
            .iter()
            .filter(|p| matches!(p, DebugPrimitive::Line(..)))
            .count()
    }

    #[must_use]
    pub fn number_of_triangles(&self) -> usize {
        self.primitives
            .iter()
            .filter(|p| matches!(p, DebugPrimitive::Triangle(..)))
            .count()
    }

    #[must_use]
    pub fn number_of_points(&self) -> usize {
        self.primitives
            .iter()
            .filter(|p| matches!(p, DebugPrimitive::Point(..)))
            .count()
    }
}

impl DebugRenderer for RecordingDebugRenderer {
    fn line(&mut self, a: &Point3<f64>, b: &Point3<f64>, color: Color) {
        self.primitives.push(DebugPrimitive::Line([*a, *b], color));
    }

    fn triangle(&mut self, a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, color: Color) {
        self.primitives.push(DebugPrimitive::Triangle([*a, *b, *c], color));
    }

    fn point(&mut self, p: &Point3<f64>, color: Color) {
        self.primitives.push(DebugPrimitive::Point(*p, color));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_keeps_order() {
        let mut r = RecordingDebugRenderer::new();
        let o = Point3::origin();
        let x = Point3::new(1.0, 0.0, 0.0);
        r.point(&o, RED);
        r.line(&o, &x, GREEN);
        r.triangle(&o, &x, &Point3::new(0.0, 1.0, 0.0), BLUE);
        assert_eq!(r.primitives[0], DebugPrimitive::Point(o, RED));
        assert_eq!(r.number_of_points(), 1);
        assert_eq!(r.number_of_lines(), 1);
        assert_eq!(r.number_of_triangles(), 1);
    }
}
