//! Plain data types shared by the command queue and the render job.

use bytemuck::{Pod, Zeroable};

/// Number of vertices emitted per rectangle: two triangles.
pub const N_VERTICES: usize = 6;

/// A vertex as uploaded to the GPU.
///
/// Attribute 0 is `position`, attribute 1 is `uv`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    /// Position in the local space of the draw (before the modelview).
    pub position: [f32; 2],
    /// Texture coordinate in `[0, 1]`.
    pub uv: [f32; 2],
}

impl Vertex {
    /// Create a vertex from a position and texture coordinate.
    #[must_use]
    pub const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self {
            position: [x, y],
            uv: [u, v],
        }
    }
}

/// A straight (non-premultiplied) RGBA color.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Color {
    /// Red channel.
    pub r: f32,
    /// Green channel.
    pub g: f32,
    /// Blue channel.
    pub b: f32,
    /// Alpha channel.
    pub a: f32,
}

impl Color {
    /// Create a color from its four channels.
    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// The color as `[r, g, b, a]`.
    #[must_use]
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// One stop of a linear gradient.
///
/// Laid out as five consecutive floats, which is how the stops are uploaded.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ColorStop {
    /// Position along the gradient line in `[0, 1]`.
    pub offset: f32,
    /// Color at this stop.
    pub color: Color,
}

impl ColorStop {
    /// Create a color stop.
    #[must_use]
    pub const fn new(offset: f32, color: Color) -> Self {
        Self { offset, color }
    }
}

/// Texture sampling filter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    /// `GL_LINEAR`.
    Linear,
    /// `GL_NEAREST`.
    Nearest,
}

impl Filter {
    /// The GL enum value for this filter.
    #[must_use]
    pub const fn to_gl(self) -> u32 {
        match self {
            Self::Linear => glow::LINEAR,
            Self::Nearest => glow::NEAREST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<Vertex>(), 16);
        assert_eq!(std::mem::offset_of!(Vertex, uv), 8);
    }

    #[test]
    fn color_stops_cast_to_five_floats_each() {
        let stops = [
            ColorStop::new(0.0, Color::new(1.0, 0.0, 0.0, 1.0)),
            ColorStop::new(1.0, Color::new(0.0, 0.0, 1.0, 0.5)),
        ];
        let floats: &[f32] = bytemuck::cast_slice(&stops);
        assert_eq!(floats, &[0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.5]);
    }
}
