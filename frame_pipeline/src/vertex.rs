/// Vertex formats and the sample triangle

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

use crate::graphics_device::{InputElement, VertexFormat};

/// Position + RGBA color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl ColorVertex {
    pub fn new(position: Vec3, color: Vec4) -> Self {
        Self {
            position: position.to_array(),
            color: color.to_array(),
        }
    }

    /// POSITION at 0, COLOR at 12
    pub fn input_layout() -> Vec<InputElement> {
        vec![
            InputElement {
                semantic: "POSITION",
                semantic_index: 0,
                format: VertexFormat::R32G32B32_FLOAT,
                offset: 0,
                location: 0,
            },
            InputElement {
                semantic: "COLOR",
                semantic_index: 0,
                format: VertexFormat::R32G32B32A32_FLOAT,
                offset: 12,
                location: 1,
            },
        ]
    }
}

/// Position + texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl TexturedVertex {
    pub fn new(position: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            uv: uv.to_array(),
        }
    }

    /// POSITION at 0, TEXCOORD at 12
    pub fn input_layout() -> Vec<InputElement> {
        vec![
            InputElement {
                semantic: "POSITION",
                semantic_index: 0,
                format: VertexFormat::R32G32B32_FLOAT,
                offset: 0,
                location: 0,
            },
            InputElement {
                semantic: "TEXCOORD",
                semantic_index: 0,
                format: VertexFormat::R32G32_FLOAT,
                offset: 12,
                location: 1,
            },
        ]
    }
}

fn triangle_positions(aspect_ratio: f32) -> [Vec3; 3] {
    [
        Vec3::new(0.0, 0.25 * aspect_ratio, 0.0),
        Vec3::new(0.25, -0.25 * aspect_ratio, 0.0),
        Vec3::new(-0.25, -0.25 * aspect_ratio, 0.0),
    ]
}

/// Red, green, blue triangle scaled by the surface aspect ratio
pub fn triangle_colored(aspect_ratio: f32) -> [ColorVertex; 3] {
    let [top, right, left] = triangle_positions(aspect_ratio);
    [
        ColorVertex::new(top, Vec4::new(1.0, 0.0, 0.0, 1.0)),
        ColorVertex::new(right, Vec4::new(0.0, 1.0, 0.0, 1.0)),
        ColorVertex::new(left, Vec4::new(0.0, 0.0, 1.0, 1.0)),
    ]
}

/// Textured triangle scaled by the surface aspect ratio
pub fn triangle_textured(aspect_ratio: f32) -> [TexturedVertex; 3] {
    let [top, right, left] = triangle_positions(aspect_ratio);
    [
        TexturedVertex::new(top, Vec2::new(0.5, 0.0)),
        TexturedVertex::new(right, Vec2::new(1.0, 1.0)),
        TexturedVertex::new(left, Vec2::new(0.0, 1.0)),
    ]
}

#[cfg(test)]
#[path = "vertex_tests.rs"]
mod tests;
