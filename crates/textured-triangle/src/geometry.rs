/// Vertex layout consumed by the pipeline: `POSITION` (3 floats) followed by
/// `TEXCOORD` (2 floats).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

pub const POSITION_OFFSET: u32 = 0;
pub const TEXCOORD_OFFSET: u32 = std::mem::size_of::<[f32; 3]>() as u32;
pub const VERTEX_STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

pub const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [0.0, 0.5, 0.0],
        uv: [0.5, 0.0],
    },
    Vertex {
        position: [0.5, -0.5, 0.0],
        uv: [1.0, 1.0],
    },
    Vertex {
        position: [-0.5, -0.5, 0.0],
        uv: [0.0, 1.0],
    },
];

pub const TRIANGLE_VERTEX_COUNT: u32 = TRIANGLE.len() as u32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_input_elements() {
        assert_eq!(VERTEX_STRIDE, 20);
        assert_eq!(TEXCOORD_OFFSET, 12);
        assert_eq!(std::mem::offset_of!(Vertex, uv) as u32, TEXCOORD_OFFSET);
        assert_eq!(std::mem::offset_of!(Vertex, position) as u32, POSITION_OFFSET);
    }

    #[test]
    fn triangle_uvs_stay_inside_the_texture() {
        for vertex in TRIANGLE {
            assert!(vertex.uv.iter().all(|c| (0.0..=1.0).contains(c)));
        }
    }
}
