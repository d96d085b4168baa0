//! Deterministic triangle geometry.
use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Depth of the plane all triangles lie on.
const DEPTH: f32 = -1.0;

/// Multiplier of the walk over the cells.
const STEP: u64 = 13;

/// One triangle in a unit cell of the image grid.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Triangle {
    /// The three vertices in normalized image coordinates.
    pub vertices: [Vec3; 3],
}

/// Emits triangles by walking over the cells of a `width` x `height` grid.
///
/// The walk starts at cell (0, 0). After emitting the triangle of cell `n = width * y + x`
/// it continues at cell `(13 * (n + 1)) mod (width * height)`. The walk is shared by all
/// geometries built from the same builder, so consecutive geometries cover distinct cells.
#[derive(Clone, Debug)]
pub struct GeometryBuilder {
    width: u32,
    height: u32,
    x: u32,
    y: u32,
}

impl GeometryBuilder {
    /// Creates a builder for a grid of the given size. The walk starts at cell (0, 0).
    pub fn new(width: u32, height: u32) -> Self {
        assert!(width > 0 && height > 0, "grid must not be empty");
        Self {
            width,
            height,
            x: 0,
            y: 0,
        }
    }

    /// Returns the current cell and advances the walk.
    pub fn next_cell(&mut self) -> (u32, u32) {
        let cell = (self.x, self.y);

        let cells = u64::from(self.width) * u64::from(self.height);
        let n = u64::from(self.width) * u64::from(self.y) + u64::from(self.x);
        let m = (STEP * (n + 1)) % cells;
        // Both values are below width and height.
        self.x = (m % u64::from(self.width)) as u32;
        self.y = (m / u64::from(self.width)) as u32;

        cell
    }

    /// Returns the triangle of the current cell and advances the walk.
    ///
    /// The triangle spans the two lower corners of the cell and the middle of its upper edge.
    pub fn next_triangle(&mut self) -> Triangle {
        let (x, y) = self.next_cell();
        let w = self.width as f32;
        let h = self.height as f32;
        let x = x as f32;
        let y = y as f32;

        Triangle {
            vertices: [
                Vec3::new(x / w, y / h, DEPTH),
                Vec3::new((x + 1.0) / w, y / h, DEPTH),
                Vec3::new((x + 0.5) / w, (y + 1.0) / h, DEPTH),
            ],
        }
    }

    /// Emits the next `squares` triangles as one geometry.
    pub fn build_geometry(&mut self, squares: u32) -> Vec<Triangle> {
        (0..squares).map(|_| self.next_triangle()).collect()
    }
}
