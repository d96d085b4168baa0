use std::collections::HashSet;

use glam::Vec3;
use vkcts_rt::{BottomLevelBuilder, BuildType, GeometryBuilder, Triangle};

#[test]
fn walk_starts_at_origin_and_steps_by_thirteen() {
    let mut walk = GeometryBuilder::new(8, 8);

    assert_eq!(walk.next_cell(), (0, 0));
    // 13 * 1 mod 64 = 13
    assert_eq!(walk.next_cell(), (5, 1));
    // 13 * 14 mod 64 = 54
    assert_eq!(walk.next_cell(), (6, 6));
}

#[test]
fn walk_visits_every_cell_once() {
    for (width, height) in [(8, 8), (64, 64), (16, 4)] {
        let mut walk = GeometryBuilder::new(width, height);
        let cells: HashSet<(u32, u32)> = (0..width * height).map(|_| walk.next_cell()).collect();
        assert_eq!(cells.len(), (width * height) as usize);
    }
}

#[test]
fn triangle_spans_lower_corners_and_upper_midpoint() {
    let mut walk = GeometryBuilder::new(8, 8);
    let first = walk.next_triangle();

    assert_eq!(
        first,
        Triangle {
            vertices: [
                Vec3::new(0.0, 0.0, -1.0),
                Vec3::new(0.125, 0.0, -1.0),
                Vec3::new(0.0625, 0.125, -1.0),
            ],
        }
    );

    let second = walk.next_triangle();
    assert_eq!(second.vertices[0], Vec3::new(5.0 / 8.0, 1.0 / 8.0, -1.0));
    assert!(second.vertices.iter().all(|v| v.z == -1.0));
}

#[test]
fn geometry_is_deterministic() {
    let first = GeometryBuilder::new(64, 64).build_geometry(4096);
    let second = GeometryBuilder::new(64, 64).build_geometry(4096);

    assert_eq!(
        bytemuck::cast_slice::<Triangle, u8>(&first),
        bytemuck::cast_slice::<Triangle, u8>(&second)
    );
}

#[test]
fn geometries_continue_the_walk() {
    let mut shared = GeometryBuilder::new(8, 8);
    let mut builder = BottomLevelBuilder::new(BuildType::Host);
    builder.add_geometries(&mut shared, 4, 16);

    assert_eq!(builder.geometry_count(), 4);
    assert_eq!(builder.primitive_count(), 64);

    let all = GeometryBuilder::new(8, 8).build_geometry(64);
    let mut rest = GeometryBuilder::new(8, 8);
    let split: Vec<Triangle> = (0..4).flat_map(|_| rest.build_geometry(16)).collect();
    assert_eq!(all, split);
}

#[test]
#[should_panic]
fn empty_grid_panics() {
    let _ = GeometryBuilder::new(0, 8);
}
