use glam::{Mat4, Vec3};
use vkcts_rt::TransformMatrix;

#[test]
fn identity_is_the_default() {
    assert_eq!(TransformMatrix::default(), TransformMatrix::IDENTITY);
    assert_eq!(
        TransformMatrix::from_mat4(&Mat4::IDENTITY),
        TransformMatrix::IDENTITY
    );
}

#[test]
fn translation_lands_in_the_last_column() {
    let transform = TransformMatrix::from_mat4(&Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));

    assert_eq!(
        transform,
        TransformMatrix([
            [1.0, 0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0, 2.0],
            [0.0, 0.0, 1.0, 3.0],
        ])
    );
    assert_eq!(std::mem::size_of::<TransformMatrix>(), 48);
}
