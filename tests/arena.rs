use vkcts_rt::{Arena, CtsError};

#[test]
fn insert_and_get() {
    let mut arena = Arena::new();
    let a = arena.insert("a");
    let b = arena.insert("b");

    assert_eq!(*arena.get(a).unwrap(), "a");
    assert_eq!(*arena.get(b).unwrap(), "b");
    assert_eq!(arena.len(), 2);

    *arena.get_mut(a).unwrap() = "c";
    assert_eq!(*arena.get(a).unwrap(), "c");
}

#[test]
fn value_lives_until_last_release() {
    let mut arena = Arena::new();
    let handle = arena.insert(String::from("blas"));
    arena.retain(handle).unwrap();
    assert_eq!(arena.ref_count(handle).unwrap(), 2);

    assert_eq!(arena.release(handle).unwrap(), None);
    assert!(arena.contains(handle));

    assert_eq!(arena.release(handle).unwrap(), Some(String::from("blas")));
    assert!(!arena.contains(handle));
    assert!(arena.is_empty());
}

#[test]
fn stale_handle_is_rejected_after_reuse() {
    let mut arena = Arena::new();
    let old = arena.insert(1u32);
    arena.release(old).unwrap();

    let new = arena.insert(2u32);
    assert_ne!(old, new);
    assert_eq!(*arena.get(new).unwrap(), 2);

    assert!(matches!(arena.get(old), Err(CtsError::InvalidHandle)));
    assert!(matches!(arena.retain(old), Err(CtsError::InvalidHandle)));
    assert!(matches!(arena.release(old), Err(CtsError::InvalidHandle)));
    assert_eq!(arena.ref_count(new).unwrap(), 1);
}
