//! Axis-aligned hitboxes and the pairwise collision engine

use crate::game::object::{GameObject, ObjectKind};

/// Axis-aligned rectangle used for overlap testing. Purely geometric;
/// positions live in the same coordinate space as the owning object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hitbox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Hitbox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Strict overlap on both axes; touching edges do not collide
    pub fn overlaps(&self, other: &Hitbox) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }
}

/// Per-tick collision result, indexed like the object slice it was computed
/// from. Rebuilt every tick and discarded; never carried across ticks.
#[derive(Debug, Default)]
pub struct CollisionSet {
    colliding: Vec<Vec<usize>>,
}

impl CollisionSet {
    fn with_len(len: usize) -> Self {
        Self {
            colliding: vec![Vec::new(); len],
        }
    }

    fn record(&mut self, a: usize, b: usize) {
        self.colliding[a].push(b);
        self.colliding[b].push(a);
    }

    /// Indices of the objects colliding with `index` this tick
    pub fn colliding_with(&self, index: usize) -> &[usize] {
        &self.colliding[index]
    }

    pub fn is_colliding(&self, index: usize) -> bool {
        !self.colliding[index].is_empty()
    }
}

/// Pairwise collision detection over object hitboxes.
///
/// Quadratic over objects and their hitboxes, which is fine at the object
/// counts a match holds; the contract leaves room to put a spatial index
/// behind `compute` without touching callers.
pub struct CollisionEngine;

impl CollisionEngine {
    /// Test every unordered object pair, skipping excluded kinds, and
    /// record overlapping pairs in both directions. No side effects:
    /// collision response belongs to each object's `update`.
    pub fn compute(objects: &[Box<dyn GameObject>]) -> CollisionSet {
        let mut set = CollisionSet::with_len(objects.len());

        for a in 0..objects.len() {
            for b in (a + 1)..objects.len() {
                if Self::excluded(objects[a].as_ref(), objects[b].as_ref()) {
                    continue;
                }

                if Self::any_hitbox_overlap(objects[a].as_ref(), objects[b].as_ref()) {
                    set.record(a, b);
                }
            }
        }

        set
    }

    /// A pair is skipped when either side excludes the other's kind
    fn excluded(a: &dyn GameObject, b: &dyn GameObject) -> bool {
        a.body().collision_exclusions.contains(&b.kind())
            || b.body().collision_exclusions.contains(&a.kind())
    }

    fn any_hitbox_overlap(a: &dyn GameObject, b: &dyn GameObject) -> bool {
        a.body()
            .hitboxes
            .iter()
            .any(|ha| b.body().hitboxes.iter().any(|hb| ha.overlaps(hb)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::object::ObjectBody;

    struct TestObject {
        body: ObjectBody,
        kind: ObjectKind,
    }

    impl TestObject {
        fn at(kind: ObjectKind, x: f64, y: f64) -> Self {
            let mut body = ObjectBody::new(x, y, 0.0, 1.0);
            body.hitboxes = vec![Hitbox::new(x, y, 10.0, 10.0)];
            Self { body, kind }
        }
    }

    impl GameObject for TestObject {
        fn kind(&self) -> ObjectKind {
            self.kind
        }

        fn body(&self) -> &ObjectBody {
            &self.body
        }

        fn body_mut(&mut self) -> &mut ObjectBody {
            &mut self.body
        }

        fn update(&mut self, _contacts: &[ObjectKind]) {}
    }

    #[test]
    fn overlapping_hitboxes_collide() {
        let a = Hitbox::new(0.0, 0.0, 10.0, 10.0);
        let b = Hitbox::new(5.0, 5.0, 10.0, 10.0);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn edge_touching_hitboxes_do_not_collide() {
        let a = Hitbox::new(0.0, 0.0, 10.0, 10.0);
        assert!(!a.overlaps(&Hitbox::new(10.0, 10.0, 10.0, 10.0)));
        assert!(!a.overlaps(&Hitbox::new(10.0, 0.0, 10.0, 10.0)));
        assert!(!a.overlaps(&Hitbox::new(0.0, 10.0, 10.0, 10.0)));
    }

    #[test]
    fn disjoint_hitboxes_do_not_collide() {
        let a = Hitbox::new(0.0, 0.0, 10.0, 10.0);
        let b = Hitbox::new(25.0, 0.0, 10.0, 10.0);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn engine_records_pairs_in_both_directions() {
        let objects: Vec<Box<dyn GameObject>> = vec![
            Box::new(TestObject::at(ObjectKind::Car, 0.0, 0.0)),
            Box::new(TestObject::at(ObjectKind::Boundary, 5.0, 5.0)),
            Box::new(TestObject::at(ObjectKind::Boundary, 100.0, 100.0)),
        ];

        let set = CollisionEngine::compute(&objects);
        assert_eq!(set.colliding_with(0), &[1]);
        assert_eq!(set.colliding_with(1), &[0]);
        assert!(!set.is_colliding(2));
    }

    #[test]
    fn excluded_kinds_never_collide() {
        let mut a = TestObject::at(ObjectKind::Car, 0.0, 0.0);
        a.body.collision_exclusions.insert(ObjectKind::Car);
        let b = TestObject::at(ObjectKind::Car, 5.0, 5.0);

        // Hitboxes geometrically overlap, but the pair is filtered out
        let objects: Vec<Box<dyn GameObject>> = vec![Box::new(a), Box::new(b)];
        let set = CollisionEngine::compute(&objects);
        assert!(!set.is_colliding(0));
        assert!(!set.is_colliding(1));
    }

    #[test]
    fn exclusion_applies_from_either_side() {
        let a = TestObject::at(ObjectKind::Car, 0.0, 0.0);
        let mut b = TestObject::at(ObjectKind::Boundary, 5.0, 5.0);
        b.body.collision_exclusions.insert(ObjectKind::Car);

        let objects: Vec<Box<dyn GameObject>> = vec![Box::new(a), Box::new(b)];
        let set = CollisionEngine::compute(&objects);
        assert!(!set.is_colliding(0));
    }

    #[test]
    fn any_overlapping_hitbox_pair_counts() {
        let mut a = TestObject::at(ObjectKind::Car, 0.0, 0.0);
        a.body.hitboxes = vec![
            Hitbox::new(0.0, 0.0, 2.0, 2.0),
            Hitbox::new(50.0, 50.0, 10.0, 10.0),
        ];
        let b = TestObject::at(ObjectKind::Boundary, 55.0, 55.0);

        let objects: Vec<Box<dyn GameObject>> = vec![Box::new(a), Box::new(b)];
        let set = CollisionEngine::compute(&objects);
        assert!(set.is_colliding(0));
    }
}
