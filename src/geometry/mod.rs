mod bbox;

pub use bbox::{union_all, BBox, Predicate, EPSILON};

/// A simplified geometry handed to the façade: the engine only ever needs
/// the object's bounding box plus an external pointer, never the raw shape.
/// The geometry library that derives a `BBox` from an actual polygon is one
/// of the fixed external collaborators the core does not implement.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub bbox: BBox,
}

impl Geometry {
    pub fn new(bbox: BBox) -> Self {
        Self { bbox }
    }
}
