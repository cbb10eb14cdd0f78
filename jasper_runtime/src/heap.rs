//! The object heap.
//!
//! Allocation pins objects for the process lifetime; reclamation belongs
//! to a collector, which is a separate concern with its own interface.
//! The heap keeps allocation accounting so embedders can watch growth.

use crate::object::Object;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct Heap {
    object_count: AtomicUsize,
}

impl Heap {
    pub fn new() -> Heap {
        Heap::default()
    }

    /// Allocate and pin an object.
    pub fn pin(&self, object: Object) -> &'static Object {
        self.object_count.fetch_add(1, Ordering::Relaxed);
        Box::leak(Box::new(object))
    }

    /// Number of objects allocated so far.
    pub fn object_count(&self) -> usize {
        self.object_count.load(Ordering::Relaxed)
    }
}
