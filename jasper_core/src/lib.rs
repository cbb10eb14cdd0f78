//! Core types shared by the jasper virtual machine crates.
//!
//! This crate is a leaf: it knows nothing about heap objects, classes, or
//! threads. It defines the slot tagging scheme used by the interpreter
//! stack, the canonical opcode numbering, primitive type codes, and method
//! descriptor parsing.

pub mod descriptor;
pub mod error;
pub mod opcode;
pub mod types;

pub use descriptor::{parameter_count, parameter_footprint, return_code, DescriptorCursor};
pub use error::DescriptorError;
pub use opcode::Opcode;
pub use types::{NativeType, TypeCode};

/// Slot tag for 32-bit primitive words (and halves of long/double).
///
/// Must be zero: a freshly zero-filled locals area reads back as int slots.
pub const INT_TAG: usize = 0;

/// Slot tag for object references. Only slots carrying this tag are
/// visited as heap roots.
pub const OBJECT_TAG: usize = 1;
