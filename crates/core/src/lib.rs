//! `structval-core`: structural value semantics for immutable types.
//!
//! For every value type the engine synthesizes, once, and caches for the life
//! of the process:
//! - deep structural equality ([`equals`]),
//! - a hash consistent with that equality ([`hash_of`]),
//! - `evolve`: a copy with one named field replaced, rebuilt through the
//!   type's canonical constructor ([`evolve`]).
//!
//! Types describe their fields and constructor through [`Structural`], usually
//! via the [`value_object!`] macro.

mod cache;
pub mod classify;
pub mod descriptor;
pub mod equality;
pub mod error;
pub mod evolve;
pub mod hash;
pub mod reflect;
pub mod value_object;

pub use cache::TypeSlots;
pub use classify::{ClassificationKind, FieldClassification, classify};
pub use descriptor::{
    Arguments, Declaration, DescriptorSummary, FieldDescriptor, FieldSummary, Structural, TypeDescriptor, describe,
};
pub use equality::{EqualsFn, equals};
pub use error::{ValueObjectError, ValueResult};
pub use evolve::{EvolvePlan, evolve};
pub use hash::{HashFnOf, hash_of};
pub use reflect::{OrderedContainer, Reflect, TypeHandle};
pub use value_object::{ValueObject, structural_eq, structural_hash, verify};
