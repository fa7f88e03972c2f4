//! Hash synthesis.
//!
//! Fields are folded in declaration order with `acc = acc * 31 + field_hash`,
//! starting from a seed derived from the concrete type's identity. Sequences
//! fold their elements the same way from a fixed seed, and a null contributes
//! [`NULL_HASH`]. Everything equality treats as equal folds to the same value.

use core::any::{Any, TypeId, type_name};
use core::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::cache::SynthesisCache;
use crate::classify::{FieldClassification, StrategyError, classify};
use crate::descriptor::{Structural, TypeDescriptor, describe};
use crate::error::ValueResult;
use crate::reflect::{ElementFn, HashFn, LenFn, ProjectFn, TypeHandle};

static HASHES: Lazy<SynthesisCache> = Lazy::new(|| SynthesisCache::new("hash"));

/// Multiplier applied to the accumulator before each fold step.
pub const HASH_PRIME: u64 = 31;
/// Contribution of a null value.
pub const NULL_HASH: u64 = 0;
/// Starting accumulator for sequence fields.
pub const SEQUENCE_SEED: u64 = 1;

type HashOf<T> = dyn Fn(&T) -> u64 + Send + Sync;

/// Synthesized structural hash for `T`.
pub struct HashFnOf<T>(Box<HashOf<T>>);

impl<T> HashFnOf<T> {
    pub fn call(&self, instance: &T) -> u64 {
        (self.0)(instance)
    }
}

enum FieldHasher {
    Value(HashFn),
    Sequence {
        len: LenFn,
        element_at: ElementFn,
        element: Box<FieldHasher>,
    },
    Nullable {
        project: ProjectFn,
        inner: Box<FieldHasher>,
    },
}

impl FieldHasher {
    fn build(handle: &TypeHandle) -> Result<Self, StrategyError> {
        if let Some(view) = handle.nullable_view() {
            return Ok(Self::Nullable {
                project: view.project,
                inner: Box::new(Self::build(&view.inner)?),
            });
        }

        match classify(handle) {
            FieldClassification::OrderedSequence(element) => {
                let view = handle
                    .sequence_view()
                    .ok_or("classified as a sequence without a sequence view")?;
                Ok(Self::Sequence {
                    len: view.len,
                    element_at: view.element_at,
                    element: Box::new(Self::build(&element)?),
                })
            }
            FieldClassification::ValueEquatable | FieldClassification::CustomEquatable => {
                let hash = handle
                    .equality()
                    .and_then(|equality| equality.hash)
                    .ok_or("type advertises equality without a hash")?;
                if let Some(prepare) = handle.prepare() {
                    prepare()?;
                }
                Ok(Self::Value(hash))
            }
            FieldClassification::Unsupported => {
                Err("type is not a sequence, not a value kind, and has no self-equality".into())
            }
        }
    }

    fn hash(&self, value: &dyn Any) -> u64 {
        match self {
            Self::Value(hash) => hash(value),
            Self::Sequence {
                len,
                element_at,
                element,
            } => (0..len(value)).fold(SEQUENCE_SEED, |acc, index| {
                combine(acc, element_at(value, index).map_or(NULL_HASH, |e| element.hash(e)))
            }),
            Self::Nullable { project, inner } => project(value).map_or(NULL_HASH, |v| inner.hash(v)),
        }
    }
}

/// One fold step.
pub fn combine(acc: u64, hash: u64) -> u64 {
    acc.wrapping_mul(HASH_PRIME).wrapping_add(hash)
}

/// Seed for `T`'s field fold, distinct per concrete type.
pub fn type_seed<T: 'static>() -> u64 {
    let mut hasher = DefaultHasher::new();
    TypeId::of::<T>().hash(&mut hasher);
    hasher.finish()
}

/// Build the hash function for a described type.
pub fn synthesize_hash<T: 'static>(descriptor: Arc<TypeDescriptor<T>>) -> ValueResult<HashFnOf<T>> {
    let seed = type_seed::<T>();

    let hashers = descriptor
        .fields()
        .iter()
        .map(|field| {
            FieldHasher::build(field.declared_type()).map_err(|err| {
                err.for_field(descriptor.type_name(), field.name(), field.declared_type().name())
            })
        })
        .collect::<ValueResult<Vec<_>>>()?;

    Ok(HashFnOf(Box::new(move |instance: &T| {
        descriptor
            .fields()
            .iter()
            .zip(&hashers)
            .fold(seed, |acc, (field, hasher)| combine(acc, hasher.hash(field.value(instance))))
    })))
}

/// Fetch (or synthesize on first use) the hash function for `T`.
pub fn hash_fn<T: Structural>() -> ValueResult<Arc<HashFnOf<T>>> {
    HASHES.get_or_try_init_in::<T, _, _>(T::slots().map(|slots| &slots.hash), || {
        let type_name = type_name::<T>();
        let descriptor = describe::<T>()?;
        let fields = descriptor.fields().len();
        synthesize_hash(descriptor)
            .inspect(|_| tracing::debug!(type_name, fields, "synthesized hash"))
            .inspect_err(|err| tracing::warn!(type_name, error = %err, "hash synthesis failed"))
    })
}

/// Whether the hash for `T` has already been published.
pub(crate) fn is_synthesized<T: Structural>() -> bool {
    match T::slots() {
        Some(slots) => slots.hash.get().is_some(),
        None => HASHES.contains::<T>(),
    }
}

/// Structural hash of an instance of `T`.
pub fn hash_of<T: Structural>(instance: &T) -> ValueResult<u64> {
    Ok(hash_fn::<T>()?.call(instance))
}
