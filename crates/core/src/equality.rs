//! Equality synthesis.
//!
//! Builds one composite comparison per type from its classified fields: the
//! conjunction, in declaration order, of a per-field comparator chosen by
//! classification. The result is cached process-wide and is pure.

use core::any::{Any, type_name};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::cache::SynthesisCache;
use crate::classify::{FieldClassification, StrategyError, classify};
use crate::descriptor::{Structural, TypeDescriptor, describe};
use crate::error::ValueResult;
use crate::reflect::{ElementFn, EqFn, LenFn, ProjectFn, TypeHandle};

static EQUALITY: Lazy<SynthesisCache> = Lazy::new(|| SynthesisCache::new("equality"));

type Compare<T> = dyn Fn(&T, &T) -> bool + Send + Sync;

/// Synthesized structural equality for `T`.
pub struct EqualsFn<T>(Box<Compare<T>>);

impl<T> EqualsFn<T> {
    pub fn call(&self, one: &T, other: &T) -> bool {
        (self.0)(one, other)
    }
}

enum Comparator {
    Equals(EqFn),
    Sequence {
        len: LenFn,
        element_at: ElementFn,
        element: Box<Comparator>,
    },
    Nullable {
        project: ProjectFn,
        inner: Box<Comparator>,
    },
}

impl Comparator {
    fn build(handle: &TypeHandle) -> Result<Self, StrategyError> {
        // both null: equal; one null: unequal; otherwise compare payloads
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
                let equality = handle.equality().ok_or("type advertises no equality")?;
                if let Some(prepare) = handle.prepare() {
                    prepare()?;
                }
                Ok(Self::Equals(equality.eq))
            }
            FieldClassification::Unsupported => {
                Err("type is not a sequence, not a value kind, and has no self-equality".into())
            }
        }
    }

    fn eq(&self, one: &dyn Any, other: &dyn Any) -> bool {
        match self {
            Self::Equals(eq) => eq(one, other),
            Self::Sequence {
                len,
                element_at,
                element,
            } => {
                let count = len(one);
                count == len(other)
                    && (0..count).all(|index| match (element_at(one, index), element_at(other, index)) {
                        (Some(a), Some(b)) => element.eq(a, b),
                        _ => false,
                    })
            }
            Self::Nullable { project, inner } => match (project(one), project(other)) {
                (None, None) => true,
                (Some(a), Some(b)) => inner.eq(a, b),
                _ => false,
            },
        }
    }
}

/// Build the equality function for a described type.
pub fn synthesize_equals<T: 'static>(descriptor: Arc<TypeDescriptor<T>>) -> ValueResult<EqualsFn<T>> {
    if descriptor.fields().is_empty() {
        return Ok(EqualsFn(Box::new(|_: &T, _: &T| true)));
    }

    let comparators = descriptor
        .fields()
        .iter()
        .map(|field| {
            Comparator::build(field.declared_type()).map_err(|err| {
                err.for_field(descriptor.type_name(), field.name(), field.declared_type().name())
            })
        })
        .collect::<ValueResult<Vec<_>>>()?;

    Ok(EqualsFn(Box::new(move |one: &T, other: &T| {
        descriptor
            .fields()
            .iter()
            .zip(&comparators)
            .all(|(field, comparator)| comparator.eq(field.value(one), field.value(other)))
    })))
}

/// Fetch (or synthesize on first use) the equality function for `T`.
pub fn equals_fn<T: Structural>() -> ValueResult<Arc<EqualsFn<T>>> {
    EQUALITY.get_or_try_init_in::<T, _, _>(T::slots().map(|slots| &slots.equality), || {
        let type_name = type_name::<T>();
        let descriptor = describe::<T>()?;
        let fields = descriptor.fields().len();
        synthesize_equals(descriptor)
            .inspect(|_| tracing::debug!(type_name, fields, "synthesized equality"))
            .inspect_err(|err| tracing::warn!(type_name, error = %err, "equality synthesis failed"))
    })
}

/// Whether equality for `T` has already been published.
pub(crate) fn is_synthesized<T: Structural>() -> bool {
    match T::slots() {
        Some(slots) => slots.equality.get().is_some(),
        None => EQUALITY.contains::<T>(),
    }
}

/// Structural equality of two instances of `T`.
///
/// Once `T` is known to be comparable, an instance compared with itself is
/// equal without touching any field.
pub fn equals<T: Structural>(one: &T, other: &T) -> ValueResult<bool> {
    let compare = equals_fn::<T>()?;
    if core::ptr::eq(one, other) {
        return Ok(true);
    }
    Ok(compare.call(one, other))
}
