//! Runtime type handles.
//!
//! A [`TypeHandle`] is the engine's view of a field's declared type: its
//! identity and name plus the capabilities it advertises (value kind,
//! self-equality, ordered-sequence view, nullable view, clone). A type may
//! advertise several capabilities at once; deciding which one governs
//! comparison is the classifier's job, not the handle's.

use core::any::{Any, TypeId, type_name};
use core::fmt;
use core::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::descriptor::Structural;
use crate::error::ValueResult;

/// Erased equality between two values of the same declared type.
pub type EqFn = fn(&dyn Any, &dyn Any) -> bool;
/// Erased hash of one value.
pub type HashFn = fn(&dyn Any) -> u64;
/// Erased clone into an owned constructor argument.
pub type CloneFn = fn(&dyn Any) -> Option<Box<dyn Any + Send>>;
/// Erased projection through a null-capable wrapper; `None` means null.
pub type ProjectFn = fn(&dyn Any) -> Option<&dyn Any>;
/// Erased sequence length.
pub type LenFn = fn(&dyn Any) -> usize;
/// Erased positional element access.
pub type ElementFn = fn(&dyn Any, usize) -> Option<&dyn Any>;
/// Checks run before a nested value type is relied on as a field type.
pub type PrepareFn = fn() -> ValueResult<()>;

/// A type the engine can see as a field type.
///
/// Implemented for primitives, text, ordered containers, `Option`, `uuid` and
/// `chrono` values, and every value object. Third-party field types implement
/// it with one of the [`TypeHandle`] constructors:
///
/// ```ignore
/// impl Reflect for Currency {
///     fn type_handle() -> TypeHandle {
///         TypeHandle::equatable::<Self>()
///     }
/// }
/// ```
pub trait Reflect: Any + Clone + Send + Sync {
    fn type_handle() -> TypeHandle;
}

/// Ordered container whose elements are stored contiguously.
pub trait OrderedContainer {
    type Element;

    fn elements(&self) -> &[Self::Element];
}

impl<E> OrderedContainer for Vec<E> {
    type Element = E;

    fn elements(&self) -> &[E] {
        self
    }
}

impl<E> OrderedContainer for Box<[E]> {
    type Element = E;

    fn elements(&self) -> &[E] {
        self
    }
}

impl<E> OrderedContainer for Arc<[E]> {
    type Element = E;

    fn elements(&self) -> &[E] {
        self
    }
}

impl<E, const N: usize> OrderedContainer for [E; N] {
    type Element = E;

    fn elements(&self) -> &[E] {
        self
    }
}

/// Self-equality capability, optionally paired with a consistent hash.
#[derive(Debug, Clone, Copy)]
pub struct Equality {
    pub eq: EqFn,
    pub hash: Option<HashFn>,
}

/// Ordered-sequence capability.
#[derive(Debug, Clone)]
pub struct SequenceView {
    pub element: TypeHandle,
    pub len: LenFn,
    pub element_at: ElementFn,
}

/// Null-capable wrapper capability.
#[derive(Debug, Clone)]
pub struct NullableView {
    pub inner: TypeHandle,
    pub project: ProjectFn,
}

struct TypeInfo {
    id: TypeId,
    name: &'static str,
    value_kind: bool,
    equality: Option<Equality>,
    sequence: Option<SequenceView>,
    nullable: Option<NullableView>,
    prepare: Option<PrepareFn>,
    clone: CloneFn,
}

impl TypeInfo {
    fn bare<T: Reflect>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            value_kind: false,
            equality: None,
            sequence: None,
            nullable: None,
            prepare: None,
            clone: clone_erased::<T>,
        }
    }
}

/// Shared, immutable description of one declared type.
#[derive(Clone)]
pub struct TypeHandle(Arc<TypeInfo>);

impl TypeHandle {
    /// Primitive-like type compared with its own `PartialEq`.
    pub fn value<T: Reflect + PartialEq + Hash>() -> Self {
        Self::value_with_hash::<T>(hash_erased::<T>)
    }

    /// Primitive-like type without a std `Hash`; `hash` must agree with `PartialEq`.
    pub fn value_with_hash<T: Reflect + PartialEq>(hash: HashFn) -> Self {
        Self(Arc::new(TypeInfo {
            value_kind: true,
            equality: Some(Equality {
                eq: eq_erased::<T>,
                hash: Some(hash),
            }),
            ..TypeInfo::bare::<T>()
        }))
    }

    /// Reference-like type that knows how to compare itself.
    pub fn equatable<T: Reflect + Eq + Hash>() -> Self {
        Self(Arc::new(TypeInfo {
            equality: Some(Equality {
                eq: eq_erased::<T>,
                hash: Some(hash_erased::<T>),
            }),
            ..TypeInfo::bare::<T>()
        }))
    }

    /// Value object: self-equality backed by the engine. Synthesis for an
    /// enclosing type first checks that `T`'s own synthesis succeeds.
    pub fn structural<T: Structural + Reflect + Eq + Hash>() -> Self {
        Self(Arc::new(TypeInfo {
            equality: Some(Equality {
                eq: eq_erased::<T>,
                hash: Some(hash_erased::<T>),
            }),
            prepare: Some(crate::value_object::verify::<T>),
            ..TypeInfo::bare::<T>()
        }))
    }

    /// Ordered container. The container's own `PartialEq` is advertised too,
    /// but comparison goes element by element.
    pub fn sequence<C>() -> Self
    where
        C: Reflect + OrderedContainer + PartialEq,
        C::Element: Reflect,
    {
        Self(Arc::new(TypeInfo {
            equality: Some(Equality {
                eq: eq_erased::<C>,
                hash: None,
            }),
            sequence: Some(SequenceView {
                element: C::Element::type_handle(),
                len: len_erased::<C>,
                element_at: element_erased::<C>,
            }),
            ..TypeInfo::bare::<C>()
        }))
    }

    /// `Option<T>`, the engine's null-capable wrapper.
    pub fn nullable<T: Reflect>() -> Self {
        Self(Arc::new(TypeInfo {
            nullable: Some(NullableView {
                inner: T::type_handle(),
                project: project_option::<T>,
            }),
            ..TypeInfo::bare::<Option<T>>()
        }))
    }

    /// Type with no comparison capability at all.
    pub fn opaque<T: Reflect>() -> Self {
        Self(Arc::new(TypeInfo::bare::<T>()))
    }

    pub(crate) fn text<T: Reflect + Eq + Hash>() -> Self {
        Self::equatable::<T>()
    }

    pub fn type_id(&self) -> TypeId {
        self.0.id
    }

    pub fn name(&self) -> &'static str {
        self.0.name
    }

    pub fn is_value_kind(&self) -> bool {
        self.0.value_kind
    }

    pub fn equality(&self) -> Option<Equality> {
        self.0.equality
    }

    pub fn sequence_view(&self) -> Option<&SequenceView> {
        self.0.sequence.as_ref()
    }

    pub fn nullable_view(&self) -> Option<&NullableView> {
        self.0.nullable.as_ref()
    }

    pub fn prepare(&self) -> Option<PrepareFn> {
        self.0.prepare
    }

    pub fn clone_fn(&self) -> CloneFn {
        self.0.clone
    }

    /// The handle under any number of `Option` layers.
    pub fn strip_nullable(&self) -> &TypeHandle {
        let mut handle = self;
        while let Some(view) = handle.nullable_view() {
            handle = &view.inner;
        }
        handle
    }

    /// Whether the type is one of the reference types treated like values.
    pub fn is_designated_value_like(&self) -> bool {
        designated_value_like().contains(&self.0.id)
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeHandle").field(&self.0.name).finish()
    }
}

impl PartialEq for TypeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for TypeHandle {}

fn designated_value_like() -> [TypeId; 4] {
    [
        TypeId::of::<String>(),
        TypeId::of::<Box<str>>(),
        TypeId::of::<Arc<str>>(),
        TypeId::of::<&'static str>(),
    ]
}

fn eq_erased<T: PartialEq + 'static>(a: &dyn Any, b: &dyn Any) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn hash_erased<T: Hash + 'static>(value: &dyn Any) -> u64 {
    value.downcast_ref::<T>().map_or(0, |value| {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    })
}

fn clone_erased<T: Clone + Send + 'static>(value: &dyn Any) -> Option<Box<dyn Any + Send>> {
    value
        .downcast_ref::<T>()
        .map(|value| Box::new(value.clone()) as Box<dyn Any + Send>)
}

fn project_option<T: 'static>(value: &dyn Any) -> Option<&dyn Any> {
    value
        .downcast_ref::<Option<T>>()?
        .as_ref()
        .map(|inner| inner as &dyn Any)
}

fn len_erased<C: OrderedContainer + 'static>(value: &dyn Any) -> usize {
    value.downcast_ref::<C>().map_or(0, |c| c.elements().len())
}

fn element_erased<C>(value: &dyn Any, index: usize) -> Option<&dyn Any>
where
    C: OrderedContainer + 'static,
    C::Element: 'static,
{
    value
        .downcast_ref::<C>()?
        .elements()
        .get(index)
        .map(|element| element as &dyn Any)
}

macro_rules! impl_value_kind {
    ($($t:ty),* $(,)?) => {
        $(
            impl Reflect for $t {
                fn type_handle() -> TypeHandle {
                    TypeHandle::value::<$t>()
                }
            }
        )*
    };
}

macro_rules! impl_float {
    ($t:ty, $hash:ident) => {
        // `0.0 == -0.0`, so both must hash alike.
        fn $hash(value: &dyn Any) -> u64 {
            value.downcast_ref::<$t>().map_or(0, |value| {
                let bits = if *value == 0.0 { 0 } else { value.to_bits() };
                let mut hasher = DefaultHasher::new();
                bits.hash(&mut hasher);
                hasher.finish()
            })
        }

        impl Reflect for $t {
            fn type_handle() -> TypeHandle {
                TypeHandle::value_with_hash::<$t>($hash)
            }
        }
    };
}

macro_rules! impl_text {
    ($($t:ty),* $(,)?) => {
        $(
            impl Reflect for $t {
                fn type_handle() -> TypeHandle {
                    TypeHandle::text::<$t>()
                }
            }
        )*
    };
}

impl_value_kind!(
    bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, (),
    Uuid, DateTime<Utc>, NaiveDate,
);

impl_float!(f32, hash_f32);
impl_float!(f64, hash_f64);

impl_text!(String, Box<str>, Arc<str>, &'static str);

impl<E: Reflect + PartialEq> Reflect for Vec<E> {
    fn type_handle() -> TypeHandle {
        TypeHandle::sequence::<Self>()
    }
}

impl<E: Reflect + PartialEq> Reflect for Box<[E]> {
    fn type_handle() -> TypeHandle {
        TypeHandle::sequence::<Self>()
    }
}

impl<E: Reflect + PartialEq> Reflect for Arc<[E]> {
    fn type_handle() -> TypeHandle {
        TypeHandle::sequence::<Self>()
    }
}

impl<E: Reflect + PartialEq, const N: usize> Reflect for [E; N] {
    fn type_handle() -> TypeHandle {
        TypeHandle::sequence::<Self>()
    }
}

impl<T: Reflect> Reflect for Option<T> {
    fn type_handle() -> TypeHandle {
        TypeHandle::nullable::<T>()
    }
}
