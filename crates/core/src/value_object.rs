//! Value object trait: equality by value, not identity.
//!
//! Value objects are defined entirely by their attribute values. Two value
//! objects with the same values are equal and hash alike, and "changing" one
//! means building a new instance.

use core::any::{Any, TypeId};
use std::cell::RefCell;
use std::sync::Arc;

use crate::descriptor::{Structural, describe};
use crate::equality::{self, equals, synthesize_equals};
use crate::error::ValueResult;
use crate::hash::{self, hash_of, synthesize_hash};

thread_local! {
    static VERIFYING: RefCell<Vec<TypeId>> = const { RefCell::new(Vec::new()) };
}

/// An immutable aggregate compared, hashed and evolved structurally.
///
/// ## Value Object vs Entity
///
/// - **Value Object**: no identity; two value objects with the same values are equal
/// - **Entity**: identity; two entities with the same ID are the same entity
///
/// ## Immutability
///
/// Fields are set once, by the canonical constructor. To "modify" a value
/// object, [`evolve`](ValueObject::evolve) it into a new one.
///
/// ## Usage Pattern
///
/// ```ignore
/// structval_core::value_object! {
///     pub struct Money {
///         pub amount: i64,
///         pub currency: String,
///     }
/// }
///
/// let m1 = Money::new(100, "USD".to_string());
/// let m2 = Money::new(100, "USD".to_string());
/// assert_eq!(m1, m2);
///
/// let m3 = m1.evolve("amount", 250i64)?;
/// assert_eq!(m3.amount, 250);
/// assert_eq!(m1.amount, 100);
/// ```
pub trait ValueObject: Structural + Clone + PartialEq + core::fmt::Debug {
    /// Structural equality, reporting a rejected declaration instead of panicking.
    fn try_equals(&self, other: &Self) -> ValueResult<bool> {
        equals(self, other)
    }

    /// Structural hash, reporting a rejected declaration instead of panicking.
    fn try_hash(&self) -> ValueResult<u64> {
        hash_of(self)
    }

    /// A new instance equal to this one except that `field` holds `value`.
    fn evolve<V: Any + Send>(&self, field: &str, value: V) -> ValueResult<Self> {
        crate::evolve::evolve(self, field, value)
    }

    /// Equality against a value of unknown type. Values of another concrete
    /// type are never equal, whatever their fields hold.
    fn equals_dyn(&self, other: &dyn Any) -> bool {
        other
            .downcast_ref::<Self>()
            .is_some_and(|other| self == other)
    }
}

/// Check that equality and hash can be synthesized for `T`, and for every
/// value type nested in it, without publishing anything.
///
/// Runs when `T` appears as a field type, so that a rejected declaration
/// deep inside a value surfaces as an error from the enclosing type's
/// synthesis. A type already being checked on this thread passes; the
/// outer check reports its errors.
pub fn verify<T: Structural>() -> ValueResult<()> {
    if equality::is_synthesized::<T>() && hash::is_synthesized::<T>() {
        return Ok(());
    }

    let id = TypeId::of::<T>();
    if VERIFYING.with(|stack| stack.borrow().contains(&id)) {
        return Ok(());
    }

    VERIFYING.with(|stack| stack.borrow_mut().push(id));
    let result = describe::<T>().and_then(|descriptor| {
        synthesize_equals(Arc::clone(&descriptor))?;
        synthesize_hash(descriptor)?;
        Ok(())
    });
    VERIFYING.with(|stack| stack.borrow_mut().pop());

    result
}

/// `PartialEq` body for value objects.
///
/// # Panics
///
/// Panics if the engine rejects `T`'s declaration.
pub fn structural_eq<T: Structural>(one: &T, other: &T) -> bool {
    match equals(one, other) {
        Ok(equal) => equal,
        Err(err) => panic!("{err}"),
    }
}

/// `Hash` body for value objects.
///
/// # Panics
///
/// Panics if the engine rejects `T`'s declaration.
pub fn structural_hash<T: Structural>(instance: &T) -> u64 {
    match hash_of(instance) {
        Ok(hash) => hash,
        Err(err) => panic!("{err}"),
    }
}

/// Implement `PartialEq`, `Eq`, `Hash`, [`Reflect`](crate::Reflect) and
/// [`ValueObject`] for a type that already implements
/// [`Structural`](crate::Structural), `Clone` and `Debug`.
#[macro_export]
macro_rules! impl_value_semantics {
    ($name:ty) => {
        impl ::core::cmp::PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                $crate::structural_eq(self, other)
            }
        }

        impl ::core::cmp::Eq for $name {}

        impl ::core::hash::Hash for $name {
            fn hash<H: ::core::hash::Hasher>(&self, state: &mut H) {
                state.write_u64($crate::structural_hash(self));
            }
        }

        impl $crate::Reflect for $name {
            fn type_handle() -> $crate::TypeHandle {
                $crate::TypeHandle::structural::<Self>()
            }
        }

        impl $crate::ValueObject for $name {}
    };
}

/// Declare a value object.
///
/// Emits the struct (deriving `Clone` and `Debug`), a `new` constructor taking
/// every field in declaration order, its [`Structural`](crate::Structural)
/// declaration with static [`TypeSlots`](crate::TypeSlots), and
/// [`impl_value_semantics!`].
///
/// ```ignore
/// structval_core::value_object! {
///     /// A person's full name.
///     pub struct FullName {
///         pub first: String,
///         pub last: String,
///         pub middle: Option<String>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! value_object {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {}
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name {}

        impl $name {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self {}
            }
        }

        impl $crate::Structural for $name {
            fn declare() -> $crate::Declaration<Self> {
                $crate::Declaration::<Self>::new().constructor(&[], |_| Ok($name::new()))
            }

            fn slots() -> ::core::option::Option<&'static $crate::TypeSlots<Self>> {
                static SLOTS: $crate::TypeSlots<$name> = $crate::TypeSlots::new();
                ::core::option::Option::Some(&SLOTS)
            }
        }

        $crate::impl_value_semantics!($name);
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $name {
            #[allow(clippy::too_many_arguments)]
            pub fn new($($field: $ty),*) -> Self {
                Self { $($field),* }
            }
        }

        impl $crate::Structural for $name {
            fn declare() -> $crate::Declaration<Self> {
                $crate::Declaration::<Self>::new()
                    $(.field::<$ty>(stringify!($field), |value| &value.$field))*
                    .constructor(&[$(stringify!($field)),*], |arguments| {
                        Ok($name::new($(arguments.next::<$ty>()?),*))
                    })
            }

            fn slots() -> ::core::option::Option<&'static $crate::TypeSlots<Self>> {
                static SLOTS: $crate::TypeSlots<$name> = $crate::TypeSlots::new();
                ::core::option::Option::Some(&SLOTS)
            }
        }

        $crate::impl_value_semantics!($name);
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValueObjectError;
    use std::collections::HashSet;

    crate::value_object! {
        /// Three text fields, the classic evolve fixture.
        pub struct Triple {
            pub value1: String,
            pub value2: String,
            pub value3: String,
        }
    }

    crate::value_object! {
        pub struct Empty {}
    }

    crate::value_object! {
        pub struct Wrapper {
            inner: Option<Triple>,
            count: u8,
        }
    }

    crate::value_object! {
        pub struct LookAlike {
            pub value1: String,
            pub value2: String,
            pub value3: String,
        }
    }

    #[derive(Debug, Clone)]
    pub struct Opaque;

    impl crate::Reflect for Opaque {
        fn type_handle() -> crate::TypeHandle {
            crate::TypeHandle::opaque::<Self>()
        }
    }

    crate::value_object! {
        pub struct Inner {
            pub h: Opaque,
        }
    }

    crate::value_object! {
        pub struct Outer {
            pub inner: Option<Inner>,
            pub n: u8,
        }
    }

    crate::value_object! {
        pub struct Node {
            pub label: String,
            pub children: Vec<Node>,
        }
    }

    fn triple() -> Triple {
        Triple::new("first".into(), "second".into(), "third".into())
    }

    #[test]
    fn evolve_replaces_one_field_and_leaves_original_alone() {
        let p = triple();
        let q = p.evolve("value2", "two".to_string()).unwrap();

        assert_eq!(q.value1, "first");
        assert_eq!(q.value2, "two");
        assert_eq!(q.value3, "third");
        assert_eq!(p.value2, "second");
        assert_ne!(p, q);
    }

    #[test]
    fn evolve_rejects_unknown_field() {
        let err = triple().evolve("doesNotExist", 1u8).unwrap_err();
        assert!(matches!(err, ValueObjectError::UnknownField { .. }));
    }

    #[test]
    fn std_traits_follow_structure() {
        let mut set = HashSet::new();
        set.insert(triple());
        set.insert(triple());
        assert_eq!(set.len(), 1);
        assert!(set.contains(&triple()));
    }

    #[test]
    fn empty_value_objects_are_all_equal() {
        assert_eq!(Empty::new(), Empty::new());
        assert_eq!(Empty::new().try_hash().unwrap(), Empty::new().try_hash().unwrap());
    }

    #[test]
    fn nested_value_objects_are_custom_equatable() {
        let a = Wrapper::new(Some(triple()), 1);
        let b = Wrapper::new(Some(triple()), 1);
        let none = Wrapper::new(None, 1);

        assert_eq!(a, b);
        assert_ne!(a, none);
        assert_eq!(none, Wrapper::new(None, 1));
        assert_eq!(a.try_hash().unwrap(), b.try_hash().unwrap());
    }

    #[test]
    fn equals_dyn_discriminates_concrete_types() {
        let p = triple();
        let look_alike = LookAlike::new("first".into(), "second".into(), "third".into());

        assert!(p.equals_dyn(&triple()));
        assert!(!p.equals_dyn(&look_alike));
        assert!(!p.equals_dyn(&"first"));
    }

    #[test]
    fn try_equals_matches_partial_eq() {
        let p = triple();
        let q = p.evolve("value3", "3".to_string()).unwrap();
        assert!(p.try_equals(&triple()).unwrap());
        assert!(!p.try_equals(&q).unwrap());
    }

    #[test]
    fn nested_rejected_declaration_is_returned_not_panicked() {
        let a = Outer::new(Some(Inner::new(Opaque)), 1);
        let b = Outer::new(Some(Inner::new(Opaque)), 1);

        let err = a.try_equals(&b).unwrap_err();
        match err {
            ValueObjectError::UnsupportedField { field, type_name, .. } => {
                assert_eq!(field, "h");
                assert!(type_name.ends_with("Inner"));
            }
            other => panic!("expected the nested unsupported field, got {other:?}"),
        }
        assert!(a.try_hash().unwrap_err().is_configuration());
        assert!(verify::<Outer>().is_err());
    }

    #[test]
    fn recursive_value_objects_synthesize() {
        let leaf = |label: &str| Node::new(label.into(), vec![]);
        let tree = || Node::new("root".into(), vec![leaf("a"), leaf("b")]);
        let swapped = Node::new("root".into(), vec![leaf("b"), leaf("a")]);

        assert!(verify::<Node>().is_ok());
        assert_eq!(tree(), tree());
        assert_ne!(tree(), swapped);
        assert_eq!(tree().try_hash().unwrap(), tree().try_hash().unwrap());
        assert_ne!(tree().try_hash().unwrap(), swapped.try_hash().unwrap());
    }

    #[test]
    fn declared_value_objects_publish_into_their_own_slots() {
        let described = describe::<Triple>().unwrap();
        triple().try_equals(&triple()).unwrap();

        let slots = <Triple as Structural>::slots().unwrap();
        assert!(Arc::ptr_eq(&described, slots.descriptor.get().unwrap()));
        assert!(slots.equality.get().is_some());
        assert!(equality::is_synthesized::<Triple>());
    }
}
