//! Type descriptors: the once-computed field and constructor metadata of a value type.
//!
//! A type describes itself through [`Structural::declare`]. The first call to
//! [`describe`] validates that declaration, classifies every field, binds each
//! constructor parameter to its field by name, and publishes the result in a
//! process-wide cache.

use core::any::{Any, type_name};
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::cache::{SynthesisCache, TypeSlots};
use crate::classify::{ClassificationKind, FieldClassification, classify};
use crate::error::{ValueObjectError, ValueResult};
use crate::reflect::{Reflect, TypeHandle};

static DESCRIPTORS: Lazy<SynthesisCache> = Lazy::new(|| SynthesisCache::new("descriptors"));

/// A type whose fields and canonical constructor are declared to the engine.
///
/// Usually generated by [`value_object!`](crate::value_object); hand-written
/// declarations are validated the same way on first use.
pub trait Structural: Sized + Send + Sync + 'static {
    fn declare() -> Declaration<Self>;

    /// Static storage for this type's synthesized functions.
    ///
    /// With slots, reads after first use are lock-free; without, they go
    /// through a shared map. [`value_object!`](crate::value_object) emits:
    ///
    /// ```ignore
    /// fn slots() -> Option<&'static TypeSlots<Self>> {
    ///     static SLOTS: TypeSlots<Money> = TypeSlots::new();
    ///     Some(&SLOTS)
    /// }
    /// ```
    fn slots() -> Option<&'static TypeSlots<Self>> {
        None
    }
}

/// Constructor entry point: consumes one argument per declared parameter, in order.
pub type Invoke<T> = fn(&mut Arguments) -> ValueResult<T>;

trait Accessor<T>: Send + Sync {
    fn get<'a>(&self, instance: &'a T) -> &'a dyn Any;
}

struct FieldAccessor<T, V> {
    get: fn(&T) -> &V,
}

impl<T, V: Any> Accessor<T> for FieldAccessor<T, V> {
    fn get<'a>(&self, instance: &'a T) -> &'a dyn Any {
        (self.get)(instance)
    }
}

struct FieldDeclaration<T> {
    name: &'static str,
    declared_type: TypeHandle,
    accessor: Box<dyn Accessor<T>>,
}

struct ConstructorDeclaration<T> {
    parameters: Vec<&'static str>,
    invoke: Invoke<T>,
}

/// Raw, unvalidated shape of a type: fields in declaration order plus its
/// public constructors.
pub struct Declaration<T> {
    fields: Vec<FieldDeclaration<T>>,
    constructors: Vec<ConstructorDeclaration<T>>,
}

impl<T: 'static> Declaration<T> {
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            constructors: Vec::new(),
        }
    }

    /// Declare the next field.
    pub fn field<V: Reflect>(mut self, name: &'static str, get: fn(&T) -> &V) -> Self {
        self.fields.push(FieldDeclaration {
            name,
            declared_type: V::type_handle(),
            accessor: Box::new(FieldAccessor { get }),
        });
        self
    }

    /// Declare a public constructor by its parameter names.
    pub fn constructor(mut self, parameters: &[&'static str], invoke: Invoke<T>) -> Self {
        self.constructors.push(ConstructorDeclaration {
            parameters: parameters.to_vec(),
            invoke,
        });
        self
    }
}

impl<T: 'static> Default for Declaration<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One owned constructor argument.
pub(crate) struct Argument {
    pub(crate) parameter: &'static str,
    pub(crate) value_type: &'static str,
    pub(crate) value: Box<dyn Any + Send>,
}

/// Positional, type-erased argument list handed to a constructor.
pub struct Arguments {
    type_name: &'static str,
    declared: usize,
    consumed: usize,
    values: std::vec::IntoIter<Argument>,
}

impl Arguments {
    pub(crate) fn new(type_name: &'static str, values: Vec<Argument>) -> Self {
        Self {
            type_name,
            declared: values.len(),
            consumed: 0,
            values: values.into_iter(),
        }
    }

    /// Take the next argument as a `V`.
    pub fn next<V: Any>(&mut self) -> ValueResult<V> {
        self.consumed += 1;
        let Argument {
            parameter,
            value_type,
            value,
        } = self.values.next().ok_or(ValueObjectError::ArityMismatch {
            type_name: self.type_name,
            declared: self.declared,
            consumed: self.consumed,
        })?;

        value
            .downcast::<V>()
            .map(|value| *value)
            .map_err(|_| ValueObjectError::TypeMismatch {
                type_name: self.type_name,
                name: parameter,
                expected: type_name::<V>(),
                actual: value_type,
            })
    }

    fn finish(&self) -> ValueResult<()> {
        if self.consumed == self.declared {
            Ok(())
        } else {
            Err(ValueObjectError::ArityMismatch {
                type_name: self.type_name,
                declared: self.declared,
                consumed: self.consumed,
            })
        }
    }
}

/// A classified field of a described type.
pub struct FieldDescriptor<T> {
    name: &'static str,
    declared_type: TypeHandle,
    classification: FieldClassification,
    accessor: Box<dyn Accessor<T>>,
}

impl<T> FieldDescriptor<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn declared_type(&self) -> &TypeHandle {
        &self.declared_type
    }

    pub fn classification(&self) -> &FieldClassification {
        &self.classification
    }

    /// Borrow this field's value out of `instance`.
    pub fn value<'a>(&self, instance: &'a T) -> &'a dyn Any {
        self.accessor.get(instance)
    }
}

/// The canonical constructor with each parameter bound to a field index.
pub struct ConstructorDescriptor<T> {
    parameters: Vec<&'static str>,
    bindings: Vec<usize>,
    invoke: Invoke<T>,
}

impl<T> ConstructorDescriptor<T> {
    pub fn parameters(&self) -> &[&'static str] {
        &self.parameters
    }

    /// Field index bound to each parameter, in parameter order.
    pub fn bindings(&self) -> &[usize] {
        &self.bindings
    }

    pub(crate) fn invoke(&self, mut arguments: Arguments) -> ValueResult<T> {
        let instance = (self.invoke)(&mut arguments)?;
        arguments.finish()?;
        Ok(instance)
    }
}

/// Validated, immutable metadata for one concrete type.
pub struct TypeDescriptor<T> {
    type_name: &'static str,
    fields: Vec<FieldDescriptor<T>>,
    constructor: ConstructorDescriptor<T>,
}

impl<T: 'static> TypeDescriptor<T> {
    /// Validate a declaration and bind constructor parameters to fields.
    pub fn from_declaration(declaration: Declaration<T>) -> ValueResult<Self> {
        let type_name = type_name::<T>();
        let Declaration {
            fields,
            mut constructors,
        } = declaration;

        let constructor = match constructors.len() {
            0 => return Err(ValueObjectError::MissingConstructor { type_name }),
            1 => constructors.remove(0),
            count => return Err(ValueObjectError::AmbiguousConstructor { type_name, count }),
        };

        let fields: Vec<FieldDescriptor<T>> = fields
            .into_iter()
            .map(|field| FieldDescriptor {
                classification: classify(&field.declared_type),
                name: field.name,
                declared_type: field.declared_type,
                accessor: field.accessor,
            })
            .collect();

        let mut bindings = Vec::with_capacity(constructor.parameters.len());
        for &parameter in &constructor.parameters {
            let mut candidates = fields
                .iter()
                .enumerate()
                .filter(|(_, field)| binds(field.name, parameter))
                .map(|(index, _)| index);

            let index = match (candidates.next(), candidates.next()) {
                (Some(index), None) => index,
                (None, _) => return Err(ValueObjectError::UnmatchedParameter { type_name, parameter }),
                (Some(_), Some(_)) => return Err(ValueObjectError::AmbiguousParameter { type_name, parameter }),
            };

            if bindings.contains(&index) {
                return Err(ValueObjectError::DuplicateParameter {
                    type_name,
                    field: fields[index].name,
                });
            }
            bindings.push(index);
        }

        Ok(Self {
            type_name,
            fields,
            constructor: ConstructorDescriptor {
                parameters: constructor.parameters,
                bindings,
                invoke: constructor.invoke,
            },
        })
    }
}

impl<T> TypeDescriptor<T> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn fields(&self) -> &[FieldDescriptor<T>] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<(usize, &FieldDescriptor<T>)> {
        self.fields.iter().enumerate().find(|(_, field)| field.name == name)
    }

    pub fn constructor(&self) -> &ConstructorDescriptor<T> {
        &self.constructor
    }

    pub fn summary(&self) -> DescriptorSummary {
        DescriptorSummary {
            type_name: self.type_name,
            fields: self
                .fields
                .iter()
                .map(|field| FieldSummary {
                    name: field.name,
                    declared_type: field.declared_type.name(),
                    classification: field.classification.kind(),
                })
                .collect(),
            constructor_parameters: self.constructor.parameters.clone(),
        }
    }
}

/// Serializable view of a descriptor, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptorSummary {
    pub type_name: &'static str,
    pub fields: Vec<FieldSummary>,
    pub constructor_parameters: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSummary {
    pub name: &'static str,
    pub declared_type: &'static str,
    pub classification: ClassificationKind,
}

/// Describe `T`, building and caching its descriptor on first use.
pub fn describe<T: Structural>() -> ValueResult<Arc<TypeDescriptor<T>>> {
    DESCRIPTORS.get_or_try_init_in::<T, _, _>(T::slots().map(|slots| &slots.descriptor), || {
        let type_name = type_name::<T>();
        match TypeDescriptor::from_declaration(T::declare()) {
            Ok(descriptor) => {
                match serde_json::to_string(&descriptor.summary()) {
                    Ok(summary) => tracing::debug!(type_name, %summary, "described value type"),
                    Err(err) => tracing::debug!(type_name, error = %err, "described value type"),
                }
                Ok(descriptor)
            }
            Err(err) => {
                tracing::warn!(type_name, error = %err, "rejected value type declaration");
                Err(err)
            }
        }
    })
}

/// Parameter naming convention: the field name with its first letter lower-cased.
fn binds(field: &str, parameter: &str) -> bool {
    let mut field = field.chars();
    let mut parameter = parameter.chars();
    match (field.next(), parameter.next()) {
        (Some(f), Some(p)) => f.to_lowercase().eq(p.to_lowercase()) && field.as_str() == parameter.as_str(),
        (None, None) => true,
        _ => false,
    }
}
