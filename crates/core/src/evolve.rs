//! Evolve ("with") synthesis: rebuild an instance through its canonical
//! constructor with exactly one field replaced.

use core::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::cache::SynthesisCache;
use crate::descriptor::{Argument, Arguments, Structural, TypeDescriptor, describe};
use crate::error::{ValueObjectError, ValueResult};

static EVOLVE_PLANS: Lazy<SynthesisCache> = Lazy::new(|| SynthesisCache::new("evolve"));

/// Per-type plan: field name to field index, and every field's constructor
/// parameter, resolved once.
pub struct EvolvePlan<T> {
    descriptor: Arc<TypeDescriptor<T>>,
    field_index: HashMap<&'static str, usize>,
}

impl<T: 'static> EvolvePlan<T> {
    /// Build the plan. Every field must be bound by a constructor parameter,
    /// otherwise a rebuilt instance could not carry it over.
    pub fn new(descriptor: Arc<TypeDescriptor<T>>) -> ValueResult<Self> {
        let bindings = descriptor.constructor().bindings();

        let mut field_index = HashMap::with_capacity(descriptor.fields().len());
        for (index, field) in descriptor.fields().iter().enumerate() {
            if !bindings.contains(&index) {
                return Err(ValueObjectError::UnconstructibleField {
                    type_name: descriptor.type_name(),
                    field: field.name(),
                });
            }
            field_index.insert(field.name(), index);
        }

        Ok(Self {
            descriptor,
            field_index,
        })
    }

    /// Rebuild `instance` with `field` set to `value`.
    ///
    /// `value_type` names `value`'s concrete type for error reporting.
    pub fn evolve(
        &self,
        instance: &T,
        field: &str,
        value: Box<dyn Any + Send>,
        value_type: &'static str,
    ) -> ValueResult<T> {
        let descriptor = &self.descriptor;
        let type_name = descriptor.type_name();

        let target = *self
            .field_index
            .get(field)
            .ok_or_else(|| ValueObjectError::unknown_field(type_name, field))?;

        let target_field = &descriptor.fields()[target];
        if (*value).type_id() != target_field.declared_type().type_id() {
            return Err(ValueObjectError::TypeMismatch {
                type_name,
                name: target_field.name(),
                expected: target_field.declared_type().name(),
                actual: value_type,
            });
        }

        let constructor = descriptor.constructor();
        let mut replacement = Some(value);
        let mut arguments = Vec::with_capacity(constructor.parameters().len());

        for (&parameter, &bound) in constructor.parameters().iter().zip(constructor.bindings()) {
            let field = &descriptor.fields()[bound];
            let declared = field.declared_type();

            let value = if bound == target {
                replacement.take().ok_or(ValueObjectError::DuplicateParameter {
                    type_name,
                    field: field.name(),
                })?
            } else {
                (declared.clone_fn())(field.value(instance)).ok_or(ValueObjectError::TypeMismatch {
                    type_name,
                    name: field.name(),
                    expected: declared.name(),
                    actual: "an undeclared field type",
                })?
            };

            arguments.push(Argument {
                parameter,
                value_type: if bound == target { value_type } else { declared.name() },
                value,
            });
        }

        constructor.invoke(Arguments::new(type_name, arguments))
    }
}

/// Fetch (or synthesize on first use) the evolve plan for `T`.
pub fn evolve_plan<T: Structural>() -> ValueResult<Arc<EvolvePlan<T>>> {
    EVOLVE_PLANS.get_or_try_init_in::<T, _, _>(T::slots().map(|slots| &slots.evolve), || {
        let type_name = type_name::<T>();
        let descriptor = describe::<T>()?;
        EvolvePlan::new(descriptor)
            .inspect(|plan| tracing::debug!(type_name, fields = plan.field_index.len(), "synthesized evolve plan"))
            .inspect_err(|err| tracing::warn!(type_name, error = %err, "evolve synthesis failed"))
    })
}

/// A new `T` equal to `instance` except that `field` holds `value`.
///
/// `instance` is left untouched; the constructor runs exactly once.
pub fn evolve<T, V>(instance: &T, field: &str, value: V) -> ValueResult<T>
where
    T: Structural,
    V: Any + Send,
{
    evolve_plan::<T>()?.evolve(instance, field, Box::new(value), type_name::<V>())
}
