//! Engine error model.

use thiserror::Error;

/// Result type used across the engine.
pub type ValueResult<T> = Result<T, ValueObjectError>;

/// Failure raised while describing, synthesizing for, or using a value type.
///
/// Configuration errors mean the type's declaration violates what the engine
/// can handle; they surface on first use of the type and name the offending
/// type and field or parameter. Usage errors are raised at the call site.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueObjectError {
    /// The type declares no public constructor.
    #[error("type `{type_name}` declares no public constructor")]
    MissingConstructor { type_name: &'static str },

    /// The type declares more than one public constructor.
    #[error("type `{type_name}` declares {count} public constructors, expected exactly one")]
    AmbiguousConstructor { type_name: &'static str, count: usize },

    /// A constructor parameter has no field with a matching name.
    #[error("constructor parameter `{parameter}` of type `{type_name}` matches no field")]
    UnmatchedParameter {
        type_name: &'static str,
        parameter: &'static str,
    },

    /// A constructor parameter matches more than one field.
    #[error("constructor parameter `{parameter}` of type `{type_name}` matches several fields")]
    AmbiguousParameter {
        type_name: &'static str,
        parameter: &'static str,
    },

    /// Two constructor parameters resolve to the same field.
    #[error("field `{field}` of type `{type_name}` is bound by more than one constructor parameter")]
    DuplicateParameter {
        type_name: &'static str,
        field: &'static str,
    },

    /// A field is not set by any constructor parameter, so it cannot be rebuilt.
    #[error("field `{field}` of type `{type_name}` is not bound by any constructor parameter")]
    UnconstructibleField {
        type_name: &'static str,
        field: &'static str,
    },

    /// A field's declared type has no usable comparison strategy.
    #[error("cannot handle field `{field}` of type `{field_type}` in `{type_name}`: {reason}")]
    UnsupportedField {
        type_name: &'static str,
        field: &'static str,
        field_type: &'static str,
        reason: &'static str,
    },

    /// The constructor consumed a different number of arguments than it declared.
    #[error("constructor of `{type_name}` declares {declared} parameters but consumed {consumed}")]
    ArityMismatch {
        type_name: &'static str,
        declared: usize,
        consumed: usize,
    },

    /// `evolve` was asked for a field the type does not have.
    #[error("type `{type_name}` has no field named `{field}`")]
    UnknownField {
        type_name: &'static str,
        field: String,
    },

    /// A value of the wrong type was supplied for a field or parameter.
    #[error("`{name}` of `{type_name}` expects `{expected}`, got `{actual}`")]
    TypeMismatch {
        type_name: &'static str,
        name: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    /// A process-wide synthesis cache is unusable (poisoned lock or corrupt entry).
    #[error("synthesis cache `{cache}` failed: {reason}")]
    Cache {
        cache: &'static str,
        reason: &'static str,
    },
}

impl ValueObjectError {
    pub fn unsupported_field(
        type_name: &'static str,
        field: &'static str,
        field_type: &'static str,
        reason: &'static str,
    ) -> Self {
        Self::UnsupportedField {
            type_name,
            field,
            field_type,
            reason,
        }
    }

    pub fn unknown_field(type_name: &'static str, field: impl Into<String>) -> Self {
        Self::UnknownField {
            type_name,
            field: field.into(),
        }
    }

    /// Whether this error reports a type whose shape the engine rejects.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingConstructor { .. }
                | Self::AmbiguousConstructor { .. }
                | Self::UnmatchedParameter { .. }
                | Self::AmbiguousParameter { .. }
                | Self::DuplicateParameter { .. }
                | Self::UnconstructibleField { .. }
                | Self::UnsupportedField { .. }
                | Self::ArityMismatch { .. }
        )
    }

    /// Whether this error reports a bad call against a well-formed type.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::UnknownField { .. } | Self::TypeMismatch { .. })
    }
}
