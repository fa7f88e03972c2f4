//! Field classification: which comparison and hash strategy a declared type gets.

use serde::Serialize;

use crate::error::ValueObjectError;
use crate::reflect::TypeHandle;

/// Strategy category for one field's declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldClassification {
    /// Primitive, value kind, or designated value-like text.
    ValueEquatable,
    /// Ordered container; compared and hashed element by element.
    OrderedSequence(TypeHandle),
    /// Reference-like type with its own equality.
    CustomEquatable,
    /// No usable strategy.
    Unsupported,
}

/// Label of a [`FieldClassification`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationKind {
    ValueEquatable,
    OrderedSequence,
    CustomEquatable,
    Unsupported,
}

impl FieldClassification {
    pub fn kind(&self) -> ClassificationKind {
        match self {
            Self::ValueEquatable => ClassificationKind::ValueEquatable,
            Self::OrderedSequence(_) => ClassificationKind::OrderedSequence,
            Self::CustomEquatable => ClassificationKind::CustomEquatable,
            Self::Unsupported => ClassificationKind::Unsupported,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// Classify a declared type. `Option` layers are looked through: nullability
/// is handled by the synthesizers, not by the classification.
///
/// First match wins. Sequences come before the equality check because
/// containers advertise a self-equality of their own that must not be used.
pub fn classify(declared: &TypeHandle) -> FieldClassification {
    let handle = declared.strip_nullable();

    if let Some(view) = handle.sequence_view() {
        return FieldClassification::OrderedSequence(view.element.clone());
    }

    if handle.is_value_kind() || handle.is_designated_value_like() {
        return FieldClassification::ValueEquatable;
    }

    if handle.equality().is_some() {
        return FieldClassification::CustomEquatable;
    }

    FieldClassification::Unsupported
}

/// Why no comparison strategy could be built for a field type.
#[derive(Debug)]
pub(crate) enum StrategyError {
    /// The type itself offers nothing usable.
    Unsupported(&'static str),
    /// A value type nested in the field rejected its own declaration.
    Nested(ValueObjectError),
}

impl StrategyError {
    pub(crate) fn for_field(
        self,
        type_name: &'static str,
        field: &'static str,
        field_type: &'static str,
    ) -> ValueObjectError {
        match self {
            Self::Unsupported(reason) => ValueObjectError::unsupported_field(type_name, field, field_type, reason),
            Self::Nested(err) => err,
        }
    }
}

impl From<&'static str> for StrategyError {
    fn from(reason: &'static str) -> Self {
        Self::Unsupported(reason)
    }
}

impl From<ValueObjectError> for StrategyError {
    fn from(err: ValueObjectError) -> Self {
        Self::Nested(err)
    }
}
