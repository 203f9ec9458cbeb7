//! Observation schemas and action spaces.
//!
//! An [`ObsSchema`] fixes the layout of the flat observation vector: an
//! ordered list of named fields, each a contiguous run of `f64`s. The
//! schema is reported once by a worker and then shared, unchanged, by
//! every worker and by the controller.

use std::ops::Range;

use crate::error::{ActionError, CodecError};
use crate::types::Action;

/// Field name used by [`ObsSchema::flat`] and [`Observation::flat`](crate::Observation::flat).
pub const FLAT_FIELD: &str = "obs";

/// One named, fixed-length field of an observation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    /// Field name, unique within a schema.
    pub name: String,
    /// Number of `f64` elements the field occupies.
    pub len: usize,
}

impl FieldLayout {
    /// Create a field layout.
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            len,
        }
    }
}

/// Ordered field layout of the flat observation vector.
///
/// # Examples
///
/// ```
/// use tandem_core::{FieldLayout, ObsSchema};
///
/// let schema = ObsSchema::new(vec![
///     FieldLayout::new("load", 3),
///     FieldLayout::new("flow", 2),
/// ])
/// .unwrap();
///
/// assert_eq!(schema.vector_len(), 5);
/// assert_eq!(schema.range_of("flow"), Some(3..5));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObsSchema {
    fields: Vec<FieldLayout>,
    vector_len: usize,
}

impl ObsSchema {
    /// Build a schema from an ordered field list.
    ///
    /// Fails with [`CodecError::DuplicateField`] if two fields share a
    /// name and with [`CodecError::SchemaOverflow`] if the total length
    /// does not fit in `usize`.
    pub fn new(fields: Vec<FieldLayout>) -> Result<Self, CodecError> {
        let mut vector_len: usize = 0;
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(CodecError::DuplicateField {
                    name: field.name.clone(),
                });
            }
            vector_len = vector_len
                .checked_add(field.len)
                .ok_or_else(|| CodecError::SchemaOverflow {
                    name: field.name.clone(),
                })?;
        }
        Ok(Self { fields, vector_len })
    }

    /// A schema with a single field named [`FLAT_FIELD`].
    pub fn flat(len: usize) -> Self {
        Self {
            fields: vec![FieldLayout::new(FLAT_FIELD, len)],
            vector_len: len,
        }
    }

    /// Fields in vector order.
    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    /// Total length of the flat observation vector.
    pub fn vector_len(&self) -> usize {
        self.vector_len
    }

    /// Element range occupied by `name` within the flat vector.
    ///
    /// Offsets never exceed [`vector_len`](Self::vector_len), which
    /// construction has already checked.
    pub fn range_of(&self, name: &str) -> Option<Range<usize>> {
        let mut offset = 0;
        for field in &self.fields {
            if field.name == name {
                return Some(offset..offset + field.len);
            }
            offset += field.len;
        }
        None
    }
}

/// Continuous action space: a fixed dimension with optional inclusive
/// per-component bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionSpace {
    dim: usize,
    bounds: Option<(f64, f64)>,
}

impl ActionSpace {
    /// An unbounded action space of dimension `dim`.
    pub fn new(dim: usize) -> Self {
        Self { dim, bounds: None }
    }

    /// An action space whose components must lie in `[low, high]`.
    pub fn bounded(dim: usize, low: f64, high: f64) -> Self {
        Self {
            dim,
            bounds: Some((low, high)),
        }
    }

    /// Number of components in every action.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Inclusive component bounds, if any.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.bounds
    }

    /// Check that `action` is a member of this space.
    ///
    /// Rejects wrong dimensions, non-finite components, and components
    /// outside the bounds. Reports the first violation found.
    pub fn check(&self, action: &Action) -> Result<(), ActionError> {
        let values = action.as_slice();
        if values.len() != self.dim {
            return Err(ActionError::DimensionMismatch {
                expected: self.dim,
                actual: values.len(),
            });
        }
        for (index, &value) in values.iter().enumerate() {
            if !value.is_finite() {
                return Err(ActionError::NonFinite { index });
            }
            if let Some((low, high)) = self.bounds {
                if value < low || value > high {
                    return Err(ActionError::OutOfBounds {
                        index,
                        value,
                        low,
                        high,
                    });
                }
            }
        }
        Ok(())
    }
}

/// The observation schema and action space an environment reports.
#[derive(Clone, Debug, PartialEq)]
pub struct Spaces {
    /// Layout of the flat observation vector.
    pub observation: ObsSchema,
    /// Space every action must belong to.
    pub action: ActionSpace,
}
