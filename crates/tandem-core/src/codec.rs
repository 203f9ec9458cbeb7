//! Observation codec: structured [`Observation`] to and from flat vectors.
//!
//! The codec is stateless apart from its schema. Workers encode with it
//! before replying, the controller decodes with it on fan-in; both hold an
//! identical copy of the schema negotiated once through `GetSpaces`.

use crate::error::CodecError;
use crate::space::ObsSchema;
use crate::types::Observation;

/// Encodes and decodes observations against a fixed [`ObsSchema`].
///
/// # Examples
///
/// ```
/// use tandem_core::{FieldLayout, ObsSchema, Observation, ObservationCodec};
///
/// let schema = ObsSchema::new(vec![FieldLayout::new("a", 2), FieldLayout::new("b", 1)]).unwrap();
/// let codec = ObservationCodec::new(schema);
///
/// let obs = Observation::new()
///     .with_field("b", vec![3.0])
///     .with_field("a", vec![1.0, 2.0]);
/// let flat = codec.encode(&obs).unwrap();
/// assert_eq!(flat, vec![1.0, 2.0, 3.0]);
///
/// let back = codec.decode(&flat).unwrap();
/// assert_eq!(back.field("a"), Some(&[1.0, 2.0][..]));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservationCodec {
    schema: ObsSchema,
}

impl ObservationCodec {
    /// Create a codec for `schema`.
    pub fn new(schema: ObsSchema) -> Self {
        Self { schema }
    }

    /// The schema this codec enforces.
    pub fn schema(&self) -> &ObsSchema {
        &self.schema
    }

    /// Length of every encoded vector.
    pub fn vector_len(&self) -> usize {
        self.schema.vector_len()
    }

    /// Flatten `obs` into schema order.
    ///
    /// Field order in `obs` does not matter; every schema field must be
    /// present with the declared length and no undeclared field may appear.
    pub fn encode(&self, obs: &Observation) -> Result<Vec<f64>, CodecError> {
        if let Some((name, _)) = obs
            .fields()
            .find(|(name, _)| self.schema.range_of(name).is_none())
        {
            return Err(CodecError::UnexpectedField {
                name: name.to_string(),
            });
        }

        let mut out = Vec::with_capacity(self.schema.vector_len());
        for layout in self.schema.fields() {
            let values = obs
                .field(&layout.name)
                .ok_or_else(|| CodecError::MissingField {
                    name: layout.name.clone(),
                })?;
            if values.len() != layout.len {
                return Err(CodecError::FieldLength {
                    name: layout.name.clone(),
                    expected: layout.len,
                    actual: values.len(),
                });
            }
            out.extend_from_slice(values);
        }
        Ok(out)
    }

    /// Split a flat vector back into named fields.
    ///
    /// Fails with [`CodecError::LengthMismatch`] if `flat` does not have
    /// exactly the schema's length.
    pub fn decode(&self, flat: &[f64]) -> Result<Observation, CodecError> {
        if flat.len() != self.schema.vector_len() {
            return Err(CodecError::LengthMismatch {
                expected: self.schema.vector_len(),
                actual: flat.len(),
            });
        }

        let mut obs = Observation::new();
        let mut offset = 0;
        for layout in self.schema.fields() {
            let end = offset + layout.len;
            obs.insert(layout.name.clone(), flat[offset..end].to_vec());
            offset = end;
        }
        Ok(obs)
    }
}
