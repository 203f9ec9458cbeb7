//! Observation, action, and transition value types.

use indexmap::IndexMap;

use crate::space::FLAT_FIELD;

/// Auxiliary per-step diagnostics returned alongside a transition.
///
/// Insertion-ordered so that encoding and display are deterministic.
pub type Info = IndexMap<String, f64>;

/// An environment's configuration as reported by `GetParameters`.
pub type Parameters = IndexMap<String, f64>;

/// A structured observation: named, ordered fields of `f64` values.
///
/// # Examples
///
/// ```
/// use tandem_core::Observation;
///
/// let obs = Observation::new()
///     .with_field("load", vec![1.0, 2.0])
///     .with_field("flow", vec![0.5]);
///
/// assert_eq!(obs.field("flow"), Some(&[0.5][..]));
/// assert_eq!(obs.to_flat_vec(), vec![1.0, 2.0, 0.5]);
/// assert!(obs.is_finite());
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Observation {
    fields: IndexMap<String, Vec<f64>>,
}

impl Observation {
    /// An observation with no fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// An observation with a single field named [`FLAT_FIELD`].
    pub fn flat(values: Vec<f64>) -> Self {
        Self::new().with_field(FLAT_FIELD, values)
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_field(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.insert(name, values);
        self
    }

    /// Set a field, replacing any previous values under the same name.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.fields.insert(name.into(), values);
    }

    /// Values of one field.
    pub fn field(&self, name: &str) -> Option<&[f64]> {
        self.fields.get(name).map(|v| v.as_slice())
    }

    /// Iterate over `(name, values)` in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// `true` if every value in every field is finite.
    pub fn is_finite(&self) -> bool {
        self.fields.values().flatten().all(|v| v.is_finite())
    }

    /// Concatenate all fields in insertion order.
    pub fn to_flat_vec(&self) -> Vec<f64> {
        self.fields.values().flatten().copied().collect()
    }
}

/// An action: a fixed-length vector of `f64` components.
#[derive(Clone, Debug, PartialEq)]
pub struct Action {
    values: Vec<f64>,
}

impl Action {
    /// Wrap a component vector.
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// The all-zero action of dimension `dim`.
    pub fn zeros(dim: usize) -> Self {
        Self {
            values: vec![0.0; dim],
        }
    }

    /// Components as a slice.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Consume the action, returning its components.
    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` if the action has no components.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<f64>> for Action {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

/// Outcome of one environment step.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// Observation after the step.
    pub observation: Observation,
    /// Reward produced by the step.
    pub reward: f64,
    /// Whether the episode ended on this step.
    pub done: bool,
    /// Auxiliary diagnostics.
    pub info: Info,
}
