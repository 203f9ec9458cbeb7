//! Small builders for actions and spaces used across test suites.

use tandem_core::{Action, ActionSpace, ObsSchema, Spaces};

/// `n` all-zero actions of dimension `dim`.
pub fn zero_actions(n: usize, dim: usize) -> Vec<Action> {
    (0..n).map(|_| Action::zeros(dim)).collect()
}

/// One action per row.
pub fn actions(rows: &[&[f64]]) -> Vec<Action> {
    rows.iter().map(|r| Action::new(r.to_vec())).collect()
}

/// Flat observation schema of `obs_dim` with an unbounded action space.
pub fn flat_spaces(obs_dim: usize, action_dim: usize) -> Spaces {
    Spaces {
        observation: ObsSchema::flat(obs_dim),
        action: ActionSpace::new(action_dim),
    }
}
