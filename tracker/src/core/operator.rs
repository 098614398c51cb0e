//! Operator application over a belief distribution.

use crate::core::types::{Operator, Weights};

/// Upper clamp for a strengthened item.
pub const MAX_ITEM_WEIGHT: f64 = 0.95;
/// Lower clamp for a dampened item.
pub const MIN_ITEM_WEIGHT: f64 = 0.05;

/// Compute the successor weights for `operator` applied to `target`.
///
/// The target moves by `strength` and is clamped to
/// [`MIN_ITEM_WEIGHT`, `MAX_ITEM_WEIGHT`]. The remaining mass `1 - target'`
/// is split across the other items in proportion to their current weights.
///
/// A target that is not in `weights` returns an unchanged copy. When every
/// other item is already at zero they stay at zero and the result sums to
/// `target'` rather than 1; registering it through the store renormalizes.
pub fn apply_operator(weights: &Weights, operator: Operator, target: &str, strength: f64) -> Weights {
    let Some(current) = weights.get(target) else {
        return weights.clone();
    };

    let next_target = match operator {
        Operator::Strengthen => (current + strength).min(MAX_ITEM_WEIGHT),
        Operator::Dampen => (current - strength).max(MIN_ITEM_WEIGHT),
    };
    let remaining = 1.0 - next_target;
    let other_sum: f64 = weights
        .iter()
        .filter(|(name, _)| *name != target)
        .map(|(_, weight)| weight)
        .sum();

    weights.map(|name, weight| {
        if name == target {
            next_target
        } else if other_sum > 0.0 {
            weight / other_sum * remaining
        } else {
            weight
        }
    })
}
