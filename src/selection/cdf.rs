//! Cumulative distribution over a weighted sibling set.

use rand::Rng;

use crate::error_handling::AttenuatorError;

/// An item that carries a configured weight and a derived cdf position.
pub trait Weighted {
    /// Configured weight. Zero means "never chosen by the weighted rule".
    fn weight(&self) -> u32;

    /// Position of this item on the set's CDF, in `[0, 1]`.
    fn cdf(&self) -> f64;

    /// Written once by [`backpatch_cdf`].
    fn set_cdf(&mut self, cdf: f64);
}

/// An item that can be picked by name from a preference list.
pub trait Named {
    /// Name used for preference matching (compared case-insensitively).
    fn name(&self) -> &str;
}

/// Writes cumulative probabilities back into `items`, in slice order.
///
/// `cdf_i = cdf_{i-1} + weight_i / Σweight`. The last positive-weight entry
/// (and any zero-weight entries after it) is pinned to exactly `1.0` so float
/// rounding can never leave a gap at the tail. An empty slice is left untouched.
///
/// # Errors
///
/// Returns `AttenuatorError::ZeroTotalWeight` if the set is non-empty and every
/// weight is zero.
pub fn backpatch_cdf<T: Weighted>(set: &str, items: &mut [T]) -> Result<(), AttenuatorError> {
    if items.is_empty() {
        return Ok(());
    }

    let total: u64 = items.iter().map(|item| u64::from(item.weight())).sum();
    if total == 0 {
        return Err(AttenuatorError::ZeroTotalWeight {
            set: set.to_string(),
        });
    }

    let total = total as f64;
    let tail = items.iter().rposition(|item| item.weight() > 0).unwrap_or(0);
    let mut cumulative = 0.0;
    for (i, item) in items.iter_mut().enumerate() {
        cumulative += f64::from(item.weight()) / total;
        let cdf = if i >= tail { 1.0 } else { cumulative.min(1.0) };
        item.set_cdf(cdf);
    }
    Ok(())
}

/// Picks the first positive-weight item whose cdf reaches `probability`.
///
/// `probability` is normally a uniform draw from `[0, 1)`. Zero-weight items are
/// never picked while a positive-weight one exists. Returns `None` only for an
/// empty slice. If float error leaves nothing at or above `probability`, a
/// uniform pick among positive-weight items is returned instead of failing the
/// caller.
pub fn choose_from_cdf<'a, T, R>(probability: f64, items: &'a [T], rng: &mut R) -> Option<&'a T>
where
    T: Weighted,
    R: Rng + ?Sized,
{
    if items.len() <= 1 {
        return items.first();
    }
    let drawn = items
        .iter()
        .filter(|item| item.weight() > 0)
        .find(|item| item.cdf() >= probability || item.cdf() >= 1.0);
    if drawn.is_some() {
        return drawn;
    }

    let positive = items.iter().filter(|item| item.weight() > 0).count();
    if positive == 0 {
        return items.get(rng.random_range(0..items.len()));
    }
    let pick = rng.random_range(0..positive);
    items.iter().filter(|item| item.weight() > 0).nth(pick)
}
