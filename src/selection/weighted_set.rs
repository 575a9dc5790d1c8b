//! A backpatched sibling set.

use rand::Rng;

use super::cdf::{backpatch_cdf, choose_from_cdf, Named, Weighted};
use super::rule::SelectionRule;
use crate::error_handling::AttenuatorError;

/// Items in configuration order with their CDF already computed.
///
/// The CDF is written once in [`WeightedSet::new`] and never changes afterwards.
#[derive(Debug, Clone)]
pub struct WeightedSet<T> {
    name: String,
    items: Vec<T>,
}

impl<T: Weighted> WeightedSet<T> {
    /// Backpatches `items` and takes ownership of them.
    ///
    /// # Errors
    ///
    /// Returns `AttenuatorError::ZeroTotalWeight` if every weight is zero.
    pub fn new(name: impl Into<String>, mut items: Vec<T>) -> Result<Self, AttenuatorError> {
        let name = name.into();
        backpatch_cdf(&name, &mut items)?;
        Ok(WeightedSet { name, items })
    }

    /// Draws one item according to `rule`. `None` only for an empty set.
    pub fn choose_by_rule<R: Rng + ?Sized>(&self, rule: SelectionRule, rng: &mut R) -> Option<&T> {
        if self.items.is_empty() {
            return None;
        }
        match rule {
            SelectionRule::Weighted => {
                let probability: f64 = rng.random();
                choose_from_cdf(probability, &self.items, rng)
            }
            SelectionRule::Uniform => self.items.get(rng.random_range(0..self.items.len())),
        }
    }
}

impl<T> WeightedSet<T> {
    /// Name of the set, used in error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Items in configuration order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Iterates over the items in configuration order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if there is nothing to choose from.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Named> WeightedSet<T> {
    /// Looks an item up by name (case-insensitive).
    pub fn find(&self, name: &str) -> Option<&T> {
        self.items
            .iter()
            .find(|item| item.name().eq_ignore_ascii_case(name))
    }

    /// Returns the first preferred name that matches an item.
    ///
    /// Preferences are tried in the caller's order.
    pub fn find_preferred<S: AsRef<str>>(&self, preferred: &[S]) -> Option<&T> {
        preferred.iter().find_map(|name| self.find(name.as_ref()))
    }
}

impl<T: Weighted + Named> WeightedSet<T> {
    /// Draws one item, letting a matching preference bypass the CDF.
    pub fn choose<S, R>(&self, rule: SelectionRule, preferred: &[S], rng: &mut R) -> Option<&T>
    where
        S: AsRef<str>,
        R: Rng + ?Sized,
    {
        self.find_preferred(preferred)
            .or_else(|| self.choose_by_rule(rule, rng))
    }
}

impl<'a, T> IntoIterator for &'a WeightedSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
