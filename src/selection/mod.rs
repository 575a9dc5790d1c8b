//! Weighted random selection.
//!
//! Backend routing and fault injection both pick one item out of a configured,
//! weighted set. This module provides:
//! - CDF construction and lookup (`backpatch_cdf`, `choose_from_cdf`)
//! - Selection rules (`SelectionRule`)
//! - An owned, backpatched set with preference-list support (`WeightedSet`)

mod cdf;
mod rule;
mod weighted_set;

// Re-export public API
pub use cdf::{backpatch_cdf, choose_from_cdf, Named, Weighted};
pub use rule::SelectionRule;
pub use weighted_set::WeightedSet;
