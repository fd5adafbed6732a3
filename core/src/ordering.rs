//! Dense per-profile display ordering.
//!
//! Positions of a profile's services always form `0..n` with no repeats.
//! These helpers compute next states; the store applies them inside one
//! transaction and re-checks density before committing.

use std::collections::HashSet;

use crate::error::CatalogError;
use crate::model::ServiceId;

/// Fails unless `orders` is exactly `{0, 1, .., n-1}`.
pub fn ensure_dense<I>(orders: I) -> Result<(), CatalogError>
where
    I: IntoIterator<Item = i64>,
{
    let mut orders: Vec<i64> = orders.into_iter().collect();
    orders.sort_unstable();
    for (expected, &got) in orders.iter().enumerate() {
        if got != expected as i64 {
            return Err(CatalogError::InvalidOrdering(format!(
                "sort order is not dense: expected position {expected}, found {got}"
            )));
        }
    }
    Ok(())
}

/// Positions for `count` rows appended after the existing ones
/// (`max + 1`, `max + 2`, ..). Existing positions are not touched.
pub fn append_positions<I>(existing: I, count: usize) -> Vec<i64>
where
    I: IntoIterator<Item = i64>,
{
    let next = existing.into_iter().max().map_or(0, |m| m + 1);
    (0..count as i64).map(|i| next + i).collect()
}

/// Validates `ordered` as a permutation of `current` and returns the
/// `(id, position)` assignment it describes.
pub fn plan_reorder(current: &[ServiceId], ordered: &[ServiceId]) -> Result<Vec<(ServiceId, i64)>, CatalogError> {
    if ordered.len() != current.len() {
        return Err(CatalogError::InvalidOrdering(format!(
            "expected {} service ids, got {}",
            current.len(),
            ordered.len()
        )));
    }
    let known: HashSet<ServiceId> = current.iter().copied().collect();
    let mut seen = HashSet::with_capacity(ordered.len());
    for id in ordered {
        if !known.contains(id) {
            return Err(CatalogError::InvalidOrdering(format!("service {id} does not belong to this profile")));
        }
        if !seen.insert(*id) {
            return Err(CatalogError::InvalidOrdering(format!("service {id} listed more than once")));
        }
    }
    Ok(ordered.iter().enumerate().map(|(pos, id)| (*id, pos as i64)).collect())
}
