//! Category filtering for search results.

/// Whether an item's category codes satisfy the requested codes.
///
/// A requested code matches exactly, or - when it is a "family" code (an
/// exact multiple of 1000, e.g. 4000) - matches any item code in the same
/// thousands family (4050, 4070, ...). Items carrying no category
/// information are kept: dropping them would silently hide results from
/// indexers with sparse metadata.
pub fn matches_requested(requested: &[u32], item: &[u32]) -> bool {
    if requested.is_empty() || item.is_empty() {
        return true;
    }

    requested.iter().any(|&r| {
        item.iter()
            .any(|&c| c == r || (r % 1000 == 0 && r / 1000 == c / 1000))
    })
}
