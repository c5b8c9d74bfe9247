//! Offset pagination and early-exit search shared by requests and basket names.

/// Returns the `[start, end)` window for `max` items after `skip`, and whether
/// items remain past the window.
pub fn window(len: usize, max: usize, skip: usize) -> (usize, usize, bool) {
    if skip >= len {
        return (len, len, false);
    }
    let end = skip.saturating_add(max).min(len);
    (skip, end, skip.saturating_add(max) < len)
}

/// Clones the page selected by [`window`].
pub fn page<T: Clone>(items: &[T], max: usize, skip: usize) -> (Vec<T>, bool) {
    let (start, end, has_more) = window(items.len(), max, skip);
    (items[start..end].to_vec(), has_more)
}

/// Scans `items` in order, skipping the first `skip` matches and collecting up
/// to `max` more. The scan stops as soon as `max` matches are collected;
/// `has_more` reports whether any items were left unscanned at that point.
pub fn find<T, I, F>(items: I, max: usize, skip: usize, mut matches: F) -> (Vec<T>, bool)
where
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> bool,
{
    let mut iter = items.into_iter();
    let mut found = Vec::new();
    let mut to_skip = skip;

    if max == 0 {
        return (found, iter.next().is_some());
    }

    while let Some(item) = iter.next() {
        if !matches(&item) {
            continue;
        }
        if to_skip > 0 {
            to_skip -= 1;
            continue;
        }
        found.push(item);
        if found.len() == max {
            return (found, iter.next().is_some());
        }
    }
    (found, false)
}
