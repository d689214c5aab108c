//! Shared controller helpers.

/// Finalizer list with `finalizer` added, or `None` when already present.
pub fn with_finalizer(finalizers: &[String], finalizer: &str) -> Option<Vec<String>> {
    if finalizers.iter().any(|f| f == finalizer) {
        return None;
    }
    let mut updated = finalizers.to_vec();
    updated.push(finalizer.to_string());
    Some(updated)
}

/// Finalizer list with `finalizer` removed, or `None` when absent.
///
/// Other controllers' finalizers are left in place.
pub fn without_finalizer(finalizers: &[String], finalizer: &str) -> Option<Vec<String>> {
    if !finalizers.iter().any(|f| f == finalizer) {
        return None;
    }
    Some(
        finalizers
            .iter()
            .filter(|f| *f != finalizer)
            .cloned()
            .collect(),
    )
}
