use std::collections::HashSet;

use crate::types::ItemId;

/// Monotonic set of ids that may never again be offered as a main item.
///
/// The set only grows. It is rebuilt at startup from the annotation log's
/// `pos` ids rather than persisted directly.
#[derive(Clone, Debug, Default)]
pub struct ExclusionSet {
    ids: HashSet<ItemId>,
}

impl ExclusionSet {
    /// Create an empty exclusion set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `ids`, returning the ids that were not already excluded.
    pub fn extend<'a, I>(&mut self, ids: I) -> Vec<ItemId>
    where
        I: IntoIterator<Item = &'a ItemId>,
    {
        let mut added = Vec::new();
        for id in ids {
            if self.ids.insert(id.clone()) {
                added.push(id.clone());
            }
        }
        added
    }

    /// Returns `true` when `id` is excluded.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of excluded ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` when nothing is excluded yet.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_reports_only_new_ids() {
        let mut set = ExclusionSet::new();
        let first = set.extend(&["a".to_string(), "b".to_string()]);
        assert_eq!(first, vec!["a".to_string(), "b".to_string()]);

        let second = set.extend(&["b".to_string(), "c".to_string(), "c".to_string()]);
        assert_eq!(second, vec!["c".to_string()]);
        assert_eq!(set.len(), 3);
        assert!(set.contains("a"));
        assert!(!set.contains("d"));
    }
}
