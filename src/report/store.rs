use std::collections::HashSet;

use dashmap::DashMap;

use super::{CallSite, CollectedMatches};

/// Deduplicated matches keyed by owner class.
///
/// Scanning threads add through `&self`; each owner bucket lives in a
/// `DashMap` shard, so concurrent adds only contend on the same shard.
#[derive(Debug, Default)]
pub(crate) struct MatchStore {
    buckets: DashMap<String, HashSet<CallSite>>,
}

impl MatchStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert a record. Returns `false` when an equal record was already present.
    pub(crate) fn add(&self, record: CallSite) -> bool {
        self.buckets
            .entry(record.owner_class.clone())
            .or_default()
            .insert(record)
    }

    pub(crate) fn clear(&self) {
        self.buckets.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.value().len()).sum()
    }

    /// Ordered copy of the current contents.
    pub(crate) fn snapshot(&self) -> CollectedMatches {
        self.buckets
            .iter()
            .map(|bucket| {
                (
                    bucket.key().clone(),
                    bucket.value().iter().cloned().collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::{field_site, site};
    use rayon::prelude::*;

    #[test]
    fn add_is_idempotent_for_equal_records() {
        let store = MatchStore::new();

        assert!(store.add(site("com.app.Logger", "void d()", "com.app.Main", 42)));
        assert!(!store.add(site("com.app.Logger", "void d()", "com.app.Main", 42)));

        let snapshot = store.snapshot();
        assert_eq!(snapshot["com.app.Logger"].len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn records_differing_in_one_field_are_kept_apart() {
        let store = MatchStore::new();
        store.add(site("a.B", "void x()", "c.C", 1));
        store.add(site("a.B", "void x()", "c.C", 2));
        store.add(site("a.B", "void x()", "c.D", 1));
        store.add(field_site("a.B", "int x", "c.C", 1));
        store.add(site("a.E", "void x()", "c.C", 1));

        let snapshot = store.snapshot();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["a.B"].len(), 4);
        assert_eq!(snapshot["a.E"].len(), 1);
    }

    #[test]
    fn clear_empties_every_bucket() {
        let store = MatchStore::new();
        store.add(site("a.B", "void x()", "c.C", 1));

        store.clear();

        assert_eq!(store.len(), 0);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn concurrent_adds_lose_nothing() {
        let store = MatchStore::new();

        (0..4000u32).into_par_iter().for_each(|index| {
            // Neighbouring tasks add the same record.
            let key = index / 2;
            let owner = format!("owner.C{}", key % 7);
            store.add(site(&owner, "void x()", "caller.Main", key as i32));
        });

        assert_eq!(store.snapshot().len(), 7);
        assert_eq!(store.len(), 2000);
    }
}
