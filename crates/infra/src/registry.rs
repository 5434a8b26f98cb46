//! In-memory token registry.
//!
//! Authoritative for listings and admin existence checks. Rebuilt from the
//! store once at startup, then kept in step with it by `AdminOperations`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use portgate_core::{PolicyRecord, RecordFilter};

/// Concurrency-safe `user -> record` map.
///
/// Records are replaced as whole values under the write lock, so readers
/// never see a partially updated record.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    records: RwLock<HashMap<String, PolicyRecord>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, PolicyRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, PolicyRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the whole contents with `records`.
    pub fn load(&self, records: impl IntoIterator<Item = PolicyRecord>) {
        let fresh: HashMap<String, PolicyRecord> = records
            .into_iter()
            .map(|record| (record.user.clone(), record))
            .collect();
        *self.write() = fresh;
    }

    pub fn get(&self, user: &str) -> Option<PolicyRecord> {
        self.read().get(user).cloned()
    }

    pub fn contains(&self, user: &str) -> bool {
        self.read().contains_key(user)
    }

    pub fn put(&self, record: PolicyRecord) {
        self.write().insert(record.user.clone(), record);
    }

    pub fn delete(&self, user: &str) -> Option<PolicyRecord> {
        self.write().remove(user)
    }

    /// Flip the enabled flag of an existing record. Returns `false` if absent.
    pub fn set_enabled(&self, user: &str, enabled: bool) -> bool {
        let mut records = self.write();
        let Some(current) = records.get(user) else {
            return false;
        };
        let mut next = current.clone();
        next.enabled = enabled;
        records.insert(user.to_string(), next);
        true
    }

    pub fn all(&self) -> Vec<PolicyRecord> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Filtered listing sorted by user, plus the filtered total.
    ///
    /// `page` is 1-based and only applies when `limit > 0`. Page 0 and pages
    /// past the end yield an empty slice.
    pub fn query(&self, filter: &RecordFilter, page: usize, limit: usize) -> (Vec<PolicyRecord>, usize) {
        let mut matched: Vec<PolicyRecord> = self
            .read()
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.user.cmp(&b.user));

        let total = matched.len();
        if limit == 0 {
            return (matched, total);
        }

        if page == 0 {
            return (Vec::new(), total);
        }
        let start = (page - 1).saturating_mul(limit);
        if start >= total {
            return (Vec::new(), total);
        }
        let end = start.saturating_add(limit).min(total);
        (matched.drain(start..end).collect(), total)
    }

    /// Highest port referenced by records bound to `server`, 0 if none.
    pub fn max_port_for_server(&self, server: &str) -> u32 {
        self.read()
            .values()
            .filter(|record| record.server.as_deref() == Some(server))
            .filter_map(PolicyRecord::max_port)
            .max()
            .unwrap_or(0)
    }

    /// Highest referenced port per server name. Unbound records are keyed by `""`.
    pub fn max_ports_by_server(&self) -> BTreeMap<String, u32> {
        let mut ports = BTreeMap::new();
        for record in self.read().values() {
            let entry = ports
                .entry(record.server.clone().unwrap_or_default())
                .or_insert(0);
            if let Some(max) = record.max_port() {
                *entry = (*entry).max(max);
            }
        }
        ports
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn named(user: &str) -> PolicyRecord {
        PolicyRecord::new(user, "t")
    }

    #[test]
    fn paginates_in_user_order() {
        let registry = TokenRegistry::new();
        registry.load((1..=25).rev().map(|i| named(&format!("user{i:02}"))));

        let (page, total) = registry.query(&RecordFilter::default(), 2, 10);
        assert_eq!(total, 25);
        let users: Vec<_> = page.iter().map(|r| r.user.as_str()).collect();
        assert_eq!(users.first(), Some(&"user11"));
        assert_eq!(users.last(), Some(&"user20"));
        assert_eq!(users.len(), 10);

        let (last, _) = registry.query(&RecordFilter::default(), 3, 10);
        assert_eq!(last.len(), 5);

        let (beyond, total) = registry.query(&RecordFilter::default(), 4, 10);
        assert!(beyond.is_empty());
        assert_eq!(total, 25);

        let (everything, _) = registry.query(&RecordFilter::default(), 0, 0);
        assert_eq!(everything.len(), 25);
    }

    #[test]
    fn page_zero_with_limit_is_empty() {
        let registry = TokenRegistry::new();
        registry.load((1..=25).map(|i| named(&format!("user{i:02}"))));

        let (page, total) = registry.query(&RecordFilter::default(), 0, 10);
        assert!(page.is_empty());
        assert_eq!(total, 25);
    }

    proptest! {
        #[test]
        fn pages_stay_within_bounds(size in 0usize..60, page in 0usize..12, limit in 0usize..15) {
            let registry = TokenRegistry::new();
            registry.load((0..size).map(|i| named(&format!("user{i:03}"))));

            let (records, total) = registry.query(&RecordFilter::default(), page, limit);
            prop_assert_eq!(total, size);

            let expected = if limit == 0 {
                size
            } else if page == 0 {
                0
            } else {
                let start = ((page - 1) * limit).min(size);
                (page * limit).min(size) - start
            };
            prop_assert_eq!(records.len(), expected);

            if limit > 0 && page > 0 {
                for (offset, record) in records.iter().enumerate() {
                    prop_assert_eq!(&record.user, &format!("user{:03}", (page - 1) * limit + offset));
                }
            }
            prop_assert!(records.windows(2).all(|w| w[0].user < w[1].user));
        }
    }

    #[test]
    fn filter_total_counts_matches_only() {
        let registry = TokenRegistry::new();
        registry.load(vec![named("alpha"), named("alpine"), named("beta")]);

        let filter = RecordFilter {
            user: "al p".into(),
            ..Default::default()
        };
        let (records, total) = registry.query(&filter, 1, 1);
        assert_eq!(total, 2);
        assert_eq!(records[0].user, "alpha");
    }

    #[test]
    fn set_enabled_replaces_whole_record() {
        let registry = TokenRegistry::new();
        registry.put(named("u"));
        assert!(registry.set_enabled("u", false));
        assert!(!registry.get("u").unwrap().enabled);
        assert!(!registry.set_enabled("ghost", true));
    }

    #[test]
    fn load_replaces_previous_contents() {
        let registry = TokenRegistry::new();
        registry.put(named("stale"));
        registry.load(vec![named("fresh")]);
        assert!(!registry.contains("stale"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn max_ports_group_by_server() {
        let registry = TokenRegistry::new();
        let mut a = named("a");
        a.server = Some("edge".into());
        a.ports = serde_json::from_str(r#"[80, "10000-10200"]"#).unwrap();
        let mut b = named("b");
        b.server = Some("edge".into());
        b.ports = serde_json::from_str(r#"["12000"]"#).unwrap();
        let mut c = named("c");
        c.ports = serde_json::from_str(r#"[443]"#).unwrap();
        registry.load(vec![a, b, c, named("d")]);

        assert_eq!(registry.max_port_for_server("edge"), 12000);
        assert_eq!(registry.max_port_for_server("nowhere"), 0);

        let all = registry.max_ports_by_server();
        assert_eq!(all.get("edge"), Some(&12000));
        assert_eq!(all.get(""), Some(&443));
    }
}
