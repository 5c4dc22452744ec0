//! In-memory working copy of the vault: domain → key → value.
//!
//! Every operation here is total.  Type checks happen in the typed
//! accessors, durability in the service layer.

use std::collections::BTreeMap;

use super::value::Value;

/// All key-value pairs of one domain.
pub type DomainMap = BTreeMap<String, Value>;

/// Invariant: no domain maps to an empty `DomainMap`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainStore {
    domains: BTreeMap<String, DomainMap>,
}

impl DomainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a single value.
    pub fn get(&self, domain: &str, key: &str) -> Option<&Value> {
        self.domains.get(domain)?.get(key)
    }

    pub fn contains_domain(&self, domain: &str) -> bool {
        self.domains.contains_key(domain)
    }

    /// Copy of a whole domain; empty if the domain does not exist.
    pub fn domain_snapshot(&self, domain: &str) -> DomainMap {
        self.domains.get(domain).cloned().unwrap_or_default()
    }

    /// Insert or overwrite a value, creating the domain if needed.
    pub fn put(&mut self, domain: &str, key: &str, value: Value) {
        self.domains
            .entry(domain.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Discard a domain's contents and install `entries` in one step.
    ///
    /// An empty `entries` removes the domain.
    pub fn replace_domain(&mut self, domain: &str, entries: DomainMap) {
        if entries.is_empty() {
            self.domains.remove(domain);
        } else {
            self.domains.insert(domain.to_string(), entries);
        }
    }

    /// Remove one key; drops the domain when it becomes empty.
    pub fn remove_key(&mut self, domain: &str, key: &str) {
        if let Some(entries) = self.domains.get_mut(domain) {
            entries.remove(key);
            if entries.is_empty() {
                self.domains.remove(domain);
            }
        }
    }

    pub fn remove_domain(&mut self, domain: &str) {
        self.domains.remove(domain);
    }

    /// Domain names in sorted order.
    pub fn domain_names(&self) -> Vec<String> {
        self.domains.keys().cloned().collect()
    }

    /// Iterate domains in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DomainMap)> {
        self.domains.iter()
    }

    /// Number of domains.
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

/// One mutating operation, kept until it has been durably committed.
///
/// Pending mutations are replayed onto the freshly loaded blob at commit
/// time, so writes from other processes are never overwritten.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Put {
        domain: String,
        key: String,
        value: Value,
    },
    ReplaceDomain {
        domain: String,
        entries: DomainMap,
    },
    RemoveKey {
        domain: String,
        key: String,
    },
    RemoveDomain {
        domain: String,
    },
}

impl Mutation {
    pub fn apply(&self, store: &mut DomainStore) {
        match self {
            Self::Put { domain, key, value } => store.put(domain, key, value.clone()),
            Self::ReplaceDomain { domain, entries } => {
                store.replace_domain(domain, entries.clone())
            }
            Self::RemoveKey { domain, key } => store.remove_key(domain, key),
            Self::RemoveDomain { domain } => store.remove_domain(domain),
        }
    }

    /// Short operation name for logs and the audit trail.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Put { .. } => "put",
            Self::ReplaceDomain { .. } => "replace_domain",
            Self::RemoveKey { .. } => "unset_key",
            Self::RemoveDomain { .. } => "unset_domain",
        }
    }

    pub fn domain(&self) -> &str {
        match self {
            Self::Put { domain, .. }
            | Self::ReplaceDomain { domain, .. }
            | Self::RemoveKey { domain, .. }
            | Self::RemoveDomain { domain } => domain,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Put { key, .. } | Self::RemoveKey { key, .. } => Some(key),
            Self::ReplaceDomain { .. } | Self::RemoveDomain { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, Value)]) -> DomainMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn get_missing_returns_none() {
        let store = DomainStore::new();
        assert!(store.get("api", "token").is_none());
        assert!(store.domain_snapshot("api").is_empty());
    }

    #[test]
    fn put_creates_domain_and_overwrites() {
        let mut store = DomainStore::new();
        store.put("api", "token", Value::from("a"));
        store.put("api", "token", Value::Integer(2));

        assert_eq!(store.get("api", "token"), Some(&Value::Integer(2)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_last_key_removes_domain() {
        let mut store = DomainStore::new();
        store.put("api", "token", Value::from("a"));
        store.put("api", "url", Value::from("b"));

        store.remove_key("api", "token");
        assert_eq!(store.domain_names(), vec!["api".to_string()]);

        store.remove_key("api", "url");
        assert!(store.is_empty());

        // Removing again is a no-op.
        store.remove_key("api", "url");
        store.remove_domain("api");
        assert!(store.is_empty());
    }

    #[test]
    fn replace_domain_discards_old_keys() {
        let mut store = DomainStore::new();
        store.put("db", "host", Value::from("old"));
        store.put("db", "port", Value::Integer(5432));

        store.replace_domain("db", map(&[("host", Value::from("new"))]));

        let snapshot = store.domain_snapshot("db");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["host"], Value::from("new"));
    }

    #[test]
    fn replace_with_empty_mapping_removes_domain() {
        let mut store = DomainStore::new();
        store.put("db", "host", Value::from("x"));
        store.replace_domain("db", DomainMap::new());
        assert!(store.is_empty());
    }

    #[test]
    fn remove_domain_leaves_others() {
        let mut store = DomainStore::new();
        store.put("a", "k", Value::Boolean(true));
        store.put("b", "k", Value::Boolean(false));

        store.remove_domain("a");
        assert!(store.get("a", "k").is_none());
        assert_eq!(store.get("b", "k"), Some(&Value::Boolean(false)));
    }

    #[test]
    fn replaying_mutations_reproduces_state() {
        let mutations = vec![
            Mutation::Put {
                domain: "api".into(),
                key: "token".into(),
                value: Value::from("t"),
            },
            Mutation::ReplaceDomain {
                domain: "limits".into(),
                entries: map(&[("max", Value::Integer(3))]),
            },
            Mutation::RemoveKey {
                domain: "api".into(),
                key: "token".into(),
            },
        ];

        let mut store = DomainStore::new();
        for m in &mutations {
            m.apply(&mut store);
        }

        assert_eq!(store.domain_names(), vec!["limits".to_string()]);
        assert_eq!(mutations[2].operation(), "unset_key");
        assert_eq!(mutations[1].key(), None);
    }
}
