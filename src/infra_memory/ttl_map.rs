use crate::domain_port::Clock;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::hash::Hash;
use std::sync::Arc;

struct Expiring<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// Key-value map whose entries vanish once the injected clock passes their
/// deadline, mirroring Redis key TTLs.
pub(crate) struct TtlMap<K, V> {
    clock: Arc<dyn Clock>,
    entries: DashMap<K, Expiring<V>>,
}

impl<K, V> TtlMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: DashMap::new(),
        }
    }

    fn deadline(&self, ttl_secs: u64) -> DateTime<Utc> {
        self.clock.now() + Duration::seconds(ttl_secs as i64)
    }

    fn purge(&self, key: &K, now: DateTime<Utc>) {
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
    }

    pub(crate) fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(e) if e.expires_at > now => return Some(e.value.clone()),
            Some(_) => {}
            None => return None,
        }
        self.purge(key, now);
        None
    }

    pub(crate) fn insert(&self, key: K, value: V, ttl_secs: u64) {
        let expires_at = self.deadline(ttl_secs);
        self.entries.insert(key, Expiring { value, expires_at });
    }

    pub(crate) fn insert_if_absent(&self, key: K, value: V, ttl_secs: u64) -> bool {
        let now = self.clock.now();
        let fresh = Expiring {
            value,
            expires_at: self.deadline(ttl_secs),
        };
        match self.entries.entry(key) {
            Entry::Occupied(mut o) => {
                if o.get().expires_at > now {
                    false
                } else {
                    o.insert(fresh);
                    true
                }
            }
            Entry::Vacant(v) => {
                v.insert(fresh);
                true
            }
        }
    }

    /// Mutates a live entry in place, keeping its deadline.
    pub(crate) fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let now = self.clock.now();
        {
            let mut entry = self.entries.get_mut(key)?;
            if entry.expires_at > now {
                return Some(f(&mut entry.value));
            }
        }
        self.purge(key, now);
        None
    }

    /// Mutates a live entry or starts a new one with `ttl_secs`.
    pub(crate) fn upsert<R>(
        &self,
        key: K,
        ttl_secs: u64,
        init: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> R,
    ) -> R {
        let now = self.clock.now();
        let expires_at = self.deadline(ttl_secs);
        match self.entries.entry(key) {
            Entry::Occupied(mut o) => {
                if o.get().expires_at <= now {
                    o.insert(Expiring {
                        value: init(),
                        expires_at,
                    });
                }
                f(&mut o.get_mut().value)
            }
            Entry::Vacant(v) => {
                let mut e = v.insert(Expiring {
                    value: init(),
                    expires_at,
                });
                f(&mut e.value)
            }
        }
    }

    pub(crate) fn remove_if(&self, key: &K, f: impl FnOnce(&V) -> bool) {
        self.entries.remove_if(key, |_, e| f(&e.value));
    }

    pub(crate) fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    pub(crate) fn ttl_secs(&self, key: &K) -> Option<u64> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?;
        if entry.expires_at <= now {
            return None;
        }
        let millis = (entry.expires_at - now).num_milliseconds().max(0) as u64;
        Some(millis.div_ceil(1000))
    }
}
