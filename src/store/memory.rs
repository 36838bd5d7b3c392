use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{KeyValueStore, StoreError, StoreResult};

enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// In-memory [`KeyValueStore`] with per-key expiry.
///
/// Expiry is lazy: a key whose deadline has passed is treated as absent and
/// dropped on the next access, matching what the engine may observe against
/// a real store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<HashMap<String, Entry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Removes the key if expired, so lookups below see a live entry or nothing.
fn purge_expired(map: &mut HashMap<String, Entry>, key: &str) {
    if map.get(key).is_some_and(Entry::expired) {
        map.remove(key);
    }
}

fn hash_mut<'a>(
    map: &'a mut HashMap<String, Entry>,
    key: &str,
) -> StoreResult<&'a mut HashMap<String, String>> {
    let entry = map
        .entry(key.to_string())
        .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
    match &mut entry.value {
        Value::Hash(h) => Ok(h),
        _ => Err(StoreError::WrongType(key.to_string())),
    }
}

fn set_mut<'a>(
    map: &'a mut HashMap<String, Entry>,
    key: &str,
) -> StoreResult<&'a mut HashSet<String>> {
    let entry = map
        .entry(key.to_string())
        .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));
    match &mut entry.value {
        Value::Set(s) => Ok(s),
        _ => Err(StoreError::WrongType(key.to_string())),
    }
}

fn hash_ref<'a>(
    map: &'a HashMap<String, Entry>,
    key: &str,
) -> StoreResult<Option<&'a HashMap<String, String>>> {
    match map.get(key) {
        None => Ok(None),
        Some(entry) => match &entry.value {
            Value::Hash(h) => Ok(Some(h)),
            _ => Err(StoreError::WrongType(key.to_string())),
        },
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut map = self.inner.lock().await;
        purge_expired(&mut map, key);
        Ok(hash_ref(&map, key)?.and_then(|h| h.get(field).cloned()))
    }

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut map = self.inner.lock().await;
        purge_expired(&mut map, key);
        Ok(hash_ref(&map, key)?.cloned().unwrap_or_default())
    }

    async fn hset(&self, key: &str, entries: &[(&str, String)]) -> StoreResult<()> {
        let mut map = self.inner.lock().await;
        purge_expired(&mut map, key);
        let hash = hash_mut(&mut map, key)?;
        for (field, value) in entries {
            hash.insert(field.to_string(), value.clone());
        }
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<()> {
        let mut map = self.inner.lock().await;
        purge_expired(&mut map, key);
        if map.contains_key(key) {
            hash_mut(&mut map, key)?.remove(field);
        }
        Ok(())
    }

    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool> {
        Ok(self.hget(key, field).await?.is_some())
    }

    async fn hlen(&self, key: &str) -> StoreResult<usize> {
        let mut map = self.inner.lock().await;
        purge_expired(&mut map, key);
        Ok(hash_ref(&map, key)?.map(HashMap::len).unwrap_or(0))
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let mut map = self.inner.lock().await;
        purge_expired(&mut map, key);
        let hash = hash_mut(&mut map, key)?;
        let current = match hash.get(field) {
            None => 0,
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| StoreError::WrongType(key.to_string()))?,
        };
        let next = current + delta;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn hset_if_eq(
        &self,
        key: &str,
        field: &str,
        expected: &str,
        updates: &[(&str, String)],
    ) -> StoreResult<bool> {
        let mut map = self.inner.lock().await;
        purge_expired(&mut map, key);
        let hash = match hash_ref(&map, key)? {
            Some(h) => h,
            None => return Ok(false),
        };
        if hash.get(field).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        let hash = hash_mut(&mut map, key)?;
        for (f, v) in updates {
            hash.insert(f.to_string(), v.clone());
        }
        Ok(true)
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut map = self.inner.lock().await;
        purge_expired(&mut map, key);
        set_mut(&mut map, key)?.insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut map = self.inner.lock().await;
        purge_expired(&mut map, key);
        if map.contains_key(key) {
            set_mut(&mut map, key)?.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut map = self.inner.lock().await;
        purge_expired(&mut map, key);
        match map.get(key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::Set(s) => Ok(s.iter().cloned().collect()),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut map = self.inner.lock().await;
        purge_expired(&mut map, key);
        match map.get(key) {
            None => Ok(false),
            Some(entry) => match &entry.value {
                Value::Set(s) => Ok(s.contains(member)),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut map = self.inner.lock().await;
        purge_expired(&mut map, key);
        match map.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Str(s) => Ok(Some(s.clone())),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut map = self.inner.lock().await;
        map.insert(key.to_string(), Entry::new(Value::Str(value.to_string())));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<bool> {
        let mut map = self.inner.lock().await;
        purge_expired(&mut map, key);
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(true)
    }

    async fn del(&self, keys: &[&str]) -> StoreResult<()> {
        let mut map = self.inner.lock().await;
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let mut map = self.inner.lock().await;
        purge_expired(&mut map, key);
        if let Some(entry) = map.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}
