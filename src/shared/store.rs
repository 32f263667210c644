//! Document store abstraction over the Realtime Database JSON tree
//!
//! The poller only needs three operations: read a subtree (optionally
//! shallow or limited to the last N children by key), overwrite a node, and
//! delete a node. `MemoryStore` implements the same semantics in-process.

use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Mutex;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// Entire subtree
    Full,
    /// Immediate children only; object children are replaced by `true`
    Shallow,
    /// Last `n` children ordered by key
    LastByKey(usize),
}

pub trait DocumentStore: Send + Sync {
    /// Read the node at `path`; `Ok(None)` when nothing is stored there
    fn get(
        &self,
        path: &str,
        query: Query,
    ) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Overwrite the node at `path`
    fn set(&self, path: &str, value: &Value) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove the node at `path` and everything below it
    fn delete(&self, path: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Keys of the immediate children of `path`
pub async fn child_keys<S: DocumentStore>(store: &S, path: &str) -> Result<Vec<String>, StoreError> {
    match store.get(path, Query::Shallow).await? {
        Some(Value::Object(map)) => Ok(map.keys().cloned().collect()),
        _ => Ok(Vec::new()),
    }
}

/// Serialize `value` and write it to `path`
pub async fn set_json<S, T>(store: &S, path: &str, value: &T) -> Result<(), StoreError>
where
    S: DocumentStore,
    T: Serialize + Sync,
{
    let value = serde_json::to_value(value)?;
    store.set(path, &value).await
}

/// In-process JSON tree with the same read/write semantics as the database
#[derive(Debug, Default)]
pub struct MemoryStore {
    root: Mutex<Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(root: Value) -> Self {
        Self {
            root: Mutex::new(root),
        }
    }

    /// Copy of the whole tree
    pub fn snapshot(&self) -> Value {
        self.lock().clone()
    }

    /// Synchronous read of a node, mainly for assertions
    pub fn read(&self, path: &str) -> Option<Value> {
        let root = self.lock();
        lookup(&root, &segments(path)).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Value> {
        self.root.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DocumentStore for MemoryStore {
    async fn get(&self, path: &str, query: Query) -> Result<Option<Value>, StoreError> {
        let root = self.lock();
        let node = match lookup(&root, &segments(path)) {
            Some(node) => node,
            None => return Ok(None),
        };

        let result = match (query, node) {
            (Query::Full, node) => node.clone(),
            (Query::Shallow, Value::Object(map)) => Value::Object(
                map.iter()
                    .map(|(k, v)| {
                        let shallow = if v.is_object() { Value::Bool(true) } else { v.clone() };
                        (k.clone(), shallow)
                    })
                    .collect(),
            ),
            (Query::LastByKey(n), Value::Object(map)) => {
                let skip = map.len().saturating_sub(n);
                Value::Object(
                    map.iter()
                        .skip(skip)
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect::<Map<String, Value>>(),
                )
            }
            (_, node) => node.clone(),
        };

        Ok(Some(result))
    }

    async fn set(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        let mut root = self.lock();
        let segs = segments(path);
        if value.is_null() {
            remove(&mut root, &segs);
        } else {
            insert(&mut root, &segs, value.clone());
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let mut root = self.lock();
        remove(&mut root, &segments(path));
        Ok(())
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Arrays are addressed by index, as the database does for numeric keys
fn child<'a>(node: &'a Value, seg: &str) -> Option<&'a Value> {
    match node {
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => node.get(seg),
    }
}

/// Turn an array node into the equivalent index-keyed object
fn index_keyed(node: &mut Value) {
    if let Value::Array(items) = node {
        let map: Map<String, Value> = std::mem::take(items)
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect();
        *node = Value::Object(map);
    }
}

fn lookup<'a>(root: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    let node = segs.iter().try_fold(root, |node, seg| child(node, seg))?;
    if node.is_null() {
        None
    } else {
        Some(node)
    }
}

fn insert(node: &mut Value, segs: &[&str], value: Value) {
    match segs.split_first() {
        None => *node = value,
        Some((head, rest)) => {
            index_keyed(node);
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            if let Value::Object(map) = node {
                let child = map.entry(head.to_string()).or_insert(Value::Null);
                insert(child, rest, value);
            }
        }
    }
}

/// Remove the node at `segs`, pruning parents left empty; returns true when
/// `node` itself is now empty
fn remove(node: &mut Value, segs: &[&str]) -> bool {
    let Some((head, rest)) = segs.split_first() else {
        *node = Value::Null;
        return true;
    };

    index_keyed(node);
    let Value::Object(map) = node else {
        return false;
    };

    if rest.is_empty() {
        map.remove(*head);
    } else if let Some(child) = map.get_mut(*head) {
        if remove(child, rest) {
            map.remove(*head);
        }
    }

    if map.is_empty() {
        *node = Value::Null;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> MemoryStore {
        MemoryStore::with_data(json!({
            "users": {
                "u1": {
                    "live_status": { "north": { "env": { "temp": 20 } } },
                    "fields": { "north": { "data": {
                        "1704067200000": { "temperature": 20.0 },
                        "1704069000000": { "temperature": 21.0 },
                        "1704070800000": { "temperature": 22.0 }
                    } } }
                },
                "u2": { "name": "second" }
            }
        }))
    }

    #[tokio::test]
    async fn test_get_full_and_missing() {
        let store = sample();

        let env = store.get("users/u1/live_status/north/env", Query::Full).await.unwrap();
        assert_eq!(env, Some(json!({ "temp": 20 })));

        let missing = store.get("users/u9/live_status", Query::Full).await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_get_shallow() {
        let store = sample();

        let users = store.get("users", Query::Shallow).await.unwrap().unwrap();
        assert_eq!(users, json!({ "u1": true, "u2": true }));

        let u2 = store.get("users/u2", Query::Shallow).await.unwrap().unwrap();
        assert_eq!(u2, json!({ "name": "second" }));
    }

    #[tokio::test]
    async fn test_get_last_by_key() {
        let store = sample();

        let last_two = store
            .get("users/u1/fields/north/data", Query::LastByKey(2))
            .await
            .unwrap()
            .unwrap();
        let keys: Vec<&String> = last_two.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["1704069000000", "1704070800000"]);

        let all = store
            .get("users/u1/fields/north/data", Query::LastByKey(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(all.as_object().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_set_creates_intermediate_nodes() {
        let store = MemoryStore::new();
        store
            .set("users/u1/fields/north/prediction", &json!({ "risk": "HIGH" }))
            .await
            .unwrap();

        assert_eq!(
            store.read("users/u1/fields/north/prediction/risk"),
            Some(json!("HIGH"))
        );
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = sample();
        store
            .set("users/u1/live_status/north/env", &json!({ "temp": 25 }))
            .await
            .unwrap();
        assert_eq!(
            store.read("users/u1/live_status/north/env"),
            Some(json!({ "temp": 25 }))
        );
    }

    #[tokio::test]
    async fn test_delete_prunes_empty_parents() {
        let store = sample();
        store.delete("users/u1/fields/north/data").await.unwrap();

        assert_eq!(store.read("users/u1/fields"), None);
        assert!(store.read("users/u1/live_status").is_some());
    }

    #[tokio::test]
    async fn test_set_null_deletes() {
        let store = sample();
        store.set("users/u2/name", &Value::Null).await.unwrap();
        assert_eq!(store.read("users/u2"), None);
    }

    #[tokio::test]
    async fn test_array_children_addressed_by_index() {
        let store = MemoryStore::with_data(json!({
            "probes": [{ "raw_moisture": 20 }, { "raw_moisture": 70 }]
        }));
        assert_eq!(store.read("probes/1/raw_moisture"), Some(json!(70)));

        store.set("probes/0/prediction", &json!("WATCH")).await.unwrap();
        assert_eq!(
            store.read("probes"),
            Some(json!({
                "0": { "raw_moisture": 20, "prediction": "WATCH" },
                "1": { "raw_moisture": 70 }
            }))
        );
    }

    #[tokio::test]
    async fn test_child_keys() {
        let store = sample();
        let keys = child_keys(&store, "users/u1/fields/north/data").await.unwrap();
        assert_eq!(keys.len(), 3);

        let none = child_keys(&store, "users/nobody").await.unwrap();
        assert!(none.is_empty());
    }
}
