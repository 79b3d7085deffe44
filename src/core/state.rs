use crate::core::error::{Result, StoryError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use tokio::sync::RwLock;

pub const KEY_ITEMS: &str = "items";
pub const KEY_GLOBAL_TITLE: &str = "globalTitle";
pub const KEY_GLOBAL_DESCRIPTION: &str = "globalDescription";
pub const KEY_LAST_ACTION: &str = "lastAction";
pub const KEY_ITEMS_CREATED: &str = "itemsCreated";

/// Type tag of a canvas item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Project,
    Entity,
    Note,
    Chart,
    Character,
    Story,
}

impl ItemType {
    pub const ALL: [ItemType; 6] = [
        ItemType::Project,
        ItemType::Entity,
        ItemType::Note,
        ItemType::Chart,
        ItemType::Character,
        ItemType::Story,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Project => "project",
            ItemType::Entity => "entity",
            ItemType::Note => "note",
            ItemType::Chart => "chart",
            ItemType::Character => "character",
            ItemType::Story => "story",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|t| t.as_str()).collect()
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = StoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                StoryError::Validation(format!(
                    "Unknown item type '{}'. Expected one of: {}",
                    s,
                    Self::names().join(", ")
                ))
            })
    }
}

/// A canvas item as the UI stores it. `data` follows the per-type field
/// schema given to the model; nothing here enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u64,
    pub values: Map<String, Value>,
}

impl StateSnapshot {
    /// Items that parse as [`CanvasItem`]; anything else the UI put in the
    /// list is skipped.
    pub fn items(&self) -> Vec<CanvasItem> {
        self.values
            .get(KEY_ITEMS)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| serde_json::from_value(i.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub fn initial_state() -> Map<String, Value> {
    let value = json!({
        KEY_ITEMS: [],
        KEY_GLOBAL_TITLE: "",
        KEY_GLOBAL_DESCRIPTION: "",
        KEY_LAST_ACTION: "",
        KEY_ITEMS_CREATED: 0,
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Shared key-value state synchronised with the UI. Every write bumps the
/// version.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn snapshot(&self) -> StateSnapshot;
    async fn get(&self, key: &str) -> Option<Value>;
    async fn set(&self, key: &str, value: Value) -> u64;
    /// Replaces the whole mapping. When `expected_version` is given and does
    /// not match, nothing is written.
    async fn replace(&self, values: Map<String, Value>, expected_version: Option<u64>)
        -> Result<u64>;
}

pub struct InMemoryStateStore {
    inner: RwLock<StateSnapshot>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::with_values(initial_state())
    }

    pub fn with_values(values: Map<String, Value>) -> Self {
        Self {
            inner: RwLock::new(StateSnapshot { version: 0, values }),
        }
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn snapshot(&self) -> StateSnapshot {
        self.inner.read().await.clone()
    }

    async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.values.get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value) -> u64 {
        let mut guard = self.inner.write().await;
        guard.values.insert(key.to_string(), value);
        guard.version += 1;
        guard.version
    }

    async fn replace(
        &self,
        values: Map<String, Value>,
        expected_version: Option<u64>,
    ) -> Result<u64> {
        let mut guard = self.inner.write().await;
        if let Some(expected) = expected_version {
            if expected != guard.version {
                return Err(StoryError::Validation(format!(
                    "State version conflict: expected {}, current {}",
                    expected, guard.version
                )));
            }
        }
        guard.values = values;
        guard.version += 1;
        Ok(guard.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_keys() {
        let state = initial_state();
        assert_eq!(state[KEY_ITEMS], json!([]));
        assert_eq!(state[KEY_GLOBAL_TITLE], "");
        assert_eq!(state[KEY_GLOBAL_DESCRIPTION], "");
        assert_eq!(state[KEY_LAST_ACTION], "");
        assert_eq!(state[KEY_ITEMS_CREATED], 0);
        assert_eq!(state.len(), 5);
    }

    #[test]
    fn test_item_type_parsing() {
        assert_eq!("story".parse::<ItemType>().unwrap(), ItemType::Story);
        assert!("widget".parse::<ItemType>().is_err());
        assert_eq!(ItemType::names().len(), 6);
    }

    #[tokio::test]
    async fn test_set_bumps_version() {
        let store = InMemoryStateStore::new();
        assert_eq!(store.snapshot().await.version, 0);
        let v = store.set(KEY_LAST_ACTION, json!("createItem")).await;
        assert_eq!(v, 1);
        assert_eq!(store.get(KEY_LAST_ACTION).await, Some(json!("createItem")));
    }

    #[tokio::test]
    async fn test_replace_with_stale_version_conflicts() {
        let store = InMemoryStateStore::new();
        store.set(KEY_GLOBAL_TITLE, json!("A")).await;

        let err = store.replace(initial_state(), Some(0)).await.unwrap_err();
        assert!(err.to_string().contains("conflict"));
        assert_eq!(store.get(KEY_GLOBAL_TITLE).await, Some(json!("A")));

        let v = store.replace(initial_state(), Some(1)).await.unwrap();
        assert_eq!(v, 2);
        assert_eq!(store.get(KEY_GLOBAL_TITLE).await, Some(json!("")));
    }

    #[tokio::test]
    async fn test_snapshot_items_skips_unknown_entries() {
        let mut values = initial_state();
        values.insert(
            KEY_ITEMS.to_string(),
            json!([
                {"id": "0001", "type": "character", "name": "Pip", "data": {"traits": ["brave"]}},
                {"id": "0002", "type": "spaceship"}
            ]),
        );
        let store = InMemoryStateStore::with_values(values);
        let items = store.snapshot().await.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_type, ItemType::Character);
        assert_eq!(items[0].subtitle, "");
    }
}
