// File: src/models.rs
// Purpose: In-memory object store behind the /object controller

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    #[serde(default)]
    pub object_id: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub player_name: String,
}

/// Shared store of objects keyed by id
#[derive(Clone, Default)]
pub struct ObjectStore {
    objects: Arc<RwLock<HashMap<String, Object>>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object under a fresh id and return the id
    pub async fn add(&self, mut object: Object) -> String {
        let id = Uuid::new_v4().simple().to_string();
        object.object_id = id.clone();
        self.objects.write().await.insert(id.clone(), object);
        id
    }

    pub async fn get(&self, id: &str) -> Option<Object> {
        self.objects.read().await.get(id).cloned()
    }

    /// All objects, ordered by id
    pub async fn all(&self) -> Vec<Object> {
        let mut objects: Vec<Object> = self.objects.read().await.values().cloned().collect();
        objects.sort_by(|a, b| a.object_id.cmp(&b.object_id));
        objects
    }

    /// Replace score and player name. Returns false for an unknown id.
    pub async fn update(&self, id: &str, score: i64, player_name: String) -> bool {
        match self.objects.write().await.get_mut(id) {
            Some(object) => {
                object.score = score;
                object.player_name = player_name;
                true
            }
            None => false,
        }
    }

    pub async fn delete(&self, id: &str) -> bool {
        self.objects.write().await.remove(id).is_some()
    }
}
