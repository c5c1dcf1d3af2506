use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Prerequisite post id -> post ids that build on it.
pub type Deps = BTreeMap<Uuid, Vec<Uuid>>;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DependencyMapRow {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub author: Uuid,
    pub title: String,
    pub tags: Vec<String>,
    pub deps: Json<Deps>,
    /// Union of every key and value in `deps`, without duplicates.
    pub all_items: Vec<Uuid>,
    #[serde(rename = "dateCreated")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "dateUpdated")]
    pub updated_at: DateTime<Utc>,
}

impl DependencyMapRow {
    pub fn new(author: Uuid, title: String, tags: Vec<String>, deps: Deps) -> Self {
        let now = Utc::now();
        let all_items = all_items(&deps);
        Self {
            id: Uuid::new_v4(),
            author,
            title,
            tags,
            deps: Json(deps),
            all_items,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_deps(&mut self, deps: Deps) {
        self.all_items = all_items(&deps);
        self.deps = Json(deps);
    }

    /// Every post that appears on the right-hand side of an edge.
    pub fn postrequisites(&self) -> BTreeSet<Uuid> {
        self.deps.values().flatten().copied().collect()
    }
}

pub fn all_items(deps: &Deps) -> Vec<Uuid> {
    let mut items: BTreeSet<Uuid> = deps.keys().copied().collect();
    items.extend(deps.values().flatten().copied());
    items.into_iter().collect()
}
