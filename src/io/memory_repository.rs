//! In-memory repository seeded from a JSON document
//!
//! Stores and geofences are reference data loaded at startup. Orders live in
//! memory and support compare-and-save on their revision. Raw events go to an
//! optional JSONL audit log; only the most recent ones stay in memory.

use crate::domain::types::{Geofence, IncomingEvent, Order, Store};
use crate::io::jsonl::JsonlWriter;
use crate::io::repository::{Repository, RepositoryResult};
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Seed document layout
///
/// ```json
/// {
///   "stores": [{"name": "springfield"}],
///   "geofences": {"springfield": [{"id": "g1", "rangeType": "time", "range": 120, "shape": {...}}]},
///   "orders": []
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub stores: Vec<Store>,
    #[serde(default)]
    pub geofences: HashMap<String, Vec<Geofence>>,
    #[serde(default)]
    pub orders: Vec<Order>,
}

impl SeedData {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse seed file {}", path.display()))
    }
}

/// Raw events retained in memory for inspection
pub const DEFAULT_RECENT_EVENTS: usize = 256;

type OrderKey = (String, String);

fn order_key(order_id: &str, store_name: &str) -> OrderKey {
    (order_id.to_string(), store_name.to_string())
}

pub struct MemoryRepository {
    stores: RwLock<FxHashMap<String, Store>>,
    geofences: RwLock<FxHashMap<String, Vec<Geofence>>>,
    orders: RwLock<FxHashMap<OrderKey, Order>>,
    recent_events: RwLock<VecDeque<IncomingEvent>>,
    recent_capacity: usize,
    event_log: Option<JsonlWriter>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(FxHashMap::default()),
            geofences: RwLock::new(FxHashMap::default()),
            orders: RwLock::new(FxHashMap::default()),
            recent_events: RwLock::new(VecDeque::new()),
            recent_capacity: DEFAULT_RECENT_EVENTS,
            event_log: None,
        }
    }

    /// Build a repository from seed data
    pub fn from_seed(seed: SeedData) -> Self {
        let repo = Self::new();
        let store_count = seed.stores.len();
        let order_count = seed.orders.len();

        for store in seed.stores {
            repo.insert_store(store);
        }
        for (store_name, geofences) in seed.geofences {
            repo.set_geofences(&store_name, geofences);
        }
        {
            let mut orders = repo.orders.write();
            for order in seed.orders {
                orders.insert(order_key(&order.order_id, &order.store_name), order);
            }
        }

        info!(stores = %store_count, orders = %order_count, "repository_seeded");
        repo
    }

    /// Append every inserted event to a JSONL audit log
    pub fn with_event_log(mut self, writer: JsonlWriter) -> Self {
        self.event_log = Some(writer);
        self
    }

    /// Number of raw events kept in memory; 0 keeps none
    pub fn with_recent_event_capacity(mut self, capacity: usize) -> Self {
        self.recent_capacity = capacity;
        self
    }

    pub fn insert_store(&self, store: Store) {
        self.stores.write().insert(store.name.clone(), store);
    }

    /// Replace the geofence set of a store
    pub fn set_geofences(&self, store_name: &str, geofences: Vec<Geofence>) {
        debug!(store = %store_name, geofences = %geofences.len(), "geofences_loaded");
        self.geofences.write().insert(store_name.to_string(), geofences);
    }

    /// Current stored order, without going through the async interface
    pub fn order(&self, order_id: &str, store_name: &str) -> Option<Order> {
        self.orders.read().get(&order_key(order_id, store_name)).cloned()
    }

    pub fn order_count(&self) -> usize {
        self.orders.read().len()
    }

    /// Most recently inserted raw events, oldest first
    pub fn recent_events(&self) -> Vec<IncomingEvent> {
        self.recent_events.read().iter().cloned().collect()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_store(&self, store_name: &str) -> RepositoryResult<Option<Store>> {
        Ok(self.stores.read().get(store_name).cloned())
    }

    async fn get_geofences_by_store(&self, store_name: &str) -> RepositoryResult<Vec<Geofence>> {
        Ok(self.geofences.read().get(store_name).cloned().unwrap_or_default())
    }

    async fn get_order(
        &self,
        order_id: &str,
        store_name: &str,
    ) -> RepositoryResult<Option<Order>> {
        Ok(self.order(order_id, store_name))
    }

    async fn save_order(&self, order: &Order) -> RepositoryResult<()> {
        self.orders
            .write()
            .insert(order_key(&order.order_id, &order.store_name), order.clone());
        Ok(())
    }

    async fn compare_and_save_order(
        &self,
        order: &Order,
        expected_revision: Option<u64>,
    ) -> RepositoryResult<bool> {
        let key = order_key(&order.order_id, &order.store_name);
        let mut orders = self.orders.write();
        let current_revision = orders.get(&key).map(|o| o.revision);
        if current_revision != expected_revision {
            debug!(
                order_id = %order.order_id,
                expected = ?expected_revision,
                actual = ?current_revision,
                "order_revision_conflict"
            );
            return Ok(false);
        }
        orders.insert(key, order.clone());
        Ok(true)
    }

    async fn insert_event(&self, event: &IncomingEvent) -> RepositoryResult<()> {
        if let Some(ref log) = self.event_log {
            log.append(event)?;
        }
        if self.recent_capacity > 0 {
            let mut recent = self.recent_events.write();
            if recent.len() == self.recent_capacity {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }
        Ok(())
    }
}
