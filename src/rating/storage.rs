//! Rating store interface and implementations
//!
//! This module defines the interface for persisting and retrieving entity
//! ratings, with an in-memory implementation and an instrumented variant
//! for tests.

use crate::error::{Result, WarsError};
use crate::types::{ConditionalUpdate, Contender, EntityId, EntitySummary, EntityUpdate};
use crate::utils::leaderboard_order;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Barrier;

/// Storage entry for an entity's rating with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingEntry {
    pub entity: EntitySummary,
    pub rating: f64,
    pub matches_played: u64,
    /// Bumped on every write, used for compare-and-swap
    pub version: u64,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RatingEntry {
    /// Create a new rating entry for a new entity
    pub fn new(entity: EntitySummary, initial_rating: f64) -> Self {
        let now = Utc::now();
        Self {
            entity,
            rating: initial_rating,
            matches_played: 0,
            version: 0,
            last_updated: now,
            created_at: now,
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.entity.id
    }

    /// Apply a partial update and bump the version
    pub fn apply(&mut self, update: &EntityUpdate) {
        if let Some(rating) = update.rating {
            self.rating = rating;
        }
        if let Some(matches_played) = update.matches_played {
            self.matches_played = matches_played;
        }
        self.version += 1;
        self.last_updated = Utc::now();
    }

    pub fn to_contender(&self) -> Contender {
        Contender {
            entity: self.entity.clone(),
            rating: self.rating,
            matches_played: self.matches_played,
        }
    }
}

/// Outcome of a conditional two-row write
#[derive(Debug, Clone, PartialEq)]
pub enum PairWriteResult {
    /// Both rows were written
    Applied,
    /// At least one row changed since it was read; nothing was written
    Conflict,
    /// These rows no longer exist; nothing was written
    Missing(Vec<EntityId>),
}

/// Trait for rating store operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RatingStore: Send + Sync {
    /// Fetch the entries for a set of ids; unknown ids are simply absent
    async fn fetch_entries(&self, entity_ids: &[EntityId]) -> Result<Vec<RatingEntry>>;

    /// Update one entry by id. Returns false if no such entry exists
    async fn update_entry(&self, entity_id: &EntityId, update: EntityUpdate) -> Result<bool>;

    /// Write both updates if both rows still have their expected versions
    async fn update_pair_if_unchanged(
        &self,
        updates: [ConditionalUpdate; 2],
    ) -> Result<PairWriteResult>;

    /// Insert a new entry; fails with `AlreadyExists` if the id is taken
    async fn insert_entry(&self, entry: RatingEntry) -> Result<()>;

    /// Remove an entry. Returns false if it did not exist
    async fn remove_entry(&self, entity_id: &EntityId) -> Result<bool>;

    /// Ids of all stored entities
    async fn entity_ids(&self) -> Result<Vec<EntityId>>;

    /// Highest rated entries first
    async fn top_rated(&self, limit: usize) -> Result<Vec<RatingEntry>>;

    /// Total number of rated entities
    async fn entry_count(&self) -> Result<usize>;
}

/// In-memory rating store implementation
#[derive(Debug, Default)]
pub struct InMemoryRatingStore {
    entries: RwLock<HashMap<EntityId, RatingEntry>>,
}

impl InMemoryRatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with entries
    pub fn with_entries(entries: impl IntoIterator<Item = RatingEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| (entry.id().clone(), entry))
            .collect();

        Self {
            entries: RwLock::new(entries),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<EntityId, RatingEntry>>> {
        self.entries
            .read()
            .map_err(|_| WarsError::internal("Failed to acquire entries read lock").into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<EntityId, RatingEntry>>> {
        self.entries
            .write()
            .map_err(|_| WarsError::internal("Failed to acquire entries write lock").into())
    }
}

#[async_trait]
impl RatingStore for InMemoryRatingStore {
    async fn fetch_entries(&self, entity_ids: &[EntityId]) -> Result<Vec<RatingEntry>> {
        let entries = self.read()?;

        let mut result = Vec::with_capacity(entity_ids.len());
        for entity_id in entity_ids {
            if let Some(entry) = entries.get(entity_id) {
                if !result.iter().any(|e: &RatingEntry| e.id() == entity_id) {
                    result.push(entry.clone());
                }
            }
        }

        Ok(result)
    }

    async fn update_entry(&self, entity_id: &EntityId, update: EntityUpdate) -> Result<bool> {
        let mut entries = self.write()?;

        match entries.get_mut(entity_id) {
            Some(entry) => {
                entry.apply(&update);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_pair_if_unchanged(
        &self,
        updates: [ConditionalUpdate; 2],
    ) -> Result<PairWriteResult> {
        let mut entries = self.write()?;

        let missing: Vec<EntityId> = updates
            .iter()
            .filter(|u| !entries.contains_key(&u.entity_id))
            .map(|u| u.entity_id.clone())
            .collect();
        if !missing.is_empty() {
            return Ok(PairWriteResult::Missing(missing));
        }

        let unchanged = updates
            .iter()
            .all(|u| entries[&u.entity_id].version == u.expected_version);
        if !unchanged {
            return Ok(PairWriteResult::Conflict);
        }

        for conditional in &updates {
            if let Some(entry) = entries.get_mut(&conditional.entity_id) {
                entry.apply(&conditional.update);
            }
        }

        Ok(PairWriteResult::Applied)
    }

    async fn insert_entry(&self, entry: RatingEntry) -> Result<()> {
        let mut entries = self.write()?;

        if entries.contains_key(entry.id()) {
            return Err(WarsError::AlreadyExists {
                entity_id: entry.id().clone(),
            }
            .into());
        }

        entries.insert(entry.id().clone(), entry);
        Ok(())
    }

    async fn remove_entry(&self, entity_id: &EntityId) -> Result<bool> {
        let mut entries = self.write()?;
        Ok(entries.remove(entity_id).is_some())
    }

    async fn entity_ids(&self) -> Result<Vec<EntityId>> {
        let entries = self.read()?;

        let mut ids: Vec<EntityId> = entries.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn top_rated(&self, limit: usize) -> Result<Vec<RatingEntry>> {
        let entries = self.read()?;

        let mut ranked: Vec<RatingEntry> = entries.values().cloned().collect();
        ranked.sort_by(|a, b| {
            leaderboard_order(
                (a.rating, a.matches_played, a.id()),
                (b.rating, b.matches_played, b.id()),
            )
        });
        ranked.truncate(limit);

        Ok(ranked)
    }

    async fn entry_count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}

/// In-memory store with call recording and fault injection for tests
#[derive(Debug, Default)]
pub struct TestRatingStore {
    inner: InMemoryRatingStore,
    update_calls: Mutex<Vec<(EntityId, EntityUpdate)>>,
    pair_update_calls: Mutex<usize>,
    read_failures: Mutex<u32>,
    update_failures: Mutex<HashMap<EntityId, u32>>,
    read_gate: Mutex<Option<(Arc<Barrier>, usize)>>,
}

impl TestRatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = RatingEntry>) -> Self {
        Self {
            inner: InMemoryRatingStore::with_entries(entries),
            ..Self::default()
        }
    }

    /// Get all single-row update calls made (for testing)
    pub fn get_update_calls(&self) -> Vec<(EntityId, EntityUpdate)> {
        self.update_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Number of conditional pair writes attempted
    pub fn pair_update_count(&self) -> usize {
        self.pair_update_calls
            .lock()
            .map(|count| *count)
            .unwrap_or_default()
    }

    /// Make the next `count` fetches fail with a transient error
    pub fn fail_next_reads(&self, count: u32) {
        if let Ok(mut failures) = self.read_failures.lock() {
            *failures = count;
        }
    }

    /// Make the next `count` writes touching `entity_id` fail with a transient error
    pub fn fail_next_updates(&self, entity_id: &str, count: u32) {
        if let Ok(mut failures) = self.update_failures.lock() {
            failures.insert(entity_id.to_string(), count);
        }
    }

    /// Hold the next `reads` fetches until `parties` fetches have completed,
    /// so concurrent submissions all read before any of them writes
    pub fn gate_next_reads(&self, parties: usize, reads: usize) {
        if let Ok(mut gate) = self.read_gate.lock() {
            *gate = Some((Arc::new(Barrier::new(parties)), reads));
        }
    }

    /// Direct access to the current state of an entry
    pub async fn entry(&self, entity_id: &str) -> Option<RatingEntry> {
        self.inner
            .fetch_entries(&[entity_id.to_string()])
            .await
            .ok()
            .and_then(|mut entries| entries.pop())
    }

    fn take_read_failure(&self) -> bool {
        match self.read_failures.lock() {
            Ok(mut failures) if *failures > 0 => {
                *failures -= 1;
                true
            }
            _ => false,
        }
    }

    fn take_update_failure(&self, entity_id: &EntityId) -> bool {
        match self.update_failures.lock() {
            Ok(mut failures) => match failures.get_mut(entity_id) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            },
            Err(_) => false,
        }
    }

    fn take_gate(&self) -> Option<Arc<Barrier>> {
        let mut gate = self.read_gate.lock().ok()?;
        match gate.as_mut() {
            Some((barrier, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Some(barrier.clone())
            }
            _ => None,
        }
    }
}

fn unavailable(operation: &str) -> anyhow::Error {
    WarsError::StoreUnavailable {
        message: format!("injected {operation} failure"),
    }
    .into()
}

#[async_trait]
impl RatingStore for TestRatingStore {
    async fn fetch_entries(&self, entity_ids: &[EntityId]) -> Result<Vec<RatingEntry>> {
        if self.take_read_failure() {
            return Err(unavailable("read"));
        }

        let entries = self.inner.fetch_entries(entity_ids).await?;

        if let Some(barrier) = self.take_gate() {
            barrier.wait().await;
        }

        Ok(entries)
    }

    async fn update_entry(&self, entity_id: &EntityId, update: EntityUpdate) -> Result<bool> {
        if let Ok(mut calls) = self.update_calls.lock() {
            calls.push((entity_id.clone(), update.clone()));
        }

        if self.take_update_failure(entity_id) {
            return Err(unavailable("update"));
        }

        self.inner.update_entry(entity_id, update).await
    }

    async fn update_pair_if_unchanged(
        &self,
        updates: [ConditionalUpdate; 2],
    ) -> Result<PairWriteResult> {
        if let Ok(mut count) = self.pair_update_calls.lock() {
            *count += 1;
        }

        if updates
            .iter()
            .any(|u| self.take_update_failure(&u.entity_id))
        {
            return Err(unavailable("pair update"));
        }

        self.inner.update_pair_if_unchanged(updates).await
    }

    async fn insert_entry(&self, entry: RatingEntry) -> Result<()> {
        self.inner.insert_entry(entry).await
    }

    async fn remove_entry(&self, entity_id: &EntityId) -> Result<bool> {
        self.inner.remove_entry(entity_id).await
    }

    async fn entity_ids(&self) -> Result<Vec<EntityId>> {
        self.inner.entity_ids().await
    }

    async fn top_rated(&self, limit: usize) -> Result<Vec<RatingEntry>> {
        self.inner.top_rated(limit).await
    }

    async fn entry_count(&self) -> Result<usize> {
        self.inner.entry_count().await
    }
}
