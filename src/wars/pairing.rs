//! Choosing the two contenders shown to a voter

use crate::error::{Result, WarsError};
use crate::rating::storage::RatingStore;
use crate::types::{EntityId, WarPair};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::debug;

/// Trait for pair selection strategies
#[async_trait]
pub trait PairSelector: Send + Sync {
    /// Pick two distinct entities for the next vote
    async fn select_pair(&self) -> Result<WarPair>;
}

/// Picks two distinct entities uniformly at random
pub struct RandomPairSelector {
    store: Arc<dyn RatingStore>,
}

impl RandomPairSelector {
    pub fn new(store: Arc<dyn RatingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PairSelector for RandomPairSelector {
    async fn select_pair(&self) -> Result<WarPair> {
        let ids = self.store.entity_ids().await?;
        if ids.len() < 2 {
            return Err(WarsError::NotEnoughContenders {
                available: ids.len(),
            }
            .into());
        }

        let chosen: Vec<EntityId> = {
            let mut rng = rand::thread_rng();
            ids.choose_multiple(&mut rng, 2).cloned().collect()
        };

        let mut entries = self.store.fetch_entries(&chosen).await?;
        if entries.len() < 2 {
            // Lost a race with a removal
            let missing = chosen
                .into_iter()
                .filter(|id| !entries.iter().any(|e| e.id() == id))
                .collect();
            return Err(WarsError::NotFound { ids: missing }.into());
        }

        let right = entries.remove(1).to_contender();
        let left = entries.remove(0).to_contender();
        debug!("Selected pair {} vs {}", left.entity.id, right.entity.id);

        Ok(WarPair { left, right })
    }
}
