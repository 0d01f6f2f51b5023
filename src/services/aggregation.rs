use crate::db::{Store, StoreResult};
use crate::domain::aggregate::tally;
use crate::domain::models::{Aggregate, Poll, Sentiment};
use crate::services::cache::AggregateCache;
use std::sync::Arc;
use uuid::Uuid;

pub fn poll_key(poll_id: Uuid) -> String {
    format!("poll_results_{poll_id}")
}

pub fn sentiment_key(complaint_id: Uuid) -> String {
    format!("complaint_sentiment_{complaint_id}")
}

/// Cache-aside reads of vote aggregates, with invalidation on every vote write.
#[derive(Clone)]
pub struct AggregationService {
    store: Arc<dyn Store>,
    cache: Arc<dyn AggregateCache>,
}

impl AggregationService {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn AggregateCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<dyn AggregateCache> {
        &self.cache
    }

    pub async fn poll_results(&self, poll: &Poll, use_cache: bool) -> StoreResult<Aggregate> {
        let key = poll_key(poll.id);
        if use_cache {
            if let Some(hit) = self.cache.get(&key).await {
                return Ok(hit);
            }
        }

        let rows = self.store.poll_vote_counts(poll.id).await?;
        let aggregate = tally(&poll.options, &rows);

        if use_cache {
            self.cache.set(&key, &aggregate).await;
        }
        Ok(aggregate)
    }

    pub async fn complaint_sentiment(
        &self,
        complaint_id: Uuid,
        use_cache: bool,
    ) -> StoreResult<Aggregate> {
        let key = sentiment_key(complaint_id);
        if use_cache {
            if let Some(hit) = self.cache.get(&key).await {
                return Ok(hit);
            }
        }

        let rows = self.store.sentiment_counts(complaint_id).await?;
        let aggregate = tally(&Sentiment::ALL.map(|s| s.as_str()), &rows);

        if use_cache {
            self.cache.set(&key, &aggregate).await;
        }
        Ok(aggregate)
    }

    /// Stores the ballot; a repeat voter gets `StoreError::Duplicate` and nothing changes.
    pub async fn record_poll_vote(&self, poll_id: Uuid, voter: Uuid, option: &str) -> StoreResult<()> {
        self.store.insert_poll_vote(poll_id, voter, option).await?;
        self.cache.invalidate(&poll_key(poll_id)).await;
        tracing::info!("Vote recorded on poll {}", poll_id);
        Ok(())
    }

    pub async fn record_sentiment(
        &self,
        complaint_id: Uuid,
        voter: Uuid,
        sentiment: Sentiment,
    ) -> StoreResult<()> {
        self.store
            .insert_sentiment(complaint_id, voter, sentiment)
            .await?;
        self.cache.invalidate(&sentiment_key(complaint_id)).await;
        tracing::info!("Sentiment {} recorded on complaint {}", sentiment.as_str(), complaint_id);
        Ok(())
    }
}
