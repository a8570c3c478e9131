// src/engagement.rs
//! Local engagement mutations. Every change recomputes local and final score
//! in the same write.

use std::sync::Arc;

use chrono::Utc;

use crate::error::PersistenceError;
use crate::model::{ContentItem, EngagementCounters};
use crate::scoring::rescore_local;
use crate::store::{ContentStore, Storage};

pub struct Engagement {
    store: Arc<dyn Storage>,
    external_weight: f64,
}

impl Engagement {
    pub fn new(store: Arc<dyn Storage>, external_weight: f64) -> Self {
        Self {
            store,
            external_weight,
        }
    }

    pub async fn record_view(&self, item_id: &str) -> Result<ContentItem, PersistenceError> {
        self.mutate(item_id, |e| e.views = e.views.saturating_add(1))
            .await
    }

    /// Returns the item and whether `user` now likes it.
    pub async fn toggle_like(
        &self,
        item_id: &str,
        user: &str,
    ) -> Result<(ContentItem, bool), PersistenceError> {
        let item = self
            .mutate(item_id, |e| toggle(&mut e.liked_by, user))
            .await?;
        let on = item.engagement.liked_by.contains(user);
        Ok((item, on))
    }

    /// Returns the item and whether `user` now has it bookmarked.
    pub async fn toggle_bookmark(
        &self,
        item_id: &str,
        user: &str,
    ) -> Result<(ContentItem, bool), PersistenceError> {
        let item = self
            .mutate(item_id, |e| toggle(&mut e.bookmarked_by, user))
            .await?;
        let on = item.engagement.bookmarked_by.contains(user);
        Ok((item, on))
    }

    async fn mutate<F>(&self, item_id: &str, mut f: F) -> Result<ContentItem, PersistenceError>
    where
        F: FnMut(&mut EngagementCounters) + Send,
    {
        let w = self.external_weight;
        let now = Utc::now();
        self.store
            .modify_item(item_id, &mut |item: &mut ContentItem| {
                f(&mut item.engagement);
                item.scores = rescore_local(item.scores, &item.engagement, w);
                item.updated_at = now;
            })
            .await
    }
}

fn toggle(set: &mut std::collections::BTreeSet<String>, user: &str) {
    if !set.remove(user) {
        set.insert(user.to_string());
    }
}
