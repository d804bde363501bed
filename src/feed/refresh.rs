use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::aggregator::{AggregatedFeed, Aggregator};
use crate::store::{ColumnId, FeedSource};

/// Result of a [`RefreshCoordinator::refresh`] call.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// This request was the newest for its column; its feed is now current.
    Published(Arc<AggregatedFeed>),
    /// A newer request for the column started while this one ran, or the
    /// column was forgotten. The result was dropped.
    Superseded,
}

impl RefreshOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }
}

#[derive(Debug, Default)]
struct Slot {
    latest: u64,
    published: Option<Arc<AggregatedFeed>>,
}

#[derive(Debug, Default)]
struct Slots {
    // Shared across columns so a forgotten column's old numbers never repeat
    next_generation: u64,
    columns: HashMap<ColumnId, Slot>,
}

/// Runs column refreshes where the most recently started request wins.
///
/// Each refresh takes the next generation number for its column before it
/// starts aggregating. When it finishes it publishes only if that number is
/// still the column's latest, so a slow, stale request can never overwrite
/// a newer one. Columns are independent of each other.
#[derive(Debug)]
pub struct RefreshCoordinator {
    aggregator: Aggregator,
    slots: Mutex<Slots>,
}

impl RefreshCoordinator {
    pub fn new(aggregator: Aggregator) -> Self {
        Self {
            aggregator,
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Aggregates `sources` for `column` and publishes the result unless a
    /// newer refresh of the same column was started in the meantime.
    pub async fn refresh(&self, column: ColumnId, sources: &[FeedSource]) -> RefreshOutcome {
        let generation = self.begin(column);
        let feed = self.aggregator.aggregate(sources).await;
        self.publish(column, generation, feed)
    }

    /// The last published feed for `column`.
    pub fn current(&self, column: ColumnId) -> Option<Arc<AggregatedFeed>> {
        self.lock_slots()
            .columns
            .get(&column)
            .and_then(|slot| slot.published.clone())
    }

    /// Drops everything known about `column`. Refreshes still in flight for
    /// it will not publish.
    pub fn forget(&self, column: ColumnId) {
        self.lock_slots().columns.remove(&column);
    }

    pub(crate) fn begin(&self, column: ColumnId) -> u64 {
        let mut slots = self.lock_slots();
        slots.next_generation += 1;
        let generation = slots.next_generation;
        slots.columns.entry(column).or_default().latest = generation;
        generation
    }

    pub(crate) fn publish(
        &self,
        column: ColumnId,
        generation: u64,
        feed: AggregatedFeed,
    ) -> RefreshOutcome {
        let mut slots = self.lock_slots();
        match slots.columns.get_mut(&column) {
            Some(slot) if slot.latest == generation => {
                let feed = Arc::new(feed);
                slot.published = Some(Arc::clone(&feed));
                RefreshOutcome::Published(feed)
            }
            Some(slot) => {
                tracing::debug!(
                    column = %column,
                    generation,
                    latest = slot.latest,
                    "Dropping superseded refresh"
                );
                RefreshOutcome::Superseded
            }
            None => {
                tracing::debug!(column = %column, generation, "Dropping refresh for forgotten column");
                RefreshOutcome::Superseded
            }
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
