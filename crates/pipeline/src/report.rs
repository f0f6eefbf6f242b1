//! Per-run report of what happened to every item.

use chrono::{DateTime, Utc};
use serde::Serialize;

use cliprelay_media::RejectedUsage;
use cliprelay_timeline::ItemRef;

use crate::analyzer::SkipReason;

/// Final state of one item that took part in resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Published { url: String },
    /// Served from a local ephemeral reference; warn the user.
    Fallback { url: String, reason: String },
    /// Left untouched.
    Unresolved { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReport {
    pub item: ItemRef,
    pub source_key: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// A source whose items were all left untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedAsset {
    pub key: String,
    pub name: String,
    pub usages: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedItem {
    pub item: ItemRef,
    pub reason: SkipReason,
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct ResolveReport {
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Items that became usages, in timeline order.
    pub items: Vec<ItemReport>,
    /// Items not considered (non-video or already published).
    pub skipped_items: Vec<SkippedItem>,
    pub skipped_assets: Vec<SkippedAsset>,
    pub rejected_usages: Vec<RejectedUsage>,
    /// Composition duration of the resolved timeline, in seconds.
    pub composition_duration: f64,
    pub cancelled: bool,
}

impl ResolveReport {
    pub fn new(job_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            started_at: now,
            finished_at: now,
            items: Vec::new(),
            skipped_items: Vec::new(),
            skipped_assets: Vec::new(),
            rejected_usages: Vec::new(),
            composition_duration: 0.0,
            cancelled: false,
        }
    }

    pub fn record(&mut self, item: ItemRef, source_key: &str, outcome: ItemOutcome) {
        self.items.push(ItemReport {
            item,
            source_key: source_key.to_string(),
            outcome,
        });
    }

    pub fn published_count(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Published { .. }))
    }

    pub fn fallback_count(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Fallback { .. }))
    }

    pub fn unresolved_count(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Unresolved { .. }))
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// Items served from a local fallback.
    pub fn degraded_items(&self) -> impl Iterator<Item = &ItemReport> {
        self.items
            .iter()
            .filter(|r| matches!(r.outcome, ItemOutcome::Fallback { .. }))
    }

    /// Every considered item reached durable storage.
    pub fn is_fully_published(&self) -> bool {
        self.items.len() == self.published_count()
    }

    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Sort items by position; assets are processed out of timeline order.
    pub(crate) fn finish(&mut self, composition_duration: f64) {
        self.items.sort_by(|a, b| a.item.cmp(&b.item));
        self.composition_duration = composition_duration;
        self.finished_at = Utc::now();
    }

    pub fn summary(&self) -> String {
        format!(
            "{} published, {} fallback, {} unresolved, {} skipped assets, {} rejected usages",
            self.published_count(),
            self.fallback_count(),
            self.unresolved_count(),
            self.skipped_assets.len(),
            self.rejected_usages.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_order() {
        let mut report = ResolveReport::new("job");
        report.record(
            ItemRef::new(1, 0, "b"),
            "clip.mp4",
            ItemOutcome::Fallback {
                url: "file:///tmp/x".into(),
                reason: "timeout".into(),
            },
        );
        report.record(
            ItemRef::new(0, 0, "a"),
            "clip.mp4",
            ItemOutcome::Published {
                url: "https://vod/x".into(),
            },
        );
        report.finish(12.5);

        assert_eq!(report.items[0].item.item_id, "a");
        assert_eq!(report.published_count(), 1);
        assert_eq!(report.fallback_count(), 1);
        assert!(!report.is_fully_published());
        assert_eq!(report.degraded_items().count(), 1);
        assert_eq!(report.composition_duration, 12.5);
        assert!(report.summary().starts_with("1 published, 1 fallback"));
    }

    #[test]
    fn test_serializes_status_tag() {
        let mut report = ResolveReport::new("job");
        report.record(
            ItemRef::new(0, 0, "a"),
            "k",
            ItemOutcome::Unresolved {
                reason: "Source not found: k".into(),
            },
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["items"][0]["status"], "unresolved");
        assert_eq!(value["items"][0]["item"]["itemId"], "a");
    }
}
