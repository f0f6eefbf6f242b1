//! Timeline rewriting.
//!
//! Builds a new track list from the original and a lookup of published
//! segments. The input is never mutated: matched items are rebuilt from a
//! clone with their reference and trim window replaced, every other item is
//! cloned as is.

use std::collections::HashMap;

use cliprelay_timeline::{ItemRef, PublishStatus, TimelineItem, TimelineTrack};

use crate::publisher::{PublishedSegment, SegmentLocation};

/// Rewrite `tracks` so each item with a published segment points at it.
///
/// Lookup is by `(track_index, item_index, item_id)`; an item matches only
/// when all three agree.
pub fn rewrite_tracks<'a>(
    tracks: &[TimelineTrack],
    published: impl IntoIterator<Item = &'a PublishedSegment>,
) -> Vec<TimelineTrack> {
    let lookup: HashMap<&ItemRef, &PublishedSegment> = published
        .into_iter()
        .filter(|p| p.url().is_some())
        .map(|p| (&p.segment.usage.item, p))
        .collect();

    let mut rewritten = 0usize;
    let tracks = tracks
        .iter()
        .enumerate()
        .map(|(track_index, track)| TimelineTrack {
            items: track
                .items
                .iter()
                .enumerate()
                .map(|(item_index, item)| {
                    let key = ItemRef::new(track_index, item_index, item.id.clone());
                    match lookup.get(&key) {
                        Some(published) => {
                            rewritten += 1;
                            rewrite_item(item, published)
                        }
                        None => item.clone(),
                    }
                })
                .collect(),
            ..track.clone()
        })
        .collect();

    tracing::info!(rewritten, "Timeline rewritten");
    tracks
}

fn rewrite_item(item: &TimelineItem, published: &PublishedSegment) -> TimelineItem {
    let mut out = item.clone();
    let (url, status) = match &published.location {
        SegmentLocation::Remote { url, .. } => (
            url.clone(),
            PublishStatus::Published { url: url.clone() },
        ),
        SegmentLocation::Local { url, .. } => (
            url.clone(),
            PublishStatus::Fallback {
                local_ref: url.clone(),
            },
        ),
        SegmentLocation::Unavailable { .. } => return out,
    };

    let window = published.segment.normalized_window();
    out.source_ref = Some(url.clone());
    out.published_url = Some(url);
    out.in_point = Some(window.in_point);
    out.out_point = Some(window.out_point);
    let adjustment = published.segment.adjustment;
    out.adjustment = (adjustment > 0.0).then_some(adjustment);
    out.publish_status = status;
    out
}
