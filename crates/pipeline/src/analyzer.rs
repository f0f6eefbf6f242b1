//! Source analysis: group timeline items by the media they play.
//!
//! Pure structural pass over the tracks. No network or file I/O happens here;
//! binary content is resolved later, once per [`SourceAsset`].

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use cliprelay_timeline::{ItemRef, PlaybackUrlPattern, TimelineItem, TimelineTrack, Usage};

/// One underlying media asset and every usage of it in the timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceAsset {
    /// Dedupe key; also the reference handed to direct fetch.
    pub key: String,
    /// Display name of the first item using this asset.
    pub name: String,
    /// Inline handle of the first item that carries one.
    pub inline: Option<PathBuf>,
    /// Usages ordered by `(track_index, item_index)`.
    pub usages: Vec<Usage>,
}

impl SourceAsset {
    pub fn usage_count(&self) -> usize {
        self.usages.len()
    }
}

/// Why an item did not become a usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotVideo,
    AlreadyPublished,
}

/// Result of analyzing a timeline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Analysis {
    /// Assets in order of first appearance.
    pub assets: Vec<SourceAsset>,
    pub skipped: Vec<(ItemRef, SkipReason)>,
}

impl Analysis {
    pub fn usage_count(&self) -> usize {
        self.assets.iter().map(SourceAsset::usage_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Dedupe key for an item.
///
/// Primary reference, then the alternate URL, then a placeholder for an
/// inline handle, then the item's label. Every item gets a key, so clips
/// captured on a device without a canonical URL still group.
pub fn dedupe_key(item: &TimelineItem) -> String {
    let non_empty = |s: &Option<String>| {
        s.as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };

    non_empty(&item.source_ref)
        .or_else(|| non_empty(&item.external_url))
        .or_else(|| item.blob.as_ref().map(|_| format!("blob_{}", item.id)))
        .unwrap_or_else(|| item.label().to_string())
}

/// Group the video items of `tracks` into source assets.
pub fn analyze_tracks(tracks: &[TimelineTrack], pattern: &PlaybackUrlPattern) -> Analysis {
    let mut analysis = Analysis::default();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (track_index, track) in tracks.iter().enumerate() {
        for (item_index, item) in track.items.iter().enumerate() {
            let item_ref = ItemRef::new(track_index, item_index, item.id.clone());

            if !item.is_video() {
                analysis.skipped.push((item_ref, SkipReason::NotVideo));
                continue;
            }
            if pattern.is_item_published(item) {
                tracing::debug!(item = %item_ref, "Item already published");
                analysis.skipped.push((item_ref, SkipReason::AlreadyPublished));
                continue;
            }

            let key = dedupe_key(item);
            let slot = *index.entry(key.clone()).or_insert_with(|| {
                analysis.assets.push(SourceAsset {
                    key: key.clone(),
                    name: item.label().to_string(),
                    inline: None,
                    usages: Vec::new(),
                });
                analysis.assets.len() - 1
            });

            let asset = &mut analysis.assets[slot];
            if asset.inline.is_none() {
                asset.inline = item.blob.clone();
            }
            asset.usages.push(Usage::new(item_ref, item.trim_window()));
        }
    }

    // Positional correlation downstream relies on this order.
    for asset in &mut analysis.assets {
        asset.usages.sort_by(|a, b| a.item.position().cmp(&b.item.position()));
    }

    tracing::info!(
        assets = analysis.assets.len(),
        usages = analysis.usage_count(),
        skipped = analysis.skipped.len(),
        "Timeline analyzed"
    );
    analysis
}
