//! Playback URL pattern of the remote asset store.
//!
//! Published segments are served at `{base}/{asset_id}/{container}/source.{container}`.
//! The store transcodes every upload, so the playback container does not
//! depend on the uploaded file's format.
//! An item whose reference already has this shape was resolved by an
//! earlier run and is left alone.

use crate::timeline::TimelineItem;

/// Builds and recognizes public playback URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackUrlPattern {
    base: String,
    container: String,
}

impl PlaybackUrlPattern {
    pub fn new(base: impl Into<String>, container: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self {
            base,
            container: container.into(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Deterministic playback URL for an uploaded asset.
    pub fn url_for(&self, asset_id: &str) -> String {
        format!(
            "{}/{}/{}/source.{}",
            self.base, asset_id, self.container, self.container
        )
    }

    /// Extract the asset id from a URL produced by [`Self::url_for`].
    pub fn asset_id<'a>(&self, url: &'a str) -> Option<&'a str> {
        let rest = url.strip_prefix(self.base.as_str())?.strip_prefix('/')?;
        let mut parts = rest.split('/');
        let asset_id = parts.next().filter(|id| !id.is_empty())?;
        let container = parts.next()?;
        let file = parts.next()?;
        if parts.next().is_some() || container != self.container || !file.starts_with("source.") {
            return None;
        }
        Some(asset_id)
    }

    pub fn matches(&self, url: &str) -> bool {
        self.asset_id(url).is_some()
    }

    /// Whether an item already points at durable media.
    ///
    /// True when the pipeline previously wrote an http(s) `published_url`,
    /// or when the primary reference itself is a playback URL.
    pub fn is_item_published(&self, item: &TimelineItem) -> bool {
        item.published_url.as_deref().is_some_and(is_remote_url)
            || item.source_ref.as_deref().is_some_and(|r| self.matches(r))
    }
}

impl Default for PlaybackUrlPattern {
    fn default() -> Self {
        Self::new("https://vod.api.video/vod", "mp4")
    }
}

/// `http://` or `https://` reference.
pub fn is_remote_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}
