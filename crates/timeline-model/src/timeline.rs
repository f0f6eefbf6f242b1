//! Composition timeline types.
//!
//! JSON uses camelCase keys. Legacy editor keys (`src`, `type`,
//! `public_url`, `chunkAdjustment`) are accepted as aliases.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A track of the composition timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineTrack {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, alias = "type")]
    pub kind: TrackKind,

    /// Items in playback order.
    #[serde(default)]
    pub items: Vec<TimelineItem>,

    /// Unrecognized track attributes, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Track media kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    #[default]
    Video,
    Audio,
}

/// Item media kind. Only video items take part in resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[serde(alias = "Video")]
    Video,
    #[serde(alias = "Audio")]
    Audio,
    #[serde(alias = "Image")]
    Image,
    #[serde(alias = "Text")]
    Text,
    #[default]
    #[serde(other)]
    Other,
}

/// One clip placed on a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineItem {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, alias = "type")]
    pub kind: ItemKind,

    /// Position on the track, in seconds.
    #[serde(default)]
    pub start: f64,

    /// Length on the track, in seconds.
    #[serde(default)]
    pub duration: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_index: Option<usize>,

    /// Primary media reference: URL, local path, or identifier.
    #[serde(default, alias = "src", skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,

    /// Secondary reference used when `source_ref` is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,

    /// Inline binary handle: a local file picked in the editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_point: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_point: Option<f64>,

    /// Full length of the source media, when the editor knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_duration: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,

    /// Durable (or fallback) URL written by the pipeline.
    #[serde(default, alias = "public_url", skip_serializing_if = "Option::is_none")]
    pub published_url: Option<String>,

    /// Leading bleed in seconds the renderer must skip in the segment.
    #[serde(default, alias = "chunkAdjustment", skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<f64>,

    #[serde(default, skip_serializing_if = "PublishStatus::is_unresolved")]
    pub publish_status: PublishStatus,

    /// Opaque layout attributes (position, scale, keyframes, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Resolution state of an item's media reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PublishStatus {
    #[default]
    Unresolved,
    Published {
        url: String,
    },
    Fallback {
        #[serde(rename = "localRef")]
        local_ref: String,
    },
}

impl PublishStatus {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }

    /// Whether the item was served a lower-durability local reference.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    /// The URL the item now plays from, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Unresolved => None,
            Self::Published { url } => Some(url),
            Self::Fallback { local_ref } => Some(local_ref),
        }
    }
}

/// The `(in, out)` sub-range of a source that an item plays, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimWindow {
    pub in_point: f64,
    pub out_point: f64,
}

impl TrimWindow {
    pub fn new(in_point: f64, out_point: f64) -> Self {
        Self {
            in_point,
            out_point,
        }
    }

    pub fn duration(&self) -> f64 {
        self.out_point - self.in_point
    }

    /// A window is playable when both ends are finite and it has length.
    pub fn is_playable(&self) -> bool {
        self.in_point.is_finite()
            && self.out_point.is_finite()
            && self.in_point >= 0.0
            && self.duration() > 0.0
    }
}

impl TimelineItem {
    /// Minimal video item, mostly useful for tests and tooling.
    pub fn video(id: impl Into<String>, source_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind: ItemKind::Video,
            start: 0.0,
            duration: 0.0,
            track_index: None,
            source_ref: Some(source_ref.into()),
            external_url: None,
            blob: None,
            in_point: None,
            out_point: None,
            media_duration: None,
            volume: None,
            published_url: None,
            adjustment: None,
            publish_status: PublishStatus::Unresolved,
            extra: Map::new(),
        }
    }

    /// Builder-style trim setter; also sets `duration` to the window length.
    pub fn trimmed(mut self, in_point: f64, out_point: f64) -> Self {
        self.in_point = Some(in_point);
        self.out_point = Some(out_point);
        self.duration = out_point - in_point;
        self
    }

    pub fn is_video(&self) -> bool {
        self.kind == ItemKind::Video
    }

    /// Effective trim window.
    ///
    /// A missing in point means 0. A missing out point falls back to
    /// `in_point + duration` (the item's length on its track), then to the
    /// media duration; when neither is known the window collapses to zero
    /// length.
    pub fn trim_window(&self) -> TrimWindow {
        let in_point = self.in_point.unwrap_or(0.0);
        let out_point = self
            .out_point
            .or_else(|| (self.duration > 0.0).then_some(in_point + self.duration))
            .or(self.media_duration)
            .unwrap_or(in_point);
        TrimWindow::new(in_point, out_point)
    }

    /// End of the item on its track.
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Display label used in logs and as a last-resort identity.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| (!self.id.is_empty()).then_some(self.id.as_str()))
            .unwrap_or("unknown")
    }
}

impl TimelineTrack {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            items: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_items(mut self, items: Vec<TimelineItem>) -> Self {
        self.items = items;
        self
    }

    /// End of the last item on this track.
    pub fn end(&self) -> f64 {
        self.items.last().map(TimelineItem::end).unwrap_or(0.0)
    }
}

/// Total composition duration: the latest track end.
pub fn composition_duration(tracks: &[TimelineTrack]) -> f64 {
    tracks.iter().map(TimelineTrack::end).fold(0.0, f64::max)
}

/// Check structural preconditions of a timeline.
///
/// Degenerate trim windows (`in >= out`) are not errors here; they are
/// rejected per usage during extraction.
pub fn validate_tracks(tracks: &[TimelineTrack]) -> Result<(), TimelineError> {
    for (track_index, track) in tracks.iter().enumerate() {
        for (item_index, item) in track.items.iter().enumerate() {
            let at = |field: &str| format!("track {track_index} item {item_index} {field}");

            for (field, value) in [("start", Some(item.start)), ("duration", Some(item.duration))]
                .into_iter()
                .chain([("inPoint", item.in_point), ("outPoint", item.out_point)])
            {
                if let Some(v) = value {
                    if !v.is_finite() {
                        return Err(TimelineError::ValidationError {
                            message: format!("{} is not finite", at(field)),
                        });
                    }
                }
            }

            if item.in_point.is_some_and(|v| v < 0.0) || item.out_point.is_some_and(|v| v < 0.0)
            {
                return Err(TimelineError::ValidationError {
                    message: format!("{} is negative", at("trim window")),
                });
            }
        }
    }
    Ok(())
}

/// On-disk timeline document: either a bare track array or an object with
/// a `tracks` field plus arbitrary sibling fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimelineDocument {
    Tracks(Vec<TimelineTrack>),
    Wrapped {
        tracks: Vec<TimelineTrack>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

impl TimelineDocument {
    pub fn tracks(&self) -> &[TimelineTrack] {
        match self {
            Self::Tracks(tracks) | Self::Wrapped { tracks, .. } => tracks,
        }
    }

    /// Same document shape with the tracks replaced.
    pub fn with_tracks(&self, tracks: Vec<TimelineTrack>) -> Self {
        match self {
            Self::Tracks(_) => Self::Tracks(tracks),
            Self::Wrapped { extra, .. } => Self::Wrapped {
                tracks,
                extra: extra.clone(),
            },
        }
    }

    /// Load a timeline document from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TimelineError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| TimelineError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| TimelineError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write the document as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TimelineError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|e| TimelineError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TimelineError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, json).map_err(|e| TimelineError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Errors that can occur when working with timelines.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid timeline: {message}")]
    ValidationError { message: String },
}
