//! Publishing extracted segments.
//!
//! Each segment is uploaded to the remote asset store. When the upload
//! fails for any reason (rejection, malformed response, timeout, or no store
//! configured) the segment is spooled to a local file and served from a
//! `file://` reference instead. Publishing itself never fails.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cliprelay_common::config::StoreConfig;
use cliprelay_common::error::{RelayError, RelayResult};
use cliprelay_media::ExtractedSegment;
use cliprelay_timeline::PlaybackUrlPattern;

use crate::locator::file_url_path;
use crate::progress::{Phase, PipelineProgress, ProgressSink};

const MAX_TITLE_CHARS: usize = 255;

/// Remote storage for segments.
#[async_trait::async_trait]
pub trait AssetStore: Send + Sync {
    fn name(&self) -> &str;

    /// Upload `segment` under `title` and return the store's asset id.
    async fn upload(&self, title: &str, segment: &ExtractedSegment) -> RelayResult<String>;
}

/// api.video-compatible asset store.
pub struct ApiVideoStore {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Serialize)]
struct CreateVideoRequest<'a> {
    title: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResponse {
    #[serde(default)]
    video_id: Option<String>,
}

impl ApiVideoStore {
    /// Build a store from config. Requires an API key.
    pub fn new(config: &StoreConfig) -> RelayResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| RelayError::config("Asset store API key is not set"))?;

        let client = reqwest::Client::builder()
            .timeout(config.upload_timeout())
            .build()
            .map_err(|e| RelayError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn create_video(&self, title: &str) -> RelayResult<String> {
        let response = self
            .client
            .post(format!("{}/videos", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&CreateVideoRequest { title })
            .send()
            .await
            .map_err(|e| RelayError::publish(format!("Create video request failed: {e}")))?;

        let created: VideoResponse = parse_response(response, "create video").await?;
        created
            .video_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| RelayError::publish("Create video response has no videoId"))
    }

    async fn upload_source(&self, video_id: &str, segment: &ExtractedSegment) -> RelayResult<()> {
        let part = reqwest::multipart::Part::bytes(segment.blob.bytes().to_vec())
            .file_name(segment.file_name.clone())
            .mime_str(segment.container.mime())
            .map_err(|e| RelayError::publish(format!("Invalid content type: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/videos/{video_id}/source", self.endpoint))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RelayError::publish(format!("Source upload failed: {e}")))?;

        let _: VideoResponse = parse_response(response, "upload source").await?;
        Ok(())
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> RelayResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RelayError::publish(format!(
            "{what} returned {status}: {}",
            body.trim()
        )));
    }
    response
        .json()
        .await
        .map_err(|e| RelayError::publish(format!("Malformed {what} response: {e}")))
}

#[async_trait::async_trait]
impl AssetStore for ApiVideoStore {
    fn name(&self) -> &str {
        "api.video"
    }

    async fn upload(&self, title: &str, segment: &ExtractedSegment) -> RelayResult<String> {
        let video_id = self.create_video(title).await?;
        self.upload_source(&video_id, segment).await?;
        Ok(video_id)
    }
}

/// Naming metadata for one upload.
#[derive(Debug, Clone, Copy)]
pub struct SegmentNaming<'a> {
    pub job_id: &'a str,
    pub source_name: &'a str,
    pub usage_index: usize,
    pub usage_count: usize,
}

impl SegmentNaming<'_> {
    /// `{job}-{source}-{file}`, at most 255 characters.
    pub fn title(&self, file_name: &str) -> String {
        format!("{}-{}-{}", self.job_id, self.source_name, file_name)
            .chars()
            .take(MAX_TITLE_CHARS)
            .collect()
    }
}

/// Where a published segment can be played from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentLocation {
    /// Uploaded; durable playback URL.
    Remote { asset_id: String, url: String },
    /// Upload failed; spooled to a local ephemeral file.
    Local { url: String, reason: String },
    /// Upload failed and the spool could not be written either.
    Unavailable { reason: String },
}

/// An extracted segment with its playback location.
#[derive(Debug, Clone)]
pub struct PublishedSegment {
    pub segment: ExtractedSegment,
    pub location: SegmentLocation,
}

impl PublishedSegment {
    pub fn url(&self) -> Option<&str> {
        match &self.location {
            SegmentLocation::Remote { url, .. } | SegmentLocation::Local { url, .. } => Some(url),
            SegmentLocation::Unavailable { .. } => None,
        }
    }

    pub fn fallback_to_local(&self) -> bool {
        !matches!(self.location, SegmentLocation::Remote { .. })
    }
}

/// Owner of spooled fallback files.
///
/// Files stay on disk until released. Call [`EphemeralRefs::release_all`]
/// once the resolved timeline has been consumed.
#[derive(Debug)]
pub struct EphemeralRefs {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl EphemeralRefs {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write `data` to the spool and return its `file://` URL.
    pub async fn spool(&mut self, name: &str, data: &[u8]) -> RelayResult<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, data).await?;
        let url = file_url(&path);
        if !self.files.contains(&path) {
            self.files.push(path);
        }
        Ok(url)
    }

    /// Delete one spooled file. Returns whether `url` was owned here.
    pub async fn release(&mut self, url: &str) -> bool {
        let Some(path) = file_url_path(url) else {
            return false;
        };
        let Some(pos) = self.files.iter().position(|p| *p == path) else {
            return false;
        };
        let path = self.files.remove(pos);
        remove_quietly(&path).await;
        true
    }

    /// Delete every spooled file.
    pub async fn release_all(&mut self) {
        for path in self.files.drain(..) {
            remove_quietly(&path).await;
        }
    }
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to release spooled segment");
        }
    }
}

/// Uploads segments, falling back to local spool files.
pub struct Publisher {
    store: Option<Arc<dyn AssetStore>>,
    pattern: PlaybackUrlPattern,
    timeout: Duration,
    warned_no_store: AtomicBool,
}

impl Publisher {
    pub fn new(store: Option<Arc<dyn AssetStore>>, pattern: PlaybackUrlPattern, timeout: Duration) -> Self {
        Self {
            store,
            pattern,
            timeout,
            warned_no_store: AtomicBool::new(false),
        }
    }

    /// Publisher for `config`. Without an API key every segment falls back.
    pub fn from_config(config: &StoreConfig) -> RelayResult<Self> {
        let store: Option<Arc<dyn AssetStore>> = match config.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Some(Arc::new(ApiVideoStore::new(config)?)),
            _ => None,
        };
        Ok(Self::new(
            store,
            PlaybackUrlPattern::new(&config.playback_base, &config.container),
            config.upload_timeout(),
        ))
    }

    pub fn pattern(&self) -> &PlaybackUrlPattern {
        &self.pattern
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Publish one segment. Always returns a result; failures degrade to a
    /// local reference.
    pub async fn publish(
        &self,
        segment: ExtractedSegment,
        naming: SegmentNaming<'_>,
        refs: &mut EphemeralRefs,
        progress: &ProgressSink,
    ) -> PublishedSegment {
        let title = naming.title(&segment.file_name);

        let location = match self.upload(&title, &segment).await {
            Ok(asset_id) => {
                let url = self.pattern.url_for(&asset_id);
                tracing::info!(
                    item = %segment.usage.item,
                    asset_id = %asset_id,
                    url = %url,
                    "Segment published"
                );
                SegmentLocation::Remote { asset_id, url }
            }
            Err(e) => {
                let reason = e.to_string();
                let spool_name = spool_file_name(naming.job_id, &segment);
                match refs.spool(&spool_name, segment.blob.bytes()).await {
                    Ok(url) => {
                        tracing::warn!(item = %segment.usage.item, error = %reason, url = %url, "Upload failed; using local fallback");
                        SegmentLocation::Local { url, reason }
                    }
                    Err(spool_err) => {
                        tracing::error!(item = %segment.usage.item, error = %reason, spool_error = %spool_err, "Upload and local fallback both failed");
                        SegmentLocation::Unavailable {
                            reason: format!("{reason}; spool: {spool_err}"),
                        }
                    }
                }
            }
        };

        let verb = match location {
            SegmentLocation::Remote { .. } => "Uploaded",
            _ => "Stored locally",
        };
        progress.emit(
            PipelineProgress::new(
                Phase::Uploading,
                format!(
                    "{verb} {}/{} segments of {}",
                    naming.usage_index + 1,
                    naming.usage_count,
                    naming.source_name
                ),
            )
            .with_counts(naming.usage_index + 1, naming.usage_count),
        );

        PublishedSegment { segment, location }
    }

    async fn upload(&self, title: &str, segment: &ExtractedSegment) -> RelayResult<String> {
        let Some(store) = &self.store else {
            if !self.warned_no_store.swap(true, Ordering::SeqCst) {
                tracing::warn!("No asset store API key configured; all segments use local fallback");
            }
            return Err(RelayError::publish("No asset store configured"));
        };

        let asset_id = tokio::time::timeout(self.timeout, store.upload(title, segment))
            .await
            .map_err(|_| {
                RelayError::publish(format!(
                    "Upload to {} timed out after {}s",
                    store.name(),
                    self.timeout.as_secs_f64()
                ))
            })??;

        if asset_id.trim().is_empty() {
            return Err(RelayError::publish(format!("{} returned an empty asset id", store.name())));
        }
        Ok(asset_id)
    }
}

/// `{job}-t{track}-i{item}-{file}`. Unique per timeline slot, so items that
/// share an id never share a spool file.
fn spool_file_name(job_id: &str, segment: &ExtractedSegment) -> String {
    let item = &segment.usage.item;
    format!(
        "{}-t{}-i{}-{}",
        sanitize(job_id),
        item.track_index,
        item.item_index,
        segment.file_name
    )
}

fn sanitize(s: &str) -> String {
    let out: String = s
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() {
        "job".to_string()
    } else {
        out
    }
}
