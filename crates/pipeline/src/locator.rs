//! Source location: turn a dedupe key into binary content.
//!
//! Resolution runs an ordered chain of independent strategies. The first
//! strategy that produces non-empty content wins. A strategy that errors is
//! logged and treated as a miss, so one broken source of media never hides
//! another.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cliprelay_common::config::LocatorConfig;
use cliprelay_common::error::{RelayError, RelayResult};
use cliprelay_media::MediaBlob;
use cliprelay_timeline::is_remote_url;

use crate::analyzer::SourceAsset;
use crate::cache::{CacheEntry, ContentCache, DirectoryCache};

/// What the locator knows about one source.
#[derive(Debug, Clone, Copy)]
pub struct LocateRequest<'a> {
    pub key: &'a str,
    pub name_hint: Option<&'a str>,
    pub inline: Option<&'a Path>,
}

impl<'a> LocateRequest<'a> {
    pub fn new(key: &'a str) -> Self {
        Self {
            key,
            name_hint: None,
            inline: None,
        }
    }

    pub fn for_asset(asset: &'a SourceAsset) -> Self {
        Self {
            key: &asset.key,
            name_hint: Some(asset.name.as_str()).filter(|n| !n.is_empty()),
            inline: asset.inline.as_deref(),
        }
    }

    pub fn with_name_hint(mut self, name: &'a str) -> Self {
        self.name_hint = Some(name);
        self
    }

    pub fn with_inline(mut self, path: &'a Path) -> Self {
        self.inline = Some(path);
        self
    }
}

/// One way of finding source content.
#[async_trait::async_trait]
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` is a miss.
    async fn resolve(&self, request: &LocateRequest<'_>) -> RelayResult<Option<MediaBlob>>;
}

/// Reads the file behind an item's inline handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineHandle;

#[async_trait::async_trait]
impl ResolveStrategy for InlineHandle {
    fn name(&self) -> &'static str {
        "inline_handle"
    }

    async fn resolve(&self, request: &LocateRequest<'_>) -> RelayResult<Option<MediaBlob>> {
        match request.inline {
            Some(path) => MediaBlob::from_file(path).await.map(Some),
            None => Ok(None),
        }
    }
}

/// How a cache entry is matched against a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// Entry name equals the name hint.
    ExactName,
    /// `device-<digits>` identities matched by id or capture time.
    ///
    /// Heuristic: generated device names embed a millisecond timestamp that
    /// usually, but not always, lines up with the cached entry.
    DeviceIdentity,
    /// Entry name appears inside the reference (case-insensitive). Heuristic.
    NameInReference,
}

const DEVICE_PREFIX: &str = "device-";

impl MatchRule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExactName => "exact_name",
            Self::DeviceIdentity => "device_identity",
            Self::NameInReference => "name_in_reference",
        }
    }

    pub fn matches(&self, entry: &CacheEntry, request: &LocateRequest<'_>) -> bool {
        match self {
            Self::ExactName => request.name_hint.is_some_and(|hint| entry.name == hint),
            Self::DeviceIdentity => {
                let Some(digits) = request
                    .name_hint
                    .into_iter()
                    .chain(std::iter::once(request.key))
                    .find_map(|s| s.strip_prefix(DEVICE_PREFIX))
                    .filter(|d| !d.is_empty())
                else {
                    return false;
                };

                let entry_id = entry.id.strip_prefix(DEVICE_PREFIX).unwrap_or(&entry.id);
                if !entry_id.is_empty() && (entry.id.contains(digits) || digits.contains(entry_id)) {
                    return true;
                }

                // Second precision: first 10 digits of a millisecond timestamp.
                entry.timestamp.is_some_and(|ts| {
                    let ts = ts.to_string();
                    let prefix = &ts[..ts.len().min(10)];
                    !prefix.is_empty() && digits.starts_with(prefix)
                })
            }
            Self::NameInReference => {
                let name = entry.name.to_lowercase();
                !name.is_empty() && request.key.to_lowercase().contains(&name)
            }
        }
    }
}

/// Looks up a content cache with one [`MatchRule`].
pub struct CacheLookup {
    cache: Arc<dyn ContentCache>,
    rule: MatchRule,
}

impl CacheLookup {
    pub fn new(cache: Arc<dyn ContentCache>, rule: MatchRule) -> Self {
        Self { cache, rule }
    }
}

#[async_trait::async_trait]
impl ResolveStrategy for CacheLookup {
    fn name(&self) -> &'static str {
        self.rule.name()
    }

    async fn resolve(&self, request: &LocateRequest<'_>) -> RelayResult<Option<MediaBlob>> {
        let entries = self.cache.entries().await?;
        match entries.iter().find(|e| self.rule.matches(e, request)) {
            Some(entry) => {
                tracing::debug!(rule = self.rule.name(), id = %entry.id, name = %entry.name, "Cache hit");
                self.cache.read(entry).await.map(Some)
            }
            None => Ok(None),
        }
    }
}

/// Fetches the key itself when it is a fetchable reference.
///
/// - `file://` URLs and local paths are read from disk
/// - `/relative` references are joined to the base URL when one is set
/// - `http(s)://` URLs are fetched
pub struct DirectFetch {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl DirectFetch {
    pub fn new(client: reqwest::Client, base_url: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.map(|b| b.trim_end_matches('/').to_string()),
        }
    }

    async fn fetch(&self, url: &str) -> RelayResult<Option<MediaBlob>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RelayError::not_found(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            tracing::debug!(url, status = %response.status(), "Fetch returned non-success status");
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RelayError::not_found(format!("{url}: {e}")))?;

        let blob = MediaBlob::new(bytes.to_vec());
        Ok(Some(match content_type {
            Some(ct) => blob.with_content_type(ct),
            None => blob,
        }))
    }
}

#[async_trait::async_trait]
impl ResolveStrategy for DirectFetch {
    fn name(&self) -> &'static str {
        "direct_fetch"
    }

    async fn resolve(&self, request: &LocateRequest<'_>) -> RelayResult<Option<MediaBlob>> {
        let key = request.key;

        if let Some(path) = key.strip_prefix("file://") {
            return read_if_exists(Path::new(path)).await;
        }
        if is_remote_url(key) {
            return self.fetch(key).await;
        }
        if key.starts_with('/') {
            if let Some(base) = &self.base_url {
                return self.fetch(&format!("{base}{key}")).await;
            }
        }
        read_if_exists(Path::new(key)).await
    }
}

async fn read_if_exists(path: &Path) -> RelayResult<Option<MediaBlob>> {
    match MediaBlob::from_file(path).await {
        Ok(blob) => Ok(Some(blob)),
        Err(RelayError::FileNotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Ordered strategy chain.
#[derive(Default)]
pub struct SourceLocator {
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl SourceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a strategy to the end of the chain.
    pub fn with_strategy(mut self, strategy: impl ResolveStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Standard chain: inline handle, cache lookups (when a cache directory
    /// is configured), then direct fetch.
    pub fn from_config(config: &LocatorConfig) -> RelayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .build()
            .map_err(|e| RelayError::config(format!("Failed to create HTTP client: {e}")))?;

        let mut locator = Self::new().with_strategy(InlineHandle);
        if let Some(dir) = &config.cache_dir {
            locator = locator.with_cache(Arc::new(DirectoryCache::new(dir.clone())));
        }
        Ok(locator.with_strategy(DirectFetch::new(client, config.base_url.clone())))
    }

    /// Append the three cache strategies in order.
    pub fn with_cache(self, cache: Arc<dyn ContentCache>) -> Self {
        self.with_strategy(CacheLookup::new(cache.clone(), MatchRule::ExactName))
            .with_strategy(CacheLookup::new(cache.clone(), MatchRule::DeviceIdentity))
            .with_strategy(CacheLookup::new(cache, MatchRule::NameInReference))
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolve `request`, or [`RelayError::NotFound`] when every strategy misses.
    pub async fn locate(&self, request: &LocateRequest<'_>) -> RelayResult<MediaBlob> {
        for strategy in &self.strategies {
            match strategy.resolve(request).await {
                Ok(Some(blob)) if !blob.is_empty() => {
                    tracing::info!(
                        key = request.key,
                        strategy = strategy.name(),
                        size_mb = %format!("{:.2}", blob.size_mb()),
                        "Source located"
                    );
                    return Ok(blob);
                }
                Ok(Some(_)) => {
                    tracing::debug!(key = request.key, strategy = strategy.name(), "Empty content, skipping");
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(key = request.key, strategy = strategy.name(), error = %e, "Strategy failed");
                }
            }
        }
        Err(RelayError::not_found(request.key))
    }
}

/// Path form of a `file://` reference.
pub fn file_url_path(reference: &str) -> Option<PathBuf> {
    reference.strip_prefix("file://").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::test_http::{Reply, TestServer};

    struct FixedCache {
        entries: Vec<CacheEntry>,
        reads: AtomicUsize,
    }

    impl FixedCache {
        fn new(entries: Vec<CacheEntry>) -> Self {
            Self {
                entries,
                reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ContentCache for FixedCache {
        async fn entries(&self) -> RelayResult<Vec<CacheEntry>> {
            Ok(self.entries.clone())
        }

        async fn read(&self, entry: &CacheEntry) -> RelayResult<MediaBlob> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(MediaBlob::new(entry.id.clone().into_bytes()))
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl ResolveStrategy for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn resolve(&self, _: &LocateRequest<'_>) -> RelayResult<Option<MediaBlob>> {
            Err(RelayError::engine("boom"))
        }
    }

    fn entry(id: &str, name: &str, timestamp: Option<i64>) -> CacheEntry {
        CacheEntry {
            id: id.into(),
            name: name.into(),
            timestamp,
            file: PathBuf::from(format!("{id}.mp4")),
        }
    }

    #[test]
    fn test_exact_name_rule() {
        let e = entry("1", "Beach.mov", None);
        let req = LocateRequest::new("blob:x").with_name_hint("Beach.mov");
        assert!(MatchRule::ExactName.matches(&e, &req));
        assert!(!MatchRule::ExactName.matches(&e, &LocateRequest::new("Beach.mov")));
    }

    #[test]
    fn test_device_identity_rule() {
        let req = LocateRequest::new("blob:x").with_name_hint("device-1760637121685");

        assert!(MatchRule::DeviceIdentity.matches(&entry("device-1760637121685", "a", None), &req));
        assert!(MatchRule::DeviceIdentity.matches(&entry("1760637121685", "a", None), &req));
        assert!(MatchRule::DeviceIdentity.matches(&entry("other", "a", Some(1_760_637_121_999)), &req));
        assert!(!MatchRule::DeviceIdentity.matches(&entry("other", "a", Some(1_760_637_999_000)), &req));
        assert!(!MatchRule::DeviceIdentity.matches(&entry("device-", "a", None), &req));

        let plain = LocateRequest::new("clip.mp4").with_name_hint("clip.mp4");
        assert!(!MatchRule::DeviceIdentity.matches(&entry("1760637121685", "a", None), &plain));
    }

    #[test]
    fn test_name_in_reference_rule() {
        let req = LocateRequest::new("https://cdn.example.com/Media/Intro.MP4");
        assert!(MatchRule::NameInReference.matches(&entry("1", "intro.mp4", None), &req));
        assert!(!MatchRule::NameInReference.matches(&entry("1", "outro.mp4", None), &req));
        assert!(!MatchRule::NameInReference.matches(&entry("1", "", None), &req));
    }

    #[tokio::test]
    async fn test_chain_order_first_hit_wins() {
        let dir = tempfile::tempdir().unwrap();
        let inline = dir.path().join("picked.mp4");
        std::fs::write(&inline, b"inline").unwrap();

        let cache = Arc::new(FixedCache::new(vec![entry("cached", "clip.mp4", None)]));
        let locator = SourceLocator::new()
            .with_strategy(InlineHandle)
            .with_cache(cache.clone());

        let req = LocateRequest::new("clip.mp4")
            .with_name_hint("clip.mp4")
            .with_inline(&inline);
        assert_eq!(locator.locate(&req).await.unwrap().bytes(), b"inline");
        assert_eq!(cache.reads.load(Ordering::SeqCst), 0);

        let req = LocateRequest::new("clip.mp4").with_name_hint("clip.mp4");
        assert_eq!(locator.locate(&req).await.unwrap().bytes(), b"cached");
    }

    #[tokio::test]
    async fn test_failing_strategy_counts_as_miss() {
        let cache = Arc::new(FixedCache::new(vec![entry("hit", "x.mp4", None)]));
        let locator = SourceLocator::new().with_strategy(Failing).with_cache(cache);
        let req = LocateRequest::new("x.mp4").with_name_hint("x.mp4");
        assert_eq!(locator.locate(&req).await.unwrap().bytes(), b"hit");
    }

    #[tokio::test]
    async fn test_all_miss_is_not_found() {
        let locator = SourceLocator::new()
            .with_strategy(InlineHandle)
            .with_cache(Arc::new(FixedCache::new(vec![])));
        let err = locator.locate(&LocateRequest::new("missing.mp4")).await.unwrap_err();
        assert!(matches!(err, RelayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_direct_fetch_reads_file_urls_and_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spooled.webm");
        std::fs::write(&path, b"spool").unwrap();

        let fetch = DirectFetch::new(reqwest::Client::new(), None);
        let url = format!("file://{}", path.display());
        let blob = fetch.resolve(&LocateRequest::new(&url)).await.unwrap().unwrap();
        assert_eq!(blob.bytes(), b"spool");
        assert_eq!(blob.content_type(), Some("video/webm"));

        let key = path.display().to_string();
        assert!(fetch.resolve(&LocateRequest::new(&key)).await.unwrap().is_some());

        let missing = dir.path().join("gone.mp4").display().to_string();
        assert!(fetch.resolve(&LocateRequest::new(&missing)).await.unwrap().is_none());
        assert!(fetch.resolve(&LocateRequest::new("device-123")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_direct_fetch_over_http() {
        let server = TestServer::start(vec![(
            "GET",
            "/media/clip.mp4",
            Reply::media("video/mp4; codecs=avc1", b"remote"),
        )])
        .await;
        let fetch = DirectFetch::new(reqwest::Client::new(), None);

        let url = format!("{}/media/clip.mp4", server.url());
        let blob = fetch.resolve(&LocateRequest::new(&url)).await.unwrap().unwrap();
        assert_eq!(blob.bytes(), b"remote");
        assert_eq!(blob.content_type(), Some("video/mp4"));

        let missing = format!("{}/media/gone.mp4", server.url());
        assert!(fetch.resolve(&LocateRequest::new(&missing)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_relative_key_joins_base_url() {
        let server = TestServer::start(vec![(
            "GET",
            "/videos/video3.mp4",
            Reply::media("video/mp4", b"relative"),
        )])
        .await;
        let fetch = DirectFetch::new(reqwest::Client::new(), Some(format!("{}/", server.url())));

        let blob = fetch
            .resolve(&LocateRequest::new("/videos/video3.mp4"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(blob.bytes(), b"relative");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, "/videos/video3.mp4");
    }

    #[test]
    fn test_from_config_chain() {
        let locator = SourceLocator::from_config(&LocatorConfig::default()).unwrap();
        assert_eq!(locator.strategy_names(), vec!["inline_handle", "direct_fetch"]);

        let config = LocatorConfig {
            cache_dir: Some(PathBuf::from("/tmp/cache")),
            ..LocatorConfig::default()
        };
        let locator = SourceLocator::from_config(&config).unwrap();
        assert_eq!(
            locator.strategy_names(),
            vec![
                "inline_handle",
                "exact_name",
                "device_identity",
                "name_in_reference",
                "direct_fetch"
            ]
        );
    }

    #[test]
    fn test_file_url_path() {
        assert_eq!(file_url_path("file:///tmp/a.mp4"), Some(PathBuf::from("/tmp/a.mp4")));
        assert_eq!(file_url_path("https://x"), None);
    }
}
