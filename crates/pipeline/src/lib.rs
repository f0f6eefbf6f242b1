//! cliprelay Pipeline
//!
//! Resolves a composition timeline so every video item points at an
//! independently playable, published segment of its source:
//!
//! ```text
//! tracks ──► analyzer ──► SourceAsset[] ──┐
//!                                         │ per asset
//!                      locator ◄──────────┤
//!                         │ MediaBlob     │
//!                      extractor ─────────┤ ExtractedSegment[]
//!                         │               │
//!                      publisher ─────────┘ PublishedSegment[]
//!                         │
//!                      rewriter ──► resolved tracks + ResolveReport
//! ```

pub mod analyzer;
pub mod cache;
pub mod locator;
pub mod orchestrator;
pub mod progress;
pub mod publisher;
pub mod report;
pub mod rewriter;

#[cfg(test)]
mod test_http;

pub use analyzer::{analyze_tracks, Analysis, SourceAsset};
pub use cache::{CacheEntry, ContentCache, DirectoryCache};
pub use locator::{LocateRequest, ResolveStrategy, SourceLocator};
pub use orchestrator::{Orchestrator, ResolveOutcome};
pub use progress::{Phase, PipelineProgress, ProgressSink};
pub use publisher::{AssetStore, EphemeralRefs, PublishedSegment, Publisher, SegmentLocation};
pub use report::{ItemOutcome, ResolveReport};
pub use rewriter::rewrite_tracks;
