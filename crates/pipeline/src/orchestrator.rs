//! Pipeline orchestration.
//!
//! Analyzer, then per source asset Locator, Extractor and Publisher, then a
//! single Rewriter pass. Failures are contained at the asset, usage, and
//! upload boundaries; only precondition violations escape as
//! [`RelayError::Pipeline`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cliprelay_common::config::AppConfig;
use cliprelay_common::error::{RelayError, RelayResult};
use cliprelay_media::{MediaEngine, RejectReason, SegmentExtractor};
use cliprelay_timeline::{composition_duration, validate_tracks, TimelineTrack};

use crate::analyzer::{analyze_tracks, SourceAsset};
use crate::locator::{LocateRequest, SourceLocator};
use crate::progress::{Phase, PipelineProgress, ProgressSink};
use crate::publisher::{EphemeralRefs, PublishedSegment, Publisher, SegmentLocation, SegmentNaming};
use crate::report::{ItemOutcome, ResolveReport, SkippedAsset, SkippedItem};
use crate::rewriter::rewrite_tracks;

/// Result of one pipeline run.
#[derive(Debug)]
pub struct ResolveOutcome {
    /// Resolved tracks; equal to the input when nothing needed processing.
    pub tracks: Vec<TimelineTrack>,
    pub report: ResolveReport,
    /// Spooled fallback files referenced by `tracks`. Release them once the
    /// timeline has been consumed.
    pub ephemeral: EphemeralRefs,
}

/// Runs the resolve pipeline.
pub struct Orchestrator {
    locator: SourceLocator,
    extractor: SegmentExtractor,
    publisher: Publisher,
    spool_dir: PathBuf,
    stop_flag: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        locator: SourceLocator,
        extractor: SegmentExtractor,
        publisher: Publisher,
        spool_dir: impl Into<PathBuf>,
    ) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        Self {
            locator,
            extractor: extractor.with_stop_flag(stop_flag.clone()),
            publisher,
            spool_dir: spool_dir.into(),
            stop_flag,
        }
    }

    pub fn from_config(config: &AppConfig) -> RelayResult<Self> {
        Ok(Self::new(
            SourceLocator::from_config(&config.locator)?,
            SegmentExtractor::new(&config.extraction),
            Publisher::from_config(&config.store)?,
            config.spool_dir.clone(),
        ))
    }

    /// Flag that cancels the current run when set. Checked between usages
    /// and between assets.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    pub fn cancel(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    /// Resolve every unpublished video item of `tracks`.
    ///
    /// `engine` is started on first use; shutting it down is up to the
    /// caller.
    pub async fn resolve(
        &self,
        engine: &mut dyn MediaEngine,
        tracks: &[TimelineTrack],
        job_id: &str,
        progress: &ProgressSink,
    ) -> RelayResult<ResolveOutcome> {
        if job_id.trim().is_empty() {
            return Err(RelayError::pipeline("Job id must not be empty"));
        }
        validate_tracks(tracks).map_err(|e| RelayError::pipeline(e.to_string()))?;

        self.stop_flag.store(false, Ordering::SeqCst);
        let mut report = ResolveReport::new(job_id);
        let mut ephemeral = EphemeralRefs::new(self.spool_dir.clone());

        tracing::info!(job_id, tracks = tracks.len(), "Resolving timeline");
        progress.emit(PipelineProgress::new(Phase::Analyzing, "Analyzing timeline"));

        let analysis = analyze_tracks(tracks, self.publisher.pattern());
        report.skipped_items = analysis
            .skipped
            .iter()
            .map(|(item, reason)| SkippedItem {
                item: item.clone(),
                reason: *reason,
            })
            .collect();

        if analysis.is_empty() {
            report.finish(composition_duration(tracks));
            progress.emit(PipelineProgress::new(Phase::Complete, "Nothing to resolve"));
            return Ok(ResolveOutcome {
                tracks: tracks.to_vec(),
                report,
                ephemeral,
            });
        }

        let asset_count = analysis.assets.len();
        let mut published = Vec::with_capacity(analysis.usage_count());

        for (index, asset) in analysis.assets.iter().enumerate() {
            if self.stop_requested() {
                report.cancelled = true;
                skip_asset(&mut report, asset, "cancelled");
                continue;
            }

            let segments = self
                .process_asset(
                    engine,
                    asset,
                    (index, asset_count),
                    job_id,
                    &mut report,
                    &mut ephemeral,
                    progress,
                )
                .await?;
            published.extend(segments);
        }

        progress.emit(PipelineProgress::new(Phase::Rewriting, "Rewriting timeline"));
        let resolved = rewrite_tracks(tracks, &published);

        report.finish(composition_duration(&resolved));
        tracing::info!(
            job_id,
            summary = %report.summary(),
            elapsed_secs = report.elapsed_secs(),
            "Timeline resolved"
        );
        progress.emit(PipelineProgress::new(Phase::Complete, report.summary()));

        Ok(ResolveOutcome {
            tracks: resolved,
            report,
            ephemeral,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_asset(
        &self,
        engine: &mut dyn MediaEngine,
        asset: &SourceAsset,
        (index, asset_count): (usize, usize),
        job_id: &str,
        report: &mut ResolveReport,
        ephemeral: &mut EphemeralRefs,
        progress: &ProgressSink,
    ) -> RelayResult<Vec<PublishedSegment>> {
        progress.emit(
            PipelineProgress::new(Phase::Locating, format!("Locating {}", asset.name))
                .with_counts(index, asset_count),
        );

        let blob = match self.locator.locate(&LocateRequest::for_asset(asset)).await {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(key = %asset.key, error = %e, "Source not found; leaving items untouched");
                skip_asset(report, asset, &e.to_string());
                return Ok(Vec::new());
            }
        };

        progress.emit(
            PipelineProgress::new(
                Phase::Extracting,
                format!("Extracting {} segments from {}", asset.usages.len(), asset.name),
            )
            .with_counts(index, asset_count),
        );

        let extraction = match self.extractor.extract(engine, &blob, &asset.usages).await {
            Ok(extraction) => extraction,
            Err(e) if e.is_recoverable() => {
                tracing::warn!(key = %asset.key, error = %e, "Extraction failed for source");
                skip_asset(report, asset, &e.to_string());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        drop(blob);

        for rejected in &extraction.rejected {
            let reason = match &rejected.reason {
                RejectReason::DegenerateWindow => "empty trim window".to_string(),
                RejectReason::Failed(msg) => msg.clone(),
                RejectReason::Cancelled => {
                    report.cancelled = true;
                    "cancelled".to_string()
                }
            };
            report.record(
                rejected.usage.item.clone(),
                &asset.key,
                ItemOutcome::Unresolved { reason },
            );
        }
        report.rejected_usages.extend(extraction.rejected);

        let usage_count = extraction.segments.len();
        let mut published = Vec::with_capacity(usage_count);
        for (usage_index, segment) in extraction.segments.into_iter().enumerate() {
            let naming = SegmentNaming {
                job_id,
                source_name: &asset.name,
                usage_index,
                usage_count,
            };
            let result = self.publisher.publish(segment, naming, ephemeral, progress).await;

            let outcome = match &result.location {
                SegmentLocation::Remote { url, .. } => ItemOutcome::Published { url: url.clone() },
                SegmentLocation::Local { url, reason } => ItemOutcome::Fallback {
                    url: url.clone(),
                    reason: reason.clone(),
                },
                SegmentLocation::Unavailable { reason } => ItemOutcome::Unresolved {
                    reason: reason.clone(),
                },
            };
            report.record(result.segment.usage.item.clone(), &asset.key, outcome);
            published.push(result);
        }

        Ok(published)
    }
}

fn skip_asset(report: &mut ResolveReport, asset: &SourceAsset, reason: &str) {
    for usage in &asset.usages {
        report.record(
            usage.item.clone(),
            &asset.key,
            ItemOutcome::Unresolved {
                reason: reason.to_string(),
            },
        );
    }
    report.skipped_assets.push(SkippedAsset {
        key: asset.key.clone(),
        name: asset.name.clone(),
        usages: asset.usages.len(),
        reason: reason.to_string(),
    });
}
