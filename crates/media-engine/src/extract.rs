//! Segment extraction: one independently playable file per usage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use cliprelay_common::config::{ExtractionConfig, ExtractionMode};
use cliprelay_common::error::{RelayError, RelayResult};
use cliprelay_timeline::{TrimWindow, Usage};

use crate::blob::{Container, MediaBlob};
use crate::engine::MediaEngine;
use crate::keyframes::CutPlan;

/// A usage cut out of its source, starting at time 0.
#[derive(Debug, Clone)]
pub struct ExtractedSegment {
    pub usage: Usage,
    pub blob: MediaBlob,
    /// Engine artifact name, e.g. `usage_clip-1.mp4`.
    pub file_name: String,
    pub container: Container,
    /// Leading bleed in seconds; 0 for exact cuts.
    pub adjustment: f64,
}

impl ExtractedSegment {
    /// Window of the segment itself: `[0, duration)`.
    pub fn normalized_window(&self) -> TrimWindow {
        TrimWindow::new(0.0, self.usage.duration())
    }
}

/// Why a usage produced no segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    /// `out <= in`, or a non-finite bound.
    DegenerateWindow,
    /// Engine or read failure for this usage only.
    Failed(String),
    /// Stop flag observed before this usage ran.
    Cancelled,
}

/// A usage excluded from extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedUsage {
    pub usage: Usage,
    pub reason: RejectReason,
}

/// Result of extracting all usages of one source.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// Segments in usage order.
    pub segments: Vec<ExtractedSegment>,
    pub rejected: Vec<RejectedUsage>,
}

impl ExtractionReport {
    pub fn total_bytes(&self) -> usize {
        self.segments.iter().map(|s| s.blob.len()).sum()
    }
}

/// Encoder settings for exact (re-encoding) cuts.
#[derive(Debug, Clone)]
struct EncodeSettings {
    video_codec: String,
    audio_codec: String,
    preset: String,
}

/// Cuts segments out of a source blob.
#[derive(Debug, Clone)]
pub struct SegmentExtractor {
    mode: ExtractionMode,
    encode: EncodeSettings,
    stop_flag: Option<Arc<AtomicBool>>,
}

impl SegmentExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            mode: config.mode,
            encode: EncodeSettings {
                video_codec: config.video_codec.clone(),
                audio_codec: config.audio_codec.clone(),
                preset: config.preset.clone(),
            },
            stop_flag: None,
        }
    }

    /// Check `flag` between usages; once set, remaining usages are rejected
    /// as cancelled.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Extract one segment per usage, in usage order.
    ///
    /// Usage-level failures land in [`ExtractionReport::rejected`]. An `Err`
    /// means the source as a whole could not be processed (engine start or
    /// input write failed). Engine files are deleted on every path.
    pub async fn extract(
        &self,
        engine: &mut dyn MediaEngine,
        source: &MediaBlob,
        usages: &[Usage],
    ) -> RelayResult<ExtractionReport> {
        let mut report = ExtractionReport::default();

        let mut accepted = Vec::with_capacity(usages.len());
        for usage in usages {
            if usage.window.is_playable() {
                accepted.push(usage);
            } else {
                tracing::warn!(
                    item = %usage.item,
                    in_point = usage.window.in_point,
                    out_point = usage.window.out_point,
                    "Rejecting usage with empty trim window"
                );
                report.rejected.push(RejectedUsage {
                    usage: usage.clone(),
                    reason: RejectReason::DegenerateWindow,
                });
            }
        }

        if accepted.is_empty() {
            return Ok(report);
        }
        if source.is_empty() {
            return Err(RelayError::extraction("Source media is empty"));
        }

        if !engine.is_running() {
            engine.start().await?;
        }

        let container = source.container();
        let input_name = format!("input.{}", container.extension());

        tracing::info!(
            engine = engine.name(),
            size_mb = %format!("{:.2}", source.size_mb()),
            usages = accepted.len(),
            mode = ?self.mode,
            "Starting segment extraction"
        );

        if let Err(e) = engine.write_input(&input_name, source.bytes()).await {
            release(engine, &input_name).await;
            return Err(e);
        }

        let keyframes = match self.mode {
            ExtractionMode::Exact => None,
            ExtractionMode::Fast => match engine.keyframes(&input_name).await {
                Ok(kf) if !kf.is_empty() => Some(kf),
                Ok(_) => {
                    tracing::warn!("No keyframes found; using exact cuts for this source");
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Keyframe probe failed; using exact cuts for this source");
                    None
                }
            },
        };

        for usage in accepted {
            if self.stop_requested() {
                report.rejected.push(RejectedUsage {
                    usage: usage.clone(),
                    reason: RejectReason::Cancelled,
                });
                continue;
            }

            let plan = CutPlan::for_window(self.mode, usage.window, keyframes.as_deref());
            let output_name = segment_file_name(&usage.item.item_id, container);
            let args = self.build_args(&plan, &input_name, &output_name, container);

            let result = run_cut(engine, &args, &output_name).await;
            release(engine, &output_name).await;

            match result {
                Ok(data) => {
                    tracing::info!(
                        item = %usage.item,
                        in_point = usage.window.in_point,
                        out_point = usage.window.out_point,
                        adjustment = plan.adjustment,
                        bytes = data.len(),
                        "Segment extracted"
                    );
                    report.segments.push(ExtractedSegment {
                        usage: usage.clone(),
                        blob: MediaBlob::new(data).with_content_type(container.mime()),
                        file_name: output_name,
                        container,
                        adjustment: plan.adjustment,
                    });
                }
                Err(e) => {
                    tracing::warn!(item = %usage.item, error = %e, "Segment extraction failed");
                    report.rejected.push(RejectedUsage {
                        usage: usage.clone(),
                        reason: RejectReason::Failed(e.to_string()),
                    });
                }
            }
        }

        release(engine, &input_name).await;

        tracing::info!(
            extracted = report.segments.len(),
            rejected = report.rejected.len(),
            total_mb = %format!("{:.2}", report.total_bytes() as f64 / 1024.0 / 1024.0),
            "Segment extraction complete"
        );
        Ok(report)
    }

    fn build_args(
        &self,
        plan: &CutPlan,
        input: &str,
        output: &str,
        container: Container,
    ) -> Vec<String> {
        let mut args = vec![
            "-ss".to_string(),
            format_secs(plan.seek),
            "-i".to_string(),
            input.to_string(),
            "-t".to_string(),
            format_secs(plan.length),
        ];

        if plan.stream_copy {
            args.extend(["-c".to_string(), "copy".to_string()]);
        } else {
            let (vcodec, acodec) = match container {
                Container::Mp4 => (self.encode.video_codec.as_str(), self.encode.audio_codec.as_str()),
                Container::Webm => ("libvpx-vp9", "libopus"),
            };
            args.extend(["-c:v".to_string(), vcodec.to_string()]);
            if container == Container::Mp4 {
                args.extend(["-preset".to_string(), self.encode.preset.clone()]);
            }
            args.extend(["-c:a".to_string(), acodec.to_string()]);
        }

        args.extend(["-avoid_negative_ts".to_string(), "make_zero".to_string()]);
        if container == Container::Mp4 {
            args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        }
        args.push(output.to_string());
        args
    }
}

async fn run_cut(
    engine: &mut dyn MediaEngine,
    args: &[String],
    output_name: &str,
) -> RelayResult<Vec<u8>> {
    engine.execute(args).await?;
    let data = engine.read_output(output_name).await?;
    if data.is_empty() {
        return Err(RelayError::extraction(format!(
            "{output_name} is empty after trim"
        )));
    }
    Ok(data)
}

async fn release(engine: &mut dyn MediaEngine, name: &str) {
    if let Err(e) = engine.delete_file(name).await {
        tracing::debug!(name, error = %e, "Failed to delete engine file");
    }
}

/// `usage_<id>.<ext>` with the id reduced to filename-safe characters.
pub fn segment_file_name(item_id: &str, container: Container) -> String {
    let safe: String = item_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = if safe.is_empty() { "item".to_string() } else { safe };
    format!("usage_{safe}.{}", container.extension())
}

fn format_secs(secs: f64) -> String {
    format!("{secs:.6}")
}
