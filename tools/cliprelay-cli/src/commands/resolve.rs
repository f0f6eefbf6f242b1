//! Resolve a timeline: extract, publish, and rewrite.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use cliprelay_common::config::AppConfig;
use cliprelay_media::{FfmpegEngine, MediaEngine};
use cliprelay_pipeline::{ItemOutcome, Orchestrator, ProgressSink};
use cliprelay_timeline::TimelineDocument;

pub async fn run(
    config: AppConfig,
    timeline: PathBuf,
    output: Option<PathBuf>,
    job_id: Option<String>,
    report_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let doc = TimelineDocument::load(&timeline)
        .map_err(|e| anyhow::anyhow!("Failed to load timeline: {e}"))?;
    let output_path = output.unwrap_or_else(|| default_output_path(&timeline));
    let job_id = job_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    println!("Resolving timeline: {}", timeline.display());
    println!("  Job: {job_id}");
    println!("  Mode: {:?}", config.extraction.mode);
    if config.store.api_key.is_none() {
        println!("  [WARN] No asset store API key; segments will be stored locally");
    }

    let orchestrator = Orchestrator::from_config(&config)?;
    let mut engine = FfmpegEngine::new(&config.extraction);

    let stop_flag = orchestrator.stop_flag();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupt received; finishing current segment...");
            stop_flag.store(true, Ordering::SeqCst);
        }
    });

    let progress = ProgressSink::callback(|p| {
        print!("\r  [{}] {}\x1b[K", p.phase, p.message);
        let _ = std::io::stdout().flush();
    });

    let result = orchestrator
        .resolve(&mut engine, doc.tracks(), &job_id, &progress)
        .await;
    interrupt.abort();

    if let Err(e) = engine.shutdown().await {
        tracing::warn!(error = %e, "Engine shutdown failed");
    }
    println!();

    let outcome = result.map_err(|e| anyhow::anyhow!("Resolve failed: {e}"))?;
    let report = &outcome.report;

    doc.with_tracks(outcome.tracks.clone())
        .save(&output_path)
        .map_err(|e| anyhow::anyhow!("Failed to write resolved timeline: {e}"))?;

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;
        println!("  Report: {}", path.display());
    }

    println!("  Output: {}", output_path.display());
    println!("  Result: {}", report.summary());
    println!("  Duration: {:.2}s", report.composition_duration);

    for item in &report.items {
        match &item.outcome {
            ItemOutcome::Published { .. } => {}
            ItemOutcome::Fallback { reason, .. } => {
                println!("  [WARN] {} uses a local fallback: {reason}", item.item);
            }
            ItemOutcome::Unresolved { reason } => {
                println!("  [WARN] {} left unresolved: {reason}", item.item);
            }
        }
    }

    if !outcome.ephemeral.is_empty() {
        println!(
            "\n{} segment(s) were spooled to {}. Remove them once the timeline has been rendered.",
            outcome.ephemeral.len(),
            outcome.ephemeral.dir().display()
        );
    }
    if report.cancelled {
        println!("\nResolve was cancelled; remaining items were left untouched.");
    }

    Ok(())
}

/// `<dir>/<stem>.resolved.json`
fn default_output_path(timeline: &Path) -> PathBuf {
    let stem = timeline
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "timeline".to_string());
    timeline.with_file_name(format!("{stem}.resolved.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/work/project.json")),
            PathBuf::from("/work/project.resolved.json")
        );
    }
}
