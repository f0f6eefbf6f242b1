//! Show the source assets of a timeline without touching any media.

use std::path::PathBuf;

use cliprelay_common::config::AppConfig;
use cliprelay_pipeline::analyze_tracks;
use cliprelay_timeline::{composition_duration, PlaybackUrlPattern, TimelineDocument};

pub fn run(config: &AppConfig, timeline: PathBuf) -> anyhow::Result<()> {
    println!("Analyzing timeline: {}", timeline.display());

    let doc = TimelineDocument::load(&timeline)
        .map_err(|e| anyhow::anyhow!("Failed to load timeline: {e}"))?;
    let tracks = doc.tracks();

    let pattern = PlaybackUrlPattern::new(&config.store.playback_base, &config.store.container);
    let analysis = analyze_tracks(tracks, &pattern);

    println!("  Tracks: {}", tracks.len());
    println!("  Duration: {:.2}s", composition_duration(tracks));
    println!("  Skipped items: {}", analysis.skipped.len());
    println!();

    if analysis.is_empty() {
        println!("Nothing to resolve.");
        return Ok(());
    }

    println!("Source assets ({}):", analysis.assets.len());
    for asset in &analysis.assets {
        println!("  {} ({} usage(s))", asset.key, asset.usages.len());
        if asset.name != asset.key {
            println!("    name: {}", asset.name);
        }
        if let Some(ref inline) = asset.inline {
            println!("    inline: {}", inline.display());
        }
        for usage in &asset.usages {
            let marker = if usage.window.is_playable() { "" } else { "  [empty window]" };
            println!(
                "    {} {:.3}s -> {:.3}s ({:.3}s){marker}",
                usage.item,
                usage.window.in_point,
                usage.window.out_point,
                usage.duration()
            );
        }
    }

    Ok(())
}
