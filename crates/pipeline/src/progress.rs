//! One-way progress reporting.
//!
//! Notifications are fire-and-forget: a dropped receiver or a slow callback
//! never changes what the pipeline does.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Analyzing,
    Locating,
    Extracting,
    Uploading,
    Rewriting,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Analyzing => "analyzing",
            Self::Locating => "locating",
            Self::Extracting => "extracting",
            Self::Uploading => "uploading",
            Self::Rewriting => "rewriting",
            Self::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Progress notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineProgress {
    pub phase: Phase,
    /// Human-readable status line.
    pub message: String,
    /// Units finished within the phase.
    pub current: usize,
    /// Units in the phase; 0 when unknown.
    pub total: usize,
}

impl PipelineProgress {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            current: 0,
            total: 0,
        }
    }

    pub fn with_counts(mut self, current: usize, total: usize) -> Self {
        self.current = current;
        self.total = total;
        self
    }

    /// Fraction done within the phase, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64 / self.total as f64).clamp(0.0, 1.0)
        }
    }
}

/// Progress callback.
pub type ProgressCallback = Arc<dyn Fn(PipelineProgress) + Send + Sync>;

/// Where progress notifications go.
#[derive(Clone, Default)]
pub struct ProgressSink {
    callback: Option<ProgressCallback>,
}

impl ProgressSink {
    /// Discard all notifications.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn callback(f: impl Fn(PipelineProgress) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(f)),
        }
    }

    /// Forward notifications to a channel. Send errors are ignored.
    pub fn channel(tx: tokio::sync::mpsc::UnboundedSender<PipelineProgress>) -> Self {
        Self::callback(move |p| {
            let _ = tx.send(p);
        })
    }

    pub fn emit(&self, progress: PipelineProgress) {
        tracing::debug!(phase = %progress.phase, current = progress.current, total = progress.total, "{}", progress.message);
        if let Some(cb) = &self.callback {
            cb(progress);
        }
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink")
            .field("attached", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_callback_receives_notifications() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            ProgressSink::callback(move |p| seen.lock().unwrap().push(p.phase))
        };
        sink.emit(PipelineProgress::new(Phase::Analyzing, "a"));
        sink.emit(PipelineProgress::new(Phase::Complete, "b"));
        assert_eq!(*seen.lock().unwrap(), vec![Phase::Analyzing, Phase::Complete]);
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        ProgressSink::channel(tx).emit(PipelineProgress::new(Phase::Uploading, "x"));
        ProgressSink::none().emit(PipelineProgress::new(Phase::Uploading, "y"));
    }

    #[test]
    fn test_fraction() {
        let p = PipelineProgress::new(Phase::Uploading, "").with_counts(1, 4);
        assert_eq!(p.fraction(), 0.25);
        assert_eq!(PipelineProgress::new(Phase::Locating, "").fraction(), 0.0);
    }
}
