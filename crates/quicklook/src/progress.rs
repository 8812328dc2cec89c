//! Progress reporting.
//!
//! The pipeline reports `(completed, total, phase)` triples from the
//! coordinating task only, after every completion. Sinks decide how to render
//! them: a log line, a console bar, or a channel feeding some other front-end.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use point_engine::Statistic;
use tokio::sync::mpsc;
use tracing::info;

/// Phase label used while tiles are rasterized.
pub fn rasterize_phase(statistic: Statistic) -> String {
    format!("Generating {} raster", statistic)
}

/// Receiver of progress updates.
///
/// `completed` never decreases within a phase and reaches `total` before
/// [`finish`](Self::finish) is called for that phase.
pub trait ProgressSink: Send + Sync {
    fn update(&self, completed: usize, total: usize, phase: &str);

    fn finish(&self, _phase: &str) {}
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&self, _completed: usize, _total: usize, _phase: &str) {}
}

/// Logs each update at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn update(&self, completed: usize, total: usize, phase: &str) {
        if completed == 0 {
            return;
        }
        let percent = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            100.0
        };
        info!(
            phase,
            completed,
            total,
            percent = format!("{:.1}", percent),
            "Progress"
        );
    }

    fn finish(&self, phase: &str) {
        info!(phase, "Phase complete");
    }
}

/// Terminal progress bar, one bar per phase.
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    current: Mutex<Option<(String, ProgressBar)>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn new_bar(total: usize, phase: &str) -> ProgressBar {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        bar.set_style(style);
        bar.set_message(phase.to_string());
        bar
    }
}

impl ProgressSink for ConsoleProgress {
    fn update(&self, completed: usize, total: usize, phase: &str) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };
        let same_phase = matches!(current.as_ref(), Some((p, _)) if p == phase);
        if !same_phase {
            if let Some((_, old)) = current.take() {
                old.finish();
            }
            *current = Some((phase.to_string(), Self::new_bar(total, phase)));
        }
        if let Some((_, bar)) = current.as_ref() {
            bar.set_length(total as u64);
            bar.set_position(completed as u64);
        }
    }

    fn finish(&self, phase: &str) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };
        if matches!(current.as_ref(), Some((p, _)) if p == phase) {
            if let Some((_, bar)) = current.take() {
                bar.finish_with_message(format!("{} done", phase));
            }
        }
    }
}

/// One progress update as sent over a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub completed: usize,
    pub total: usize,
    pub phase: String,
    pub finished: bool,
}

/// Forwards updates to an unbounded channel.
///
/// A closed receiver is ignored so the batch keeps running when the
/// front-end goes away.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn update(&self, completed: usize, total: usize, phase: &str) {
        let _ = self.tx.send(ProgressUpdate {
            completed,
            total,
            phase: phase.to_string(),
            finished: false,
        });
    }

    fn finish(&self, phase: &str) {
        let _ = self.tx.send(ProgressUpdate {
            completed: 0,
            total: 0,
            phase: phase.to_string(),
            finished: true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_label() {
        assert_eq!(rasterize_phase(Statistic::Mean), "Generating mean raster");
        assert_eq!(rasterize_phase(Statistic::Count), "Generating count raster");
    }

    #[test]
    fn test_channel_sink() {
        let (sink, mut rx) = ChannelProgress::new();
        sink.update(1, 2, "phase");
        sink.finish("phase");

        let first = rx.try_recv().unwrap();
        assert_eq!((first.completed, first.total), (1, 2));
        assert!(rx.try_recv().unwrap().finished);

        drop(rx);
        sink.update(2, 2, "phase");
    }

    #[test]
    fn test_console_sink_switches_phase() {
        let sink = ConsoleProgress::new();
        sink.update(0, 3, "a");
        sink.update(3, 3, "a");
        sink.update(1, 5, "b");
        sink.finish("a");
        {
            let current = sink.current.lock().unwrap();
            let (phase, bar) = current.as_ref().unwrap();
            assert_eq!(phase, "b");
            assert_eq!(bar.position(), 1);
            assert_eq!(bar.length(), Some(5));
        }
        sink.finish("b");
        assert!(sink.current.lock().unwrap().is_none());
    }
}
