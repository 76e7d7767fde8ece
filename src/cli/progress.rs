//! Console rendering of transfer events
//!
//! Shows a progress bar while a job runs. With a known total the bar fills
//! up; with an unknown total (`-1`) a spinner counts records instead.

use std::sync::Mutex;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::Color;

use crate::transfer::{ProgressEmitter, ProgressEvent, TransferEvent};

/// How events reach the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMode {
    /// Progress bar on stderr
    Bar,
    /// One JSON object per event on stdout
    Json,
    /// Nothing but warnings
    Silent,
}

/// [`ProgressEmitter`] for interactive use
pub struct ConsoleEmitter {
    mode: ConsoleMode,
    colors: bool,
    state: Mutex<BarState>,
}

#[derive(Default)]
struct BarState {
    bar: Option<ProgressBar>,
    bounded: bool,
    started: Option<Instant>,
}

impl ConsoleEmitter {
    /// Create a console emitter
    ///
    /// # Arguments
    /// * `mode` - Bar, JSON lines or silent
    /// * `colors` - Color warnings
    pub fn new(mode: ConsoleMode, colors: bool) -> Self {
        Self {
            mode,
            colors,
            state: Mutex::new(BarState::default()),
        }
    }

    fn bar_style(bounded: bool) -> ProgressStyle {
        let template = if bounded {
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}"
        } else {
            "{spinner:.green} {pos} records {msg}"
        };
        let style = if bounded {
            ProgressStyle::default_bar()
        } else {
            ProgressStyle::default_spinner()
        };
        style
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
    }

    fn new_bar(&self) -> ProgressBar {
        if self.mode == ConsoleMode::Bar {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        }
    }

    fn update(&self, progress: &ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let bar = match state.bar.take() {
            Some(bar) => bar,
            None => {
                state.started = Some(Instant::now());
                state.bounded = false;
                let bar = self.new_bar();
                bar.set_style(Self::bar_style(false));
                bar
            }
        };

        let bounded = progress.total >= 0;
        if bounded != state.bounded {
            bar.set_style(Self::bar_style(bounded));
            state.bounded = bounded;
        }
        if bounded {
            bar.set_length(progress.total as u64);
        }
        bar.set_position(progress.current);
        bar.set_message(Self::describe(progress, state.started));
        state.bar = Some(bar);
    }

    /// Namespace, batch position and throughput
    fn describe(progress: &ProgressEvent, started: Option<Instant>) -> String {
        let mut parts = Vec::new();
        match (&progress.database, &progress.collection) {
            (Some(db), Some(coll)) => parts.push(format!("{db}.{coll}")),
            (Some(db), None) => parts.push(db.clone()),
            _ => {}
        }
        if progress.batch_total > 1 {
            parts.push(format!(
                "[{}/{}]",
                progress.batch_index + 1,
                progress.batch_total
            ));
        }
        if let Some(started) = started {
            let elapsed = started.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                parts.push(format!(
                    "({:.0} docs/sec)",
                    progress.current as f64 / elapsed
                ));
            }
        }
        parts.join(" ")
    }

    fn finish(&self) {
        if let Ok(mut state) = self.state.lock()
            && let Some(bar) = state.bar.take()
        {
            bar.finish_and_clear();
            state.started = None;
        }
    }

    fn set_message(&self, message: &str) {
        if let Ok(state) = self.state.lock()
            && let Some(bar) = &state.bar
        {
            bar.set_message(message.to_string());
        }
    }

    /// Warning line, colored when enabled
    pub fn format_warning(&self, message: &str) -> String {
        if self.colors {
            format!("{} {}", Color::Yellow.bold().paint("warning:"), message)
        } else {
            format!("warning: {}", message)
        }
    }

    fn print_warning(&self, message: &str) {
        let line = self.format_warning(message);
        match self.state.lock() {
            Ok(state) if state.bar.is_some() => {
                if let Some(bar) = &state.bar {
                    bar.println(line);
                }
            }
            _ => eprintln!("{}", line),
        }
    }
}

impl ProgressEmitter for ConsoleEmitter {
    fn emit(&self, event: TransferEvent) {
        if self.mode == ConsoleMode::Json {
            println!("{}", event.to_json());
            return;
        }

        match &event {
            TransferEvent::Progress { progress, .. } => self.update(progress),
            TransferEvent::Warning { message, .. } => self.print_warning(message),
            TransferEvent::Complete { .. } | TransferEvent::Cancelled { .. } => self.finish(),
            TransferEvent::Paused { .. } => self.set_message("paused"),
            TransferEvent::Resumed { .. } => self.set_message("resumed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{TransferKind, TransferPhase};

    fn progress(current: u64, total: i64) -> TransferEvent {
        TransferEvent::Progress {
            kind: TransferKind::Export,
            progress: ProgressEvent {
                job_id: "job".into(),
                phase: TransferPhase::Exporting,
                database: Some("shop".into()),
                collection: Some("orders".into()),
                current,
                total,
                batch_index: 1,
                batch_total: 3,
                processed_records: current,
                total_records: total,
            },
        }
    }

    #[test]
    fn test_bar_switches_to_bounded() {
        let emitter = ConsoleEmitter::new(ConsoleMode::Silent, false);
        emitter.emit(progress(5, -1));
        assert!(!emitter.state.lock().unwrap().bounded);

        emitter.emit(progress(10, 40));
        let state = emitter.state.lock().unwrap();
        assert!(state.bounded);
        let bar = state.bar.as_ref().unwrap();
        assert_eq!(bar.position(), 10);
        assert_eq!(bar.length(), Some(40));
    }

    #[test]
    fn test_complete_clears_bar() {
        let emitter = ConsoleEmitter::new(ConsoleMode::Silent, false);
        emitter.emit(progress(1, 2));
        emitter.emit(TransferEvent::Complete {
            kind: TransferKind::Export,
            job_id: "job".into(),
            output_path: "out.zip".into(),
            records: 2,
            failed: 0,
        });
        assert!(emitter.state.lock().unwrap().bar.is_none());
    }

    #[test]
    fn test_describe_includes_namespace_and_batch() {
        let TransferEvent::Progress { progress, .. } = progress(0, 10) else {
            unreachable!()
        };
        let text = ConsoleEmitter::describe(&progress, None);
        assert_eq!(text, "shop.orders [2/3]");
    }

    #[test]
    fn test_plain_warning() {
        let emitter = ConsoleEmitter::new(ConsoleMode::Silent, false);
        assert_eq!(emitter.format_warning("3 skipped"), "warning: 3 skipped");
        let colored = ConsoleEmitter::new(ConsoleMode::Silent, true).format_warning("x");
        assert!(colored.contains("\u{1b}["));
    }
}
