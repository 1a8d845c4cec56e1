//! Progress notifications emitted while modules are analyzed and uploaded.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// `index` is zero-based.
    ModuleStarted {
        index: usize,
        total: usize,
        name: String,
    },
    ModuleFinished {
        index: usize,
        total: usize,
        name: String,
    },
}

impl std::fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressEvent::ModuleStarted { index, total, name } => {
                write!(f, "Analyzing module ({}/{}): {}", index + 1, total, name)
            }
            ProgressEvent::ModuleFinished { index, total, name } => {
                write!(f, "Analyzed module ({}/{}): {}", index + 1, total, name)
            }
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);

    /// Remove any progress display.
    fn clear(&self);
}

/// Calls [`ProgressSink::clear`] when dropped, so the display is cleared on
/// every exit path of the scope holding it.
pub struct ProgressGuard<'a> {
    sink: &'a dyn ProgressSink,
}

impl<'a> ProgressGuard<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self { sink }
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.sink.clear();
    }
}

/// Sink used with `--quiet` and in tests.
#[derive(Debug, Default)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}

    fn clear(&self) {}
}

/// Progress bar on stderr.
#[derive(Default)]
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_bar(&self, total: u64, f: impl FnOnce(&ProgressBar)) {
        let mut slot = match self.bar.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        let pb = slot.get_or_insert_with(|| {
            let pb = ProgressBar::new(total);
            let style = ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .map(|s| s.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            pb
        });
        if pb.length() != Some(total) {
            pb.set_length(total);
        }
        f(pb);
    }
}

impl ProgressSink for TerminalProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::ModuleStarted { total, .. } => {
                self.with_bar(*total as u64, |pb| pb.set_message(event.to_string()));
            }
            ProgressEvent::ModuleFinished { total, .. } => {
                self.with_bar(*total as u64, |pb| pb.inc(1));
            }
        }
    }

    fn clear(&self) {
        let mut slot = match self.bar.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(pb) = slot.take() {
            pb.finish_and_clear();
        }
    }
}
