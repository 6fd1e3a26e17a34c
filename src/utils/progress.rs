//! Line-oriented progress output with a file progress bar underneath.

use indicatif::{ProgressBar, ProgressStyle};

#[cfg(test)]
use std::sync::{Arc, Mutex};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({eta})";

/// Shared handle for progress lines. Cloned into the reader and every worker.
///
/// Lines go to stdout with the bar suspended, so they never interleave with the
/// bar drawn on stderr. The bar hides itself when stderr is not a terminal.
#[derive(Clone)]
pub struct Progress {
    bar: ProgressBar,
    #[cfg(test)]
    captured: Option<Arc<Mutex<Vec<String>>>>,
}

impl Progress {
    /// Progress for a run over `files` shards.
    pub fn new(files: u64) -> Self {
        let bar = ProgressBar::new(files);
        if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self::from_bar(bar)
    }

    /// Prints lines but never draws a bar.
    pub fn hidden() -> Self {
        Self::from_bar(ProgressBar::hidden())
    }

    fn from_bar(bar: ProgressBar) -> Self {
        Self {
            bar,
            #[cfg(test)]
            captured: None,
        }
    }

    /// A hidden progress that also records every line.
    #[cfg(test)]
    pub fn capturing() -> (Self, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let progress = Self {
            bar: ProgressBar::hidden(),
            captured: Some(Arc::clone(&lines)),
        };
        (progress, lines)
    }

    pub fn println(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        self.capture(line);
        self.bar.suspend(|| println!("{line}"));
    }

    #[cfg(test)]
    fn capture(&self, line: &str) {
        if let Some(captured) = &self.captured {
            captured.lock().unwrap().push(line.to_string());
        }
    }

    #[cfg(not(test))]
    fn capture(&self, _line: &str) {}

    /// Mark one shard as handled (loaded or skipped).
    pub fn file_done(&self) {
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
