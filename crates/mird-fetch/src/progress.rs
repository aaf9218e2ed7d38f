//! Progress reporting for downloads.
//!
//! The fetcher reports through a [`ProgressSink`] handed in by the caller, so
//! library code never writes to the terminal on its own. [`NoProgress`] is the
//! silent sink; [`ConsoleProgress`] drives `indicatif` bars.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Receiver of byte-level download progress.
pub trait ProgressSink: Send + Sync {
    /// A transfer for `name` is starting; `total` is the declared size if known.
    fn start(&self, name: &str, total: Option<u64>);

    /// `downloaded` bytes of `name` have been written so far.
    fn advance(&self, name: &str, downloaded: u64, total: Option<u64>);

    /// The transfer for `name` ended (successfully or not).
    fn finish(&self, name: &str);
}

/// Sink that discards all progress events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&self, _name: &str, _total: Option<u64>) {}
    fn advance(&self, _name: &str, _downloaded: u64, _total: Option<u64>) {}
    fn finish(&self, _name: &str) {}
}

/// Console progress bars, one per in-flight transfer.
pub struct ConsoleProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    enabled: bool,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            enabled,
        }
    }

    /// Check if progress is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn create_download_bar(&self, name: &str, total: Option<u64>) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = match total {
            Some(total) => {
                let pb = self.multi.add(ProgressBar::new(total));
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                {
                    pb.set_style(style.progress_chars("#>-"));
                }
                pb
            }
            None => {
                let pb = self.multi.add(ProgressBar::new_spinner());
                if let Ok(style) =
                    ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {bytes} {msg}")
                {
                    pb.set_style(style);
                }
                pb
            }
        };
        pb.set_message(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ProgressSink for ConsoleProgress {
    fn start(&self, name: &str, total: Option<u64>) {
        let pb = self.create_download_bar(name, total);
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(name.to_string(), pb);
        }
    }

    fn advance(&self, name: &str, downloaded: u64, total: Option<u64>) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(pb) = bars.get(name) {
                if let Some(total) = total {
                    pb.set_length(total);
                }
                pb.set_position(downloaded);
            }
        }
    }

    fn finish(&self, name: &str) {
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(pb) = bars.remove(name) {
                pb.finish_and_clear();
            }
        }
    }
}

/// Helper to format bytes for display
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_disabled_console_tracks_bars() {
        let progress = ConsoleProgress::new(false);
        assert!(!progress.is_enabled());

        progress.start("audio", Some(10));
        progress.advance("audio", 5, Some(10));
        assert_eq!(progress.bars.lock().unwrap().len(), 1);

        progress.finish("audio");
        assert!(progress.bars.lock().unwrap().is_empty());
    }

    #[test]
    fn test_advance_unknown_name_is_ignored() {
        let progress = ConsoleProgress::new(false);
        progress.advance("missing", 1, None);
        progress.finish("missing");
    }
}
