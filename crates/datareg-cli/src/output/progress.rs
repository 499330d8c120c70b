use std::io::IsTerminal;

use datareg_fetch::TransferProgress;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::OutputFormat;

/// Byte progress for one download, drawn on stderr.
pub struct DownloadBar {
    bar: ProgressBar,
}

impl DownloadBar {
    /// Drawn only for text output on an interactive stderr.
    pub fn new(label: &str, format: OutputFormat) -> Self {
        let visible = matches!(format, OutputFormat::Text) && std::io::stderr().is_terminal();
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        Self::with_target(label, target)
    }

    fn with_target(label: &str, target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(None, target);
        bar.set_style(spinner_style());
        bar.set_message(format!("Downloading {label}"));
        Self { bar }
    }

    pub fn is_hidden(&self) -> bool {
        self.bar.is_hidden()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl TransferProgress for DownloadBar {
    fn start(&self, total: Option<u64>) {
        self.bar.reset();
        match total {
            Some(len) => {
                self.bar.set_length(len);
                self.bar.set_style(bar_style());
            }
            None => {
                self.bar.unset_length();
                self.bar.set_style(spinner_style());
            }
        }
    }

    fn advance(&self, bytes: u64) {
        self.bar.inc(bytes);
    }
}

impl Drop for DownloadBar {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{msg} [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    )
    .map(|s| s.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg} {bytes} ({bytes_per_sec})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
