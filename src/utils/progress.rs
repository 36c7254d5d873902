//! Download progress indicators.
//!
//! A byte-count bar is shown while a transfer with a known length is in flight.
//! Bars are hidden when stderr is not a terminal (indicatif's default) or when
//! `TOOLUP_NO_PROGRESS` is set, so scripted runs and tests stay quiet.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};

fn is_progress_disabled() -> bool {
    std::env::var("TOOLUP_NO_PROGRESS").is_ok()
}

#[derive(Clone)]
pub struct DownloadProgress {
    inner: IndicatifBar,
}

impl DownloadProgress {
    /// A bar for a transfer of `len` bytes, or a hidden bar when `len` is unknown.
    pub fn new(len: Option<u64>) -> Self {
        let bar = match len {
            Some(len) if !is_progress_disabled() => {
                let bar = IndicatifBar::new(len);
                bar.set_style(bytes_style());
                bar
            }
            _ => IndicatifBar::hidden(),
        };
        Self {
            inner: bar,
        }
    }

    pub fn inc(&self, delta: u64) {
        self.inner.inc(delta);
    }

    pub fn finish(&self) {
        self.inner.finish_and_clear();
    }
}

fn bytes_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("=> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_length_is_hidden() {
        let progress = DownloadProgress::new(None);
        assert!(progress.inner.is_hidden());
        progress.inc(10);
        progress.finish();
    }
}
