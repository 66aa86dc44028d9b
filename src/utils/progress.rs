//! Progress indicators for long-running operations.
//!
//! Spinners and bars render on stderr and stay silent when
//! `KRATEOCTL_NO_PROGRESS` is set, so scripted runs get clean output.
//!
//! ```rust
//! use krateoctl::utils::progress::ProgressBar;
//!
//! let spinner = ProgressBar::new_spinner();
//! spinner.set_message("Installing krateo-core");
//! spinner.finish_with_message("krateo-core installed");
//! ```

use clap::builder::{FalseyValueParser, TypedValueParser};
use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::ffi::OsStr;
use std::time::Duration;

use crate::constants::NO_PROGRESS_ENV;

/// Whether `KRATEOCTL_NO_PROGRESS` holds a truthy value.
///
/// Follows the `--no-progress` flag: unset, empty, `0`, `false`, `no`, `off`,
/// `n` and `f` leave progress on; anything else turns it off.
#[must_use]
pub fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some_and(|value| is_truthy(&value))
}

fn is_truthy(value: &OsStr) -> bool {
    FalseyValueParser::new()
        .parse_ref(&clap::Command::new(NO_PROGRESS_ENV), None, value)
        .unwrap_or(true)
}

/// A progress bar or spinner with consistent styling.
///
/// When progress is disabled the wrapped bar is hidden and every call is a
/// no-op.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// A bar tracking `len` units of work.
    #[must_use]
    pub fn new(len: u64) -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new(len);
            bar.set_style(default_style());
            bar
        };
        Self { inner: bar }
    }

    /// A spinner for work of unknown length, ticking every 100ms.
    #[must_use]
    pub fn new_spinner() -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        Self { inner: bar }
    }

    /// A bar that never renders.
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.inner.set_prefix(prefix.into());
    }

    pub fn inc(&self, delta: u64) {
        self.inner.inc(delta);
    }

    /// Print a line above the bar without breaking its rendering.
    pub fn println(&self, line: impl AsRef<str>) {
        if self.inner.is_hidden() {
            return;
        }
        self.inner.println(line);
    }

    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

fn default_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("━╸━")
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{prefix:.bold} {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
}
