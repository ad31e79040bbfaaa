//! Control over how much the solver reports while running.

use indicatif::{ProgressBar, ProgressStyle};
use lazy_static::lazy_static;
use std::fmt;

lazy_static! {
    pub static ref DEFAULT_PROGRESS_STYLE: ProgressStyle =
        ProgressStyle::default_bar()
            .template("Cycles: {bar:40} {pos}/{len} | ETA: {eta}")
            .expect("Invalid progress bar template");
}

/// How much information to print during a solve.
#[derive(Clone)]
pub enum Verbosity {
    Quiet,
    Messages,
    /// Print messages and show a progress bar over the V-cycles.
    Progress(ProgressStyle),
}

impl Verbosity {
    /// Progress bar with the default style.
    pub fn progress() -> Self {
        Self::Progress(DEFAULT_PROGRESS_STYLE.clone())
    }

    pub fn print_messages(&self) -> bool {
        !matches!(self, Self::Quiet)
    }

    /// Creates a progress bar of the given length, hidden unless progress
    /// is requested.
    pub fn create_progress_bar(&self, len: usize) -> ProgressBar {
        match self {
            Self::Progress(style) => ProgressBar::new(len as u64).with_style(style.clone()),
            _ => ProgressBar::hidden(),
        }
    }
}

impl fmt::Debug for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Quiet => "Quiet",
            Self::Messages => "Messages",
            Self::Progress(_) => "Progress",
        })
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Self::Quiet
    }
}
