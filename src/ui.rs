//! Console progress for the probe binaries.
//!
//! Long blocking steps (connecting to a camera, waiting for a still) are
//! wrapped in a `Stage`. On a terminal a stage shows a spinner on stderr;
//! otherwise it prints plain `==>` lines so logs stay readable.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ConsoleMode {
    /// Spinner on a terminal, plain lines otherwise.
    #[default]
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Console {
    mode: ConsoleMode,
    is_tty: bool,
}

impl Console {
    pub fn new(mode: ConsoleMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    /// Console for stderr, honouring `NO_COLOR` in auto mode.
    pub fn detect(mode: ConsoleMode) -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some();
        let is_tty = std::io::stderr().is_terminal() && !(no_color && mode == ConsoleMode::Auto);
        Self::new(mode, is_tty)
    }

    fn pretty(&self) -> bool {
        match self.mode {
            ConsoleMode::Plain => false,
            ConsoleMode::Pretty | ConsoleMode::Auto => self.is_tty,
        }
    }

    pub fn stage(&self, name: &str) -> Stage {
        let spinner = if self.pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            Some(spinner)
        } else {
            eprintln!("==> {}", name);
            None
        };
        Stage {
            name: name.to_string(),
            start: Instant::now(),
            spinner,
            finished: false,
        }
    }
}

/// A running console stage. Dropping it without `fail` reports success.
pub struct Stage {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    finished: bool,
}

impl Stage {
    /// Update the text next to the spinner.
    pub fn note(&self, detail: &str) {
        if let Some(spinner) = &self.spinner {
            spinner.set_message(format!("{}… {}", self.name, detail));
        }
    }

    pub fn fail(mut self, reason: &str) {
        let message = self.summary(Some(reason));
        self.finish(message);
    }

    /// Finish on the outcome of the stage's work: `fail` with `reason` on
    /// error, success otherwise. The outcome is passed through.
    pub fn conclude<T>(self, outcome: anyhow::Result<T>, reason: &str) -> anyhow::Result<T> {
        if outcome.is_err() {
            self.fail(reason);
        }
        outcome
    }

    fn summary(&self, failure: Option<&str>) -> String {
        match failure {
            Some(reason) => format!("✖ {} ({})", self.name, reason),
            None => format!("✔ {} ({})", self.name, format_duration(self.start.elapsed())),
        }
    }

    fn finish(&mut self, message: String) {
        self.finished = true;
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        if !self.finished {
            let message = self.summary(None);
            self.finish(message);
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
