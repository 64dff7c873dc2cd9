//! Terminal output of `camctl`: spinners and colored results.
//!
//! Uses `indicatif` for progress spinners and `console` for colors.
//! [`StepProgress`] follows one engine operation in the terminal.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use camctl::JobError;
use camctl::state_machine::{TransitionOutcome, TransitionRecord};

/// Spinner shown while an engine operation is in flight.
pub struct StepProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl StepProgress {
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(description.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Stops the spinner and prints how the operation ended.
    pub fn complete(&self, description: &str, result: &Result<(), JobError>) {
        self.pb.finish_and_clear();
        match result {
            Ok(()) => println!("  {} {description}", self.green.apply_to("✓")),
            Err(JobError::Cancelled) => {
                println!("  {} {description}: cancelled", self.yellow.apply_to("↷"))
            }
            Err(err) => println!("  {} {description}: {err}", self.red.apply_to("✗")),
        }
    }
}

/// Prints the state transition history, one line per state-change job.
pub fn print_transitions(records: &[TransitionRecord]) {
    let green = Style::new().green();
    let red = Style::new().red();
    let yellow = Style::new().yellow();

    println!();
    println!("{}", Style::new().bold().apply_to("─── Transitions ───"));
    for record in records {
        let outcome = match &record.outcome {
            TransitionOutcome::Applied => green.apply_to("applied".to_string()),
            TransitionOutcome::Stale => yellow.apply_to("stale".to_string()),
            TransitionOutcome::Failed(reason) => red.apply_to(format!("failed: {reason}")),
        };
        println!(
            "  {:>7} → {:<7} {:>5}ms  {outcome}",
            record.from.to_string(),
            record.to.to_string(),
            record.duration_ms
        );
    }
}

/// Pretty-prints `value` as JSON under a bold title.
pub fn print_json<T: Serialize>(title: &str, value: &T) {
    println!();
    println!("{}", Style::new().bold().apply_to(format!("─── {title} ───")));
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}
