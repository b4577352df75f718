//! Progress indicators for the homestead CLI.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A counted bar for multi-stack operations.
pub fn bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("static template")
            .progress_chars("=>-"),
    );
    pb.set_message(msg.to_string());
    pb
}

/// A spinner for a single long-running external command.
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("static template"),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
