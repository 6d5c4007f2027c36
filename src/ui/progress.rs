//! Progress reporting

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Instant;

/// Terminal view of one backup run: a percentage bar plus CONSOLE lines.
pub struct BackupProgress {
    bar: ProgressBar,
    started_at: Instant,
    lines: u64,
}

impl BackupProgress {
    /// Progress bar drawn on stderr
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(100))
    }

    /// Progress bar that draws nothing (JSON output, tests)
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::hidden()))
    }

    fn with_bar(bar: ProgressBar) -> Self {
        if let Ok(style) =
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% | {elapsed_precise} | {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_message("Sizing...".to_string());

        Self {
            bar,
            started_at: Instant::now(),
            lines: 0,
        }
    }

    /// Print one CONSOLE line above the bar
    pub fn console_line(&mut self, line: &str) {
        self.lines += 1;
        if line.starts_with("Cannot") || line.starts_with("Skipping") {
            self.bar.println(format!("{}", style(line).yellow()));
        } else {
            self.bar.println(line);
        }
    }

    /// Move the bar to `percent`
    pub fn set_percent(&self, percent: u8) {
        self.bar.set_position(u64::from(percent.min(100)));
        if percent > 0 {
            self.bar.set_message("Mirroring...".to_string());
        }
    }

    pub fn percent(&self) -> u64 {
        self.bar.position()
    }

    pub fn lines_printed(&self) -> u64 {
        self.lines
    }

    /// Freeze the bar with a coloured verdict
    pub fn finish(&self, success: bool) {
        let elapsed = self.started_at.elapsed();
        let verdict = if success {
            style("Backup finished").green().bold()
        } else {
            style("Backup finished with errors").red().bold()
        };
        self.bar.finish_with_message(format!(
            "{} in {:.1}s",
            verdict,
            elapsed.as_secs_f64()
        ));
    }
}

impl Default for BackupProgress {
    fn default() -> Self {
        Self::new()
    }
}
