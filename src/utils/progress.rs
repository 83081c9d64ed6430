use indicatif::{ProgressBar, ProgressStyle};

/// Batches smaller than this are written without a visible bar
const VISIBLE_FROM: u64 = 10_000;

pub struct ProgressTracker {
    bar: ProgressBar,
}

impl ProgressTracker {
    pub fn new(total: u64, description: &str) -> Self {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(description.to_string());

        ProgressTracker {
            bar,
        }
    }

    /// A tracker for writing `total` records, drawn only for large batches
    pub fn for_records(total: usize, description: &str) -> Self {
        if (total as u64) < VISIBLE_FROM {
            return Self::hidden();
        }
        Self::new(total as u64, description)
    }

    /// A tracker that counts without drawing
    pub fn hidden() -> Self {
        ProgressTracker {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn increment(&self, amount: u64) {
        self.bar.inc(amount);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("Completed");
    }
}
