//! Progress display for file allocation

use anyhow::Result;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Progress bar on stderr for `total` bytes of allocation
///
/// Hidden when `quiet` is set or there is nothing to allocate.
pub fn allocation_bar(total: u64, quiet: bool) -> Result<ProgressBar> {
    if quiet || total == 0 {
        return Ok(ProgressBar::hidden());
    }

    let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
    bar.set_style(
        ProgressStyle::default_bar()
            .template("  [{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} {msg}")?
            .progress_chars("█░"),
    );
    bar.set_message("allocating");
    Ok(bar)
}

/// Tracks overall allocation across files of equal size
pub struct AllocationProgress {
    bar: ProgressBar,
    file_size: u64,
}

impl AllocationProgress {
    /// Report into `bar` for files of `file_size` bytes each
    pub fn new(bar: ProgressBar, file_size: u64) -> Self {
        Self { bar, file_size }
    }

    /// Worker `id` has written `written` bytes of its file
    pub fn update(&self, id: usize, written: u64) {
        let position = self.file_size * id as u64 + written;
        self.bar.set_position(position);
        if self.bar.length().is_some_and(|len| position >= len) {
            self.bar.finish_and_clear();
        }
    }

    /// Overall bytes written so far
    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_bar_is_hidden() {
        assert!(allocation_bar(1024, true).unwrap().is_hidden());
        assert!(allocation_bar(0, false).unwrap().is_hidden());
    }

    #[test]
    fn test_allocation_progress_spans_files() {
        let bar = ProgressBar::hidden();
        bar.set_length(300);
        let progress = AllocationProgress::new(bar, 100);

        progress.update(0, 100);
        assert_eq!(progress.position(), 100);
        progress.update(1, 40);
        assert_eq!(progress.position(), 140);
        progress.update(2, 100);
        assert_eq!(progress.position(), 300);
    }
}
