//! Throttled progress reporting.

/// True if a status line is due for `complete` finished jobs.
///
/// Steps are 25 jobs below 100, 100 below 1000, and 1000 after that.
pub fn should_report(complete: u64) -> bool {
    let step = if complete < 100 {
        25
    } else if complete < 1000 {
        100
    } else {
        1000
    };
    complete % step == 0
}

/// Emits `complete/total` status lines for the level being rendered.
#[derive(Debug)]
pub struct ProgressReporter {
    max_level: u32,
    lines_emitted: u64,
}

impl ProgressReporter {
    pub fn new(max_level: u32) -> Self {
        Self { max_level, lines_emitted: 0 }
    }

    /// Log a status line if due, or unconditionally when `force` is set.
    ///
    /// Returns whether a line was emitted.
    pub fn report(&mut self, complete: u64, total: u64, level: u32, force: bool) -> bool {
        if !force && !should_report(complete) {
            return false;
        }
        self.lines_emitted += 1;
        tracing::info!(
            complete,
            total,
            level,
            max_level = self.max_level,
            "{}/{} tiles complete on level {}/{}",
            complete,
            total,
            level,
            self.max_level
        );
        true
    }

    pub fn lines_emitted(&self) -> u64 {
        self.lines_emitted
    }
}
