use crate::types::{Metric, Verdict};

/// Fraction of the good/bad gap that still counts as good.
pub const DEFAULT_FACTOR: f64 = 0.5;

/// Exit code telling `git bisect run` to skip the commit.
pub const SKIP_EXIT_CODE: u8 = 125;

/// Exit code that makes `git bisect run` abort the whole bisection.
pub const ABORT_EXIT_CODE: u8 = 255;

/// Return true if `metric` is closer to `good` than `bad` and its noise is
/// small enough to trust.
///
/// `good` must be less than `bad`; this is not checked. With a `factor` of
/// 0.5 anything below the midpoint of `good` and `bad` is good, as long as
/// `metric_std` is below half the gap.
pub fn classify(good: f64, bad: f64, metric: f64, metric_std: f64, factor: f64) -> bool {
    let window = factor * (bad - good);
    let threshold = good + window;

    tracing::info!(metric, threshold, metric_std, window, "classifying metric");
    metric < threshold && metric_std < window
}

pub fn verdict_for(good: f64, bad: f64, metric: &Metric, factor: f64) -> Verdict {
    if classify(good, bad, metric.value, metric.std, factor) {
        Verdict::Good
    } else {
        Verdict::Bad
    }
}

impl Verdict {
    /// Exit code understood by `git bisect run`.
    pub fn exit_code(self) -> u8 {
        match self {
            Verdict::Good => 0,
            Verdict::Bad => 1,
            Verdict::Skip => SKIP_EXIT_CODE,
        }
    }
}
