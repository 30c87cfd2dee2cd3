//! Progress reporting shared by the engines and the terminal front end.
//!
//! Engines report a fraction in `[0, 1]` through a [`Progress`] callback and
//! know nothing about terminals; the command runners turn those fractions
//! into an `indicatif` bar.

use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressStyle};

/// Callback receiving a non-decreasing completion fraction.
pub type Progress<'a> = dyn Fn(f64) + Send + Sync + 'a;

/// Resolution of fraction-driven bars.
const FRACTION_STEPS: u64 = 1000;

/// Progress sink that discards every update.
#[cfg(test)]
pub fn ignore(_fraction: f64) {}

/// Map a child task's `[0, 1]` progress onto `[start, start + span]` of its
/// parent.
pub fn scaled<'a>(
    parent: &'a Progress<'a>,
    start: f64,
    span: f64,
) -> impl Fn(f64) + Send + Sync + 'a {
    move |fraction: f64| parent(start + span * fraction.clamp(0.0, 1.0))
}

/// Create a progress bar with a consistent template.
///
/// Returns `ProgressBar::hidden()` when the user passed `--no-progress-bar` or
/// stdout is not a TTY.
pub fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

/// A bar driven by fractions rather than item counts.
pub fn create_fraction_bar(no_progress_bar: bool) -> ProgressBar {
    create_progress_bar(no_progress_bar, FRACTION_STEPS)
}

/// Adapt a fraction-driven bar into a [`Progress`] callback.
pub fn bar_reporter(pb: &ProgressBar) -> impl Fn(f64) + Send + Sync {
    let pb = pb.clone();
    move |fraction: f64| {
        let position = (fraction.clamp(0.0, 1.0) * FRACTION_STEPS as f64).round() as u64;
        if position > pb.position() {
            pb.set_position(position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_create_progress_bar_hidden_when_disabled() {
        let pb = create_progress_bar(true, 100);
        assert!(pb.is_hidden());
    }

    #[test]
    fn test_create_progress_bar_with_total() {
        let pb = create_progress_bar(false, 42);
        if std::io::stdout().is_terminal() {
            assert!(!pb.is_hidden());
            assert_eq!(pb.length(), Some(42));
        } else {
            assert!(pb.is_hidden());
        }
    }

    #[test]
    fn test_scaled_maps_into_parent_window() {
        let seen = Mutex::new(Vec::new());
        let parent = |f: f64| seen.lock().unwrap().push(f);
        {
            let child = scaled(&parent, 0.1, 0.8);
            child(0.0);
            child(0.5);
            child(1.0);
            child(3.0);
        }
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 4);
        assert!((seen[0] - 0.1).abs() < 1e-9);
        assert!((seen[1] - 0.5).abs() < 1e-9);
        assert!((seen[2] - 0.9).abs() < 1e-9);
        assert!((seen[3] - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_bar_reporter_never_moves_backwards() {
        let pb = ProgressBar::hidden();
        pb.set_length(FRACTION_STEPS);
        let report = bar_reporter(&pb);
        report(0.5);
        report(0.25);
        assert_eq!(pb.position(), 500);
        report(1.0);
        assert_eq!(pb.position(), FRACTION_STEPS);
    }
}
