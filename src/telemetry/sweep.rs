//! Sweep span helpers.

use tracing::Span;

use crate::scheduler::SweepReport;

/// Start a span covering one scheduler sweep. The count fields are filled in
/// by [`record_sweep_outcome`].
pub fn start_sweep_span(threshold_hours: f64) -> Span {
    tracing::info_span!(
        "scheduler.sweep",
        "sweep.threshold_hours" = threshold_hours,
        "sweep.examined" = tracing::field::Empty,
        "sweep.submitted" = tracing::field::Empty,
        "sweep.failed" = tracing::field::Empty,
    )
}

/// Record the outcome of a sweep on its span and emit a summary event.
pub fn record_sweep_outcome(span: &Span, report: &SweepReport) {
    span.record("sweep.examined", report.examined);
    span.record("sweep.submitted", report.submitted);
    span.record("sweep.failed", report.failed);
    span.in_scope(|| {
        tracing::info!(
            examined = report.examined,
            submitted = report.submitted,
            fresh = report.fresh,
            in_flight = report.in_flight,
            failed = report.failed,
            "sweep finished"
        );
    });
}
