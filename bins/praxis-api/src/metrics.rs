// Prometheus metrics for the Praxis API

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    // Global registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Submissions received (counter with exercise label)
    pub static ref SUBMISSIONS: CounterVec = CounterVec::new(
        Opts::new("praxis_submissions_total", "Total number of submissions received"),
        &["exercise"]
    )
    .expect("metric can be created");

    // Verdicts delivered (counter with exercise and outcome labels)
    pub static ref VERDICTS: CounterVec = CounterVec::new(
        Opts::new("praxis_verdicts_total", "Total number of verdicts delivered"),
        &["exercise", "outcome"]
    )
    .expect("metric can be created");

    // Grading wall-clock time histogram (in milliseconds)
    pub static ref GRADING_TIME: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "praxis_grading_time_ms",
            "Grading wall-clock time in milliseconds"
        )
        .buckets(vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 6000.0]),
        &["exercise"]
    )
    .expect("metric can be created");

    // Grader-internal failures (retry prompts, never verdicts)
    pub static ref GRADER_ERRORS: CounterVec = CounterVec::new(
        Opts::new("praxis_grader_errors_total", "Total internal grader errors"),
        &["exercise"]
    )
    .expect("metric can be created");
}

/// Initialize metrics registry
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(SUBMISSIONS.clone()))
        .expect("collector can be registered");

    REGISTRY
        .register(Box::new(VERDICTS.clone()))
        .expect("collector can be registered");

    REGISTRY
        .register(Box::new(GRADING_TIME.clone()))
        .expect("collector can be registered");

    REGISTRY
        .register(Box::new(GRADER_ERRORS.clone()))
        .expect("collector can be registered");
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record a submission arriving for an exercise
pub fn record_submission(exercise: &str) {
    SUBMISSIONS.with_label_values(&[exercise]).inc();
}

/// Record a delivered verdict and its grading time
pub fn record_verdict(exercise: &str, outcome: &str, elapsed_ms: f64) {
    VERDICTS.with_label_values(&[exercise, outcome]).inc();
    GRADING_TIME.with_label_values(&[exercise]).observe(elapsed_ms);
}

/// Record an internal grader error
pub fn record_grader_error(exercise: &str) {
    GRADER_ERRORS.with_label_values(&[exercise]).inc();
}
