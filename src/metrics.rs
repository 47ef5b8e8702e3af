/// Metrics and telemetry for the Crewgate service
///
/// Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Registration scan outcomes
/// - Logins by method, logouts
/// - Verification emails sent
/// - Background job executions

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // ========== Registration Metrics ==========

    /// QR scan outcomes: started, resumed, rejected, invalid
    pub static ref REGISTRATION_SCANS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "registration_scans_total",
        "Total number of QR registration scans",
        &["outcome"]
    )
    .unwrap();

    /// Verification emails handed to the mailer
    pub static ref VERIFICATION_EMAILS_TOTAL: IntCounter = register_int_counter!(
        "verification_emails_total",
        "Total number of verification code emails sent"
    )
    .unwrap();

    // ========== Session Metrics ==========

    /// Logins by method: password, quick
    pub static ref LOGINS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "logins_total",
        "Total number of successful logins",
        &["method"]
    )
    .unwrap();

    /// Explicit logouts
    pub static ref LOGOUTS_TOTAL: IntCounter = register_int_counter!(
        "logouts_total",
        "Total number of logouts"
    )
    .unwrap();

    /// Active sessions gauge, refreshed by the housekeeping job
    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "sessions_active",
        "Number of active sessions"
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();
}

/// Render all metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

pub fn record_scan(outcome: &str) {
    REGISTRATION_SCANS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_verification_email() {
    VERIFICATION_EMAILS_TOTAL.inc();
}

pub fn record_login(method: &str) {
    LOGINS_TOTAL.with_label_values(&[method]).inc();
}

pub fn record_logout() {
    LOGOUTS_TOTAL.inc();
}

pub fn record_background_job(job_type: &str, status: &str) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
}
