//! Prometheus metrics exposition
//!
//! Gateway metrics:
//!
//! - `sso_login_requests_total` (counter): label `result`
//! - `sso_login_duration_seconds` (histogram)
//!
//! The `sso` crate adds `sso_remote_exchanges_total`, `sso_token_cache_hits_total`
//! and `sso_users_provisioned_total` through the same recorder.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const LOGIN_DURATION: &str = "sso_login_duration_seconds";

/// Login latency includes the remote exchange, so buckets reach the client timeout range.
const LOGIN_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(LOGIN_DURATION.to_string()), LOGIN_BUCKETS)
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// The handle's `render()` method produces the Prometheus text exposition format
/// suitable for serving on a `/metrics` endpoint.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a finished login attempt. `result` is `success` or `failure`.
pub fn record_login(result: &'static str, duration_secs: f64) {
    metrics::counter!("sso_login_requests_total", "result" => result).increment(1);
    metrics::histogram!(LOGIN_DURATION).record(duration_secs);
}

#[cfg(test)]
pub(crate) fn isolated_recorder() -> (
    metrics_exporter_prometheus::PrometheusRecorder,
    PrometheusHandle,
) {
    let recorder = builder().unwrap().build_recorder();
    let handle = recorder.handle();
    (recorder, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_login_does_not_panic_without_recorder() {
        record_login("success", 0.01);
    }

    #[test]
    fn record_login_increments_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_login("success", 0.042);
        record_login("failure", 1.5);

        let output = handle.render();
        assert!(output.contains("sso_login_requests_total"));
        assert!(output.contains("result=\"success\""));
        assert!(output.contains("result=\"failure\""));
        assert!(
            output.contains("sso_login_duration_seconds_bucket"),
            "histogram must render _bucket lines"
        );
        assert!(output.contains("le=\"30\""));
    }
}
