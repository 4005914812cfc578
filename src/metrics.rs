//! Metrics collected while virtual users run.
//!
//! Each request made by a [`VirtualUser`](../user/struct.VirtualUser.html) produces a
//! [`RequestMetric`], which is sent to the parent task and folded into a
//! [`RequestMetricAggregate`] keyed by the task's display name (for example
//! `GET /health`). Every HTTP response counts as a success, whatever its status code:
//! a `404` from `/health` or an unfollowed `302` are valid outcomes. Only requests
//! that got no response at all are counted as failures.

use chrono::prelude::*;
use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// All aggregated request metrics, keyed by display name.
pub type RequestMetrics = BTreeMap<String, RequestMetricAggregate>;

/// The outcome of a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetric {
    /// How many milliseconds the load test had been running when the request was made.
    pub elapsed: u64,
    /// The display name of the task that made the request.
    pub name: String,
    /// The full URL that was requested.
    pub url: String,
    /// How many milliseconds the request took.
    pub response_time: u64,
    /// The HTTP status code, or 0 if no response was received.
    pub status_code: u16,
    /// Whether a response was received.
    pub success: bool,
    /// Which user made the request.
    pub user: usize,
    /// The transport error, if any.
    pub error: String,
}
impl RequestMetric {
    pub(crate) fn new(name: &str, url: &str, elapsed: u128, user: usize) -> Self {
        RequestMetric {
            elapsed: elapsed as u64,
            name: name.to_string(),
            url: url.to_string(),
            response_time: 0,
            status_code: 0,
            success: true,
            user,
            error: "".to_string(),
        }
    }

    pub(crate) fn set_response_time(&mut self, response_time: u128) {
        self.response_time = response_time as u64;
    }

    pub(crate) fn set_status_code(&mut self, status_code: Option<http::StatusCode>) {
        self.status_code = match status_code {
            Some(status_code) => status_code.as_u16(),
            None => 0,
        };
    }

    pub(crate) fn set_error(&mut self, error: &str) {
        self.success = false;
        self.error = error.to_string();
    }
}

/// Metrics aggregated for all requests sharing a display name.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RequestMetricAggregate {
    /// The display name, for example `GET /`.
    pub name: String,
    /// How often each status code was returned.
    pub status_code_counts: BTreeMap<u16, usize>,
    /// The quickest response, in milliseconds.
    pub min_response_time: u64,
    /// The slowest response, in milliseconds.
    pub max_response_time: u64,
    /// All response times added together, in milliseconds.
    pub total_response_time: u64,
    /// Requests that got a response.
    pub success_count: usize,
    /// Requests that got no response.
    pub fail_count: usize,
    /// How often each transport error happened.
    pub errors: BTreeMap<String, usize>,
}
impl RequestMetricAggregate {
    pub(crate) fn new(name: &str) -> Self {
        trace!("new request aggregate: {}", name);
        RequestMetricAggregate {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Fold a single request into the aggregate.
    pub(crate) fn record(&mut self, request: &RequestMetric) {
        if self.request_count() == 0 || request.response_time < self.min_response_time {
            self.min_response_time = request.response_time;
        }
        if request.response_time > self.max_response_time {
            self.max_response_time = request.response_time;
        }
        self.total_response_time += request.response_time;

        if request.success {
            self.success_count += 1;
            *self
                .status_code_counts
                .entry(request.status_code)
                .or_insert(0) += 1;
        } else {
            self.fail_count += 1;
            *self.errors.entry(request.error.clone()).or_insert(0) += 1;
        }
    }

    /// Total number of requests recorded.
    pub fn request_count(&self) -> usize {
        self.success_count + self.fail_count
    }

    /// Average response time in milliseconds.
    pub fn average_response_time(&self) -> f32 {
        match self.request_count() {
            0 => 0.0,
            count => self.total_response_time as f32 / count as f32,
        }
    }
}

/// Everything measured during a load test, returned by
/// [`LoadTest::execute`](../struct.LoadTest.html#method.execute).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LoadTestMetrics {
    /// When the load test started.
    pub started: Option<DateTime<Local>>,
    /// How many seconds the load test ran.
    pub duration: usize,
    /// How many users were launched.
    pub users: usize,
    /// How many cycles all users completed together.
    pub cycles: usize,
    /// Per display name request metrics.
    pub requests: RequestMetrics,
}
impl LoadTestMetrics {
    /// Fold a single request into the per display name aggregates.
    pub(crate) fn record_request(&mut self, request: &RequestMetric) {
        self.requests
            .entry(request.name.clone())
            .or_insert_with(|| RequestMetricAggregate::new(&request.name))
            .record(request);
    }

    /// Total number of requests across all display names.
    pub fn request_count(&self) -> usize {
        self.requests
            .values()
            .map(RequestMetricAggregate::request_count)
            .sum()
    }

    fn fmt_requests(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            fmt,
            "\n === PER REQUEST METRICS ===\n ------------------------------------------------------------------------------"
        )?;
        writeln!(
            fmt,
            " {:<24} | {:>13} | {:>14} | {:>8} | {:>7}",
            "Name", "# reqs", "# fails", "req/s", "avg ms"
        )?;
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        for (name, request) in &self.requests {
            writeln!(
                fmt,
                " {:<24} | {:>13} | {:>14} | {:>8.2} | {:>7.1}",
                truncate_string(name, 24),
                request.request_count().to_formatted_string(&Locale::en),
                request.fail_count.to_formatted_string(&Locale::en),
                per_second(self.duration, request.request_count()),
                request.average_response_time(),
            )?;
        }
        if self.requests.len() > 1 {
            writeln!(
                fmt,
                " -------------------------+---------------+----------------+----------+--------"
            )?;
            let total = self.request_count();
            let fails: usize = self.requests.values().map(|r| r.fail_count).sum();
            writeln!(
                fmt,
                " {:<24} | {:>13} | {:>14} | {:>8.2} |",
                "Aggregated",
                total.to_formatted_string(&Locale::en),
                fails.to_formatted_string(&Locale::en),
                per_second(self.duration, total),
            )?;
        }
        Ok(())
    }

    fn fmt_status_codes(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            fmt,
            "\n === STATUS CODES ===\n ------------------------------------------------------------------------------"
        )?;
        writeln!(fmt, " {:<24} | {:>51}", "Name", "Status codes")?;
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        for (name, request) in &self.requests {
            let codes = request
                .status_code_counts
                .iter()
                .map(|(code, count)| {
                    format!("{} [{}]", count.to_formatted_string(&Locale::en), code)
                })
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(fmt, " {:<24} | {:>51}", truncate_string(name, 24), codes)?;
        }
        Ok(())
    }

    fn fmt_errors(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if self.requests.values().all(|r| r.errors.is_empty()) {
            return Ok(());
        }
        writeln!(
            fmt,
            "\n === ERRORS ===\n ------------------------------------------------------------------------------"
        )?;
        for (name, request) in &self.requests {
            for (error, occurrences) in &request.errors {
                writeln!(
                    fmt,
                    " {:>13} | {}: {}",
                    occurrences.to_formatted_string(&Locale::en),
                    name,
                    error
                )?;
            }
        }
        Ok(())
    }
}
impl fmt::Display for LoadTestMetrics {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if let Some(started) = self.started {
            writeln!(
                fmt,
                " Started {} with {} users, ran {} seconds ({} cycles)",
                started.format("%Y-%m-%d %H:%M:%S"),
                self.users,
                self.duration,
                self.cycles.to_formatted_string(&Locale::en),
            )?;
        }
        if self.requests.is_empty() {
            return writeln!(fmt, " No requests were made.");
        }
        self.fmt_requests(fmt)?;
        self.fmt_status_codes(fmt)?;
        self.fmt_errors(fmt)
    }
}

fn per_second(duration: usize, total: usize) -> f32 {
    if duration == 0 {
        0.0
    } else {
        total as f32 / duration as f32
    }
}

/// Truncate strings when they're too long to display.
fn truncate_string(str_to_truncate: &str, max_length: usize) -> String {
    if str_to_truncate.chars().count() > max_length {
        let truncated: String = str_to_truncate.chars().take(max_length - 2).collect();
        format!("{}..", truncated)
    } else {
        str_to_truncate.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn request(name: &str, status_code: Option<StatusCode>, response_time: u128) -> RequestMetric {
        let mut request = RequestMetric::new(name, "http://127.0.0.1/", 0, 0);
        request.set_response_time(response_time);
        request.set_status_code(status_code);
        if status_code.is_none() {
            request.set_error("connection refused");
        }
        request
    }

    #[test]
    fn any_status_code_is_success() {
        let mut metrics = LoadTestMetrics::default();
        metrics.record_request(&request("GET /health", Some(StatusCode::NOT_FOUND), 4));
        metrics.record_request(&request("GET /health", Some(StatusCode::FOUND), 2));
        metrics.record_request(&request("GET /health", Some(StatusCode::OK), 9));
        metrics.record_request(&request(
            "GET /health",
            Some(StatusCode::INTERNAL_SERVER_ERROR),
            5,
        ));

        let health = &metrics.requests["GET /health"];
        assert_eq!(health.success_count, 4);
        assert_eq!(health.fail_count, 0);
        assert_eq!(health.status_code_counts[&404], 1);
        assert_eq!(health.status_code_counts[&302], 1);
        assert_eq!(health.status_code_counts[&200], 1);
        assert_eq!(health.status_code_counts[&500], 1);
        assert_eq!(health.min_response_time, 2);
        assert_eq!(health.max_response_time, 9);
        assert_eq!(health.average_response_time(), 5.0);
    }

    #[test]
    fn transport_errors_are_failures() {
        let mut metrics = LoadTestMetrics::default();
        metrics.record_request(&request("GET /", None, 1));
        metrics.record_request(&request("GET /", None, 1));
        metrics.record_request(&request("GET /", Some(StatusCode::OK), 1));

        let root = &metrics.requests["GET /"];
        assert_eq!(root.success_count, 1);
        assert_eq!(root.fail_count, 2);
        assert_eq!(root.errors["connection refused"], 2);
        assert!(!root.status_code_counts.contains_key(&0));
    }

    #[test]
    fn buckets_by_name() {
        let mut metrics = LoadTestMetrics::default();
        metrics.record_request(&request("GET /", Some(StatusCode::OK), 1));
        metrics.record_request(&request("GET /api/projects", Some(StatusCode::OK), 1));
        metrics.record_request(&request("GET /", Some(StatusCode::OK), 1));

        assert_eq!(metrics.requests.len(), 2);
        assert_eq!(metrics.requests["GET /"].request_count(), 2);
        assert_eq!(metrics.requests["GET /api/projects"].request_count(), 1);
        assert_eq!(metrics.request_count(), 3);
    }

    #[test]
    fn display() {
        let mut metrics = LoadTestMetrics::default();
        assert!(metrics.to_string().contains("No requests were made."));

        metrics.duration = 2;
        metrics.record_request(&request("GET /", Some(StatusCode::OK), 1));
        metrics.record_request(&request("GET /health", Some(StatusCode::NOT_FOUND), 1));
        metrics.record_request(&request("GET /health", None, 1));
        let output = metrics.to_string();
        assert!(output.contains("PER REQUEST METRICS"));
        assert!(output.contains("Aggregated"));
        assert!(output.contains("1 [404]"));
        assert!(output.contains("connection refused"));
    }

    #[test]
    fn truncate() {
        assert_eq!(truncate_string("GET /", 24), "GET /");
        assert_eq!(truncate_string("GET /api/projects/long", 10), "GET /api..");
    }
}
