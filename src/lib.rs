//! # Shelfware load test
//!
//! Simulates users browsing [Shelfware](https://shelfware.local/), in the manner of
//! a [Locust](https://locust.io/) `HttpUser`.
//!
//! Each simulated user repeatedly picks one of a small set of weighted tasks, makes
//! the task's `GET` request, records the outcome, then pauses for a random "think
//! time" before picking again.
//!
//! ## Configuring the target
//!
//! Requests usually go through the Istio ingress gateway, which routes to the
//! production or test environment depending on the `Host` header. The target is
//! configured with environment variables:
//!
//! - `BASE_URL`: where requests are sent (default depends on the deployment variant)
//! - `TARGET_ENV`: `prod` or `test` (default `prod`)
//! - `HOST_HEADER`: the `Host` header to send (default `shelfware.local` for `prod`,
//!   `test.shelfware.local` for `test`)
//! - `DEPLOYMENT_VARIANT`: `gateway` or `direct` (default `gateway`)
//!
//! ## Running
//!
//! ```bash
//! $ TARGET_ENV=test cargo run --release -- --users 10 --run-time 5m
//! ```
//!
//! Or from code:
//!
//! ```rust,no_run
//! use shelfware_loadtest::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), LoadTestError> {
//!     let metrics = LoadTest::initialize()?.execute().await?;
//!     println!("{} requests made", metrics.request_count());
//!
//!     Ok(())
//! }
//! ```

#[macro_use]
extern crate log;

pub mod config;
pub mod environment;
pub mod metrics;
pub mod prelude;
pub mod profile;
pub mod sampler;
pub mod user;
pub mod util;

use chrono::prelude::*;
use gumdrop::Options;
use lazy_static::lazy_static;
use std::sync::{Arc, RwLock};
use std::{fmt, io, time};

use crate::config::LoadTestConfiguration;
use crate::environment::EnvironmentConfiguration;
use crate::metrics::{LoadTestMetrics, RequestMetric};
use crate::profile::UserProfile;
use crate::user::{UserCommand, VirtualUser};

lazy_static! {
    /// Set once ctrl-c has been caught.
    pub(crate) static ref CANCELED: RwLock<bool> = RwLock::new(false);
}

/// How often the parent checks whether the load test is over.
const SHUTDOWN_POLL_INTERVAL: time::Duration = time::Duration::from_millis(100);

/// An enumeration of all errors a [`LoadTest`] can return.
#[derive(Debug)]
pub enum LoadTestError {
    /// Wraps a [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html).
    Io(io::Error),
    /// Wraps a [`reqwest::Error`](https://docs.rs/reqwest/*/reqwest/struct.Error.html).
    Reqwest(reqwest::Error),
    /// Wraps a ['tokio::task::JoinError'](https://tokio-rs.github.io/tokio/doc/tokio/task/struct.JoinError.html).
    TokioJoin(tokio::task::JoinError),
    /// Wraps a [`serde_json::Error`](https://docs.rs/serde_json/*/serde_json/struct.Error.html).
    Serde(serde_json::Error),
    /// Failed to parse a hostname.
    InvalidHost {
        /// The invalid hostname that caused this error.
        host: String,
        /// An optional explanation of the error.
        detail: String,
        /// Wraps a [`url::ParseError`](https://docs.rs/url/*/url/enum.ParseError.html).
        parse_error: url::ParseError,
    },
    /// Invalid option or value specified, may only be invalid in context.
    InvalidOption {
        /// The invalid option that caused this error, may be only invalid in context.
        option: String,
        /// The invalid value that caused this error, may be only invalid in context.
        value: String,
        /// An optional explanation of the error.
        detail: String,
    },
    /// Invalid wait time specified.
    InvalidWaitTime {
        /// The specified minimum wait time.
        min_wait: time::Duration,
        /// The specified maximum wait time.
        max_wait: time::Duration,
        /// An optional explanation of the error.
        detail: String,
    },
    /// Invalid weight specified.
    InvalidWeight {
        /// The specified weight.
        weight: usize,
        /// An optional explanation of the error.
        detail: String,
    },
    /// No tasks to pick from.
    NoTasks {
        /// An optional explanation of the error.
        detail: String,
    },
}
/// Implement a helper to provide a text description of all possible types of errors.
impl LoadTestError {
    fn describe(&self) -> &str {
        match *self {
            LoadTestError::Io(_) => "io::Error",
            LoadTestError::Reqwest(_) => "reqwest::Error",
            LoadTestError::TokioJoin(_) => "tokio::task::JoinError",
            LoadTestError::Serde(_) => "serde_json::Error",
            LoadTestError::InvalidHost { .. } => "failed to parse hostname",
            LoadTestError::InvalidOption { .. } => "invalid option or value specified",
            LoadTestError::InvalidWaitTime { .. } => "invalid wait_time specified",
            LoadTestError::InvalidWeight { .. } => "invalid weight specified",
            LoadTestError::NoTasks { .. } => "no tasks defined",
        }
    }
}

/// Implement format trait to allow displaying errors.
impl fmt::Display for LoadTestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LoadTestError::Io(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::Reqwest(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::TokioJoin(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::Serde(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::InvalidHost {
                ref host,
                ref parse_error,
                ..
            } => write!(
                f,
                "LoadTestError: {} {} ({})",
                self.describe(),
                host,
                parse_error
            ),
            LoadTestError::InvalidOption {
                ref option,
                ref value,
                ref detail,
            } => write!(
                f,
                "LoadTestError: {} {}={:?}: {}",
                self.describe(),
                option,
                value,
                detail
            ),
            LoadTestError::InvalidWaitTime { ref detail, .. }
            | LoadTestError::InvalidWeight { ref detail, .. }
            | LoadTestError::NoTasks { ref detail } => {
                write!(f, "LoadTestError: {}: {}", self.describe(), detail)
            }
        }
    }
}

// Define the lower level source of this error, if any.
impl std::error::Error for LoadTestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            LoadTestError::Io(ref source) => Some(source),
            LoadTestError::Reqwest(ref source) => Some(source),
            LoadTestError::TokioJoin(ref source) => Some(source),
            LoadTestError::Serde(ref source) => Some(source),
            LoadTestError::InvalidHost {
                ref parse_error, ..
            } => Some(parse_error),
            _ => None,
        }
    }
}

/// Auto-convert Reqwest errors.
impl From<reqwest::Error> for LoadTestError {
    fn from(err: reqwest::Error) -> LoadTestError {
        LoadTestError::Reqwest(err)
    }
}

/// Auto-convert IO errors.
impl From<io::Error> for LoadTestError {
    fn from(err: io::Error) -> LoadTestError {
        LoadTestError::Io(err)
    }
}

/// Auto-convert TokioJoin errors.
impl From<tokio::task::JoinError> for LoadTestError {
    fn from(err: tokio::task::JoinError) -> LoadTestError {
        LoadTestError::TokioJoin(err)
    }
}

/// Auto-convert serde_json errors.
impl From<serde_json::Error> for LoadTestError {
    fn from(err: serde_json::Error) -> LoadTestError {
        LoadTestError::Serde(err)
    }
}

/// Internal global run state for a load test.
struct LoadTestRunState {
    /// When the load test started.
    started: time::Instant,
    /// One command channel per launched user.
    users: Vec<flume::Sender<UserCommand>>,
    /// Handles of all launched users, each returning how many cycles it ran.
    user_handles: Vec<tokio::task::JoinHandle<usize>>,
    /// Receives the outcome of every request made by users.
    metrics_rx: flume::Receiver<RequestMetric>,
}

// Add up the cycles of all exited users, logging any user that didn't exit cleanly.
fn sum_cycles(results: Vec<Result<usize, tokio::task::JoinError>>) -> usize {
    let mut cycles = 0;
    for result in results {
        match result {
            Ok(user_cycles) => cycles += user_cycles,
            Err(e) => error!("failed to join user: {}", e),
        }
    }
    cycles
}

/// Launches virtual users against the configured target and collects their metrics.
pub struct LoadTest {
    /// Run-time options.
    configuration: LoadTestConfiguration,
    /// Metrics collected so far.
    metrics: LoadTestMetrics,
}
impl LoadTest {
    /// Load configuration from the command line.
    ///
    /// # Example
    /// ```rust
    /// use shelfware_loadtest::LoadTest;
    ///
    /// let load_test = LoadTest::initialize();
    /// ```
    pub fn initialize() -> Result<LoadTest, LoadTestError> {
        let configuration = LoadTestConfiguration::parse_args_default_or_exit();
        Ok(LoadTest::initialize_with_config(configuration))
    }

    /// Use an already built configuration, rather than the command line.
    ///
    /// # Example
    /// ```rust
    /// use gumdrop::Options;
    ///
    /// use shelfware_loadtest::config::LoadTestConfiguration;
    /// use shelfware_loadtest::LoadTest;
    ///
    /// let configuration = LoadTestConfiguration::parse_args_default(&["--users", "2"]).unwrap();
    /// let load_test = LoadTest::initialize_with_config(configuration);
    /// ```
    pub fn initialize_with_config(configuration: LoadTestConfiguration) -> LoadTest {
        LoadTest {
            configuration,
            metrics: LoadTestMetrics::default(),
        }
    }

    /// Resolve the target and build the user profile, failing before any request is
    /// made if the environment is malformed.
    pub fn prepare(&self) -> Result<(EnvironmentConfiguration, UserProfile), LoadTestError> {
        let variant = self.configuration.deployment_variant()?;
        let mut environment = EnvironmentConfiguration::resolve(variant)?;
        if !self.configuration.host.is_empty() {
            environment = environment.set_base_url(&self.configuration.host)?;
        }
        let profile = UserProfile::for_variant(variant, &environment)?;

        info!("deployment variant: {}", variant);
        info!("base url: {}", environment.base_url);
        info!("target environment: {}", environment.target_env);
        info!("host header: {}", environment.host_header);

        Ok((environment, profile))
    }

    /// Run the load test, returning the collected metrics once all users have stopped.
    ///
    /// Users stop when `--run-time` expires, when each has completed `--iterations`
    /// tasks, or when ctrl-c is pressed.
    pub async fn execute(mut self) -> Result<LoadTestMetrics, LoadTestError> {
        // If version flag is set, display package name and version and exit.
        if self.configuration.version {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            std::process::exit(0);
        }

        self.configuration.validate()?;
        self.configuration.initialize_logger();

        let (environment, profile) = self.prepare()?;

        // Display tasks, then exit.
        if self.configuration.list {
            println!("Available tasks:");
            println!(" - {}", profile.name);
            for task in &profile.tasks {
                println!("    o {} (weight: {})", task.name, task.weight);
            }
            std::process::exit(0);
        }

        util::setup_ctrlc_handler();

        let run_state = self.launch_users(environment, profile)?;
        self.wait_for_users(run_state).await?;

        if !self.configuration.no_print_metrics {
            println!("{}", self.metrics);
        }

        if !self.configuration.report_file.is_empty() {
            self.write_report_file().await?;
        }

        Ok(self.metrics)
    }

    // Create one virtual user per configured user and launch each in its own task.
    fn launch_users(
        &mut self,
        environment: EnvironmentConfiguration,
        profile: UserProfile,
    ) -> Result<LoadTestRunState, LoadTestError> {
        let sampler = profile.sampler()?;
        let profile = Arc::new(profile);
        let user_count = self.configuration.users();
        let (metrics_tx, metrics_rx) = flume::unbounded();

        info!("users = {}", user_count);
        info!("run_time = {}", self.configuration.run_time());
        if self.configuration.iterations > 0 {
            info!("iterations = {}", self.configuration.iterations);
        }

        let started = time::Instant::now();
        self.metrics.started = Some(Local::now());
        self.metrics.users = user_count;

        let mut users = Vec::with_capacity(user_count);
        let mut user_handles = Vec::with_capacity(user_count);
        for number in 1..=user_count {
            let user = VirtualUser::with_start_time(number, &profile, &environment, started)?;
            let (user_tx, user_rx) = flume::unbounded();
            users.push(user_tx);
            user_handles.push(tokio::spawn(user::user_main(
                Arc::clone(&profile),
                sampler.clone(),
                user,
                user_rx,
                metrics_tx.clone(),
                self.configuration.iterations,
            )));
        }

        Ok(LoadTestRunState {
            started,
            users,
            user_handles,
            metrics_rx,
        })
    }

    // Wait for the load test to end, stop all users and aggregate their metrics.
    async fn wait_for_users(&mut self, run_state: LoadTestRunState) -> Result<(), LoadTestError> {
        let run_time = self.configuration.run_time();
        loop {
            for request in run_state.metrics_rx.try_iter() {
                self.metrics.record_request(&request);
            }

            if util::timer_expired(run_state.started, run_time) {
                info!("stopping after {} seconds...", run_time);
                break;
            }
            if util::canceled() {
                break;
            }
            if run_state.user_handles.iter().all(|handle| handle.is_finished()) {
                info!("all users finished");
                break;
            }
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }

        for user in &run_state.users {
            // The user may already have exited.
            let _ = user.send(UserCommand::Exit);
        }
        let results = futures::future::join_all(run_state.user_handles).await;
        self.metrics.cycles += sum_cycles(results);

        // Users have all exited, collect anything they sent while stopping.
        for request in run_state.metrics_rx.try_iter() {
            self.metrics.record_request(&request);
        }
        self.metrics.duration = run_state.started.elapsed().as_secs() as usize;

        Ok(())
    }

    // Write the metrics as json.
    async fn write_report_file(&self) -> Result<(), LoadTestError> {
        let report = serde_json::to_string_pretty(&self.metrics)?;
        tokio::fs::write(&self.configuration.report_file, report).await?;
        info!("wrote report file to: {}", self.configuration.report_file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn failing_user() -> usize {
        panic!("user failed")
    }

    #[tokio::test]
    async fn failed_user_does_not_lose_cycles() {
        let handles = vec![
            tokio::spawn(async { 3 }),
            tokio::spawn(failing_user()),
            tokio::spawn(async { 4 }),
        ];
        let results = futures::future::join_all(handles).await;
        assert!(results[1].is_err());
        assert_eq!(sum_cycles(results), 7);
    }
}
