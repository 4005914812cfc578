//! Defines how virtual users behave.
//!
//! A [`UserProfile`] is the blueprint shared by every virtual user:
//!
//! - [`Task`]s each make one `GET` request and carry a weight controlling how often
//!   they are picked, and a display name under which their outcomes are recorded.
//! - A wait time range: after each task a user pauses for a random duration between
//!   the minimum and maximum before picking the next task.
//! - Default headers, applied to every request the user makes.
//!
//! ## Building a profile
//!
//! ```rust
//! use std::time::Duration;
//!
//! use shelfware_loadtest::prelude::*;
//!
//! let profile = UserProfile::new("ShelfwareUser")
//!     .register_task(Task::get("root", "/").set_weight(10).unwrap())
//!     .register_task(
//!         Task::get("health", "/health")
//!             .set_weight(2)
//!             .unwrap()
//!             .set_follow_redirects(false),
//!     )
//!     .set_wait_time(Duration::from_millis(500), Duration::from_secs(2))
//!     .unwrap();
//!
//! assert_eq!(profile.tasks.len(), 2);
//! assert_eq!(profile.tasks[0].name, "GET /");
//! ```
//!
//! Most load tests use [`UserProfile::for_variant`] instead, which builds the Shelfware
//! profile for a [`DeploymentVariant`].

use http::header::{HeaderMap, HeaderName, HeaderValue, HOST, USER_AGENT};
use std::time::Duration;

use crate::environment::{DeploymentVariant, EnvironmentConfiguration, HOST_HEADER_VAR};
use crate::sampler::WeightedSampler;
use crate::LoadTestError;

/// The `User-Agent` header sent with every request.
pub const LOADTEST_USER_AGENT: &str = "locust";

/// A single `GET` request a virtual user may make.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Task {
    /// Short identifier of the task, for example `health`.
    pub id: String,
    /// The name under which outcomes are recorded, for example `GET /health`.
    pub name: String,
    /// The path requested, joined onto the base URL.
    pub path: String,
    /// Relative frequency this task is picked with.
    pub weight: usize,
    /// Whether redirect responses are followed, or recorded as is.
    pub follow_redirects: bool,
}
impl Task {
    /// A task requesting `path`, with a weight of 1, named `GET {path}`, following
    /// redirects.
    pub fn get(id: &str, path: &str) -> Self {
        trace!("new task: {} {}", id, path);
        Task {
            id: id.to_string(),
            name: format!("GET {}", path),
            path: path.to_string(),
            weight: 1,
            follow_redirects: true,
        }
    }

    /// Override the display name requests are recorded under.
    pub fn set_name(mut self, name: &str) -> Self {
        trace!("{} set_name: {}", self.id, name);
        self.name = name.to_string();
        self
    }

    /// Sets the weight of the task. The larger the weight, the more often it runs: a
    /// task with a weight of 10 runs five times as often as a task with a weight of 2.
    ///
    /// # Example
    /// ```rust
    /// use shelfware_loadtest::prelude::*;
    ///
    /// assert!(Task::get("root", "/").set_weight(10).is_ok());
    /// assert!(Task::get("root", "/").set_weight(0).is_err());
    /// ```
    pub fn set_weight(mut self, weight: usize) -> Result<Self, LoadTestError> {
        trace!("{} set_weight: {}", self.id, weight);
        if weight < 1 {
            return Err(LoadTestError::InvalidWeight {
                weight,
                detail: format!("Task {} weight must be set to at least 1.", self.id),
            });
        }
        self.weight = weight;
        Ok(self)
    }

    /// Whether redirects are followed. When disabled, a redirect response is recorded
    /// as the outcome and its `Location` is never requested.
    pub fn set_follow_redirects(mut self, follow_redirects: bool) -> Self {
        trace!("{} set_follow_redirects: {}", self.id, follow_redirects);
        self.follow_redirects = follow_redirects;
        self
    }
}

/// The tasks, wait time and default headers of a simulated user.
#[derive(Clone, Debug)]
pub struct UserProfile {
    /// The name of the profile, used in logs.
    pub name: String,
    /// Candidate tasks, in registration order.
    pub tasks: Vec<Task>,
    /// Inclusive range a user pauses for after each task.
    pub wait_time: (Duration, Duration),
    /// Headers sent with every request.
    pub default_headers: HeaderMap,
}
impl UserProfile {
    /// An empty profile with no wait time and no default headers.
    pub fn new(name: &str) -> Self {
        trace!("new profile: {}", name);
        UserProfile {
            name: name.to_string(),
            tasks: Vec::new(),
            wait_time: (Duration::from_secs(0), Duration::from_secs(0)),
            default_headers: HeaderMap::new(),
        }
    }

    /// The Shelfware profile for a deployment variant.
    ///
    /// Users wait between 0.5 and 2 seconds after each task, and send the resolved
    /// `Host` header with a `User-Agent` of `locust`.
    ///
    /// | Task | Path | Weight | Redirects | Variants |
    /// |---|---|---|---|---|
    /// | root | `/` | 10 | followed | all |
    /// | health | `/health` | 2 | not followed | all |
    /// | get_projects | `/api/projects` | 5 | followed | direct |
    pub fn for_variant(
        variant: DeploymentVariant,
        environment: &EnvironmentConfiguration,
    ) -> Result<Self, LoadTestError> {
        let mut profile = UserProfile::new("ShelfwareUser")
            .set_wait_time(Duration::from_millis(500), Duration::from_millis(2_000))?
            .set_default_header(HOST.as_str(), &environment.host_header)
            .map_err(|_| LoadTestError::InvalidOption {
                option: HOST_HEADER_VAR.to_string(),
                value: environment.host_header.clone(),
                detail: "The Host header must be a valid HTTP header value.".to_string(),
            })?
            .set_default_header(USER_AGENT.as_str(), LOADTEST_USER_AGENT)?
            .register_task(Task::get("root", "/").set_weight(10)?)
            // A 404 is expected if the backend doesn't expose a health check.
            .register_task(
                Task::get("health", "/health")
                    .set_weight(2)?
                    .set_follow_redirects(false),
            );
        if variant == DeploymentVariant::Direct {
            profile =
                profile.register_task(Task::get("get_projects", "/api/projects").set_weight(5)?);
        }
        Ok(profile)
    }

    /// Adds a task to the profile.
    pub fn register_task(mut self, task: Task) -> Self {
        trace!("{} register_task: {}", self.name, task.id);
        self.tasks.push(task);
        self
    }

    /// Configure how long a user pauses after each task. The pause is picked uniformly
    /// at random from `min_wait` to `max_wait` inclusively.
    ///
    /// # Example
    /// ```rust
    /// use std::time::Duration;
    ///
    /// use shelfware_loadtest::prelude::*;
    ///
    /// assert!(UserProfile::new("Example")
    ///     .set_wait_time(Duration::from_secs(3), Duration::from_secs(1))
    ///     .is_err());
    /// ```
    pub fn set_wait_time(
        mut self,
        min_wait: Duration,
        max_wait: Duration,
    ) -> Result<Self, LoadTestError> {
        trace!(
            "{} set_wait time: min: {:?} max: {:?}",
            self.name,
            min_wait,
            max_wait
        );
        if min_wait > max_wait {
            return Err(LoadTestError::InvalidWaitTime {
                min_wait,
                max_wait,
                detail: "The min_wait option can not be set to a larger value than the max_wait option.".to_string(),
            });
        }
        self.wait_time = (min_wait, max_wait);
        Ok(self)
    }

    /// Adds a header sent with every request, replacing any previous value.
    pub fn set_default_header(mut self, name: &str, value: &str) -> Result<Self, LoadTestError> {
        trace!("{} set_default_header: {}: {}", self.name, name, value);
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| LoadTestError::InvalidOption {
                option: "header name".to_string(),
                value: name.to_string(),
                detail: "Invalid HTTP header name.".to_string(),
            })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| LoadTestError::InvalidOption {
                option: name.to_string(),
                value: value.to_string(),
                detail: "Invalid HTTP header value.".to_string(),
            })?;
        self.default_headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Build a sampler picking task indexes by weight.
    pub fn sampler(&self) -> Result<WeightedSampler, LoadTestError> {
        if self.tasks.is_empty() {
            return Err(LoadTestError::NoTasks {
                detail: format!("No tasks are registered with {}.", self.name),
            });
        }
        let weights: Vec<usize> = self.tasks.iter().map(|task| task.weight).collect();
        WeightedSampler::new(&weights)
    }
}
