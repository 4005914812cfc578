//! Virtual users, each repeatedly running weighted tasks from a [`UserProfile`].

use rand::Rng;
use reqwest::{redirect, Client};
use std::sync::Arc;
use std::time::{self, Duration};
use url::Url;

use crate::environment::EnvironmentConfiguration;
use crate::metrics::RequestMetric;
use crate::profile::{Task, UserProfile};
use crate::sampler::WeightedSampler;
use crate::LoadTestError;

/// Commands sent from the parent to user tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Tell the user to stop once the current task completes.
    Exit,
}

/// The lifecycle of a virtual user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    /// Picking and running tasks.
    Running,
    /// Told to stop, or done with its iterations.
    Stopped,
}

/// Never sleep more than this many milliseconds at a time, so a sleeping user
/// notices quickly that the load test is over.
const MAXIMUM_SLEEP_TIME: u64 = 500;

/// A single simulated user, with its own HTTP clients.
#[derive(Debug, Clone)]
pub struct VirtualUser {
    /// Identifies the user in logs and metrics.
    pub number: usize,
    /// Requests are made relative to this URL.
    pub base_url: Url,
    /// Client that follows redirects.
    client: Client,
    /// Client that returns redirect responses as is.
    no_redirect_client: Client,
    /// When the load test started, used to timestamp requests.
    pub started: time::Instant,
    /// How many tasks the user has run.
    pub cycles: usize,
    pub state: UserState,
}
impl VirtualUser {
    /// Create a user, applying the profile's default headers to all of its future
    /// requests.
    pub fn new(
        number: usize,
        profile: &UserProfile,
        environment: &EnvironmentConfiguration,
    ) -> Result<Self, LoadTestError> {
        Self::with_start_time(number, profile, environment, time::Instant::now())
    }

    pub(crate) fn with_start_time(
        number: usize,
        profile: &UserProfile,
        environment: &EnvironmentConfiguration,
        started: time::Instant,
    ) -> Result<Self, LoadTestError> {
        trace!("new user {}", number);
        // Headers are set once on the client, rather than on each request.
        let client = Client::builder()
            .default_headers(profile.default_headers.clone())
            .build()?;
        let no_redirect_client = Client::builder()
            .default_headers(profile.default_headers.clone())
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(VirtualUser {
            number,
            base_url: environment.base_url.clone(),
            client,
            no_redirect_client,
            started,
            cycles: 0,
            state: UserState::Running,
        })
    }

    /// Appends the path to the base URL, keeping any path prefix of the base URL.
    /// For example, with a base URL of `http://gateway/shelfware` and a path of
    /// `/api/projects`, returns `http://gateway/shelfware/api/projects`.
    pub fn build_url(&self, path: &str) -> Result<Url, LoadTestError> {
        let mut base_url = self.base_url.clone();
        if !base_url.path().ends_with('/') {
            let base_path = format!("{}/", base_url.path());
            base_url.set_path(&base_path);
        }
        // Joined relative to the base path, an absolute path would replace it.
        base_url
            .join(path.trim_start_matches('/'))
            .map_err(|parse_error| LoadTestError::InvalidHost {
                host: self.base_url.to_string(),
                detail: format!("Failed to join path {}.", path),
                parse_error,
            })
    }

    /// Make the task's single `GET` request and return its outcome.
    ///
    /// Any response counts as a success, whatever its status code. The outcome is
    /// only a failure if no response was received.
    pub async fn run_task(&self, task: &Task) -> Result<RequestMetric, LoadTestError> {
        let url = self.build_url(&task.path)?;
        let mut request = RequestMetric::new(
            &task.name,
            url.as_str(),
            self.started.elapsed().as_millis(),
            self.number,
        );

        let client = if task.follow_redirects {
            &self.client
        } else {
            &self.no_redirect_client
        };

        let started = time::Instant::now();
        let response = client.get(url).send().await;
        request.set_response_time(started.elapsed().as_millis());

        match response {
            Ok(response) => {
                let status_code = response.status();
                debug!("{:?}: status_code {}", &task.path, status_code);
                request.set_status_code(Some(status_code));
            }
            Err(e) => {
                warn!("{:?}: {}", &task.path, e);
                request.set_status_code(e.status());
                request.set_error(&e.to_string());
            }
        }

        Ok(request)
    }

    /// Pick a random pause from the profile's wait time range.
    pub fn wait_time<R: Rng + ?Sized>(profile: &UserProfile, rng: &mut R) -> Duration {
        let (min, max) = profile.wait_time;
        if min == max {
            min
        } else {
            rng.random_range(min..=max)
        }
    }
}

/// Run a user until told to exit, or until it has run `iterations` tasks if that's
/// non-zero.
///
/// Each cycle picks one task by weight, runs it, reports its outcome to the parent,
/// then pauses. Returns the number of completed cycles.
pub(crate) async fn user_main(
    profile: Arc<UserProfile>,
    sampler: WeightedSampler,
    mut user: VirtualUser,
    receiver: flume::Receiver<UserCommand>,
    metrics: flume::Sender<RequestMetric>,
    iterations: usize,
) -> usize {
    info!("launching user {} from {}...", user.number, profile.name);

    'cycles: while user.state == UserState::Running {
        let task = &profile.tasks[sampler.sample(&mut rand::rng())];
        debug!(
            "[user {}]: launching {} task from {}",
            user.number, task.id, profile.name
        );
        match user.run_task(task).await {
            // Best effort metrics, the parent may already be gone.
            Ok(request) => {
                let _ = metrics.send(request);
            }
            Err(e) => error!("[user {}]: {} task failed: {}", user.number, task.id, e),
        }
        user.cycles += 1;

        if (iterations > 0 && user.cycles >= iterations) || received_exit(&receiver) {
            user.state = UserState::Stopped;
            break;
        }

        let mut wait_time = VirtualUser::wait_time(&profile, &mut rand::rng()).as_millis() as u64;
        while wait_time > 0 {
            if received_exit(&receiver) {
                user.state = UserState::Stopped;
                break 'cycles;
            }

            let sleep_duration = if wait_time > MAXIMUM_SLEEP_TIME {
                wait_time -= MAXIMUM_SLEEP_TIME;
                Duration::from_millis(MAXIMUM_SLEEP_TIME)
            } else {
                let sleep_duration = Duration::from_millis(wait_time);
                wait_time = 0;
                sleep_duration
            };
            trace!("user {} sleeping {:?} ...", user.number, sleep_duration);
            tokio::time::sleep(sleep_duration).await;
        }
    }

    info!(
        "exiting user {} from {} after {} cycles...",
        user.number, profile.name, user.cycles
    );
    user.cycles
}

// Determine if the parent has sent a UserCommand::Exit message, or has gone away.
fn received_exit(receiver: &flume::Receiver<UserCommand>) -> bool {
    match receiver.try_recv() {
        Ok(UserCommand::Exit) => true,
        Err(flume::TryRecvError::Disconnected) => true,
        Err(flume::TryRecvError::Empty) => false,
    }
}
