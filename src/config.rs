//! Run-time options for a load test.
//!
//! The load test is configured with the command line options defined by
//! [`LoadTestConfiguration`], derived with [`gumdrop`](https://docs.rs/gumdrop/).
//! The target itself is configured with environment variables, see the
//! [`environment`](../environment/index.html) module.

use gumdrop::Options;
use serde::{Deserialize, Serialize};
use simplelog::*;
use std::path::PathBuf;
use std::str::FromStr;

use crate::environment::{DeploymentVariant, DEPLOYMENT_VARIANT_VAR};
use crate::util;
use crate::LoadTestError;

/// Runtime options available when launching a load test.
#[derive(Options, Debug, Clone, Default, Serialize, Deserialize)]
#[options(
    help = r#"Simulates users browsing Shelfware through its gateway.

The target is configured with the BASE_URL, TARGET_ENV, HOST_HEADER and
DEPLOYMENT_VARIANT environment variables.

The following runtime options are available:"#
)]
pub struct LoadTestConfiguration {
    /// Displays this help
    #[options(short = "h")]
    pub help: bool,
    /// Prints version information
    #[options(short = "V")]
    pub version: bool,
    /// Lists all tasks and exits
    #[options(short = "l", help = "Lists all tasks and exits\n")]
    pub list: bool,

    /// Overrides BASE_URL (ie http://172.18.0.5)
    #[options(short = "H")]
    pub host: String,
    /// Sets concurrent users (default: 1)
    #[options(short = "u")]
    pub users: Option<usize>,
    /// Stops load test after (30s, 20m, 3h, 1h30m, etc)
    #[options(short = "t", meta = "TIME")]
    pub run_time: String,
    /// Stops each user after this many tasks
    #[options(no_short)]
    pub iterations: usize,
    /// Sets deployment variant (gateway, direct)
    #[options(no_short, meta = "VARIANT")]
    pub variant: Option<DeploymentVariant>,
    /// Enables log file and sets name
    #[options(short = "G", meta = "NAME")]
    pub log_file: String,
    /// Increases log file level (-g, -gg, etc)
    #[options(short = "g", count)]
    pub log_level: u8,
    /// Decreases verbosity (-q, -qq, etc)
    #[options(count, short = "q")]
    pub quiet: u8,
    /// Increases verbosity (-v, -vv, etc)
    #[options(
        count,
        short = "v",
        help = "Increases verbosity (-v, -vv, etc)\n\nMetrics:"
    )]
    pub verbose: u8,

    /// Doesn't display metrics at end of load test
    #[options(no_short)]
    pub no_print_metrics: bool,
    /// Writes metrics as json to this file
    #[options(no_short, meta = "NAME")]
    pub report_file: String,
}
impl LoadTestConfiguration {
    /// The deployment variant: `--variant` if set, otherwise `DEPLOYMENT_VARIANT`,
    /// otherwise `gateway`.
    pub fn deployment_variant(&self) -> Result<DeploymentVariant, LoadTestError> {
        self.deployment_variant_with(|name| std::env::var(name).ok())
    }

    pub(crate) fn deployment_variant_with<F>(
        &self,
        lookup: F,
    ) -> Result<DeploymentVariant, LoadTestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(variant) = self.variant {
            return Ok(variant);
        }
        match lookup(DEPLOYMENT_VARIANT_VAR).filter(|value| !value.is_empty()) {
            Some(value) => {
                DeploymentVariant::from_str(&value).map_err(|_| LoadTestError::InvalidOption {
                    option: DEPLOYMENT_VARIANT_VAR.to_string(),
                    value,
                    detail: "Expected gateway or direct.".to_string(),
                })
            }
            None => Ok(DeploymentVariant::default()),
        }
    }

    /// How many users to launch.
    pub fn users(&self) -> usize {
        self.users.unwrap_or(1)
    }

    /// How many seconds to run, or 0 to run until stopped.
    pub fn run_time(&self) -> usize {
        util::parse_timespan(&self.run_time)
    }

    /// Validate options that can be invalid in combination or range.
    pub(crate) fn validate(&self) -> Result<(), LoadTestError> {
        if self.users == Some(0) {
            return Err(LoadTestError::InvalidOption {
                option: "`configuration.users`".to_string(),
                value: "0".to_string(),
                detail: "The `configuration.users` option must be set to at least 1.".to_string(),
            });
        }

        if !self.run_time.is_empty() && self.run_time() == 0 && self.run_time != "0" {
            return Err(LoadTestError::InvalidOption {
                option: "`configuration.run_time`".to_string(),
                value: self.run_time.clone(),
                detail: "Expected a time span such as 30s, 20m, 3h or 1h30m.".to_string(),
            });
        }

        if !self.host.is_empty() {
            util::parse_host(&self.host)?;
        }

        if self.quiet > 0 && self.verbose > 0 {
            return Err(LoadTestError::InvalidOption {
                option: "`configuration.verbose`".to_string(),
                value: self.verbose.to_string(),
                detail: "The `configuration.verbose` option can not be set together with the `configuration.quiet` option.".to_string(),
            });
        }

        Ok(())
    }

    /// Initialize the logger which writes to standard out and optionally to a log file.
    pub(crate) fn initialize_logger(&self) {
        // Configure debug output level.
        let debug_level = match self.verbose {
            0 => match self.quiet {
                0 => LevelFilter::Info,
                1 => LevelFilter::Warn,
                _ => LevelFilter::Error,
            },
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Configure log file level.
        let log_level = match self.log_level {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        let mut loggers: Vec<Box<dyn SharedLogger>> =
            vec![SimpleLogger::new(debug_level, Config::default())];
        let log_file = if self.log_file.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.log_file))
        };
        if let Some(log_to_file) = &log_file {
            match std::fs::File::create(log_to_file) {
                Ok(file) => loggers.push(WriteLogger::new(log_level, Config::default(), file)),
                Err(e) => eprintln!("failed to create log file {}: {}", log_to_file.display(), e),
            }
        }

        if let Err(e) = CombinedLogger::init(loggers) {
            // Only one logger can be installed per process.
            debug!("failed to initialize CombinedLogger: {}", e);
        }
        if let Some(log_to_file) = log_file {
            info!("Writing to log file: {}", log_to_file.display());
        }

        info!("Output verbosity level: {}", debug_level);
        info!("Logfile verbosity level: {}", log_level);
    }
}
