//! Utility functions used by the load test driver.

use lazy_static::lazy_static;
use regex::Regex;
use std::str::FromStr;
use std::time;
use url::Url;

use crate::{LoadTestError, CANCELED};

/// Parse a string representing a time span and return the number of seconds.
///
/// Can be specified as an integer, indicating seconds. Or can use integers
/// together with one or more of "h", "m", and "s", in that order, indicating
/// "hours", "minutes", and "seconds".
///
/// Valid formats include: 20, 20s, 3m, 2h, 1h20m, 3h30m10s, etc.
///
/// # Example
/// ```rust
/// use shelfware_loadtest::util;
///
/// // 1 hour 2 minutes and 3 seconds is 3,723 seconds.
/// assert_eq!(util::parse_timespan("1h2m3s"), 3_723);
///
/// // 45 seconds is 45 seconds.
/// assert_eq!(util::parse_timespan("45"), 45);
///
/// // Invalid value is 0 seconds.
/// assert_eq!(util::parse_timespan("foo"), 0);
/// ```
pub fn parse_timespan(time_str: &str) -> usize {
    if let Ok(t) = usize::from_str(time_str) {
        trace!("{} is integer: {} seconds", time_str, t);
        return t;
    }

    lazy_static! {
        static ref TIMESPAN: Regex =
            Regex::new(r"^((?P<hours>\d+?)h)?((?P<minutes>\d+?)m)?((?P<seconds>\d+?)s)?$")
                .expect("timespan regex is valid");
    }

    let time_matches = match TIMESPAN.captures(time_str) {
        Some(c) => c,
        None => return 0,
    };
    let extract = |name: &str| -> usize {
        time_matches
            .name(name)
            .and_then(|m| usize::from_str(m.as_str()).ok())
            .unwrap_or(0)
    };
    let hours = extract("hours");
    let minutes = extract("minutes");
    let seconds = extract("seconds");
    let total = hours * 60 * 60 + minutes * 60 + seconds;
    trace!(
        "{} hours {} minutes {} seconds: {} seconds",
        hours,
        minutes,
        seconds,
        total
    );
    total
}

/// Calculate if the specified number of seconds has elapsed since a timer started.
///
/// A `run_time` of 0 never expires.
///
/// # Example
/// ```rust
/// use shelfware_loadtest::util;
///
/// let started = std::time::Instant::now();
/// assert_eq!(util::timer_expired(started, 60), false);
/// assert_eq!(util::timer_expired(started, 0), false);
/// ```
pub fn timer_expired(started: time::Instant, run_time: usize) -> bool {
    run_time > 0 && started.elapsed().as_secs() >= run_time as u64
}

/// Parse a base URL, returning [`LoadTestError::InvalidHost`] if it can't be used
/// to build request URLs.
///
/// # Example
/// ```rust
/// use shelfware_loadtest::util;
///
/// // Hostname is a valid URL.
/// assert!(util::parse_host("http://localhost/").is_ok());
///
/// // IP is a valid URL.
/// assert!(util::parse_host("http://172.18.0.5").is_ok());
///
/// // Protocol is required.
/// assert!(util::parse_host("shelfware.local/").is_err());
/// ```
pub fn parse_host(host: &str) -> Result<Url, LoadTestError> {
    let url = Url::parse(host).map_err(|parse_error| LoadTestError::InvalidHost {
        host: host.to_string(),
        detail: "Invalid host.".to_string(),
        parse_error,
    })?;
    if url.cannot_be_a_base() {
        return Err(LoadTestError::InvalidHost {
            host: host.to_string(),
            detail: "Host can not be used as a base URL.".to_string(),
            parse_error: url::ParseError::RelativeUrlWithCannotBeABaseBase,
        });
    }
    Ok(url)
}

/// Returns `true` once ctrl-c has been caught.
pub fn canceled() -> bool {
    CANCELED.read().map(|c| *c).unwrap_or(true)
}

// Shutdown cleanly on the first ctrl-c. Exit abruptly on the second ctrl-c.
pub(crate) fn setup_ctrlc_handler() {
    match ctrlc::set_handler(move || {
        if canceled() {
            warn!("caught another ctrl-c, exiting immediately...");
            std::process::exit(1);
        } else {
            warn!("caught ctrl-c, stopping...");
            if let Ok(mut canceled) = CANCELED.write() {
                *canceled = true;
            }
        }
    }) {
        Ok(_) => (),
        Err(e) => {
            // The handler can only be installed once per process, reset the flag so
            // consecutive load tests in the same process can run.
            if let Ok(mut canceled) = CANCELED.write() {
                *canceled = false;
            }
            info!("reset ctrl-c handler: {}", e);
        }
    }
}
