//! Resolves the load test target from the process environment.
//!
//! Requests are sent to a single base URL. When that URL is a shared ingress (the
//! Istio gateway in front of Shelfware), the `Host` header decides which backend
//! route receives the request, so the environment also determines which `Host`
//! header to send.
//!
//! The following environment variables are read, all optional:
//!  - `BASE_URL`: the base URL requests are sent to, defaulting to the base URL of
//!    the selected [`DeploymentVariant`].
//!  - `TARGET_ENV`: `prod` or `test` (case-insensitive), defaulting to `prod`.
//!  - `HOST_HEADER`: the `Host` header to send, defaulting to a per-[`TargetEnv`]
//!    hostname.
//!
//! The environment is resolved exactly once, when the load test starts, and the
//! resulting [`EnvironmentConfiguration`] is then shared read-only by all users.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};
use url::Url;

use crate::util;
use crate::LoadTestError;

/// Environment variable overriding the base URL.
pub const BASE_URL_VAR: &str = "BASE_URL";
/// Environment variable selecting the logical target environment.
pub const TARGET_ENV_VAR: &str = "TARGET_ENV";
/// Environment variable overriding the `Host` header.
pub const HOST_HEADER_VAR: &str = "HOST_HEADER";
/// Environment variable selecting the deployment variant.
pub const DEPLOYMENT_VARIANT_VAR: &str = "DEPLOYMENT_VARIANT";

/// `Host` header routed to production by the gateway.
pub const PROD_HOST: &str = "shelfware.local";
/// `Host` header routed to the test environment by the gateway.
pub const TEST_HOST: &str = "test.shelfware.local";

/// The logical environment the load test targets.
///
/// Parsing is case-insensitive. Values other than `prod` and `test` are kept as
/// [`TargetEnv::Unrecognized`] rather than rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum TargetEnv {
    #[default]
    #[strum(serialize = "prod")]
    Prod,
    #[strum(serialize = "test")]
    Test,
    #[strum(default)]
    Unrecognized(String),
}
impl TargetEnv {
    /// Parse a `TARGET_ENV` value. Never fails.
    ///
    /// # Example
    /// ```rust
    /// use shelfware_loadtest::environment::TargetEnv;
    ///
    /// assert_eq!(TargetEnv::parse("TeSt"), TargetEnv::Test);
    /// assert_eq!(TargetEnv::parse("staging"), TargetEnv::Unrecognized("staging".to_string()));
    /// ```
    pub fn parse(value: &str) -> Self {
        let lowercase = value.to_lowercase();
        TargetEnv::from_str(&lowercase).unwrap_or(TargetEnv::Unrecognized(lowercase))
    }

    /// The `Host` header the gateway routes to this environment.
    pub fn default_host(&self) -> &'static str {
        default_host(self)
    }
}
impl fmt::Display for TargetEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TargetEnv::Prod => write!(f, "prod"),
            TargetEnv::Test => write!(f, "test"),
            TargetEnv::Unrecognized(value) => write!(f, "{}", value),
        }
    }
}

/// Maps a [`TargetEnv`] to the `Host` header the gateway routes to it.
///
/// Unrecognized environments fall back to the production hostname.
///
/// # Example
/// ```rust
/// use shelfware_loadtest::environment::{default_host, TargetEnv};
///
/// assert_eq!(default_host(&TargetEnv::Prod), "shelfware.local");
/// assert_eq!(default_host(&TargetEnv::Test), "test.shelfware.local");
/// assert_eq!(default_host(&TargetEnv::parse("qa")), "shelfware.local");
/// ```
pub fn default_host(target_env: &TargetEnv) -> &'static str {
    match target_env {
        TargetEnv::Prod => PROD_HOST,
        TargetEnv::Test => TEST_HOST,
        _ => PROD_HOST,
    }
}

/// Where the load test runs from, which determines the default base URL and the
/// tasks that are exercised.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeploymentVariant {
    /// Inside the cluster, through the Istio ingress gateway.
    #[default]
    Gateway,
    /// Straight to the Shelfware node address, additionally exercising the projects API.
    Direct,
}
impl DeploymentVariant {
    /// The base URL requests are sent to when `BASE_URL` is not set.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            DeploymentVariant::Gateway => {
                "http://shelfware-gateway-istio.istio-system.svc.cluster.local"
            }
            DeploymentVariant::Direct => "http://172.18.0.5",
        }
    }
}

/// The resolved load test target, immutable once resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfiguration {
    /// All request paths are joined onto this URL.
    pub base_url: Url,
    /// The logical environment being targeted.
    pub target_env: TargetEnv,
    /// Value of the `Host` header sent with every request.
    pub host_header: String,
}
impl EnvironmentConfiguration {
    /// Resolve the configuration from the process environment.
    ///
    /// Only fails if `BASE_URL` is set to something that can't be used as a base URL,
    /// so a bad deployment is caught before the first request is made.
    pub fn resolve(variant: DeploymentVariant) -> Result<Self, LoadTestError> {
        Self::resolve_with(variant, |name| std::env::var(name).ok())
    }

    /// Resolve the configuration using `lookup` to read variables.
    ///
    /// Each field is resolved independently: the explicit variable if set and not
    /// empty, otherwise the computed default.
    ///
    /// # Example
    /// ```rust
    /// use shelfware_loadtest::environment::{
    ///     DeploymentVariant, EnvironmentConfiguration, TargetEnv,
    /// };
    ///
    /// let environment = EnvironmentConfiguration::resolve_with(DeploymentVariant::Direct, |name| {
    ///     match name {
    ///         "TARGET_ENV" => Some("TEST".to_string()),
    ///         _ => None,
    ///     }
    /// })
    /// .unwrap();
    /// assert_eq!(environment.base_url.as_str(), "http://172.18.0.5/");
    /// assert_eq!(environment.target_env, TargetEnv::Test);
    /// assert_eq!(environment.host_header, "test.shelfware.local");
    /// ```
    pub fn resolve_with<F>(variant: DeploymentVariant, lookup: F) -> Result<Self, LoadTestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let base_url = match var(BASE_URL_VAR) {
            Some(base_url) => {
                debug!("{} set: {}", BASE_URL_VAR, base_url);
                base_url
            }
            None => variant.default_base_url().to_string(),
        };
        let base_url = util::parse_host(&base_url)?;

        let target_env = var(TARGET_ENV_VAR)
            .map(|value| TargetEnv::parse(&value))
            .unwrap_or_default();
        if let TargetEnv::Unrecognized(value) = &target_env {
            warn!(
                "unrecognized {} '{}', defaulting Host header to {}",
                TARGET_ENV_VAR,
                value,
                target_env.default_host()
            );
        }

        let host_header = var(HOST_HEADER_VAR)
            .unwrap_or_else(|| target_env.default_host().to_string());

        Ok(EnvironmentConfiguration {
            base_url,
            target_env,
            host_header,
        })
    }

    /// Replace the base URL, for example with the `--host` option.
    pub fn set_base_url(mut self, host: &str) -> Result<Self, LoadTestError> {
        self.base_url = util::parse_host(host)?;
        Ok(self)
    }
}
