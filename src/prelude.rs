pub use crate::config::LoadTestConfiguration;
pub use crate::environment::{DeploymentVariant, EnvironmentConfiguration, TargetEnv};
pub use crate::metrics::{LoadTestMetrics, RequestMetric, RequestMetricAggregate};
pub use crate::profile::{Task, UserProfile};
pub use crate::sampler::WeightedSampler;
pub use crate::user::VirtualUser;
pub use crate::{LoadTest, LoadTestError};
