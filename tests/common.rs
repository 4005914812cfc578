use gumdrop::Options;
use httpmock::MockServer;

use shelfware_loadtest::config::LoadTestConfiguration;
use shelfware_loadtest::environment::{DeploymentVariant, EnvironmentConfiguration};
use shelfware_loadtest::metrics::LoadTestMetrics;
use shelfware_loadtest::LoadTest;

/// Every environment variable read by the load test.
pub const ENVIRONMENT_VARIABLES: [&str; 4] =
    ["BASE_URL", "TARGET_ENV", "HOST_HEADER", "DEPLOYMENT_VARIANT"];

/// Not all functions are used by all tests, so we enable allow(dead_code) to avoid
/// compiler warnings during testing.

/// The following options are configured by default, if not set to a custom value:
///  --host <mock-server>
///  --users 1
///  --run-time 5
#[allow(dead_code)]
pub fn build_configuration(server: &MockServer, custom: Vec<&str>) -> LoadTestConfiguration {
    // Start with an empty configuration.
    let mut configuration: Vec<&str> = vec![];
    // Declare server_url here no matter what, so its lifetime is sufficient when needed.
    let server_url = server.base_url();

    // Merge in all custom options first.
    configuration.extend_from_slice(&custom);

    // Default to using mock server if not otherwise configured.
    if !configuration.contains(&"--host") {
        configuration.extend_from_slice(&["--host", &server_url]);
    }

    // Default to testing with 1 user if not otherwise configured.
    if !configuration.contains(&"--users") {
        configuration.extend_from_slice(&["--users", "1"]);
    }

    // Never run longer than 5 seconds if not otherwise configured.
    if !configuration.contains(&"--run-time") {
        configuration.extend_from_slice(&["--run-time", "5"]);
    }

    // Parse these options to generate a LoadTestConfiguration.
    LoadTestConfiguration::parse_args_default(&configuration)
        .expect("failed to parse options and generate a configuration")
}

/// Run the actual load test, returning the LoadTestMetrics.
#[allow(dead_code)]
pub async fn run_load_test(configuration: LoadTestConfiguration) -> LoadTestMetrics {
    LoadTest::initialize_with_config(configuration)
        .execute()
        .await
        .expect("load test failed")
}

/// Resolve an environment pointing at the mock server, with optional variables.
#[allow(dead_code)]
pub fn build_environment(
    server: &MockServer,
    variables: &[(&str, &str)],
) -> EnvironmentConfiguration {
    let base_url = server.base_url();
    EnvironmentConfiguration::resolve_with(DeploymentVariant::Direct, |name| {
        if name == "BASE_URL" {
            return Some(base_url.clone());
        }
        variables
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    })
    .expect("failed to resolve environment")
}

/// Remove all environment variables read by the load test. Callers must be `#[serial]`.
#[allow(dead_code)]
pub fn clear_environment() {
    for variable in &ENVIRONMENT_VARIABLES {
        std::env::remove_var(variable);
    }
}

/// Set environment variables read by the load test. Callers must be `#[serial]`.
#[allow(dead_code)]
pub fn set_environment(variables: &[(&str, &str)]) {
    clear_environment();
    for (name, value) in variables {
        std::env::set_var(name, value);
    }
}

/// Helper to delete test artifacts, if existing.
#[allow(dead_code)]
pub fn cleanup_files(files: Vec<&str>) {
    for file in files {
        if std::path::Path::new(file).exists() {
            std::fs::remove_file(file).expect("failed to remove file");
        }
    }
}
