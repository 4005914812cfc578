use httpmock::Method::GET;
use httpmock::MockServer;
use serial_test::serial;

mod common;

use shelfware_loadtest::prelude::*;

#[test]
#[serial]
fn test_unset_variables() {
    common::clear_environment();

    let environment = EnvironmentConfiguration::resolve(DeploymentVariant::Gateway).unwrap();
    assert_eq!(environment.target_env, TargetEnv::Prod);
    assert_eq!(
        environment.base_url.as_str(),
        "http://shelfware-gateway-istio.istio-system.svc.cluster.local/"
    );
    assert_eq!(environment.host_header, "shelfware.local");

    let environment = EnvironmentConfiguration::resolve(DeploymentVariant::Direct).unwrap();
    assert_eq!(environment.base_url.as_str(), "http://172.18.0.5/");
    assert_eq!(environment.host_header, "shelfware.local");
}

#[test]
#[serial]
fn test_target_env_test() {
    for value in &["test", "TEST", "Test"] {
        common::set_environment(&[("TARGET_ENV", value)]);
        let environment = EnvironmentConfiguration::resolve(DeploymentVariant::Gateway).unwrap();
        assert_eq!(environment.target_env, TargetEnv::Test);
        assert_eq!(environment.host_header, "test.shelfware.local");
    }
    common::clear_environment();
}

#[test]
#[serial]
fn test_target_env_unrecognized() {
    common::set_environment(&[("TARGET_ENV", "acceptance")]);
    let environment = EnvironmentConfiguration::resolve(DeploymentVariant::Gateway).unwrap();
    assert_eq!(
        environment.target_env,
        TargetEnv::Unrecognized("acceptance".to_string())
    );
    assert_eq!(environment.host_header, "shelfware.local");
    common::clear_environment();
}

#[test]
#[serial]
fn test_host_header_override() {
    for target_env in &["prod", "test", "acceptance"] {
        common::set_environment(&[
            ("TARGET_ENV", target_env),
            ("HOST_HEADER", "perf.shelfware.local"),
        ]);
        let environment = EnvironmentConfiguration::resolve(DeploymentVariant::Gateway).unwrap();
        assert_eq!(environment.host_header, "perf.shelfware.local");
    }
    common::clear_environment();
}

#[test]
#[serial]
fn test_base_url_override() {
    common::set_environment(&[("BASE_URL", "http://10.0.0.7:8080")]);
    let environment = EnvironmentConfiguration::resolve(DeploymentVariant::Direct).unwrap();
    assert_eq!(environment.base_url.as_str(), "http://10.0.0.7:8080/");
    common::clear_environment();
}

#[test]
#[serial]
fn test_malformed_base_url() {
    common::set_environment(&[("BASE_URL", "shelfware-gateway")]);
    match EnvironmentConfiguration::resolve(DeploymentVariant::Gateway) {
        Err(LoadTestError::InvalidHost { host, .. }) => assert_eq!(host, "shelfware-gateway"),
        other => panic!("expected InvalidHost, got {:?}", other),
    }
    common::clear_environment();
}

/// A malformed BASE_URL stops the load test before any request is made.
#[tokio::test]
#[serial]
async fn test_malformed_base_url_fails_fast() {
    let server = MockServer::start();
    let index = server.mock(|when, then| {
        when.method(GET);
        then.status(200);
    });

    common::set_environment(&[("BASE_URL", "not a url")]);
    let mut configuration = common::build_configuration(&server, vec![]);
    // Let BASE_URL decide the target.
    configuration.host = String::new();

    let result = LoadTest::initialize_with_config(configuration)
        .execute()
        .await;
    common::clear_environment();

    match result {
        Err(LoadTestError::InvalidHost { host, .. }) => assert_eq!(host, "not a url"),
        Err(e) => panic!("expected InvalidHost, got {}", e),
        Ok(_) => panic!("expected InvalidHost, load test ran"),
    }
    assert_eq!(index.calls(), 0);
}

/// An unknown DEPLOYMENT_VARIANT is rejected before any request is made.
#[tokio::test]
#[serial]
async fn test_invalid_deployment_variant() {
    let server = MockServer::start();
    let index = server.mock(|when, then| {
        when.method(GET);
        then.status(200);
    });

    common::set_environment(&[("DEPLOYMENT_VARIANT", "mesh")]);
    let configuration = common::build_configuration(&server, vec![]);
    let result = LoadTest::initialize_with_config(configuration)
        .execute()
        .await;
    common::clear_environment();

    match result {
        Err(LoadTestError::InvalidOption { option, value, .. }) => {
            assert_eq!(option, "DEPLOYMENT_VARIANT");
            assert_eq!(value, "mesh");
        }
        Err(e) => panic!("expected InvalidOption, got {}", e),
        Ok(_) => panic!("expected InvalidOption, load test ran"),
    }
    assert_eq!(index.calls(), 0);
}

/// A HOST_HEADER that can't be sent is reported by its variable name.
#[tokio::test]
#[serial]
async fn test_invalid_host_header() {
    let server = MockServer::start();
    let index = server.mock(|when, then| {
        when.method(GET);
        then.status(200);
    });

    common::set_environment(&[("HOST_HEADER", "shelfware\rlocal")]);
    let configuration = common::build_configuration(&server, vec![]);
    let result = LoadTest::initialize_with_config(configuration)
        .execute()
        .await;
    common::clear_environment();

    match result {
        Err(LoadTestError::InvalidOption { option, .. }) => assert_eq!(option, "HOST_HEADER"),
        Err(e) => panic!("expected InvalidOption, got {}", e),
        Ok(_) => panic!("expected InvalidOption, load test ran"),
    }
    assert_eq!(index.calls(), 0);
}
