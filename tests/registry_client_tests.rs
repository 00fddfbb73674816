//! Registry protocol against a mock server
//!
//! The client is blocking, so every call runs on `spawn_blocking`.

use reqwest::blocking::Client;
use tfingest::IngestError;
use tfingest::Settings;
use tfingest::registry::{Credentials, ModuleRegistry, ProviderVersionSource, RegistryClient, resolve_module};
use tfingest::source::RegistryModule;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn host_of(server: &MockServer) -> String {
    server.address().to_string()
}

fn client_for(host: String, credentials: Credentials) -> RegistryClient {
    let settings = Settings {
        registry_host: host,
        registry_scheme: "http".to_string(),
        cli_config: None,
        ..Settings::default()
    };
    RegistryClient::with_client(Client::new(), credentials, &settings)
}

async fn discovery(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/.well-known/terraform.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "modules.v1": "/api/modules/v1/"
        })))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_resolve_module_version_and_location() {
    let server = MockServer::start().await;
    discovery(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/modules/v1/acme/vpc/aws/versions"))
        .and(header("authorization", "Bearer s3cr3t"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "modules": [{"versions": [
                {"version": "2.9.0"},
                {"version": "3.1.0"},
                {"version": "3.2.0"},
                {"version": "4.0.0"}
            ]}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/modules/v1/acme/vpc/aws/3.2.0/download"))
        .respond_with(
            ResponseTemplate::new(204)
                .insert_header("X-Terraform-Get", "git::https://example.com/acme/vpc.git?ref=v3.2.0"),
        )
        .mount(&server)
        .await;

    let host = host_of(&server);
    let resolved = tokio::task::spawn_blocking(move || {
        let credentials = Credentials::default().with_token(&host, "s3cr3t");
        let client = client_for(host, credentials);
        let module = RegistryModule::parse("acme/vpc/aws").expect("valid address");
        resolve_module(&client, &module, Some("~> 3.0"))
    })
    .await
    .expect("task joins")
    .expect("module resolves");

    assert_eq!(resolved.version, "3.2.0");
    assert_eq!(resolved.location, "git::https://example.com/acme/vpc.git?ref=v3.2.0");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_relative_location_from_json_body() {
    let server = MockServer::start().await;
    discovery(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/modules/v1/acme/vpc/aws/1.0.0/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "location": "./archive.tar.gz"
        })))
        .mount(&server)
        .await;

    let host = host_of(&server);
    let expected = format!("http://{host}/api/modules/v1/acme/vpc/aws/1.0.0/archive.tar.gz");
    let location = tokio::task::spawn_blocking(move || {
        let client = client_for(host, Credentials::default());
        let module = RegistryModule::parse("acme/vpc/aws").expect("valid address");
        client.location(&module, "1.0.0")
    })
    .await
    .expect("task joins")
    .expect("location resolves");

    assert_eq!(location, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_module_is_not_found() {
    let server = MockServer::start().await;
    discovery(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/modules/v1/acme/missing/aws/versions"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let host = host_of(&server);
    let err = tokio::task::spawn_blocking(move || {
        let client = client_for(host, Credentials::default());
        let module = RegistryModule::parse("acme/missing/aws").expect("valid address");
        client.versions(&module)
    })
    .await
    .expect("task joins")
    .expect_err("module is missing");

    assert!(matches!(err, IngestError::ModuleNotFound { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_host_without_discovery_is_not_a_registry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/terraform.json"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let host = host_of(&server);
    let answers = tokio::task::spawn_blocking(move || {
        let client = client_for("registry.terraform.io".to_string(), Credentials::default());
        let first = client.is_registry_host(&host).expect("probe runs");
        let second = client.is_registry_host(&host).expect("probe is cached");
        (first, second)
    })
    .await
    .expect("task joins");

    assert_eq!(answers, (false, false));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_latest_provider_version_skips_prereleases() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/providers/hashicorp/aws/versions"))
        .and(header("X-Terraform-Version", "0.15.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "versions": [
                {"version": "4.9.0", "protocols": ["5.0"]},
                {"version": "5.1.0", "protocols": ["5.0"]},
                {"version": "5.2.0-beta1", "protocols": ["5.0"]}
            ]
        })))
        .mount(&server)
        .await;

    let host = host_of(&server);
    let latest = tokio::task::spawn_blocking(move || {
        client_for(host, Credentials::default()).latest("hashicorp", "aws")
    })
    .await
    .expect("task joins")
    .expect("versions listed");

    assert_eq!(latest, "5.1.0");
}
