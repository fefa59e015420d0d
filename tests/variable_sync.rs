//! Integration tests for the remote variable sync pass, driven against a
//! mocked workspace API.

use driftsync::config::{RemoteSettings, SyncSpec};
use driftsync::providers::CipherResolver;
use driftsync::reconcile::variables::{sync_remote, SyncOptions};
use driftsync::remote::types::Workspace;
use driftsync::remote::RemoteClient;
use driftsync::resolver::Resolver;
use driftsync::DriftsyncError;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LEDGER_KEY: &str = "__DRIFTSYNC_VARIABLE_EXPIRATIONS";

fn client(address: String) -> RemoteClient {
    RemoteClient::new(&RemoteSettings {
        address,
        token: "token".to_string(),
        organization: "acme".to_string(),
        workspace: "infra".to_string(),
    })
    .unwrap()
}

fn workspace() -> Workspace {
    Workspace {
        id: "ws-1".to_string(),
        name: "infra".to_string(),
        auto_apply: false,
        operations: true,
        terraform_version: None,
        working_directory: None,
        locked: false,
        current_run_id: None,
        ssh_key_id: None,
    }
}

fn resolver() -> Arc<Resolver> {
    Arc::new(Resolver::new(CipherResolver::new(None, None), None))
}

fn spec(raw: &str) -> SyncSpec {
    toml::from_str(raw).unwrap()
}

fn variable_resource(id: &str, key: &str, value: &str, category: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "type": "vars",
        "attributes": {
            "key": key,
            "value": value,
            "category": category,
            "sensitive": false,
            "hcl": false
        }
    })
}

fn listing(data: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({
        "data": data,
        "meta": { "pagination": { "current-page": 1, "total-pages": 1 } }
    })
}

fn created_variable_response(id: &str, key: &str) -> ResponseTemplate {
    ResponseTemplate::new(201).set_body_json(serde_json::json!({
        "data": {
            "id": id,
            "type": "vars",
            "attributes": {
                "key": key,
                "value": "x",
                "category": "env",
                "sensitive": false,
                "hcl": false
            }
        }
    }))
}

async fn mount_listing(server: &MockServer, data: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path("/api/v2/workspaces/ws-1/vars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(data)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn first_sync_creates_variable_and_ledger() {
    std::env::set_var("SYNC_TEST_FIRST", "value-1");
    let server = MockServer::start().await;
    mount_listing(&server, vec![]).await;

    Mock::given(method("POST"))
        .and(path("/api/v2/workspaces/ws-1/vars"))
        .and(body_partial_json(serde_json::json!({
            "data": { "attributes": { "key": "FOO", "value": "value-1", "category": "env" } }
        })))
        .respond_with(created_variable_response("var-foo", "FOO"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v2/workspaces/ws-1/vars"))
        .and(body_partial_json(serde_json::json!({
            "data": { "attributes": { "key": LEDGER_KEY, "sensitive": false } }
        })))
        .respond_with(created_variable_response("var-ledger", LEDGER_KEY))
        .expect(1)
        .mount(&server)
        .await;

    let spec = spec(r#"
        [remote]
        organization = "acme"
        workspace = { name = "infra" }

        [[envvar]]
        name = "FOO"
        env = { variable = "SYNC_TEST_FIRST" }
        sensitive = false
        ttl_seconds = 900
    "#);

    sync_remote(&client(server.uri()), &workspace(), &spec, resolver(), SyncOptions::default())
        .await
        .unwrap();
    std::env::remove_var("SYNC_TEST_FIRST");
}

#[tokio::test]
async fn live_ttl_entry_makes_second_sync_a_no_op() {
    let server = MockServer::start().await;

    let ledger_value = serde_json::json!({
        "environment": { "FOO": { "ttl": 900, "expire_at": "2099-01-01T00:00:00Z" } }
    })
    .to_string();
    mount_listing(
        &server,
        vec![
            variable_resource("var-foo", "FOO", "value-1", "env"),
            variable_resource("var-ledger", LEDGER_KEY, &ledger_value, "env"),
        ],
    )
    .await;

    for verb in ["POST", "PATCH", "DELETE"] {
        Mock::given(method(verb))
            .and(wiremock::matchers::path_regex("^/api/v2/workspaces/ws-1/vars.*"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
    }

    let spec = spec(r#"
        [remote]
        organization = "acme"
        workspace = { name = "infra" }

        [[envvar]]
        name = "FOO"
        env = { variable = "SYNC_TEST_TTL" }
        ttl_seconds = 900
    "#);

    sync_remote(&client(server.uri()), &workspace(), &spec, resolver(), SyncOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn force_update_refreshes_despite_live_ttl() {
    std::env::set_var("SYNC_TEST_FORCE", "fresh");
    let server = MockServer::start().await;

    let ledger_value = serde_json::json!({
        "environment": { "FOO": { "ttl": 900, "expire_at": "2099-01-01T00:00:00Z" } }
    })
    .to_string();
    mount_listing(
        &server,
        vec![
            variable_resource("var-foo", "FOO", "stale", "env"),
            variable_resource("var-ledger", LEDGER_KEY, &ledger_value, "env"),
        ],
    )
    .await;

    Mock::given(method("PATCH"))
        .and(path("/api/v2/workspaces/ws-1/vars/var-foo"))
        .respond_with(created_variable_response("var-foo", "FOO"))
        .expect(1)
        .mount(&server)
        .await;

    // ledger entry gets a new expiry, so it is written back
    Mock::given(method("PATCH"))
        .and(path("/api/v2/workspaces/ws-1/vars/var-ledger"))
        .respond_with(created_variable_response("var-ledger", LEDGER_KEY))
        .expect(1)
        .mount(&server)
        .await;

    let spec = spec(r#"
        [remote]
        organization = "acme"
        workspace = { name = "infra" }

        [[envvar]]
        name = "FOO"
        env = { variable = "SYNC_TEST_FORCE" }
        sensitive = false
        ttl_seconds = 900
    "#);

    let options = SyncOptions { dry_run: false, force_update: true };
    sync_remote(&client(server.uri()), &workspace(), &spec, resolver(), options)
        .await
        .unwrap();
    std::env::remove_var("SYNC_TEST_FORCE");
}

#[tokio::test]
async fn corrupt_ledger_is_fatal() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        vec![variable_resource("var-ledger", LEDGER_KEY, "not json at all", "env")],
    )
    .await;

    let spec = spec(r#"
        [remote]
        organization = "acme"
        workspace = { name = "infra" }

        [[envvar]]
        name = "FOO"
        env = { variable = "SYNC_TEST_CORRUPT" }
    "#);

    let err = sync_remote(
        &client(server.uri()),
        &workspace(),
        &spec,
        resolver(),
        SyncOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DriftsyncError::CorruptState { .. }));
}

#[tokio::test]
async fn purge_deletes_only_unmanaged_variables() {
    let server = MockServer::start().await;

    // FOO is managed but skipped on TTL grounds; STALE is unmanaged.
    let ledger_value = serde_json::json!({
        "environment": { "FOO": { "ttl": 900, "expire_at": "2099-01-01T00:00:00Z" } }
    })
    .to_string();
    mount_listing(
        &server,
        vec![
            variable_resource("var-foo", "FOO", "value-1", "env"),
            variable_resource("var-stale", "STALE", "old", "env"),
            variable_resource("var-ledger", LEDGER_KEY, &ledger_value, "env"),
        ],
    )
    .await;

    Mock::given(method("DELETE"))
        .and(path("/api/v2/workspaces/ws-1/vars/var-stale"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v2/workspaces/ws-1/vars/var-foo"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let spec = spec(r#"
        [remote]
        organization = "acme"
        workspace = { name = "infra" }
        purge_unmanaged_variables = true

        [[envvar]]
        name = "FOO"
        env = { variable = "SYNC_TEST_PURGE" }
        ttl_seconds = 900
    "#);

    sync_remote(&client(server.uri()), &workspace(), &spec, resolver(), SyncOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn rejected_update_falls_back_to_delete_and_create() {
    std::env::set_var("SYNC_TEST_RECREATE", "v2");
    let server = MockServer::start().await;
    mount_listing(&server, vec![variable_resource("var-foo", "FOO", "v1", "env")]).await;

    Mock::given(method("PATCH"))
        .and(path("/api/v2/workspaces/ws-1/vars/var-foo"))
        .respond_with(ResponseTemplate::new(422).set_body_string("immutable attribute"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v2/workspaces/ws-1/vars/var-foo"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/workspaces/ws-1/vars"))
        .respond_with(created_variable_response("var-foo-2", "FOO"))
        .expect(1)
        .mount(&server)
        .await;

    let spec = spec(r#"
        [remote]
        organization = "acme"
        workspace = { name = "infra" }

        [[envvar]]
        name = "FOO"
        env = { variable = "SYNC_TEST_RECREATE" }
        sensitive = false
    "#);

    sync_remote(&client(server.uri()), &workspace(), &spec, resolver(), SyncOptions::default())
        .await
        .unwrap();
    std::env::remove_var("SYNC_TEST_RECREATE");
}

#[tokio::test]
async fn dry_run_makes_no_mutating_calls() {
    std::env::set_var("SYNC_TEST_DRY", "value");
    let server = MockServer::start().await;
    mount_listing(&server, vec![variable_resource("var-stale", "STALE", "old", "env")]).await;

    for verb in ["POST", "PATCH", "DELETE"] {
        Mock::given(method(verb))
            .and(wiremock::matchers::path_regex("^/api/v2/.*"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
    }

    let spec = spec(r#"
        [remote]
        organization = "acme"
        workspace = { name = "infra" }
        purge_unmanaged_variables = true

        [[envvar]]
        name = "FOO"
        env = { variable = "SYNC_TEST_DRY" }
        ttl_seconds = 900
    "#);

    let options = SyncOptions { dry_run: true, force_update: false };
    sync_remote(&client(server.uri()), &workspace(), &spec, resolver(), options)
        .await
        .unwrap();
    std::env::remove_var("SYNC_TEST_DRY");
}
