//! Authenticated HTTP client for the remote workspace API.
//!
//! The API speaks JSON:API: every resource travels as `{id, attributes,
//! relationships}` inside a `data` envelope, attribute names are kebab-case,
//! and collections paginate through `meta.pagination`. The wire structs stay
//! private; callers only see the flattened types from [`crate::remote::types`].

use crate::config::RemoteSettings;
use crate::errors::{DriftsyncError, Result};
use crate::remote::types::{
    ApplyInfo, ApplyStatus, Category, ConfigurationVersion, Plan, PlanStatus, Run, SshKey,
    Variable, VariableAttributes, Workspace, WorkspaceUpdate,
};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const VARIABLES_PAGE_SIZE: u32 = 20;

/// Client for one organization on one remote address.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: reqwest::Client,
    address: String,
    organization: String,
    token: String,
}

// --- JSON:API wire shapes ------------------------------------------------

#[derive(Deserialize)]
struct Document<T> {
    data: T,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Deserialize)]
struct Meta {
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Pagination {
    current_page: u32,
    total_pages: u32,
}

#[derive(Deserialize)]
struct Resource<A> {
    id: String,
    attributes: A,
    #[serde(default)]
    relationships: Relationships,
}

/// Untyped relationship map; only the linked resource ids are ever needed.
#[derive(Deserialize, Default)]
struct Relationships(serde_json::Map<String, serde_json::Value>);

impl Relationships {
    fn id(&self, name: &str) -> Option<String> {
        self.0.get(name)?.get("data")?.get("id")?.as_str().map(str::to_string)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct WorkspaceAttributes {
    name: String,
    #[serde(default)]
    auto_apply: bool,
    #[serde(default = "default_true")]
    operations: bool,
    terraform_version: Option<String>,
    working_directory: Option<String>,
    #[serde(default)]
    locked: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct VariableWireAttributes {
    key: String,
    value: Option<String>,
    category: Category,
    #[serde(default)]
    sensitive: bool,
    #[serde(default)]
    hcl: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConfigurationVersionAttributes {
    upload_url: String,
}

#[derive(Deserialize)]
struct RunAttributes {
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PlanAttributes {
    status: PlanStatus,
    #[serde(default)]
    has_changes: bool,
    log_read_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ApplyAttributes {
    status: ApplyStatus,
    log_read_url: Option<String>,
}

#[derive(Deserialize)]
struct SshKeyAttributes {
    name: String,
}

fn workspace_from(resource: Resource<WorkspaceAttributes>) -> Workspace {
    Workspace {
        id: resource.id,
        name: resource.attributes.name,
        auto_apply: resource.attributes.auto_apply,
        operations: resource.attributes.operations,
        terraform_version: resource.attributes.terraform_version,
        working_directory: resource.attributes.working_directory,
        locked: resource.attributes.locked,
        current_run_id: resource.relationships.id("current-run"),
        ssh_key_id: resource.relationships.id("ssh-key"),
    }
}

fn variable_from(resource: Resource<VariableWireAttributes>) -> Variable {
    Variable {
        id: resource.id,
        key: resource.attributes.key,
        value: resource.attributes.value,
        category: resource.attributes.category,
        sensitive: resource.attributes.sensitive,
        hcl: resource.attributes.hcl,
    }
}

fn run_from(resource: Resource<RunAttributes>) -> Run {
    Run {
        id: resource.id,
        status: resource.attributes.status,
        plan_id: resource.relationships.id("plan"),
        apply_id: resource.relationships.id("apply"),
    }
}

// --- Client ---------------------------------------------------------------

impl RemoteClient {
    pub fn new(settings: &RemoteSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            address: settings.address.clone(),
            organization: settings.organization.clone(),
            token: settings.token.clone(),
        })
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2{}", self.address, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = self.url(path);
        debug!("{} {}", method, url);
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/vnd.api+json")
    }

    /// Check the response status, mapping 404 to NotFound and any other
    /// failure to a transport error carrying the response body.
    async fn checked(
        response: reqwest::Response,
        resource_type: &str,
        id: &str,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DriftsyncError::not_found(resource_type, id));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriftsyncError::transport(format!(
                "request for {} '{}' failed with status {}: {}",
                resource_type, id, status, body
            )));
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| DriftsyncError::serialization(e, format!("remote response: {}", body)))
    }

    // --- Workspaces --------------------------------------------------------

    pub async fn read_workspace(&self, name: &str) -> Result<Workspace> {
        let path = format!("/organizations/{}/workspaces/{}", self.organization, name);
        let response = self.request(reqwest::Method::GET, &path).send().await?;
        let response = Self::checked(response, "workspace", name).await?;
        let document: Document<Resource<WorkspaceAttributes>> = Self::decode(response).await?;
        Ok(workspace_from(document.data))
    }

    pub async fn create_workspace(&self, name: &str) -> Result<Workspace> {
        let path = format!("/organizations/{}/workspaces", self.organization);
        let body = serde_json::json!({
            "data": {
                "type": "workspaces",
                "attributes": { "name": name },
            }
        });
        let response = self.request(reqwest::Method::POST, &path).json(&body).send().await?;
        let response = Self::checked(response, "workspace", name).await?;
        let document: Document<Resource<WorkspaceAttributes>> = Self::decode(response).await?;
        Ok(workspace_from(document.data))
    }

    pub async fn update_workspace(
        &self,
        workspace_id: &str,
        update: &WorkspaceUpdate,
    ) -> Result<Workspace> {
        let path = format!("/workspaces/{}", workspace_id);
        let body = serde_json::json!({
            "data": {
                "type": "workspaces",
                "attributes": update,
            }
        });
        let response = self.request(reqwest::Method::PATCH, &path).json(&body).send().await?;
        let response = Self::checked(response, "workspace", workspace_id).await?;
        let document: Document<Resource<WorkspaceAttributes>> = Self::decode(response).await?;
        Ok(workspace_from(document.data))
    }

    // --- Variables -----------------------------------------------------------

    /// List every variable in the workspace, walking all pages.
    pub async fn list_variables(&self, workspace_id: &str) -> Result<Vec<Variable>> {
        let mut variables = Vec::new();
        let mut page = 1u32;

        loop {
            let path = format!(
                "/workspaces/{}/vars?page%5Bnumber%5D={}&page%5Bsize%5D={}",
                workspace_id, page, VARIABLES_PAGE_SIZE
            );
            let response = self.request(reqwest::Method::GET, &path).send().await?;
            let response = Self::checked(response, "workspace variables", workspace_id).await?;
            let document: Document<Vec<Resource<VariableWireAttributes>>> =
                Self::decode(response).await?;

            variables.extend(document.data.into_iter().map(variable_from));

            match document.meta.and_then(|m| m.pagination) {
                Some(pagination) if pagination.current_page < pagination.total_pages => {
                    page = pagination.current_page + 1;
                }
                _ => break,
            }
        }

        Ok(variables)
    }

    pub async fn create_variable(
        &self,
        workspace_id: &str,
        attributes: &VariableAttributes,
    ) -> Result<Variable> {
        let path = format!("/workspaces/{}/vars", workspace_id);
        let body = serde_json::json!({
            "data": {
                "type": "vars",
                "attributes": attributes,
            }
        });
        let response = self.request(reqwest::Method::POST, &path).json(&body).send().await?;
        let response = Self::checked(response, "variable", &attributes.key).await?;
        let document: Document<Resource<VariableWireAttributes>> = Self::decode(response).await?;
        Ok(variable_from(document.data))
    }

    pub async fn update_variable(
        &self,
        workspace_id: &str,
        variable_id: &str,
        attributes: &VariableAttributes,
    ) -> Result<Variable> {
        let path = format!("/workspaces/{}/vars/{}", workspace_id, variable_id);
        let body = serde_json::json!({
            "data": {
                "type": "vars",
                "id": variable_id,
                "attributes": attributes,
            }
        });
        let response = self.request(reqwest::Method::PATCH, &path).json(&body).send().await?;
        let response = Self::checked(response, "variable", &attributes.key).await?;
        let document: Document<Resource<VariableWireAttributes>> = Self::decode(response).await?;
        Ok(variable_from(document.data))
    }

    pub async fn delete_variable(&self, workspace_id: &str, variable_id: &str) -> Result<()> {
        let path = format!("/workspaces/{}/vars/{}", workspace_id, variable_id);
        let response = self.request(reqwest::Method::DELETE, &path).send().await?;
        Self::checked(response, "variable", variable_id).await?;
        Ok(())
    }

    // --- Configuration versions ---------------------------------------------

    /// Create a configuration version with automatic run queueing disabled;
    /// runs are created explicitly after the upload.
    pub async fn create_configuration_version(
        &self,
        workspace_id: &str,
    ) -> Result<ConfigurationVersion> {
        let path = format!("/workspaces/{}/configuration-versions", workspace_id);
        let body = serde_json::json!({
            "data": {
                "type": "configuration-versions",
                "attributes": { "auto-queue-runs": false },
            }
        });
        let response = self.request(reqwest::Method::POST, &path).json(&body).send().await?;
        let response = Self::checked(response, "configuration version", workspace_id).await?;
        let document: Document<Resource<ConfigurationVersionAttributes>> =
            Self::decode(response).await?;
        Ok(ConfigurationVersion {
            id: document.data.id,
            upload_url: document.data.attributes.upload_url,
        })
    }

    /// Archive `directory` as tar.gz and PUT it to the pre-signed upload URL.
    /// The URL carries its own authorization; no bearer token is attached.
    pub async fn upload_configuration(&self, upload_url: &str, directory: &Path) -> Result<()> {
        let archive = build_archive(directory)?;

        let response = self
            .client
            .put(upload_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(archive)
            .send()
            .await?;
        Self::checked(response, "configuration upload", upload_url).await?;
        Ok(())
    }

    // --- Runs -----------------------------------------------------------------

    pub async fn create_run(
        &self,
        workspace_id: &str,
        configuration_version_id: &str,
        message: &str,
    ) -> Result<Run> {
        let body = serde_json::json!({
            "data": {
                "type": "runs",
                "attributes": { "message": message },
                "relationships": {
                    "workspace": {
                        "data": { "type": "workspaces", "id": workspace_id }
                    },
                    "configuration-version": {
                        "data": { "type": "configuration-versions", "id": configuration_version_id }
                    },
                }
            }
        });
        let response = self.request(reqwest::Method::POST, "/runs").json(&body).send().await?;
        let response = Self::checked(response, "run", workspace_id).await?;
        let document: Document<Resource<RunAttributes>> = Self::decode(response).await?;
        Ok(run_from(document.data))
    }

    pub async fn read_run(&self, run_id: &str) -> Result<Run> {
        let path = format!("/runs/{}", run_id);
        let response = self.request(reqwest::Method::GET, &path).send().await?;
        let response = Self::checked(response, "run", run_id).await?;
        let document: Document<Resource<RunAttributes>> = Self::decode(response).await?;
        Ok(run_from(document.data))
    }

    pub async fn apply_run(&self, run_id: &str, comment: &str) -> Result<()> {
        let path = format!("/runs/{}/actions/apply", run_id);
        let body = serde_json::json!({ "comment": comment });
        let response = self.request(reqwest::Method::POST, &path).json(&body).send().await?;
        Self::checked(response, "run", run_id).await?;
        Ok(())
    }

    pub async fn discard_run(&self, run_id: &str, comment: &str) -> Result<()> {
        let path = format!("/runs/{}/actions/discard", run_id);
        let body = serde_json::json!({ "comment": comment });
        let response = self.request(reqwest::Method::POST, &path).json(&body).send().await?;
        Self::checked(response, "run", run_id).await?;
        Ok(())
    }

    pub async fn read_plan(&self, plan_id: &str) -> Result<Plan> {
        let path = format!("/plans/{}", plan_id);
        let response = self.request(reqwest::Method::GET, &path).send().await?;
        let response = Self::checked(response, "plan", plan_id).await?;
        let document: Document<Resource<PlanAttributes>> = Self::decode(response).await?;
        Ok(Plan {
            id: document.data.id,
            status: document.data.attributes.status,
            has_changes: document.data.attributes.has_changes,
            log_read_url: document.data.attributes.log_read_url,
        })
    }

    pub async fn read_apply(&self, apply_id: &str) -> Result<ApplyInfo> {
        let path = format!("/applies/{}", apply_id);
        let response = self.request(reqwest::Method::GET, &path).send().await?;
        let response = Self::checked(response, "apply", apply_id).await?;
        let document: Document<Resource<ApplyAttributes>> = Self::decode(response).await?;
        Ok(ApplyInfo {
            id: document.data.id,
            status: document.data.attributes.status,
            log_read_url: document.data.attributes.log_read_url,
        })
    }

    /// Stream a log file to `out`, chunk by chunk, in arrival order.
    /// Log URLs are pre-signed like upload URLs.
    pub async fn stream_logs(&self, url: &str, out: &mut dyn std::io::Write) -> Result<()> {
        let response = self.client.get(url).send().await?;
        let response = Self::checked(response, "log", url).await?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            out.write_all(&chunk)
                .map_err(|e| DriftsyncError::io(e, "writing run logs"))?;
        }
        out.flush().map_err(|e| DriftsyncError::io(e, "flushing run logs"))?;
        Ok(())
    }

    // --- SSH keys ---------------------------------------------------------------

    pub async fn list_ssh_keys(&self) -> Result<Vec<SshKey>> {
        let path = format!("/organizations/{}/ssh-keys", self.organization);
        let response = self.request(reqwest::Method::GET, &path).send().await?;
        let response = Self::checked(response, "ssh keys", &self.organization).await?;
        let document: Document<Vec<Resource<SshKeyAttributes>>> = Self::decode(response).await?;
        Ok(document
            .data
            .into_iter()
            .map(|resource| SshKey { id: resource.id, name: resource.attributes.name })
            .collect())
    }

    /// Assign an SSH key to the workspace; `None` unassigns the current one.
    pub async fn assign_ssh_key(
        &self,
        workspace_id: &str,
        ssh_key_id: Option<&str>,
    ) -> Result<()> {
        let path = format!("/workspaces/{}/relationships/ssh-key", workspace_id);
        let body = serde_json::json!({
            "data": {
                "type": "workspaces",
                "attributes": { "id": ssh_key_id },
            }
        });
        let response = self.request(reqwest::Method::PATCH, &path).json(&body).send().await?;
        Self::checked(response, "workspace ssh key", workspace_id).await?;
        Ok(())
    }
}

/// Build an in-memory tar.gz archive of a directory's contents.
fn build_archive(directory: &Path) -> Result<Vec<u8>> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder
        .append_dir_all(".", directory)
        .map_err(|e| DriftsyncError::io(e, format!("archiving {}", directory.display())))?;
    let encoder = builder
        .into_inner()
        .map_err(|e| DriftsyncError::io(e, "finalizing configuration archive"))?;
    encoder
        .finish()
        .map_err(|e| DriftsyncError::io(e, "compressing configuration archive"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VariableKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(address: String) -> RemoteClient {
        RemoteClient::new(&RemoteSettings {
            address,
            token: "token".to_string(),
            organization: "acme".to_string(),
            workspace: "infra".to_string(),
        })
        .unwrap()
    }

    fn workspace_body(id: &str, name: &str) -> serde_json::Value {
        serde_json::json!({
            "data": {
                "id": id,
                "type": "workspaces",
                "attributes": {
                    "name": name,
                    "auto-apply": false,
                    "operations": true,
                    "terraform-version": "1.9.0",
                    "working-directory": null,
                    "locked": false
                },
                "relationships": {
                    "ssh-key": { "data": { "type": "ssh-keys", "id": "sshkey-1" } }
                }
            }
        })
    }

    #[tokio::test]
    async fn test_read_workspace_flattens_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/organizations/acme/workspaces/infra"))
            .respond_with(ResponseTemplate::new(200).set_body_json(workspace_body("ws-1", "infra")))
            .mount(&server)
            .await;

        let workspace = client(server.uri()).read_workspace("infra").await.unwrap();
        assert_eq!(workspace.id, "ws-1");
        assert!(workspace.operations);
        assert_eq!(workspace.terraform_version.as_deref(), Some("1.9.0"));
        assert_eq!(workspace.ssh_key_id.as_deref(), Some("sshkey-1"));
        assert_eq!(workspace.current_run_id, None);
    }

    #[tokio::test]
    async fn test_missing_workspace_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/organizations/acme/workspaces/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(server.uri()).read_workspace("ghost").await.unwrap_err();
        assert!(matches!(err, DriftsyncError::NotFound { .. }));
    }

    fn variable_page(
        keys: &[&str],
        current_page: u32,
        total_pages: u32,
    ) -> serde_json::Value {
        let data: Vec<serde_json::Value> = keys
            .iter()
            .map(|key| {
                serde_json::json!({
                    "id": format!("var-{}", key),
                    "type": "vars",
                    "attributes": {
                        "key": key,
                        "value": "x",
                        "category": "terraform",
                        "sensitive": false,
                        "hcl": false
                    }
                })
            })
            .collect();
        serde_json::json!({
            "data": data,
            "meta": {
                "pagination": { "current-page": current_page, "total-pages": total_pages }
            }
        })
    }

    #[tokio::test]
    async fn test_list_variables_walks_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/workspaces/ws-1/vars"))
            .and(query_param("page[number]", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(variable_page(&["a"], 1, 2)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/workspaces/ws-1/vars"))
            .and(query_param("page[number]", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(variable_page(&["b"], 2, 2)))
            .mount(&server)
            .await;

        let variables = client(server.uri()).list_variables("ws-1").await.unwrap();
        let keys: Vec<&str> = variables.iter().map(|v| v.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_create_variable_posts_attributes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/workspaces/ws-1/vars"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": {
                    "id": "var-new",
                    "type": "vars",
                    "attributes": {
                        "key": "db_password",
                        "value": null,
                        "category": "terraform",
                        "sensitive": true,
                        "hcl": false
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let attributes = VariableAttributes {
            key: "db_password".to_string(),
            value: "hunter2".to_string(),
            category: Category::from(VariableKind::Terraform),
            sensitive: true,
            hcl: false,
        };
        let variable =
            client(server.uri()).create_variable("ws-1", &attributes).await.unwrap();
        assert_eq!(variable.id, "var-new");
        assert!(variable.sensitive);
        assert_eq!(variable.value, None);
    }

    #[tokio::test]
    async fn test_read_plan_maps_unknown_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/plans/plan-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "id": "plan-1",
                    "type": "plans",
                    "attributes": {
                        "status": "cost_estimating",
                        "has-changes": true,
                        "log-read-url": "https://logs.example/plan-1"
                    }
                }
            })))
            .mount(&server)
            .await;

        let plan = client(server.uri()).read_plan("plan-1").await.unwrap();
        assert_eq!(plan.status, PlanStatus::Unknown);
        assert!(plan.has_changes);
    }

    #[tokio::test]
    async fn test_run_relationships_extract_plan_and_apply() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/runs/run-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "id": "run-1",
                    "type": "runs",
                    "attributes": { "status": "planned" },
                    "relationships": {
                        "plan": { "data": { "type": "plans", "id": "plan-1" } },
                        "apply": { "data": { "type": "applies", "id": "apply-1" } }
                    }
                }
            })))
            .mount(&server)
            .await;

        let run = client(server.uri()).read_run("run-1").await.unwrap();
        assert_eq!(run.plan_id.as_deref(), Some("plan-1"));
        assert_eq!(run.apply_id.as_deref(), Some("apply-1"));
    }

    #[tokio::test]
    async fn test_stream_logs_writes_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logs/plan-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("plan output line\n"))
            .mount(&server)
            .await;

        let mut out = Vec::new();
        client(server.uri())
            .stream_logs(&format!("{}/logs/plan-1", server.uri()), &mut out)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "plan output line\n");
    }

    #[test]
    fn test_build_archive_produces_gzip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.tf"), "resource {}\n").unwrap();

        let archive = build_archive(dir.path()).unwrap();
        // gzip magic bytes
        assert_eq!(&archive[..2], &[0x1f, 0x8b]);
    }
}
