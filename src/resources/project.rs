use crate::core::client::{not_found_as_none, ApiClient};
use crate::core::import_id::ProjectImportId;
use crate::domain::model::{PgSettings, Provisioner, ResourceKind};
use crate::domain::ports::Resource;
use crate::resources::branch::Branch;
use crate::resources::database::Database;
use crate::resources::endpoint::Endpoint;
use crate::resources::role::Role;
use crate::utils::error::{ProviderError, Result};
use crate::utils::validation::{self, Validate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioner: Option<Provisioner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pg_version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoscaling_limit_min_cu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoscaling_limit_max_cu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<PgSettings>,
}

impl Validate for ProjectSpec {
    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validation::validate_non_empty_string("project.name", name)?;
        }
        if let Some(pg_version) = self.pg_version {
            validation::validate_one_of("project.pg_version", &pg_version, &[14, 15])?;
        }
        if self.provisioner == Some(Provisioner::Unknown) {
            return Err(ProviderError::InvalidConfigValueError {
                field: "project.provisioner".to_string(),
                value: "unknown".to_string(),
                reason: "Value must be one of: k8s-pod, k8s-neonvm, docker".to_string(),
            });
        }
        validation::validate_cu_range(
            "project.autoscaling_limit",
            self.autoscaling_limit_min_cu,
            self.autoscaling_limit_max_cu,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionUri {
    pub connection_uri: String,
}

/// 專案狀態；建立時一併回傳的集合只會出現在建立回應中
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub platform_id: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    #[serde(default)]
    pub provisioner: Option<Provisioner>,
    #[serde(default)]
    pub pg_version: Option<u32>,
    #[serde(default)]
    pub autoscaling_limit_min_cu: Option<f64>,
    #[serde(default)]
    pub autoscaling_limit_max_cu: Option<f64>,
    #[serde(default)]
    pub settings: Option<PgSettings>,
    #[serde(default)]
    pub proxy_host: Option<String>,
    #[serde(default)]
    pub maintenance_starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub connection_uris: Vec<ConnectionUri>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub databases: Vec<Database>,
    #[serde(default)]
    pub branch: Option<Branch>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl Project {
    fn keep_collections_from(mut self, prior: &Project) -> Self {
        self.connection_uris = prior.connection_uris.clone();
        self.roles = prior.roles.clone();
        self.databases = prior.databases.clone();
        self.branch = prior.branch.clone();
        self.endpoints = prior.endpoints.clone();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ProjectEnvelope {
    project: Project,
}

#[derive(Debug, Deserialize)]
struct ProjectCreateResponse {
    project: Project,
    #[serde(default)]
    connection_uris: Vec<ConnectionUri>,
    #[serde(default)]
    roles: Vec<Role>,
    #[serde(default)]
    databases: Vec<Database>,
    #[serde(default)]
    branch: Option<Branch>,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

impl ProjectCreateResponse {
    fn into_project(self) -> Project {
        let project_id = self.project.id.clone();
        let mut project = self.project;
        project.connection_uris = self.connection_uris;
        // 建立回應中的角色與資料庫不含 project_id
        project.roles = self
            .roles
            .into_iter()
            .map(|mut role| {
                role.project_id = project_id.clone();
                role
            })
            .collect();
        project.databases = self
            .databases
            .into_iter()
            .map(|mut database| {
                database.project_id = project_id.clone();
                database
            })
            .collect();
        project.branch = self.branch;
        project.endpoints = self.endpoints;
        project
    }
}

#[derive(Debug, Serialize)]
struct ProjectRequest<'a, T: Serialize> {
    project: &'a T,
}

#[derive(Debug, Serialize)]
struct ProjectUpdateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    autoscaling_limit_min_cu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    autoscaling_limit_max_cu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    settings: Option<&'a PgSettings>,
}

pub struct ProjectResource {
    client: ApiClient,
}

impl ProjectResource {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, id: &str) -> Result<Option<Project>> {
        let envelope: Option<ProjectEnvelope> =
            not_found_as_none(self.client.get(&format!("/projects/{}", id)).await)?;
        Ok(envelope.map(|e| e.project))
    }
}

#[async_trait]
impl Resource for ProjectResource {
    type Spec = ProjectSpec;
    type State = Project;

    const KIND: ResourceKind = ResourceKind::Project;
    const REPLACE_ON_CHANGE: &'static [&'static str] = &["region_id", "pg_version", "provisioner"];

    async fn create(&self, spec: &ProjectSpec) -> Result<Project> {
        let response: ProjectCreateResponse = self
            .client
            .post("/projects", &ProjectRequest { project: spec })
            .await?;
        let project = response.into_project();
        tracing::info!("🆕 Created project {} ({})", project.name, project.id);
        Ok(project)
    }

    async fn read(&self, prior: &Project) -> Result<Option<Project>> {
        Ok(self
            .fetch(&prior.id)
            .await?
            .map(|project| project.keep_collections_from(prior)))
    }

    async fn update(&self, spec: &ProjectSpec, prior: &Project) -> Result<Project> {
        let body = ProjectUpdateBody {
            name: spec.name.as_deref(),
            autoscaling_limit_min_cu: spec.autoscaling_limit_min_cu,
            autoscaling_limit_max_cu: spec.autoscaling_limit_max_cu,
            settings: spec.settings.as_ref(),
        };
        let envelope: ProjectEnvelope = self
            .client
            .patch(
                &format!("/projects/{}", prior.id),
                &ProjectRequest { project: &body },
            )
            .await?;
        tracing::info!("✏️ Updated project {}", prior.id);
        Ok(envelope.project.keep_collections_from(prior))
    }

    async fn delete(&self, state: &Project) -> Result<()> {
        self.client
            .delete(&format!("/projects/{}", state.id))
            .await?;
        tracing::info!("🗑️ Deleted project {}", state.id);
        Ok(())
    }

    async fn import(&self, id: &str) -> Result<Project> {
        let import_id = ProjectImportId::parse(id)?;
        self.fetch(&import_id.id)
            .await?
            .ok_or_else(|| ProviderError::NotFoundError {
                path: format!("/projects/{}", import_id.id),
            })
    }

    fn import_id(state: &Project) -> String {
        state.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use httpmock::Method::PATCH;
    use serde_json::json;
    use std::time::Duration;

    fn resource(server: &MockServer) -> ProjectResource {
        let client = ApiClient::new(&server.base_url(), "test-key", Duration::from_secs(5))
            .unwrap()
            .with_retry(0, Duration::from_millis(0));
        ProjectResource::new(client)
    }

    fn project_json(name: &str) -> serde_json::Value {
        json!({
            "id": "proj-1",
            "platform_id": "aws",
            "region_id": "aws-us-east-2",
            "name": name,
            "provisioner": "k8s-pod",
            "pg_version": 15,
            "autoscaling_limit_min_cu": 0.25,
            "autoscaling_limit_max_cu": 1,
            "proxy_host": "us-east-2.aws.neon.tech",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_create_keeps_returned_collections() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/projects")
                    .json_body_partial(r#"{"project": {"name": "main", "pg_version": 15}}"#);
                then.status(201).json_body(json!({
                    "project": project_json("main"),
                    "connection_uris": [{"connection_uri": "postgres://owner@host/neondb"}],
                    "roles": [{"branch_id": "br-1", "name": "owner", "password": "secret", "protected": false}],
                    "databases": [{"id": 7, "branch_id": "br-1", "name": "neondb", "owner_name": "owner"}],
                    "branch": {"id": "br-1", "project_id": "proj-1", "name": "main", "current_state": "init"},
                    "endpoints": [{"id": "ep-1", "host": "ep-1.neon.tech", "project_id": "proj-1", "branch_id": "br-1", "type": "read_write", "current_state": "init"}]
                }));
            })
            .await;

        let spec = ProjectSpec {
            name: Some("main".to_string()),
            pg_version: Some(15),
            ..Default::default()
        };
        let project = Resource::create(&resource(&server), &spec).await.unwrap();

        mock.assert_async().await;
        assert_eq!(project.id, "proj-1");
        assert_eq!(project.provisioner, Some(Provisioner::K8sPod));
        assert_eq!(project.autoscaling_limit_max_cu, Some(1.0));
        assert_eq!(project.roles[0].project_id, "proj-1");
        assert_eq!(project.databases[0].project_id, "proj-1");
        assert_eq!(project.branch.as_ref().map(|b| b.id.as_str()), Some("br-1"));
        assert_eq!(project.connection_uris.len(), 1);
    }

    #[tokio::test]
    async fn test_read_retains_collections_and_handles_gone() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/projects/proj-1");
                then.status(200).json_body(json!({"project": project_json("renamed")}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/projects/proj-gone");
                then.status(404).json_body(json!({"message": "project not found"}));
            })
            .await;

        let resource = resource(&server);
        let mut prior: Project = serde_json::from_value(project_json("main")).unwrap();
        prior.connection_uris = vec![ConnectionUri {
            connection_uri: "postgres://x".to_string(),
        }];

        let refreshed = Resource::read(&resource, &prior).await.unwrap().unwrap();
        assert_eq!(refreshed.name, "renamed");
        assert_eq!(refreshed.connection_uris, prior.connection_uris);

        prior.id = "proj-gone".to_string();
        assert!(Resource::read(&resource, &prior).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_sends_mutable_fields_only() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/projects/proj-1")
                    .json_body(json!({"project": {"name": "renamed", "autoscaling_limit_max_cu": 2.0}}));
                then.status(200).json_body(json!({"project": project_json("renamed")}));
            })
            .await;

        let prior: Project = serde_json::from_value(project_json("main")).unwrap();
        let spec = ProjectSpec {
            name: Some("renamed".to_string()),
            region_id: Some("aws-us-east-2".to_string()),
            autoscaling_limit_max_cu: Some(2.0),
            ..Default::default()
        };
        let updated = Resource::update(&resource(&server), &spec, &prior).await.unwrap();

        mock.assert_async().await;
        assert_eq!(updated.name, "renamed");
    }

    #[tokio::test]
    async fn test_delete_and_import() {
        let server = MockServer::start_async().await;
        let delete_mock = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/projects/proj-1");
                then.status(200).json_body(json!({"project": project_json("main")}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/projects/proj-1");
                then.status(200).json_body(json!({"project": project_json("main")}));
            })
            .await;

        let resource = resource(&server);
        let imported = Resource::import(&resource, "proj-1").await.unwrap();
        assert_eq!(ProjectResource::import_id(&imported), "proj-1");

        Resource::delete(&resource, &imported).await.unwrap();
        delete_mock.assert_async().await;

        assert!(Resource::import(&resource, "proj-1/extra").await.is_err());
    }

    #[test]
    fn test_spec_validation() {
        let spec: ProjectSpec = serde_json::from_value(json!({"pg_version": 13})).unwrap();
        assert!(spec.validate().is_err());

        let spec: ProjectSpec = serde_json::from_value(json!({"provisioner": "lambda"})).unwrap();
        assert!(spec.validate().is_err());

        let spec: ProjectSpec = serde_json::from_value(
            json!({"name": "main", "provisioner": "k8s-neonvm", "pg_version": 14,
                   "autoscaling_limit_min_cu": 0.25, "autoscaling_limit_max_cu": 4}),
        )
        .unwrap();
        assert!(spec.validate().is_ok());

        assert!(serde_json::from_value::<ProjectSpec>(json!({"nmae": "typo"})).is_err());
    }
}
