use crate::core::client::{not_found_as_none, ApiClient};
use crate::core::import_id::BranchImportId;
use crate::core::poll::{wait_until, PollPolicy};
use crate::domain::model::{EndpointType, ResourceKind};
use crate::domain::ports::Resource;
use crate::resources::endpoint::Endpoint;
use crate::utils::error::{ProviderError, Result};
use crate::utils::validation::{self, Validate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const INIT_STATE: &str = "init";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchSpec {
    pub project_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_lsn: Option<String>,
    #[serde(default)]
    pub parent_timestamp: Option<DateTime<Utc>>,
    /// 只在建立時使用
    #[serde(default)]
    pub endpoints: Vec<BranchEndpointSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchEndpointSpec {
    #[serde(rename = "type")]
    pub endpoint_type: EndpointType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling_limit_min_cu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling_limit_max_cu: Option<f64>,
}

impl Validate for BranchSpec {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("branch.project_id", &self.project_id)?;
        if let Some(name) = &self.name {
            validation::validate_non_empty_string("branch.name", name)?;
        }
        if self.parent_lsn.is_some() && self.parent_timestamp.is_some() {
            return Err(ProviderError::ConfigValidationError {
                field: "branch.parent_lsn".to_string(),
                message: "parent_lsn and parent_timestamp are mutually exclusive".to_string(),
            });
        }
        for endpoint in &self.endpoints {
            if endpoint.endpoint_type == EndpointType::Unknown {
                return Err(ProviderError::InvalidConfigValueError {
                    field: "branch.endpoints.type".to_string(),
                    value: "unknown".to_string(),
                    reason: "Value must be one of: read_write, read_only".to_string(),
                });
            }
            validation::validate_cu_range(
                "branch.endpoints.autoscaling_limit",
                endpoint.autoscaling_limit_min_cu,
                endpoint.autoscaling_limit_max_cu,
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub parent_lsn: Option<String>,
    #[serde(default)]
    pub parent_timestamp: Option<DateTime<Utc>>,
    pub name: String,
    #[serde(default)]
    pub current_state: Option<String>,
    #[serde(default)]
    pub pending_state: Option<String>,
    #[serde(default)]
    pub logical_size: Option<i64>,
    #[serde(default)]
    pub logical_size_limit: Option<i64>,
    #[serde(default)]
    pub physical_size: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl Branch {
    fn is_initializing(&self) -> bool {
        self.current_state.as_deref() == Some(INIT_STATE)
    }
}

#[derive(Debug, Deserialize)]
struct BranchEnvelope {
    branch: Branch,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Serialize)]
struct BranchCreateRequest<'a> {
    branch: BranchCreateBody<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoints: Option<&'a [BranchEndpointSpec]>,
}

#[derive(Debug, Serialize)]
struct BranchCreateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_lsn: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct BranchUpdateRequest<'a> {
    branch: BranchUpdateBody<'a>,
}

#[derive(Debug, Serialize)]
struct BranchUpdateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

pub struct BranchResource {
    client: ApiClient,
    poll: PollPolicy,
}

impl BranchResource {
    pub fn new(client: ApiClient, poll: PollPolicy) -> Self {
        Self { client, poll }
    }

    fn path(project_id: &str, id: &str) -> String {
        format!("/projects/{}/branches/{}", project_id, id)
    }

    async fn fetch(&self, project_id: &str, id: &str) -> Result<Option<Branch>> {
        let envelope: Option<BranchEnvelope> =
            not_found_as_none(self.client.get(&Self::path(project_id, id)).await)?;
        Ok(envelope.map(|e| e.branch))
    }

    async fn fetch_existing(&self, project_id: &str, id: &str) -> Result<Branch> {
        self.fetch(project_id, id)
            .await?
            .ok_or_else(|| ProviderError::NotFoundError {
                path: Self::path(project_id, id),
            })
    }
}

#[async_trait]
impl Resource for BranchResource {
    type Spec = BranchSpec;
    type State = Branch;

    const KIND: ResourceKind = ResourceKind::Branch;
    const REPLACE_ON_CHANGE: &'static [&'static str] =
        &["project_id", "parent_id", "parent_lsn", "parent_timestamp"];
    const IGNORE_ON_DIFF: &'static [&'static str] = &["endpoints"];

    async fn create(&self, spec: &BranchSpec) -> Result<Branch> {
        let request = BranchCreateRequest {
            branch: BranchCreateBody {
                parent_id: spec.parent_id.as_deref(),
                name: spec.name.as_deref(),
                parent_lsn: spec.parent_lsn.as_deref(),
                parent_timestamp: spec.parent_timestamp,
            },
            endpoints: (!spec.endpoints.is_empty()).then_some(spec.endpoints.as_slice()),
        };
        let envelope: BranchEnvelope = self
            .client
            .post(&format!("/projects/{}/branches", spec.project_id), &request)
            .await?;

        let mut branch = envelope.branch;
        tracing::info!("🌿 Created branch {} in project {}", branch.id, branch.project_id);

        if branch.is_initializing() {
            let branch_id = branch.id.clone();
            let what = format!("branch {}", branch_id);
            branch = wait_until(
                &what,
                self.poll,
                || self.fetch_existing(&spec.project_id, &branch_id),
                |b| !b.is_initializing(),
            )
            .await?;
        }

        branch.endpoints = envelope.endpoints;
        Ok(branch)
    }

    async fn read(&self, prior: &Branch) -> Result<Option<Branch>> {
        Ok(self
            .fetch(&prior.project_id, &prior.id)
            .await?
            .map(|mut branch| {
                branch.endpoints = prior.endpoints.clone();
                branch
            }))
    }

    async fn update(&self, spec: &BranchSpec, prior: &Branch) -> Result<Branch> {
        let request = BranchUpdateRequest {
            branch: BranchUpdateBody {
                name: spec.name.as_deref(),
            },
        };
        let envelope: BranchEnvelope = self
            .client
            .patch(&Self::path(&prior.project_id, &prior.id), &request)
            .await?;
        tracing::info!("✏️ Updated branch {}", prior.id);

        let mut branch = envelope.branch;
        branch.endpoints = prior.endpoints.clone();
        Ok(branch)
    }

    async fn delete(&self, state: &Branch) -> Result<()> {
        self.client
            .delete(&Self::path(&state.project_id, &state.id))
            .await?;
        tracing::info!("🗑️ Deleted branch {}", state.id);
        Ok(())
    }

    async fn import(&self, id: &str) -> Result<Branch> {
        let import_id = BranchImportId::parse(id)?;
        self.fetch_existing(&import_id.project_id, &import_id.id).await
    }

    fn import_id(state: &Branch) -> String {
        BranchImportId::format(&state.id, &state.project_id)
    }
}
