use crate::core::client::{not_found_as_none, ApiClient};
use crate::core::import_id::EndpointImportId;
use crate::core::poll::{wait_until, PollPolicy};
use crate::domain::model::{EndpointState, EndpointType, PgSettings, PoolerMode, ResourceKind};
use crate::domain::ports::Resource;
use crate::utils::error::{ProviderError, Result};
use crate::utils::validation::{self, Validate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointSpec {
    pub project_id: String,
    pub branch_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<String>,
    #[serde(rename = "type")]
    pub endpoint_type: EndpointType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<PgSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling_limit_min_cu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling_limit_max_cu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pooler_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pooler_mode: Option<PoolerMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwordless_access: Option<bool>,
}

impl Validate for EndpointSpec {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("endpoint.project_id", &self.project_id)?;
        validation::validate_non_empty_string("endpoint.branch_id", &self.branch_id)?;
        if self.endpoint_type == EndpointType::Unknown {
            return Err(ProviderError::InvalidConfigValueError {
                field: "endpoint.type".to_string(),
                value: "unknown".to_string(),
                reason: "Value must be one of: read_write, read_only".to_string(),
            });
        }
        if self.pooler_mode == Some(PoolerMode::Unknown) {
            return Err(ProviderError::InvalidConfigValueError {
                field: "endpoint.pooler_mode".to_string(),
                value: "unknown".to_string(),
                reason: "Value must be: transaction".to_string(),
            });
        }
        validation::validate_cu_range(
            "endpoint.autoscaling_limit",
            self.autoscaling_limit_min_cu,
            self.autoscaling_limit_max_cu,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    #[serde(default)]
    pub host: Option<String>,
    pub project_id: String,
    pub branch_id: String,
    #[serde(default)]
    pub region_id: Option<String>,
    #[serde(rename = "type")]
    pub endpoint_type: EndpointType,
    #[serde(default)]
    pub current_state: Option<EndpointState>,
    #[serde(default)]
    pub pending_state: Option<EndpointState>,
    #[serde(default)]
    pub autoscaling_limit_min_cu: Option<f64>,
    #[serde(default)]
    pub autoscaling_limit_max_cu: Option<f64>,
    #[serde(default)]
    pub settings: Option<PgSettings>,
    #[serde(default)]
    pub pooler_enabled: Option<bool>,
    #[serde(default)]
    pub pooler_mode: Option<PoolerMode>,
    #[serde(default)]
    pub disabled: Option<bool>,
    #[serde(default)]
    pub passwordless_access: Option<bool>,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Endpoint {
    fn is_initializing(&self) -> bool {
        self.current_state == Some(EndpointState::Init)
    }
}

#[derive(Debug, Deserialize)]
struct EndpointEnvelope {
    endpoint: Endpoint,
}

#[derive(Debug, Serialize)]
struct EndpointRequest<'a, T: Serialize> {
    endpoint: &'a T,
}

/// 可在原地修改的欄位
#[derive(Debug, Serialize)]
struct EndpointUpdateBody<'a> {
    branch_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    autoscaling_limit_min_cu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    autoscaling_limit_max_cu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    settings: Option<&'a PgSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pooler_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pooler_mode: Option<PoolerMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    passwordless_access: Option<bool>,
}

#[derive(Debug, Serialize)]
struct EndpointCreateBody<'a> {
    branch_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    region_id: Option<&'a str>,
    #[serde(rename = "type")]
    endpoint_type: EndpointType,
    #[serde(flatten)]
    mutable: EndpointUpdateBody<'a>,
}

pub struct EndpointResource {
    client: ApiClient,
    poll: PollPolicy,
}

impl EndpointResource {
    pub fn new(client: ApiClient, poll: PollPolicy) -> Self {
        Self { client, poll }
    }

    fn path(project_id: &str, id: &str) -> String {
        format!("/projects/{}/endpoints/{}", project_id, id)
    }

    async fn fetch(&self, project_id: &str, id: &str) -> Result<Option<Endpoint>> {
        let envelope: Option<EndpointEnvelope> =
            not_found_as_none(self.client.get(&Self::path(project_id, id)).await)?;
        Ok(envelope.map(|e| e.endpoint))
    }

    async fn fetch_existing(&self, project_id: &str, id: &str) -> Result<Endpoint> {
        self.fetch(project_id, id)
            .await?
            .ok_or_else(|| ProviderError::NotFoundError {
                path: Self::path(project_id, id),
            })
    }

    fn mutable_body(spec: &EndpointSpec) -> EndpointUpdateBody<'_> {
        EndpointUpdateBody {
            branch_id: &spec.branch_id,
            autoscaling_limit_min_cu: spec.autoscaling_limit_min_cu,
            autoscaling_limit_max_cu: spec.autoscaling_limit_max_cu,
            settings: spec.settings.as_ref(),
            pooler_enabled: spec.pooler_enabled,
            pooler_mode: spec.pooler_mode,
            disabled: spec.disabled,
            passwordless_access: spec.passwordless_access,
        }
    }
}

#[async_trait]
impl Resource for EndpointResource {
    type Spec = EndpointSpec;
    type State = Endpoint;

    const KIND: ResourceKind = ResourceKind::Endpoint;
    const REPLACE_ON_CHANGE: &'static [&'static str] = &["project_id", "type", "region_id"];

    async fn create(&self, spec: &EndpointSpec) -> Result<Endpoint> {
        let body = EndpointCreateBody {
            branch_id: &spec.branch_id,
            region_id: spec.region_id.as_deref(),
            endpoint_type: spec.endpoint_type,
            mutable: Self::mutable_body(spec),
        };
        let envelope: EndpointEnvelope = self
            .client
            .post(
                &format!("/projects/{}/endpoints", spec.project_id),
                &EndpointRequest { endpoint: &body },
            )
            .await?;

        let endpoint = envelope.endpoint;
        tracing::info!("🔌 Created endpoint {} on branch {}", endpoint.id, endpoint.branch_id);
        if !endpoint.is_initializing() {
            return Ok(endpoint);
        }

        // 等待端點離開 init 狀態
        let what = format!("endpoint {}", endpoint.id);
        wait_until(
            &what,
            self.poll,
            || self.fetch_existing(&endpoint.project_id, &endpoint.id),
            |e| !e.is_initializing(),
        )
        .await
    }

    async fn read(&self, prior: &Endpoint) -> Result<Option<Endpoint>> {
        self.fetch(&prior.project_id, &prior.id).await
    }

    async fn update(&self, spec: &EndpointSpec, prior: &Endpoint) -> Result<Endpoint> {
        let body = Self::mutable_body(spec);
        let envelope: EndpointEnvelope = self
            .client
            .patch(
                &Self::path(&prior.project_id, &prior.id),
                &EndpointRequest { endpoint: &body },
            )
            .await?;
        tracing::info!("✏️ Updated endpoint {}", prior.id);
        Ok(envelope.endpoint)
    }

    async fn delete(&self, state: &Endpoint) -> Result<()> {
        self.client
            .delete(&Self::path(&state.project_id, &state.id))
            .await?;
        tracing::info!("🗑️ Deleted endpoint {}", state.id);
        Ok(())
    }

    async fn import(&self, id: &str) -> Result<Endpoint> {
        let import_id = EndpointImportId::parse(id)?;
        self.fetch_existing(&import_id.project_id, &import_id.id).await
    }

    fn import_id(state: &Endpoint) -> String {
        EndpointImportId::format(&state.id, &state.project_id)
    }
}
