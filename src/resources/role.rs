use crate::core::client::{encode_segment, not_found_as_none, ApiClient};
use crate::core::import_id::RoleImportId;
use crate::domain::model::ResourceKind;
use crate::domain::ports::Resource;
use crate::utils::error::{ProviderError, Result};
use crate::utils::validation::{self, Validate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleSpec {
    pub project_id: String,
    pub branch_id: String,
    pub name: String,
}

impl Validate for RoleSpec {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("role.project_id", &self.project_id)?;
        validation::validate_non_empty_string("role.branch_id", &self.branch_id)?;
        validation::validate_non_empty_string("role.name", &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default)]
    pub project_id: String,
    pub branch_id: String,
    pub name: String,
    /// 只有建立與重設密碼時會回傳
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub protected: Option<bool>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RoleEnvelope {
    role: Role,
}

#[derive(Debug, Serialize)]
struct RoleCreateRequest<'a> {
    role: RoleCreateBody<'a>,
}

#[derive(Debug, Serialize)]
struct RoleCreateBody<'a> {
    name: &'a str,
}

pub struct RoleResource {
    client: ApiClient,
}

impl RoleResource {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn collection_path(project_id: &str, branch_id: &str) -> String {
        format!("/projects/{}/branches/{}/roles", project_id, branch_id)
    }

    fn path(project_id: &str, branch_id: &str, name: &str) -> Result<String> {
        Ok(format!(
            "{}/{}",
            Self::collection_path(project_id, branch_id),
            encode_segment(name)?
        ))
    }

    async fn fetch(&self, project_id: &str, branch_id: &str, name: &str) -> Result<Option<Role>> {
        let envelope: Option<RoleEnvelope> = not_found_as_none(
            self.client
                .get(&Self::path(project_id, branch_id, name)?)
                .await,
        )?;
        Ok(envelope.map(|e| {
            let mut role = e.role;
            role.project_id = project_id.to_string();
            role
        }))
    }
}

#[async_trait]
impl Resource for RoleResource {
    type Spec = RoleSpec;
    type State = Role;

    const KIND: ResourceKind = ResourceKind::Role;
    const REPLACE_ON_CHANGE: &'static [&'static str] = &["project_id", "branch_id", "name"];

    async fn create(&self, spec: &RoleSpec) -> Result<Role> {
        let request = RoleCreateRequest {
            role: RoleCreateBody { name: &spec.name },
        };
        let envelope: RoleEnvelope = self
            .client
            .post(&Self::collection_path(&spec.project_id, &spec.branch_id), &request)
            .await?;
        tracing::info!("👤 Created role {} on branch {}", spec.name, spec.branch_id);

        let mut role = envelope.role;
        role.project_id = spec.project_id.clone();
        Ok(role)
    }

    async fn read(&self, prior: &Role) -> Result<Option<Role>> {
        Ok(self
            .fetch(&prior.project_id, &prior.branch_id, &prior.name)
            .await?
            .map(|mut role| {
                if role.password.is_none() {
                    role.password = prior.password.clone();
                }
                role
            }))
    }

    /// 角色沒有可修改的屬性，更新即重設密碼
    async fn update(&self, _spec: &RoleSpec, prior: &Role) -> Result<Role> {
        let path = format!(
            "{}/reset_password",
            Self::path(&prior.project_id, &prior.branch_id, &prior.name)?
        );
        let envelope: RoleEnvelope = self.client.post_empty(&path).await?;
        tracing::info!("🔑 Reset password for role {}", prior.name);

        let mut role = envelope.role;
        role.project_id = prior.project_id.clone();
        Ok(role)
    }

    async fn delete(&self, state: &Role) -> Result<()> {
        self.client
            .delete(&Self::path(&state.project_id, &state.branch_id, &state.name)?)
            .await?;
        tracing::info!("🗑️ Deleted role {}", state.name);
        Ok(())
    }

    async fn import(&self, id: &str) -> Result<Role> {
        let import_id = RoleImportId::parse(id)?;
        self.fetch(&import_id.project_id, &import_id.branch_id, &import_id.name)
            .await?
            .ok_or_else(|| ProviderError::NotFoundError {
                path: format!(
                    "{}/{}",
                    Self::collection_path(&import_id.project_id, &import_id.branch_id),
                    import_id.name
                ),
            })
    }

    fn import_id(state: &Role) -> String {
        RoleImportId::format(&state.project_id, &state.branch_id, &state.name)
    }
}
