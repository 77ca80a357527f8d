use crate::core::client::{encode_segment, not_found_as_none, ApiClient};
use crate::core::import_id::DatabaseImportId;
use crate::domain::model::ResourceKind;
use crate::domain::ports::Resource;
use crate::utils::error::{ProviderError, Result};
use crate::utils::validation::{self, Validate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSpec {
    pub project_id: String,
    pub branch_id: String,
    pub name: String,
    #[serde(default)]
    pub owner_name: Option<String>,
}

impl Validate for DatabaseSpec {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("database.project_id", &self.project_id)?;
        validation::validate_non_empty_string("database.branch_id", &self.branch_id)?;
        validation::validate_non_empty_string("database.name", &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub id: i64,
    /// API 回應不含此欄位，由請求路徑補上
    #[serde(default)]
    pub project_id: String,
    pub branch_id: String,
    pub name: String,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct DatabaseEnvelope {
    database: Database,
}

#[derive(Debug, Serialize)]
struct DatabaseRequest<'a> {
    database: DatabaseBody<'a>,
}

#[derive(Debug, Serialize)]
struct DatabaseBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_name: Option<&'a str>,
}

impl<'a> From<&'a DatabaseSpec> for DatabaseRequest<'a> {
    fn from(spec: &'a DatabaseSpec) -> Self {
        Self {
            database: DatabaseBody {
                name: &spec.name,
                owner_name: spec.owner_name.as_deref(),
            },
        }
    }
}

pub struct DatabaseResource {
    client: ApiClient,
}

impl DatabaseResource {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn collection_path(project_id: &str, branch_id: &str) -> String {
        format!("/projects/{}/branches/{}/databases", project_id, branch_id)
    }

    fn path(project_id: &str, branch_id: &str, name: &str) -> Result<String> {
        Ok(format!(
            "{}/{}",
            Self::collection_path(project_id, branch_id),
            encode_segment(name)?
        ))
    }

    fn with_project(mut database: Database, project_id: &str) -> Database {
        database.project_id = project_id.to_string();
        database
    }

    async fn fetch(&self, project_id: &str, branch_id: &str, name: &str) -> Result<Option<Database>> {
        let envelope: Option<DatabaseEnvelope> = not_found_as_none(
            self.client
                .get(&Self::path(project_id, branch_id, name)?)
                .await,
        )?;
        Ok(envelope.map(|e| Self::with_project(e.database, project_id)))
    }
}

#[async_trait]
impl Resource for DatabaseResource {
    type Spec = DatabaseSpec;
    type State = Database;

    const KIND: ResourceKind = ResourceKind::Database;
    const REPLACE_ON_CHANGE: &'static [&'static str] = &["project_id", "branch_id"];

    async fn create(&self, spec: &DatabaseSpec) -> Result<Database> {
        let envelope: DatabaseEnvelope = self
            .client
            .post(
                &Self::collection_path(&spec.project_id, &spec.branch_id),
                &DatabaseRequest::from(spec),
            )
            .await?;
        tracing::info!("🗄️ Created database {} on branch {}", spec.name, spec.branch_id);
        Ok(Self::with_project(envelope.database, &spec.project_id))
    }

    async fn read(&self, prior: &Database) -> Result<Option<Database>> {
        self.fetch(&prior.project_id, &prior.branch_id, &prior.name)
            .await
    }

    async fn update(&self, spec: &DatabaseSpec, prior: &Database) -> Result<Database> {
        // 以目前名稱定位，允許改名
        let envelope: DatabaseEnvelope = self
            .client
            .patch(
                &Self::path(&prior.project_id, &prior.branch_id, &prior.name)?,
                &DatabaseRequest::from(spec),
            )
            .await?;
        tracing::info!("✏️ Updated database {} -> {}", prior.name, spec.name);
        Ok(Self::with_project(envelope.database, &prior.project_id))
    }

    async fn delete(&self, state: &Database) -> Result<()> {
        self.client
            .delete(&Self::path(&state.project_id, &state.branch_id, &state.name)?)
            .await?;
        tracing::info!("🗑️ Deleted database {}", state.name);
        Ok(())
    }

    async fn import(&self, id: &str) -> Result<Database> {
        let import_id = DatabaseImportId::parse(id)?;
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

    fn import_id(state: &Database) -> String {
        DatabaseImportId::format(&state.project_id, &state.branch_id, &state.name)
    }
}
