use crate::domain::model::ResourceKind;
use crate::utils::error::{ProviderError, Result};

/// 依資源種類拆解複合匯入 ID
///
/// 段數必須完全符合，且每一段去除空白後不可為空。
pub fn split_import_id(kind: ResourceKind, raw: &str) -> Result<Vec<String>> {
    let expected = kind.import_id_format();
    let expected_segments = expected.split('/').count();

    let segments: Vec<String> = raw.split('/').map(|s| s.trim().to_string()).collect();
    if segments.len() != expected_segments || segments.iter().any(|s| s.is_empty()) {
        return Err(ProviderError::ImportIdError {
            kind: kind.to_string(),
            id: raw.to_string(),
            expected: expected.to_string(),
        });
    }

    Ok(segments)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectImportId {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchImportId {
    pub id: String,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointImportId {
    pub id: String,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseImportId {
    pub project_id: String,
    pub branch_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleImportId {
    pub project_id: String,
    pub branch_id: String,
    pub name: String,
}

impl ProjectImportId {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = split_import_id(ResourceKind::Project, raw)?.into_iter();
        Ok(Self {
            id: parts.next().unwrap_or_default(),
        })
    }
}

impl BranchImportId {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = split_import_id(ResourceKind::Branch, raw)?.into_iter();
        Ok(Self {
            id: parts.next().unwrap_or_default(),
            project_id: parts.next().unwrap_or_default(),
        })
    }

    pub fn format(id: &str, project_id: &str) -> String {
        format!("{}/{}", id, project_id)
    }
}

impl EndpointImportId {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = split_import_id(ResourceKind::Endpoint, raw)?.into_iter();
        Ok(Self {
            id: parts.next().unwrap_or_default(),
            project_id: parts.next().unwrap_or_default(),
        })
    }

    pub fn format(id: &str, project_id: &str) -> String {
        format!("{}/{}", id, project_id)
    }
}

impl DatabaseImportId {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = split_import_id(ResourceKind::Database, raw)?.into_iter();
        Ok(Self {
            project_id: parts.next().unwrap_or_default(),
            branch_id: parts.next().unwrap_or_default(),
            name: parts.next().unwrap_or_default(),
        })
    }

    pub fn format(project_id: &str, branch_id: &str, name: &str) -> String {
        format!("{}/{}/{}", project_id, branch_id, name)
    }
}

impl RoleImportId {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = split_import_id(ResourceKind::Role, raw)?.into_iter();
        Ok(Self {
            project_id: parts.next().unwrap_or_default(),
            branch_id: parts.next().unwrap_or_default(),
            name: parts.next().unwrap_or_default(),
        })
    }

    pub fn format(project_id: &str, branch_id: &str, name: &str) -> String {
        format!("{}/{}/{}", project_id, branch_id, name)
    }
}
