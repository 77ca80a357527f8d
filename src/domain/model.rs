use crate::utils::error::{ProviderError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Project,
    Branch,
    Endpoint,
    Database,
    Role,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Project,
        ResourceKind::Branch,
        ResourceKind::Endpoint,
        ResourceKind::Database,
        ResourceKind::Role,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Project => "project",
            ResourceKind::Branch => "branch",
            ResourceKind::Endpoint => "endpoint",
            ResourceKind::Database => "database",
            ResourceKind::Role => "role",
        }
    }

    /// 匯入時使用的複合 ID 格式
    pub fn import_id_format(&self) -> &'static str {
        match self {
            ResourceKind::Project => "id",
            ResourceKind::Branch | ResourceKind::Endpoint => "id/project_id",
            ResourceKind::Database | ResourceKind::Role => "project_id/branch_id/name",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProviderError::InvalidConfigValueError {
                field: "kind".to_string(),
                value: s.to_string(),
                reason: "Expected one of: project, branch, endpoint, database, role".to_string(),
            })
    }
}

/// 資源在本地的識別：`kind.name`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceAddress {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceAddress {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn state_file_name(&self) -> String {
        format!("{}.{}.json", self.kind, self.name)
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl FromStr for ResourceAddress {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, name) = s
            .split_once('.')
            .ok_or_else(|| ProviderError::UnknownResourceError {
                address: s.to_string(),
            })?;
        if name.trim().is_empty() {
            return Err(ProviderError::UnknownResourceError {
                address: s.to_string(),
            });
        }
        Ok(Self::new(kind.parse()?, name))
    }
}

/// 單一資源的持久化狀態
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub kind: ResourceKind,
    pub name: String,
    pub id: String,
    pub attributes: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl StateRecord {
    pub fn new(address: &ResourceAddress, id: String, attributes: serde_json::Value) -> Self {
        Self {
            kind: address.kind,
            name: address.name.clone(),
            id,
            attributes,
            updated_at: Utc::now(),
        }
    }

    pub fn address(&self) -> ResourceAddress {
        ResourceAddress::new(self.kind, self.name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    Create,
    Update { changed: Vec<String> },
    Replace { changed: Vec<String> },
    Delete,
    NoOp,
}

impl PlannedAction {
    pub fn is_noop(&self) -> bool {
        matches!(self, PlannedAction::NoOp)
    }
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannedAction::Create => f.write_str("create"),
            PlannedAction::Update { changed } => write!(f, "update ({})", changed.join(", ")),
            PlannedAction::Replace { changed } => write!(f, "replace ({})", changed.join(", ")),
            PlannedAction::Delete => f.write_str("delete"),
            PlannedAction::NoOp => f.write_str("no-op"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedChange {
    pub address: String,
    #[serde(flatten)]
    pub action: PlannedAction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PgSettings {
    #[serde(default)]
    pub pg_settings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provisioner {
    #[serde(rename = "k8s-pod")]
    K8sPod,
    #[serde(rename = "k8s-neonvm")]
    K8sNeonvm,
    #[serde(rename = "docker")]
    Docker,
    #[serde(other, rename = "unknown")]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointType {
    ReadWrite,
    ReadOnly,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointState {
    Init,
    Active,
    Idle,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolerMode {
    Transaction,
    #[serde(other)]
    Unknown,
}
