use crate::core::client::DEFAULT_BASE_URL;
use crate::domain::model::{ResourceAddress, ResourceKind};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{ProviderError, Result};
use crate::utils::validation::Validate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

pub const API_KEY_ENV: &str = "NEON_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub data: Vec<DataConfig>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_poll_interval_seconds")]
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: String,
}

/// 以 ID 讀取、不納入狀態管理的既有資源
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub kind: ResourceKind,
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub kind: ResourceKind,
    pub name: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl DataConfig {
    pub fn address(&self) -> ResourceAddress {
        ResourceAddress::new(self.kind, self.name.clone())
    }
}

impl ResourceConfig {
    pub fn address(&self) -> ResourceAddress {
        ResourceAddress::new(self.kind, self.name.clone())
    }

    pub fn attributes_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.attributes.clone())
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_seconds() -> u64 {
    10
}

fn default_poll_max_attempts() -> u32 {
    60
}

fn default_poll_interval_seconds() -> u64 {
    2
}

fn default_state_path() -> String {
    "./.neon-state".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
            retry_attempts: default_retry_attempts(),
            retry_delay_seconds: default_retry_delay_seconds(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_poll_max_attempts(),
            interval_seconds: default_poll_interval_seconds(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl ProviderConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ProviderError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        let mut config: Self =
            toml::from_str(&processed_content).map_err(|e| ProviderError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;

        config.api.api_key =
            resolve_api_key(config.api.api_key.as_deref(), std::env::var(API_KEY_ENV).ok());
        Ok(config)
    }

    /// 替換環境變數 (例如 ${NEON_API_KEY})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ProviderError::config(e.to_string()))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn find_resource(&self, address: &ResourceAddress) -> Option<&ResourceConfig> {
        self.resources
            .iter()
            .find(|r| r.kind == address.kind && r.name == address.name)
    }

    /// 驗證配置的合理性
    ///
    /// `polling.interval_seconds`、`api.retry_attempts` 與 `api.retry_delay_seconds`
    /// 可以是 0（立即輪詢、不重試或不等待）。
    pub fn validate_config(&self) -> Result<()> {
        crate::utils::validation::validate_url("api.base_url", &self.api.base_url)?;
        crate::utils::validation::validate_positive_number(
            "api.timeout_seconds",
            self.api.timeout_seconds,
            1,
        )?;
        crate::utils::validation::validate_positive_number(
            "polling.max_attempts",
            self.polling.max_attempts as u64,
            1,
        )?;
        crate::utils::validation::validate_non_empty_string("state.path", &self.state.path)?;

        let mut seen = HashSet::new();
        for data in &self.data {
            crate::utils::validation::validate_non_empty_string("data.name", &data.name)?;
            crate::utils::validation::validate_non_empty_string("data.id", &data.id)?;
            validate_name("data.name", &data.name)?;
            if !seen.insert(format!("data.{}", data.address())) {
                return Err(ProviderError::ConfigValidationError {
                    field: "data".to_string(),
                    message: format!("Duplicate data source: {}", data.address()),
                });
            }
        }

        for resource in &self.resources {
            crate::utils::validation::validate_non_empty_string("resources.name", &resource.name)?;
            validate_name("resources.name", &resource.name)?;
            if !seen.insert(resource.address().to_string()) {
                return Err(ProviderError::ConfigValidationError {
                    field: "resources".to_string(),
                    message: format!("Duplicate resource: {}", resource.address()),
                });
            }
        }

        Ok(())
    }
}

/// 名稱會成為引用路徑的一段，不能含 `.`
fn validate_name(field: &str, name: &str) -> Result<()> {
    if name.contains('.') {
        return Err(ProviderError::InvalidConfigValueError {
            field: field.to_string(),
            value: name.to_string(),
            reason: "Names cannot contain '.'".to_string(),
        });
    }
    Ok(())
}

/// 設定檔未提供（或仍是未替換的 `${...}`）時改用環境變數
fn resolve_api_key(configured: Option<&str>, from_env: Option<String>) -> Option<String> {
    match configured {
        Some(key) if !key.trim().is_empty() && !key.starts_with("${") => Some(key.to_string()),
        _ => from_env.filter(|key| !key.trim().is_empty()),
    }
}

impl ConfigProvider for ProviderConfig {
    fn base_url(&self) -> &str {
        &self.api.base_url
    }

    fn api_key(&self) -> &str {
        self.api.api_key.as_deref().unwrap_or_default()
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds)
    }

    fn retry_attempts(&self) -> u32 {
        self.api.retry_attempts
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.api.retry_delay_seconds)
    }

    fn poll_max_attempts(&self) -> u32 {
        self.polling.max_attempts
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_seconds)
    }

    fn state_path(&self) -> &str {
        &self.state.path
    }
}

impl Validate for ProviderConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
