use crate::config::toml_config::ProviderConfig;
use crate::core::context::ApplyContext;
use crate::core::diff::{diff_attributes, plan_action};
use crate::domain::model::{
    PlannedAction, PlannedChange, ResourceAddress, ResourceKind, StateRecord,
};
use crate::domain::ports::{ResourceHandler, Storage};
use crate::resources::ResourceRegistry;
use crate::utils::error::{ProviderError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 單一資源的套用結果
#[derive(Debug, Clone, Serialize)]
pub struct ApplyResult {
    pub address: String,
    #[serde(flatten)]
    pub action: PlannedAction,
    pub id: Option<String>,
    #[serde(serialize_with = "serialize_millis", rename = "duration_ms")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// 比對期望設定與遠端狀態並呼叫對應 API
pub struct Reconciler<S: Storage> {
    registry: ResourceRegistry,
    storage: S,
}

impl<S: Storage> Reconciler<S> {
    pub fn new(registry: ResourceRegistry, storage: S) -> Self {
        Self { registry, storage }
    }

    fn handler(&self, kind: ResourceKind) -> Result<Arc<dyn ResourceHandler>> {
        self.registry.get(kind)
    }

    pub async fn load_state(&self, address: &ResourceAddress) -> Result<Option<StateRecord>> {
        match self.storage.read_file(&address.state_file_name()).await {
            Ok(bytes) => {
                let record: StateRecord =
                    serde_json::from_slice(&bytes).map_err(|e| ProviderError::StateError {
                        address: address.to_string(),
                        message: format!("corrupt state file: {}", e),
                    })?;
                Ok(Some(record))
            }
            Err(ProviderError::IoError(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn save_state(&self, record: &StateRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        self.storage
            .write_file(&record.address().state_file_name(), &bytes)
            .await
    }

    async fn remove_state(&self, address: &ResourceAddress) -> Result<()> {
        self.storage.delete_file(&address.state_file_name()).await
    }

    async fn require_state(&self, address: &ResourceAddress) -> Result<StateRecord> {
        self.load_state(address)
            .await?
            .ok_or_else(|| ProviderError::StateError {
                address: address.to_string(),
                message: "resource is not managed (no state)".to_string(),
            })
    }

    async fn persist(
        &self,
        handler: &dyn ResourceHandler,
        address: &ResourceAddress,
        attributes: Value,
    ) -> Result<StateRecord> {
        let id = handler.state_id(&attributes)?;
        let record = StateRecord::new(address, id, attributes);
        self.save_state(&record).await?;
        Ok(record)
    }

    pub async fn create(&self, address: &ResourceAddress, attributes: &Value) -> Result<StateRecord> {
        if self.load_state(address).await?.is_some() {
            return Err(ProviderError::StateError {
                address: address.to_string(),
                message: "resource already has state; use update or import".to_string(),
            });
        }
        let handler = self.handler(address.kind)?;
        let created = handler.create_value(attributes).await?;
        self.persist(handler.as_ref(), address, created).await
    }

    /// 重新讀取遠端狀態；遠端已不存在時移除本地狀態
    pub async fn read(&self, address: &ResourceAddress) -> Result<Option<StateRecord>> {
        let record = self.require_state(address).await?;
        self.refresh(record).await
    }

    async fn refresh(&self, record: StateRecord) -> Result<Option<StateRecord>> {
        let address = record.address();
        let handler = self.handler(address.kind)?;
        match handler.read_value(&record.attributes).await? {
            Some(attributes) => Ok(Some(self.persist(handler.as_ref(), &address, attributes).await?)),
            None => {
                tracing::warn!("⚠️ {} ({}) no longer exists remotely, dropping state", address, record.id);
                self.remove_state(&address).await?;
                Ok(None)
            }
        }
    }

    pub async fn update(&self, address: &ResourceAddress, attributes: &Value) -> Result<StateRecord> {
        let record = self.require_state(address).await?;
        let handler = self.handler(address.kind)?;
        let updated = handler.update_value(attributes, &record.attributes).await?;
        self.persist(handler.as_ref(), address, updated).await
    }

    pub async fn delete(&self, address: &ResourceAddress) -> Result<()> {
        let record = self.require_state(address).await?;
        let handler = self.handler(address.kind)?;
        match handler.delete_value(&record.attributes).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::warn!("⚠️ {} was already deleted remotely", address);
            }
            Err(e) => return Err(e),
        }
        self.remove_state(address).await
    }

    pub async fn import(&self, address: &ResourceAddress, id: &str) -> Result<StateRecord> {
        if self.load_state(address).await?.is_some() {
            return Err(ProviderError::StateError {
                address: address.to_string(),
                message: "resource already has state".to_string(),
            });
        }
        let handler = self.handler(address.kind)?;
        let imported = handler.import_value(id).await?;
        tracing::info!("📥 Imported {} from {}", address, id);
        self.persist(handler.as_ref(), address, imported).await
    }

    /// 以匯入 ID 讀取遠端物件，不寫入狀態
    pub async fn lookup(&self, kind: ResourceKind, id: &str) -> Result<Value> {
        self.handler(kind)?.import_value(id).await
    }

    pub async fn show(&self, address: &ResourceAddress) -> Result<StateRecord> {
        self.require_state(address).await
    }

    /// 載入狀態 → 重新整理 → 比對 → 執行
    pub async fn reconcile(
        &self,
        address: &ResourceAddress,
        attributes: &Value,
        context: &ApplyContext,
    ) -> Result<(PlannedAction, StateRecord)> {
        let desired = context.resolve(&address.to_string(), attributes)?;
        let handler = self.handler(address.kind)?;

        let current = match self.load_state(address).await? {
            Some(record) => self.refresh(record).await?,
            None => None,
        };

        let Some(current) = current else {
            let created = handler.create_value(&desired).await?;
            let record = self.persist(handler.as_ref(), address, created).await?;
            return Ok((PlannedAction::Create, record));
        };

        let normalized = handler.normalize_spec(&desired)?;
        let changed = diff_attributes(&normalized, &current.attributes, handler.ignore_on_diff());
        let action = plan_action(changed, handler.replace_on_change());
        let record = match &action {
            PlannedAction::NoOp => current,
            PlannedAction::Update { changed } => {
                tracing::info!("✏️ Updating {} ({})", address, changed.join(", "));
                let updated = handler.update_value(&desired, &current.attributes).await?;
                self.persist(handler.as_ref(), address, updated).await?
            }
            PlannedAction::Replace { changed } => {
                tracing::info!("♻️ Replacing {} ({})", address, changed.join(", "));
                handler.delete_value(&current.attributes).await?;
                self.remove_state(address).await?;
                let created = handler.create_value(&desired).await?;
                self.persist(handler.as_ref(), address, created).await?
            }
            PlannedAction::Create | PlannedAction::Delete => {
                return Err(ProviderError::StateError {
                    address: address.to_string(),
                    message: format!("unexpected planned action: {}", action),
                })
            }
        };

        Ok((action, record))
    }

    /// 只比對不修改；尚未建立的依賴視為變更
    pub async fn plan(&self, config: &ProviderConfig) -> Result<Vec<PlannedChange>> {
        let mut context = self.lookup_data(config).await?;
        let mut changes = Vec::new();

        for resource in &config.resources {
            let address = resource.address();
            let handler = self.handler(address.kind)?;

            let current = match self.load_state(&address).await? {
                Some(record) => {
                    let refreshed = handler.read_value(&record.attributes).await?;
                    if refreshed.is_none() {
                        tracing::warn!("⚠️ {} has drifted: remote object is gone", address);
                    }
                    refreshed
                }
                None => None,
            };

            let action = match current {
                None => PlannedAction::Create,
                Some(attributes) => {
                    let (desired, unknown) =
                        resolve_known(&context, &address.to_string(), &resource.attributes)?;
                    // 部分解析的屬性可能缺少必要欄位，無法經過 Spec 正規化
                    let desired = if unknown.is_empty() {
                        handler.normalize_spec(&desired)?
                    } else {
                        desired
                    };
                    let mut changed =
                        diff_attributes(&desired, &attributes, handler.ignore_on_diff());
                    changed.extend(unknown);
                    changed.sort();
                    changed.dedup();
                    let action = plan_action(changed, handler.replace_on_change());
                    if let Some(known) = known_after(&action, attributes) {
                        context.insert_resource(&address, known);
                    }
                    action
                }
            };

            tracing::info!("📋 {}: {}", address, action);
            changes.push(PlannedChange {
                address: address.to_string(),
                action,
            });
        }

        Ok(changes)
    }

    async fn lookup_data(&self, config: &ProviderConfig) -> Result<ApplyContext> {
        let mut context = ApplyContext::new();
        for data in &config.data {
            let value = self.lookup(data.kind, &data.id).await?;
            tracing::debug!("🔎 Looked up data.{} ({})", data.address(), data.id);
            context.insert_data(&data.address(), value);
        }
        Ok(context)
    }

    /// 由已保存的狀態建立引用上下文，供單一資源指令使用
    pub async fn stored_context(&self, config: &ProviderConfig) -> Result<ApplyContext> {
        let mut context = self.lookup_data(config).await?;
        for resource in &config.resources {
            let address = resource.address();
            if let Some(record) = self.load_state(&address).await? {
                context.insert_resource(&address, record.attributes);
            }
        }
        Ok(context)
    }

    /// 先讀取資料來源，再依宣告順序套用資源
    pub async fn apply(&self, config: &ProviderConfig) -> Result<Vec<ApplyResult>> {
        let mut context = self.lookup_data(config).await?;
        let mut results = Vec::new();

        for resource in &config.resources {
            let start_time = Instant::now();
            let address = resource.address();

            let (action, record) = self
                .reconcile(&address, &resource.attributes_value(), &context)
                .await
                .inspect_err(|e| tracing::error!("❌ Failed to apply {}: {}", address, e))?;

            let result = ApplyResult {
                address: address.to_string(),
                action,
                id: Some(record.id.clone()),
                duration: start_time.elapsed(),
            };
            tracing::info!(
                "✅ {}: {} (id: {}, duration: {:?})",
                result.address,
                result.action,
                record.id,
                result.duration
            );

            context.insert_resource(&address, record.attributes);
            results.push(result);
        }

        Ok(results)
    }

    /// 依宣告的相反順序刪除所有有狀態的資源
    pub async fn destroy(&self, config: &ProviderConfig) -> Result<Vec<ApplyResult>> {
        let mut results = Vec::new();

        for resource in config.resources.iter().rev() {
            let start_time = Instant::now();
            let address = resource.address();

            let Some(record) = self.load_state(&address).await? else {
                tracing::info!("⏭️ Skipping {} (no state)", address);
                continue;
            };

            self.delete(&address).await?;
            results.push(ApplyResult {
                address: address.to_string(),
                action: PlannedAction::Delete,
                id: Some(record.id),
                duration: start_time.elapsed(),
            });
        }

        Ok(results)
    }

    pub fn apply_summary(results: &[ApplyResult]) -> HashMap<String, Value> {
        let mut summary = HashMap::new();

        let count = |pred: fn(&PlannedAction) -> bool| results.iter().filter(|r| pred(&r.action)).count();
        let total_duration: Duration = results.iter().map(|r| r.duration).sum();

        summary.insert("total_resources".to_string(), Value::Number(results.len().into()));
        summary.insert(
            "created".to_string(),
            Value::Number(count(|a| matches!(a, PlannedAction::Create)).into()),
        );
        summary.insert(
            "updated".to_string(),
            Value::Number(count(|a| matches!(a, PlannedAction::Update { .. })).into()),
        );
        summary.insert(
            "replaced".to_string(),
            Value::Number(count(|a| matches!(a, PlannedAction::Replace { .. })).into()),
        );
        summary.insert(
            "deleted".to_string(),
            Value::Number(count(|a| matches!(a, PlannedAction::Delete)).into()),
        );
        summary.insert(
            "unchanged".to_string(),
            Value::Number(count(PlannedAction::is_noop).into()),
        );
        summary.insert(
            "total_duration_ms".to_string(),
            Value::Number((total_duration.as_millis() as u64).into()),
        );

        let addresses: Vec<Value> = results
            .iter()
            .map(|r| Value::String(r.address.clone()))
            .collect();
        summary.insert("resources".to_string(), Value::Array(addresses));

        summary
    }
}

/// 套用後仍可確定的屬性：重建後全部未知，更新時變更的鍵未知
fn known_after(action: &PlannedAction, attributes: Value) -> Option<Value> {
    match action {
        PlannedAction::Replace { .. } | PlannedAction::Create | PlannedAction::Delete => None,
        PlannedAction::Update { changed } => match attributes {
            Value::Object(mut map) => {
                for key in changed {
                    map.remove(key);
                }
                Some(Value::Object(map))
            }
            other => Some(other),
        },
        PlannedAction::NoOp => Some(attributes),
    }
}

/// 逐一解析頂層屬性；無法解析的引用（依賴尚未建立）回報為未知
fn resolve_known(
    context: &ApplyContext,
    owner: &str,
    attributes: &serde_json::Map<String, Value>,
) -> Result<(Value, Vec<String>)> {
    let mut resolved = serde_json::Map::new();
    let mut unknown = Vec::new();
    for (key, value) in attributes {
        match context.resolve(owner, value) {
            Ok(value) => {
                resolved.insert(key.clone(), value);
            }
            Err(ProviderError::ReferenceError { .. }) => unknown.push(key.clone()),
            Err(e) => return Err(e),
        }
    }
    Ok((Value::Object(resolved), unknown))
}
