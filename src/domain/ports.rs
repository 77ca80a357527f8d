use crate::domain::model::ResourceKind;
use crate::utils::error::{ProviderError, Result};
use crate::utils::validation::Validate;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::time::Duration;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn delete_file(&self, path: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn base_url(&self) -> &str;
    fn api_key(&self) -> &str;
    fn timeout(&self) -> Duration;
    fn retry_attempts(&self) -> u32;
    fn retry_delay(&self) -> Duration;
    fn poll_max_attempts(&self) -> u32;
    fn poll_interval(&self) -> Duration;
    fn state_path(&self) -> &str;
}

/// 每種資源的生命週期契約
///
/// `Spec` 是使用者宣告的屬性，`State` 是遠端回傳後整理過的型別化狀態。
#[async_trait]
pub trait Resource: Send + Sync {
    type Spec: Serialize + DeserializeOwned + Validate + Send + Sync;
    type State: Serialize + DeserializeOwned + Send + Sync;

    const KIND: ResourceKind;
    /// Attributes whose change forces delete + create.
    const REPLACE_ON_CHANGE: &'static [&'static str];
    const IGNORE_ON_DIFF: &'static [&'static str] = &[];

    async fn create(&self, spec: &Self::Spec) -> Result<Self::State>;

    /// `None` when the remote object no longer exists.
    async fn read(&self, prior: &Self::State) -> Result<Option<Self::State>>;

    async fn update(&self, spec: &Self::Spec, prior: &Self::State) -> Result<Self::State>;

    async fn delete(&self, state: &Self::State) -> Result<()>;

    async fn import(&self, id: &str) -> Result<Self::State>;

    fn import_id(state: &Self::State) -> String;
}

/// JSON 版本的 `Resource`，給引擎以 trait object 方式使用
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn kind(&self) -> ResourceKind;
    fn replace_on_change(&self) -> &'static [&'static str];
    fn ignore_on_diff(&self) -> &'static [&'static str];

    /// Re-encodes declared attributes through `Spec` so they compare with
    /// stored state (e.g. `+00:00` becomes `Z`). Only declared keys are kept.
    fn normalize_spec(&self, spec: &Value) -> Result<Value>;

    async fn create_value(&self, spec: &Value) -> Result<Value>;
    async fn read_value(&self, state: &Value) -> Result<Option<Value>>;
    async fn update_value(&self, spec: &Value, state: &Value) -> Result<Value>;
    async fn delete_value(&self, state: &Value) -> Result<()>;
    async fn import_value(&self, id: &str) -> Result<Value>;
    fn state_id(&self, state: &Value) -> Result<String>;
}

fn decode_spec<R: Resource>(spec: &Value) -> Result<R::Spec> {
    let spec: R::Spec =
        serde_json::from_value(spec.clone()).map_err(|e| ProviderError::ConfigValidationError {
            field: R::KIND.to_string(),
            message: e.to_string(),
        })?;
    spec.validate()?;
    Ok(spec)
}

fn decode_state<R: Resource>(state: &Value) -> Result<R::State> {
    serde_json::from_value(state.clone()).map_err(|e| ProviderError::StateError {
        address: R::KIND.to_string(),
        message: format!("stored state does not match the {} schema: {}", R::KIND, e),
    })
}

#[async_trait]
impl<R> ResourceHandler for R
where
    R: Resource,
{
    fn kind(&self) -> ResourceKind {
        R::KIND
    }

    fn replace_on_change(&self) -> &'static [&'static str] {
        R::REPLACE_ON_CHANGE
    }

    fn ignore_on_diff(&self) -> &'static [&'static str] {
        R::IGNORE_ON_DIFF
    }

    fn normalize_spec(&self, spec: &Value) -> Result<Value> {
        let normalized = serde_json::to_value(decode_spec::<R>(spec)?)?;
        match (spec, normalized) {
            (Value::Object(declared), Value::Object(mut normalized)) => {
                normalized.retain(|key, _| declared.contains_key(key));
                Ok(Value::Object(normalized))
            }
            (_, normalized) => Ok(normalized),
        }
    }

    async fn create_value(&self, spec: &Value) -> Result<Value> {
        let spec = decode_spec::<R>(spec)?;
        let state = Resource::create(self, &spec).await?;
        Ok(serde_json::to_value(&state)?)
    }

    async fn read_value(&self, state: &Value) -> Result<Option<Value>> {
        let prior = decode_state::<R>(state)?;
        match Resource::read(self, &prior).await? {
            Some(state) => Ok(Some(serde_json::to_value(&state)?)),
            None => Ok(None),
        }
    }

    async fn update_value(&self, spec: &Value, state: &Value) -> Result<Value> {
        let spec = decode_spec::<R>(spec)?;
        let prior = decode_state::<R>(state)?;
        let state = Resource::update(self, &spec, &prior).await?;
        Ok(serde_json::to_value(&state)?)
    }

    async fn delete_value(&self, state: &Value) -> Result<()> {
        let state = decode_state::<R>(state)?;
        Resource::delete(self, &state).await
    }

    async fn import_value(&self, id: &str) -> Result<Value> {
        let state = Resource::import(self, id).await?;
        Ok(serde_json::to_value(&state)?)
    }

    fn state_id(&self, state: &Value) -> Result<String> {
        let state = decode_state::<R>(state)?;
        Ok(R::import_id(&state))
    }
}
