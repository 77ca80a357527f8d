pub mod branch;
pub mod database;
pub mod endpoint;
pub mod project;
pub mod role;

use crate::core::client::ApiClient;
use crate::core::poll::PollPolicy;
use crate::domain::model::ResourceKind;
use crate::domain::ports::ResourceHandler;
use crate::utils::error::{ProviderError, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub use branch::BranchResource;
pub use database::DatabaseResource;
pub use endpoint::EndpointResource;
pub use project::ProjectResource;
pub use role::RoleResource;

/// 依資源種類查找對應的處理器
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    handlers: HashMap<ResourceKind, Arc<dyn ResourceHandler>>,
}

impl ResourceRegistry {
    pub fn new(client: ApiClient, poll: PollPolicy) -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(ProjectResource::new(client.clone())));
        registry.register(Arc::new(BranchResource::new(client.clone(), poll)));
        registry.register(Arc::new(EndpointResource::new(client.clone(), poll)));
        registry.register(Arc::new(DatabaseResource::new(client.clone())));
        registry.register(Arc::new(RoleResource::new(client)));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn ResourceHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: ResourceKind) -> Result<Arc<dyn ResourceHandler>> {
        self.handlers
            .get(&kind)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownResourceError {
                address: kind.to_string(),
            })
    }

    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<ResourceKind> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}
