use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::traits::{ModelSystem, ModelSystemStatus, SystemManager};

/// 内存中的模型后端注册表
pub struct ModelSystemRegistry {
    systems: Arc<RwLock<HashMap<String, Arc<dyn ModelSystem>>>>,
}

impl ModelSystemRegistry {
    pub fn new() -> Self {
        Self {
            systems: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 注册后端，同一模型ID重复注册时替换旧后端
    pub async fn register(&self, model_id: impl Into<String>, system: Arc<dyn ModelSystem>) {
        let model_id = model_id.into();
        let mut registry = self.systems.write().await;
        if registry.insert(model_id.clone(), system).is_some() {
            info!("替换模型 {} 的执行后端", model_id);
        } else {
            info!("注册模型 {} 的执行后端", model_id);
        }
    }

    pub async fn register_batch(&self, systems: Vec<(String, Arc<dyn ModelSystem>)>) {
        let mut registry = self.systems.write().await;
        for (model_id, system) in systems {
            registry.insert(model_id, system);
        }
    }

    pub async fn unregister(&self, model_id: &str) -> bool {
        let mut registry = self.systems.write().await;
        let removed = registry.remove(model_id).is_some();
        if removed {
            debug!("注销模型 {} 的执行后端", model_id);
        }
        removed
    }

    pub async fn contains(&self, model_id: &str) -> bool {
        self.systems.read().await.contains_key(model_id)
    }

    pub async fn list_models(&self) -> Vec<String> {
        let registry = self.systems.read().await;
        let mut models: Vec<String> = registry.keys().cloned().collect();
        models.sort();
        models
    }

    pub async fn count(&self) -> usize {
        self.systems.read().await.len()
    }

    pub async fn clear(&self) {
        self.systems.write().await.clear();
    }

    pub async fn get_all_status(&self) -> HashMap<String, ModelSystemStatus> {
        let systems: Vec<(String, Arc<dyn ModelSystem>)> = {
            let registry = self.systems.read().await;
            registry
                .iter()
                .map(|(id, system)| (id.clone(), Arc::clone(system)))
                .collect()
        };

        let mut statuses = HashMap::with_capacity(systems.len());
        for (model_id, system) in systems {
            statuses.insert(model_id, system.get_status().await);
        }
        statuses
    }
}

impl Default for ModelSystemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemManager for ModelSystemRegistry {
    async fn get_system(&self, model_id: &str) -> Option<Arc<dyn ModelSystem>> {
        self.systems.read().await.get(model_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HubResult;
    use tokio_util::sync::CancellationToken;

    struct StaticSystem {
        status: ModelSystemStatus,
    }

    #[async_trait]
    impl ModelSystem for StaticSystem {
        fn name(&self) -> &str {
            "static"
        }

        async fn execute_task(
            &self,
            payload: &serde_json::Value,
            _cancel: CancellationToken,
        ) -> HubResult<serde_json::Value> {
            Ok(payload.clone())
        }

        async fn get_status(&self) -> ModelSystemStatus {
            self.status
        }
    }

    fn system(status: ModelSystemStatus) -> Arc<dyn ModelSystem> {
        Arc::new(StaticSystem { status })
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let registry = ModelSystemRegistry::new();
        registry.register("m1", system(ModelSystemStatus::idle())).await;

        assert!(registry.contains("m1").await);
        assert!(registry.get_system("m1").await.is_some());
        assert!(registry.get_system("missing").await.is_none());
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_and_clear() {
        let registry = ModelSystemRegistry::new();
        registry
            .register_batch(vec![
                ("b".to_string(), system(ModelSystemStatus::idle())),
                ("a".to_string(), system(ModelSystemStatus::busy())),
            ])
            .await;
        assert_eq!(registry.list_models().await, vec!["a", "b"]);

        assert!(registry.unregister("a").await);
        assert!(!registry.unregister("a").await);
        assert_eq!(registry.count().await, 1);

        registry.clear().await;
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_get_all_status() {
        let registry = ModelSystemRegistry::new();
        registry.register("idle", system(ModelSystemStatus::idle())).await;
        registry.register("down", system(ModelSystemStatus::unavailable())).await;

        let statuses = registry.get_all_status().await;
        assert!(statuses["idle"].can_accept());
        assert!(!statuses["down"].available);
    }
}
