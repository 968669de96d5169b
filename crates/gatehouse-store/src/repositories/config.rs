//! In-memory pipeline configuration with change propagation.

use async_trait::async_trait;
use gatehouse_core::ids::PipelineName;
use gatehouse_core::pipeline::{PipelineConfig, PipelineConfigs};
use gatehouse_core::ports::{ConfigChangeListener, ConfigSource};
use gatehouse_core::{Error, Result};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Holds the current configuration snapshot and notifies listeners on change.
///
/// Listeners are awaited one after another before `replace`/`update_pipeline`
/// return, so callers observe reconciled state afterwards. A listener error
/// is logged and does not stop delivery to the remaining listeners.
#[derive(Default)]
pub struct MemoryConfigRepository {
    configs: RwLock<PipelineConfigs>,
    listeners: RwLock<Vec<Arc<dyn ConfigChangeListener>>>,
}

impl MemoryConfigRepository {
    pub fn new(configs: PipelineConfigs) -> Self {
        Self {
            configs: RwLock::new(configs),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Load the configuration from a YAML file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let configs: PipelineConfigs = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), pipelines = configs.pipelines.len(), "Loaded pipeline config");
        Ok(Self::new(configs))
    }

    fn snapshot(&self) -> PipelineConfigs {
        self.configs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn listeners(&self) -> Vec<Arc<dyn ConfigChangeListener>> {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the whole configuration.
    pub async fn replace(&self, configs: PipelineConfigs) -> Result<()> {
        *self
            .configs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = configs.clone();
        info!(pipelines = configs.pipelines.len(), "Pipeline config replaced");

        for listener in self.listeners() {
            if let Err(e) = listener.on_config_change(&configs).await {
                warn!(error = %e, "Config change listener failed");
            }
        }
        Ok(())
    }

    /// Insert or replace a single pipeline.
    pub async fn update_pipeline(&self, config: PipelineConfig) -> Result<()> {
        self.configs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .upsert(config.clone());
        info!(pipeline = %config.name, "Pipeline config updated");

        for listener in self.listeners() {
            if let Err(e) = listener.on_pipeline_change(&config).await {
                warn!(pipeline = %config.name, error = %e, "Pipeline change listener failed");
            }
        }
        Ok(())
    }

    /// Remove a pipeline. Propagated as a full configuration change.
    pub async fn remove_pipeline(&self, name: &PipelineName) -> Result<()> {
        let mut configs = self.snapshot();
        let before = configs.pipelines.len();
        configs.pipelines.retain(|p| &p.name != name);
        if configs.pipelines.len() == before {
            return Err(Error::PipelineNotFound(name.to_string()));
        }
        self.replace(configs).await
    }
}

#[async_trait]
impl ConfigSource for MemoryConfigRepository {
    async fn pipeline_config(&self, name: &PipelineName) -> Result<Option<PipelineConfig>> {
        Ok(self
            .configs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned())
    }

    async fn current(&self) -> Result<PipelineConfigs> {
        Ok(self.snapshot())
    }

    fn register_listener(&self, listener: Arc<dyn ConfigChangeListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }
}
