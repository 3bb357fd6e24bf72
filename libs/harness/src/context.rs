//! Suite context.
//!
//! Built once at suite start and handed to every component. Cloning is cheap
//! and all clones share the same client.

use std::sync::Arc;

use jobprobe_names::NamespaceName;

use crate::client::ControlPlane;
use crate::cluster::KubeControlPlane;
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::poller::ConditionPoller;
use crate::scenario::ScenarioRunner;
use crate::verifier::OutcomeVerifier;

#[derive(Clone)]
pub struct HarnessContext {
    client: Arc<dyn ControlPlane>,
    config: Arc<HarnessConfig>,
}

impl HarnessContext {
    /// Fails if `config` does not validate.
    pub fn new(client: Arc<dyn ControlPlane>, config: HarnessConfig) -> Result<Self, HarnessError> {
        config.validate()?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Loads configuration from the environment and connects to the cluster.
    pub async fn from_env() -> Result<Self, HarnessError> {
        let config = HarnessConfig::from_env()?;
        Self::connect(config).await
    }

    /// Connects to the cluster named by `config`.
    pub async fn connect(config: HarnessConfig) -> Result<Self, HarnessError> {
        let client = KubeControlPlane::connect(config.kubeconfig.as_deref()).await?;
        Self::new(Arc::new(client), config)
    }

    pub fn client(&self) -> &Arc<dyn ControlPlane> {
        &self.client
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Generates a namespace name that no other run will use.
    pub fn new_namespace(&self) -> Result<NamespaceName, HarnessError> {
        Ok(NamespaceName::generate(&self.config.namespace_prefix)?)
    }

    pub fn poller(&self) -> ConditionPoller {
        ConditionPoller::new(Arc::clone(&self.client), self.config.poll_config())
    }

    pub fn verifier(&self) -> OutcomeVerifier {
        OutcomeVerifier::new(Arc::clone(&self.client))
    }

    pub fn runner(&self) -> ScenarioRunner {
        ScenarioRunner::new(self.clone())
    }
}
