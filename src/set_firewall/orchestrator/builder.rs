use std::sync::Arc;

use super::{
    super::{
        Error, Result,
        kernel::Kernel,
        notify::{Notifier, Silent},
        option::FwOption,
        rules::RuleDefinition,
        source::ListProvider,
        utils::hostname,
    },
    Orchestrator,
};

pub struct OrchestratorBuilder<K: Kernel> {
    kernel: Option<K>,
    notifier: Option<Arc<dyn Notifier>>,
    provider: Option<Box<dyn ListProvider>>,
    option: FwOption,
    rules: Vec<RuleDefinition>,
    host: Option<String>,
}

impl<K: Kernel> Default for OrchestratorBuilder<K> {
    fn default() -> Self {
        OrchestratorBuilder {
            kernel: None,
            notifier: None,
            provider: None,
            option: FwOption::default(),
            rules: Vec::new(),
            host: None,
        }
    }
}

impl<K: Kernel> OrchestratorBuilder<K> {
    pub fn kernel(mut self, kernel: K) -> Self {
        self.kernel = Some(kernel);
        self
    }
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }
    pub fn provider(mut self, provider: Box<dyn ListProvider>) -> Self {
        self.provider = Some(provider);
        self
    }
    pub fn option(mut self, option: &FwOption) -> Self {
        self.option = option.clone();
        self
    }
    pub fn rules(mut self, rules: &[RuleDefinition]) -> Self {
        self.rules = rules.to_vec();
        self
    }
    pub fn host(mut self, host: &Option<String>) -> Self {
        self.host = host.clone();
        self
    }
    pub fn build(self) -> Result<Orchestrator<K>> {
        let kernel = self
            .kernel
            .ok_or_else(|| Error::Config("no kernel capability given".to_string()))?;
        let provider = self
            .provider
            .ok_or_else(|| Error::Config("no list provider given".to_string()))?;
        Ok(Orchestrator {
            kernel,
            notifier: self.notifier.unwrap_or_else(|| Arc::new(Silent)),
            provider,
            quiescence: self.option.quiescence(),
            option: self.option,
            rules: self.rules,
            host: self.host.unwrap_or_else(hostname),
        })
    }
}
