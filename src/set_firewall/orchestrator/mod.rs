mod builder;
mod run;

pub use builder::OrchestratorBuilder;
pub use run::{acquire, export};

use std::sync::Arc;

use super::{
    kernel::Kernel,
    notify::Notifier,
    option::{FwOption, Quiescence},
    rules::RuleDefinition,
    source::ListProvider,
};

/// Sequences the configured rule definitions through acquisition, merge,
/// set update and rule binding, and drives teardown
pub struct Orchestrator<K: Kernel> {
    /// Kernel capability, privilege already verified
    pub(super) kernel: K,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) provider: Box<dyn ListProvider>,
    /// Firewall defaults the rule definitions are resolved against
    pub(super) option: FwOption,
    pub(super) rules: Vec<RuleDefinition>,
    /// Host identifier carried by notifications
    pub(super) host: String,
    pub(super) quiescence: Quiescence,
}

impl<K: Kernel> Orchestrator<K> {
    pub fn builder() -> OrchestratorBuilder<K> { OrchestratorBuilder::default() }

    #[cfg(test)]
    pub fn kernel(&self) -> &K { &self.kernel }
}
