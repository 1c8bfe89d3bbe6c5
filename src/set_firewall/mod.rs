mod binder;
mod cidr;
mod error;
mod kernel;
mod notify;
mod option;
mod orchestrator;
mod rollback;
mod rules;
mod source;
mod updater;
mod utils;

pub use cidr::find_covering;
pub use error::Error;
pub use kernel::Netfilter;
pub use notify::{Mattermost, Notifier, Silent};
pub use option::{Direction, FwOption, NotifyOption, Policy, SourceOption};
pub use orchestrator::{Orchestrator, acquire, export};
pub use rules::RuleDefinition;
pub use source::HttpProvider;
pub use utils::hostname;

pub type Result<T> = std::result::Result<T, Error>;
