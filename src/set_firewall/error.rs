use std::fmt::{Display, Formatter};

use thiserror::Error;

/// Failure classes of a run
///
/// Idempotent no-ops (destroying an absent set, deleting an absent rule,
/// creating an existing chain) never reach this type, the components
/// absorb them as success.
#[derive(Debug, Error)]
pub enum Error {
    /// The source list could not be fetched or read
    #[error("Failed to acquire list [{source_id}]: {reason}")]
    Acquisition { source_id: String, reason: String },

    /// A kernel set or packet filter operation failed for a real reason
    #[error("Kernel operation [{op}] on [{target}] failed: {reason}")]
    Kernel {
        op: &'static str,
        target: String,
        reason: String,
    },

    /// The process is not allowed to touch the kernel facilities
    #[error("Insufficient privilege: {0}")]
    Privilege(String),

    /// Rollback requested for a set that was never updated
    #[error("Backup set [{0}] does not exist")]
    BackupMissing(String),

    /// The new generation of `set` is live, a later step failed
    #[error("Set [{set}] is live with the new generation, but: {cause}")]
    Committed { set: String, cause: Box<Error> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// Failures collected when rule definitions are isolated from each other
    #[error("{} rule definition(s) failed: {}", .0.len(), JoinErrors(.0))]
    Multiple(Vec<Error>),
}

impl Error {
    pub(crate) fn kernel(op: &'static str, target: impl Into<String>, err: KernelError) -> Self {
        Error::Kernel {
            op,
            target: target.into(),
            reason: err.to_string(),
        }
    }

    /// Whether the membership change already took effect before this error
    pub fn is_committed(&self) -> bool { matches!(self, Error::Committed { .. }) }
}

struct JoinErrors<'a>(&'a [Error]);

impl Display for JoinErrors<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

/// Outcome classes reported by the kernel adapters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("does not exist: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Failed(String),
}

impl KernelError {
    /// Classify a message coming back from ipset / iptables
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("does not exist")
            || lower.contains("does a matching rule exist")
            || lower.contains("no chain/target/match by that name")
        {
            KernelError::NotFound(message)
        } else if lower.contains("already exists") {
            KernelError::AlreadyExists(message)
        } else {
            KernelError::Failed(message)
        }
    }
}
