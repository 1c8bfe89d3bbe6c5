use std::path::PathBuf;

use serde::Deserialize;

use super::{
    Error, Result,
    option::{Direction, FwOption, Policy},
};

/// ipset limits set names to 31 bytes, leave room for "-bak" / "-tmp"
const MAX_SET_NAME_LEN: usize = 27;

/// One `[[rules]]` entry of the configuration
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RuleDefinition {
    /// Source identifier, a country code or "tor"
    pub source: String,

    /// Target set name, defaults to the upper-cased source
    #[serde(default)]
    pub set: Option<String>,

    /// Local list files, read and concatenated instead of fetching
    #[serde(default, alias = "file")]
    pub files: Vec<PathBuf>,

    /// Entries always added on top of the acquired list
    #[serde(default, alias = "extraIPs")]
    pub extra: Vec<String>,

    /// Whether a match rule is attached for the set
    #[serde(default = "RuleDefinition::default_iptables")]
    pub iptables: bool,

    /// Per-rule overrides of the `[firewall]` defaults
    #[serde(default)]
    pub binding: BindingOverride,
}

impl RuleDefinition {
    #[inline]
    fn default_iptables() -> bool { true }

    pub fn new(source: &str) -> Self {
        RuleDefinition {
            source: source.to_string(),
            iptables: RuleDefinition::default_iptables(),
            ..Default::default()
        }
    }
}

/// Optional per-rule binding fields, unset ones fall back to `[firewall]`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BindingOverride {
    pub table: Option<String>,
    pub chain: Option<String>,
    pub insert: Option<i32>,
    pub policy: Option<Policy>,
    pub directions: Option<Vec<Direction>>,
}

/// Concrete firewall binding of one set
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub table: String,
    pub chain: String,
    pub position: i32,
    pub policy: Policy,
    pub directions: Vec<Direction>,
    /// Built-in chain that jumps to `chain`, when `chain` is the shared custom chain
    pub jump_from: Option<String>,
}

impl Binding {
    /// iptables rule spec matching `set` in `direction` with `policy`
    pub fn rule_spec(set: &str, direction: Direction, policy: Policy) -> String {
        format!(
            "-m set --match-set {} {} -j {}",
            set,
            direction.flag(),
            policy
        )
    }

    /// Unconditional jump rule spec
    pub fn jump_spec(chain: &str) -> String { format!("-j {}", chain) }
}

/// A rule definition with every default applied
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRule {
    pub source: String,
    pub set: String,
    pub files: Vec<PathBuf>,
    pub extra: Vec<String>,
    /// None when no match rule is attached
    pub binding: Option<Binding>,
}

pub fn backup_name(set: &str) -> String { format!("{}-bak", set) }

pub fn temp_name(set: &str) -> String { format!("{}-tmp", set) }

impl FwOption {
    /// Apply the firewall defaults to a rule definition
    pub fn resolve(&self, rule: &RuleDefinition) -> Result<ResolvedRule> {
        let source = rule.source.trim();
        if source.is_empty() {
            return Err(Error::Config("rule without a source".to_string()));
        }

        let set = match &rule.set {
            Some(set) => set.trim().to_string(),
            None => source.to_uppercase(),
        };
        if set.is_empty() || set.len() > MAX_SET_NAME_LEN || set.contains(char::is_whitespace) {
            return Err(Error::Config(format!(
                "invalid set name [{}] (1-{} characters, no whitespace)",
                set, MAX_SET_NAME_LEN
            )));
        }

        let binding = if rule.iptables {
            Some(self.binding(&rule.binding)?)
        } else {
            None
        };

        Ok(ResolvedRule {
            source: source.to_string(),
            set,
            files: rule.files.clone(),
            extra: rule.extra.clone(),
            binding,
        })
    }

    fn binding(&self, over: &BindingOverride) -> Result<Binding> {
        let table = over.table.clone().unwrap_or_else(|| self.table.clone());
        let (chain, jump_from) = match (&over.chain, &self.default_chain) {
            (Some(chain), _) => (chain.clone(), None),
            (None, Some(custom)) => (custom.clone(), Some(self.chain.clone())),
            (None, None) => (self.chain.clone(), None),
        };
        let position = over.insert.unwrap_or(self.insert);
        if position < 1 {
            return Err(Error::Config(format!("insert position {} must be >= 1", position)));
        }
        let directions = over
            .directions
            .clone()
            .unwrap_or_else(|| self.directions.clone());
        if directions.is_empty() {
            return Err(Error::Config("empty match direction list".to_string()));
        }

        Ok(Binding {
            table,
            chain,
            position,
            policy: over.policy.unwrap_or(self.policy),
            directions,
            jump_from,
        })
    }
}
