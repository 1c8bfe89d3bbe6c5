//! In-memory kernel used by unit tests.

use std::{
    collections::{BTreeMap, BTreeSet},
    net::Ipv4Addr,
    sync::Mutex,
};

use ipnet::Ipv4Net;

use super::{super::error::KernelError, FilterKernel, KernelResult, SetKernel};

const BUILTIN_CHAINS: [(&str, &str); 5] = [
    ("filter", "INPUT"),
    ("filter", "FORWARD"),
    ("filter", "OUTPUT"),
    ("raw", "PREROUTING"),
    ("raw", "OUTPUT"),
];

#[derive(Default)]
struct State {
    sets: BTreeMap<String, BTreeSet<Ipv4Net>>,
    chains: BTreeMap<(String, String), Vec<String>>,
    /// (op, target) pairs that fail once with `KernelError::Failed`
    faults: Vec<(String, String)>,
    /// Every mutating call, in order, e.g. "swap IR-tmp IR"
    journal: Vec<String>,
}

/// Kernel double modelling ipset / iptables semantics that matter here:
/// sets referenced by a rule cannot be destroyed, rules cannot reference
/// missing sets, built-in chains cannot be deleted.
pub struct MemoryKernel {
    state: Mutex<State>,
}

impl Default for MemoryKernel {
    fn default() -> Self { Self::new() }
}

impl MemoryKernel {
    pub fn new() -> Self {
        let mut state = State::default();
        for (table, chain) in BUILTIN_CHAINS {
            state
                .chains
                .insert((table.to_string(), chain.to_string()), Vec::new());
        }
        MemoryKernel {
            state: Mutex::new(state),
        }
    }

    /// Make the next `op` call on `target` fail
    pub fn fail_once(&self, op: &str, target: &str) {
        self.state
            .lock()
            .unwrap()
            .faults
            .push((op.to_string(), target.to_string()));
    }

    pub fn seed_set(&self, name: &str, members: &[&str]) {
        let members = members.iter().map(|m| m.parse().unwrap()).collect();
        self.state
            .lock()
            .unwrap()
            .sets
            .insert(name.to_string(), members);
    }

    pub fn members(&self, name: &str) -> Option<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .sets
            .get(name)
            .map(|set| set.iter().map(|n| n.to_string()).collect())
    }

    pub fn set_names(&self) -> Vec<String> {
        self.state.lock().unwrap().sets.keys().cloned().collect()
    }

    pub fn rules(&self, table: &str, chain: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .chains
            .get(&(table.to_string(), chain.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_chain(&self, table: &str, chain: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .chains
            .contains_key(&(table.to_string(), chain.to_string()))
    }

    pub fn journal(&self) -> Vec<String> { self.state.lock().unwrap().journal.clone() }

    pub fn clear_journal(&self) { self.state.lock().unwrap().journal.clear() }
}

impl State {
    fn check_fault(&mut self, op: &str, target: &str) -> KernelResult<()> {
        if let Some(i) = self
            .faults
            .iter()
            .position(|(o, t)| o == op && t == target)
        {
            self.faults.remove(i);
            return Err(KernelError::Failed(format!("injected {} failure on {}", op, target)));
        }
        Ok(())
    }

    fn record(&mut self, entry: String) { self.journal.push(entry) }

    fn referenced(&self, set: &str) -> bool {
        self.chains.values().flatten().any(|rule| {
            rule.split_whitespace()
                .skip_while(|word| *word != "--match-set")
                .nth(1)
                == Some(set)
        })
    }

    fn chain(&mut self, table: &str, chain: &str) -> KernelResult<&mut Vec<String>> {
        self.chains
            .get_mut(&(table.to_string(), chain.to_string()))
            .ok_or_else(|| {
                KernelError::NotFound(format!(
                    "iptables: No chain/target/match by that name ({} {})",
                    table, chain
                ))
            })
    }
}

fn set_missing(name: &str) -> KernelError {
    KernelError::NotFound(format!("The set with the given name does not exist ({})", name))
}

impl SetKernel for MemoryKernel {
    fn create_set(&self, name: &str) -> KernelResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_fault("create", name)?;
        if state.sets.contains_key(name) {
            return Err(KernelError::AlreadyExists(format!(
                "Set cannot be created: set with the same name already exists ({})",
                name
            )));
        }
        state.sets.insert(name.to_string(), BTreeSet::new());
        state.record(format!("create {}", name));
        Ok(())
    }

    fn destroy_set(&self, name: &str) -> KernelResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_fault("destroy", name)?;
        if !state.sets.contains_key(name) {
            return Err(set_missing(name));
        }
        if state.referenced(name) {
            return Err(KernelError::Failed(format!(
                "Set cannot be destroyed: it is in use by a kernel component ({})",
                name
            )));
        }
        state.sets.remove(name);
        state.record(format!("destroy {}", name));
        Ok(())
    }

    fn swap_sets(&self, a: &str, b: &str) -> KernelResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_fault("swap", a)?;
        let first = state.sets.remove(a).ok_or_else(|| set_missing(a))?;
        let Some(second) = state.sets.remove(b) else {
            state.sets.insert(a.to_string(), first);
            return Err(set_missing(b));
        };
        state.sets.insert(a.to_string(), second);
        state.sets.insert(b.to_string(), first);
        state.record(format!("swap {} {}", a, b));
        Ok(())
    }

    fn add_member(&self, name: &str, net: &Ipv4Net) -> KernelResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_fault("add", name)?;
        let set = state.sets.get_mut(name).ok_or_else(|| set_missing(name))?;
        if !set.insert(*net) {
            return Err(KernelError::AlreadyExists(format!(
                "Element cannot be added to the set: it's already added ({})",
                net
            )));
        }
        Ok(())
    }

    fn list_members(&self, name: &str) -> KernelResult<Vec<Ipv4Net>> {
        let state = self.state.lock().unwrap();
        state
            .sets
            .get(name)
            .map(|set| set.iter().copied().collect())
            .ok_or_else(|| set_missing(name))
    }

    fn list_sets(&self) -> KernelResult<Vec<String>> {
        Ok(self.set_names())
    }

    fn test_member(&self, name: &str, ip: Ipv4Addr) -> KernelResult<bool> {
        let state = self.state.lock().unwrap();
        let set = state.sets.get(name).ok_or_else(|| set_missing(name))?;
        Ok(set.iter().any(|net| net.contains(&ip)))
    }
}

impl FilterKernel for MemoryKernel {
    fn chain_exists(&self, table: &str, chain: &str) -> KernelResult<bool> {
        Ok(self.has_chain(table, chain))
    }

    fn new_chain(&self, table: &str, chain: &str) -> KernelResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_fault("new_chain", chain)?;
        let key = (table.to_string(), chain.to_string());
        if state.chains.contains_key(&key) {
            return Err(KernelError::AlreadyExists(
                "iptables: Chain already exists.".to_string(),
            ));
        }
        state.chains.insert(key, Vec::new());
        state.record(format!("new_chain {} {}", table, chain));
        Ok(())
    }

    fn delete_chain(&self, table: &str, chain: &str) -> KernelResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_fault("delete_chain", chain)?;
        if BUILTIN_CHAINS
            .iter()
            .any(|(t, c)| *t == table && *c == chain)
        {
            return Err(KernelError::Failed(
                "iptables: Can't delete built-in chain.".to_string(),
            ));
        }
        let rules = state.chain(table, chain)?;
        if !rules.is_empty() {
            return Err(KernelError::Failed(
                "iptables: Directory not empty.".to_string(),
            ));
        }
        let jump = format!("-j {}", chain);
        if state.chains.values().flatten().any(|rule| *rule == jump) {
            return Err(KernelError::Failed(
                "iptables: Too many links.".to_string(),
            ));
        }
        state.chains.remove(&(table.to_string(), chain.to_string()));
        state.record(format!("delete_chain {} {}", table, chain));
        Ok(())
    }

    fn rule_exists(&self, table: &str, chain: &str, rule: &str) -> KernelResult<bool> {
        let mut state = self.state.lock().unwrap();
        Ok(state.chain(table, chain)?.iter().any(|r| r == rule))
    }

    fn insert_rule(
        &self,
        table: &str,
        chain: &str,
        rule: &str,
        position: i32,
    ) -> KernelResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_fault("insert", chain)?;
        if let Some(set) = rule
            .split_whitespace()
            .skip_while(|word| *word != "--match-set")
            .nth(1)
        {
            if !state.sets.contains_key(set) {
                return Err(KernelError::Failed(format!("Set {} doesn't exist.", set)));
            }
        }
        let rules = state.chain(table, chain)?;
        if position < 1 || position as usize > rules.len() + 1 {
            return Err(KernelError::Failed(
                "iptables: Index of insertion too big.".to_string(),
            ));
        }
        rules.insert(position as usize - 1, rule.to_string());
        state.record(format!("insert {} {} {}", table, chain, rule));
        Ok(())
    }

    fn delete_rule(&self, table: &str, chain: &str, rule: &str) -> KernelResult<()> {
        let mut state = self.state.lock().unwrap();
        state.check_fault("delete", chain)?;
        let rules = state.chain(table, chain)?;
        let index = rules.iter().position(|r| r == rule).ok_or_else(|| {
            KernelError::NotFound(
                "iptables: Bad rule (does a matching rule exist in that chain?).".to_string(),
            )
        })?;
        rules.remove(index);
        state.record(format!("delete {} {} {}", table, chain, rule));
        Ok(())
    }

    fn list_rules(&self, table: &str, chain: &str) -> KernelResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        Ok(state.chain(table, chain)?.clone())
    }
}
