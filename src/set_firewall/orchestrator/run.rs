use std::{net::Ipv4Addr, path::Path};

use ipnet::Ipv4Net;
use log::{error, info, warn};

use super::{
    super::{
        Error, Result,
        binder::{Detach, RuleBinder},
        cidr::{Merged, count_addresses, merge},
        error::KernelError,
        kernel::Kernel,
        notify::NotificationEvent,
        rollback,
        rules::{ResolvedRule, RuleDefinition, backup_name, temp_name},
        source::{ListProvider, read_list_files},
        updater::Updater,
    },
    Orchestrator,
};

/// Acquire the raw list of a rule, append its extra entries and merge
///
/// Local files replace the remote list when any are configured.
pub async fn acquire(provider: &dyn ListProvider, rule: &ResolvedRule) -> Result<Merged> {
    let mut lines = if rule.files.is_empty() {
        provider.fetch(&rule.source).await?
    } else {
        read_list_files(&rule.source, &rule.files)?
    };
    lines.extend(rule.extra.iter().cloned());
    let merged = merge(&lines);
    if merged.nets.is_empty() {
        warn!("LIST [{}] HAS NO VALID ENTRIES", rule.source);
    }
    Ok(merged)
}

/// Write merged prefixes to `path`, one per line
pub fn export(merged: &Merged, path: &Path) -> Result<()> {
    let mut body = String::new();
    for net in &merged.nets {
        body.push_str(&net.to_string());
        body.push('\n');
    }
    std::fs::write(path, body)?;
    info!("EXPORT [{}] PREFIXES TO [{}]", merged.nets.len(), path.display());
    Ok(())
}

impl<K: Kernel> Orchestrator<K> {
    /// Update every configured rule definition in order, returns the
    /// number of sets updated
    pub async fn run(&self) -> Result<usize> {
        let resolved = self.resolve_all()?;
        self.wire_jumps(&resolved)?;

        let mut failures = Vec::new();
        let mut updated = 0;
        for rule in &resolved {
            match self.process(rule).await {
                Ok(_) => updated += 1,
                Err(e) => {
                    self.report(rule, &e);
                    if !self.option.continue_on_error {
                        return Err(e);
                    }
                    failures.push(e);
                }
            }
        }
        if !failures.is_empty() {
            return Err(Error::Multiple(failures));
        }
        info!("RUN FINISHED, [{}] SET(S) UPDATED", updated);
        Ok(updated)
    }

    /// Update a single rule definition given outside the configuration
    pub async fn update(&self, definition: &RuleDefinition) -> Result<usize> {
        let rule = self.option.resolve(definition)?;
        self.wire_jumps(std::slice::from_ref(&rule))?;
        self.process(&rule).await.inspect_err(|e| self.report(&rule, e))
    }

    /// Detach the rules and destroy the sets of every rule definition, then
    /// remove the custom chain wiring once nothing uses it
    ///
    /// Absent sets, rules and chains count as already removed, so a second
    /// call is a no-op.
    pub fn clear(&self) -> Result<()> {
        let resolved = self.resolve_all()?;
        let mut failures = Vec::new();
        for rule in &resolved {
            if let Err(e) = self.clear_rule(rule) {
                error!("CLEAR SET [{}] FAILED: {}", rule.set, e);
                if !self.option.continue_on_error {
                    return Err(e);
                }
                failures.push(e);
            }
        }

        let binder = RuleBinder::new(&self.kernel);
        for (table, base, custom) in jumps(&resolved) {
            if let Err(e) = binder.unwire_jump(table, base, custom) {
                error!("UNWIRE CHAIN [{}] FAILED: {}", custom, e);
                if !self.option.continue_on_error {
                    return Err(e);
                }
                failures.push(e);
            }
        }
        if !failures.is_empty() {
            return Err(Error::Multiple(failures));
        }
        info!("CLEAR FINISHED, [{}] RULE DEFINITION(S)", resolved.len());
        Ok(())
    }

    pub fn rollback(&self, set: &str) -> Result<()> {
        rollback::rollback(&self.kernel, set).inspect(|_| {
            self.notifier.notify(NotificationEvent::success(
                &self.host,
                format!("Rolled back set {}", set),
            ))
        })
    }

    /// Existing set names, with `managed` only those having a backup partner
    pub fn list_sets(&self, managed: bool) -> Result<Vec<String>> {
        let sets = self
            .kernel
            .list_sets()
            .map_err(|e| Error::kernel("list_sets", "*", e))?;
        if !managed {
            return Ok(sets);
        }
        Ok(sets
            .iter()
            .filter(|set| sets.contains(&backup_name(set)))
            .cloned()
            .collect())
    }

    /// Members of a live set
    pub fn members(&self, set: &str) -> Result<Vec<Ipv4Net>> {
        self.kernel
            .list_members(set)
            .map_err(|e| Error::kernel("list_members", set, e))
    }

    /// Whether `ip` is covered by a member of the live set
    pub fn check_set(&self, set: &str, ip: Ipv4Addr) -> Result<bool> {
        self.kernel
            .test_member(set, ip)
            .map_err(|e| Error::kernel("test_member", set, e))
    }

    fn resolve_all(&self) -> Result<Vec<ResolvedRule>> {
        self.rules
            .iter()
            .map(|rule| self.option.resolve(rule))
            .collect()
    }

    /// Wire each distinct custom chain into its base chain once
    fn wire_jumps(&self, resolved: &[ResolvedRule]) -> Result<()> {
        let binder = RuleBinder::new(&self.kernel);
        for (table, base, custom) in jumps(resolved) {
            binder.wire_jump(table, base, custom)?;
        }
        Ok(())
    }

    async fn process(&self, rule: &ResolvedRule) -> Result<usize> {
        let merged = acquire(self.provider.as_ref(), rule).await?;
        info!(
            "LIST [{}] MERGED INTO [{}] PREFIXES ([{}] ADDRESSES), SKIPPED [{}]",
            rule.source,
            merged.nets.len(),
            count_addresses(&merged.nets),
            merged.skipped
        );
        Updater::new(&self.kernel, self.notifier.as_ref(), &self.host).update(
            &rule.source,
            &rule.set,
            &merged.nets,
            rule.binding.as_ref(),
        )
    }

    fn clear_rule(&self, rule: &ResolvedRule) -> Result<()> {
        if let Some(binding) = &rule.binding {
            RuleBinder::new(&self.kernel).detach(&rule.set, binding, Detach::Tolerant)?;
            self.quiescence.wait();
        }
        for name in [rule.set.clone(), backup_name(&rule.set), temp_name(&rule.set)] {
            match self.kernel.destroy_set(&name) {
                Ok(()) => info!("DESTROY SET [{}]", name),
                Err(KernelError::NotFound(_)) => (),
                Err(e) => return Err(Error::kernel("destroy_set", name, e)),
            }
        }
        Ok(())
    }

    fn report(&self, rule: &ResolvedRule, e: &Error) {
        error!("UPDATE SET [{}] FOR [{}] FAILED: {}", rule.set, rule.source, e);
        if e.is_committed() {
            warn!("UPDATE SET [{}] KEEPS THE NEW GENERATION", rule.set);
        }
        self.notifier.notify(NotificationEvent::failure(
            &self.host,
            format!("Failed to update set {} for {}: {}", rule.set, rule.source, e),
        ));
    }
}

/// Distinct (table, base chain, custom chain) wirings, in first-use order
fn jumps(resolved: &[ResolvedRule]) -> Vec<(&str, &str, &str)> {
    let mut jumps: Vec<(&str, &str, &str)> = Vec::new();
    for binding in resolved.iter().filter_map(|rule| rule.binding.as_ref()) {
        if let Some(base) = &binding.jump_from {
            let jump = (binding.table.as_str(), base.as_str(), binding.chain.as_str());
            if !jumps.contains(&jump) {
                jumps.push(jump);
            }
        }
    }
    jumps
}
