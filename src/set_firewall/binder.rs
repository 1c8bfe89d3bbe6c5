use log::{debug, info, warn};

use super::{
    Error, Result,
    error::KernelError,
    kernel::FilterKernel,
    option::{Direction, Policy},
    rules::Binding,
};

/// How a missing rule is treated when detaching
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Detach {
    /// A direction with no rule for either policy is an error
    Strict,
    /// Missing rules are fine, used by teardown
    Tolerant,
}

/// Attaches and detaches the match rules referencing a set, and wires
/// the shared custom chain into its base chain
pub struct RuleBinder<'a, K: FilterKernel + ?Sized> {
    kernel: &'a K,
}

impl<'a, K: FilterKernel + ?Sized> RuleBinder<'a, K> {
    pub fn new(kernel: &'a K) -> Self { RuleBinder { kernel } }

    /// Create `chain` unless it already exists
    pub fn ensure_chain(&self, table: &str, chain: &str) -> Result<()> {
        if self
            .kernel
            .chain_exists(table, chain)
            .map_err(|e| Error::kernel("chain_exists", chain, e))?
        {
            return Ok(());
        }
        match self.kernel.new_chain(table, chain) {
            Ok(()) => {
                info!("CREATE CHAIN [{}] IN TABLE [{}]", chain, table);
                Ok(())
            }
            // created by someone else between the check and the create
            Err(KernelError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(Error::kernel("new_chain", chain, e)),
        }
    }

    /// Insert one match rule per direction unless an identical rule is
    /// already present anywhere in the chain, returns the number inserted
    pub fn attach_rule(
        &self,
        table: &str,
        chain: &str,
        position: i32,
        set: &str,
        directions: &[Direction],
        policy: Policy,
    ) -> Result<usize> {
        let mut inserted = 0;
        for direction in directions {
            let rule = Binding::rule_spec(set, *direction, policy);
            if self
                .kernel
                .rule_exists(table, chain, &rule)
                .map_err(|e| Error::kernel("rule_exists", chain, e))?
            {
                debug!("RULE EXISTS [{}] [{}] [{}]", table, chain, rule);
                continue;
            }
            self.kernel
                .insert_rule(table, chain, &rule, position)
                .map_err(|e| Error::kernel("insert_rule", chain, e))?;
            info!("INSERT RULE [{}] [{}] #{} [{}]", table, chain, position, rule);
            inserted += 1;
        }
        Ok(inserted)
    }

    /// Attach the rules described by a resolved binding
    pub fn attach(&self, set: &str, binding: &Binding) -> Result<usize> {
        self.attach_rule(
            &binding.table,
            &binding.chain,
            binding.position,
            set,
            &binding.directions,
            binding.policy,
        )
    }

    /// Delete the accept and drop match rules of `set` for every direction,
    /// returns the number of rules deleted
    pub fn detach_rule(
        &self,
        table: &str,
        chain: &str,
        set: &str,
        directions: &[Direction],
        mode: Detach,
    ) -> Result<usize> {
        let mut deleted = 0;
        for direction in directions {
            let mut found = false;
            for policy in Policy::ALL {
                let rule = Binding::rule_spec(set, *direction, policy);
                let count = self.delete_all(table, chain, &rule)?;
                if count > 0 {
                    info!("DELETE RULE [{}] [{}] [{}] x{}", table, chain, rule, count);
                }
                found |= count > 0;
                deleted += count;
            }
            if !found && mode == Detach::Strict {
                return Err(Error::Kernel {
                    op: "delete_rule",
                    target: chain.to_string(),
                    reason: format!(
                        "no rule matching set [{}] as [{}] in [{}]",
                        set,
                        direction.flag(),
                        table
                    ),
                });
            }
        }
        Ok(deleted)
    }

    /// Detach the rules described by a resolved binding
    pub fn detach(&self, set: &str, binding: &Binding, mode: Detach) -> Result<usize> {
        self.detach_rule(
            &binding.table,
            &binding.chain,
            set,
            &binding.directions,
            mode,
        )
    }

    /// Make sure exactly one jump from `base` to `custom` exists
    pub fn wire_jump(&self, table: &str, base: &str, custom: &str) -> Result<()> {
        self.ensure_chain(table, custom)?;
        let jump = Binding::jump_spec(custom);
        if self
            .kernel
            .rule_exists(table, base, &jump)
            .map_err(|e| Error::kernel("rule_exists", base, e))?
        {
            return Ok(());
        }
        self.kernel
            .insert_rule(table, base, &jump, 1)
            .map_err(|e| Error::kernel("insert_rule", base, e))?;
        info!("WIRE JUMP [{}] [{}] -> [{}]", table, base, custom);
        Ok(())
    }

    /// Remove the jump from `base` to `custom` and the custom chain, unless
    /// the chain still holds rules, returns whether the chain was removed
    pub fn unwire_jump(&self, table: &str, base: &str, custom: &str) -> Result<bool> {
        let exists = self
            .kernel
            .chain_exists(table, custom)
            .map_err(|e| Error::kernel("chain_exists", custom, e))?;
        if exists {
            let remaining = self
                .kernel
                .list_rules(table, custom)
                .map_err(|e| Error::kernel("list_rules", custom, e))?;
            if !remaining.is_empty() {
                warn!(
                    "CHAIN [{}] STILL HOLDS [{}] RULE(S), KEEPING IT AND ITS JUMP",
                    custom,
                    remaining.len()
                );
                return Ok(false);
            }
        }

        let jump = Binding::jump_spec(custom);
        if self.delete_all(table, base, &jump)? > 0 {
            info!("UNWIRE JUMP [{}] [{}] -> [{}]", table, base, custom);
        }
        if !exists {
            return Ok(false);
        }
        match self.kernel.delete_chain(table, custom) {
            Ok(()) => {
                info!("DELETE CHAIN [{}] IN TABLE [{}]", custom, table);
                Ok(true)
            }
            Err(KernelError::NotFound(_)) => Ok(false),
            Err(e) => Err(Error::kernel("delete_chain", custom, e)),
        }
    }

    /// Delete every copy of `rule`, a missing rule or chain counts as zero
    fn delete_all(&self, table: &str, chain: &str, rule: &str) -> Result<usize> {
        let mut count = 0;
        loop {
            match self.kernel.delete_rule(table, chain, rule) {
                Ok(()) => count += 1,
                Err(KernelError::NotFound(_)) => return Ok(count),
                Err(e) => return Err(Error::kernel("delete_rule", chain, e)),
            }
        }
    }
}
