use ipnet::Ipv4Net;
use log::{debug, error, info, trace, warn};

use super::{
    Error, Result,
    binder::RuleBinder,
    error::KernelError,
    kernel::Kernel,
    notify::{NotificationEvent, Notifier},
    rules::{Binding, backup_name, temp_name},
    utils::{format_time, now, padding},
};

/// Installs new generations of address sets through a temp set and swaps
///
/// After a successful `update` the live set holds the new members and the
/// backup set holds the generation that was live before the call.
pub struct Updater<'a, K: Kernel + ?Sized> {
    kernel: &'a K,
    notifier: &'a dyn Notifier,
    host: &'a str,
}

impl<'a, K: Kernel + ?Sized> Updater<'a, K> {
    pub fn new(kernel: &'a K, notifier: &'a dyn Notifier, host: &'a str) -> Self {
        Updater {
            kernel,
            notifier,
            host,
        }
    }

    /// Replace the members of `set` with `members`, then attach the match
    /// rule when a binding is given, returns the member count
    ///
    /// Errors wrapped in `Error::Committed` happened after the new
    /// generation went live.
    pub fn update(
        &self,
        source: &str,
        set: &str,
        members: &[Ipv4Net],
        binding: Option<&Binding>,
    ) -> Result<usize> {
        let temp = temp_name(set);
        let backup = backup_name(set);

        self.create_temp(&temp)?;
        if let Err(e) = self
            .populate(&temp, members)
            .and_then(|_| self.commit(set, &temp, &backup, members))
        {
            self.discard(&temp);
            return Err(e);
        }

        let count = members.len();
        if let Err(e) = self.finish(set, &temp, binding) {
            error!("UPDATE SET [{}] IS LIVE BUT: {}", set, e);
            return Err(Error::Committed {
                set: set.to_string(),
                cause: Box::new(e),
            });
        }

        let message = format!(
            "Successfully updated set {} for {} with {} entries",
            set, source, count
        );
        info!(
            "UPDATE SET [{}] [{}] [{}] [{}] [{}]",
            padding(set),
            source,
            count,
            self.host,
            format_time(&now())
        );
        self.notifier
            .notify(NotificationEvent::success(self.host, message));
        Ok(count)
    }

    /// Create an empty temp set, replacing one left behind by a crashed run
    fn create_temp(&self, temp: &str) -> Result<()> {
        match self.kernel.create_set(temp) {
            Ok(()) => Ok(()),
            Err(KernelError::AlreadyExists(_)) => {
                warn!("UPDATE SET [{}] LEFTOVER FROM A PREVIOUS RUN, RECREATING", temp);
                match self.kernel.destroy_set(temp) {
                    Ok(()) | Err(KernelError::NotFound(_)) => (),
                    Err(e) => return Err(Error::kernel("destroy_set", temp, e)),
                }
                self.kernel
                    .create_set(temp)
                    .map_err(|e| Error::kernel("create_set", temp, e))
            }
            Err(e) => Err(Error::kernel("create_set", temp, e)),
        }
    }

    fn populate(&self, name: &str, members: &[Ipv4Net]) -> Result<()> {
        for net in members {
            match self.kernel.add_member(name, net) {
                Ok(()) => trace!("UPDATE SET [{}] [ADD] [{}]", name, net),
                Err(KernelError::AlreadyExists(_)) => (),
                Err(e) => return Err(Error::kernel("add_member", format!("{} {}", name, net), e)),
            }
        }
        Ok(())
    }

    /// Swap the populated temp set into the live role
    fn commit(&self, set: &str, temp: &str, backup: &str, members: &[Ipv4Net]) -> Result<()> {
        let has_backup = self.exists(backup)?;
        let has_live = self.exists(set)?;

        if !has_backup {
            debug!("UPDATE SET [{}] FIRST GENERATION, CREATING [{}]", set, backup);
            return self
                .bootstrap(set, temp, backup, members, has_live)
                .inspect_err(|_| {
                    self.discard(backup);
                    if !has_live {
                        self.discard(set);
                    }
                });
        }

        if !has_live {
            warn!("UPDATE SET [{}] MISSING WHILE [{}] EXISTS, RECREATING", set, backup);
            self.kernel
                .create_set(set)
                .map_err(|e| Error::kernel("create_set", set, e))?;
            return self.swap(temp, set).inspect_err(|_| self.discard(set));
        }

        self.swap(set, backup)?;
        if let Err(e) = self.swap(temp, set) {
            // put the previous generation back so live keeps a full set
            if let Err(undo) = self.kernel.swap_sets(set, backup) {
                error!("UPDATE SET [{}] RESTORE FROM [{}] FAILED: {}", set, backup, undo);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Create the backup as a copy of the new generation, and an empty live
    /// set when the name has never existed, then swap temp into live
    ///
    /// On failure the caller removes what was created here.
    fn bootstrap(
        &self,
        set: &str,
        temp: &str,
        backup: &str,
        members: &[Ipv4Net],
        has_live: bool,
    ) -> Result<()> {
        self.kernel
            .create_set(backup)
            .map_err(|e| Error::kernel("create_set", backup, e))?;
        self.populate(backup, members)?;
        if !has_live {
            self.kernel
                .create_set(set)
                .map_err(|e| Error::kernel("create_set", set, e))?;
        }
        self.swap(temp, set)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        self.kernel
            .set_exists(name)
            .map_err(|e| Error::kernel("list_sets", name, e))
    }

    /// Best-effort destroy of a set created by a failed update
    fn discard(&self, name: &str) {
        match self.kernel.destroy_set(name) {
            Ok(()) => debug!("UPDATE SET [{}] DISCARDED", name),
            Err(KernelError::NotFound(_)) => (),
            Err(e) => warn!("UPDATE SET [{}] CLEANUP FAILED: {}", name, e),
        }
    }

    fn swap(&self, a: &str, b: &str) -> Result<()> {
        self.kernel
            .swap_sets(a, b)
            .map_err(|e| Error::kernel("swap_sets", format!("{} {}", a, b), e))?;
        debug!("UPDATE SET [SWAP] [{}] <-> [{}]", a, b);
        Ok(())
    }

    /// Steps after the new generation is live
    fn finish(&self, set: &str, temp: &str, binding: Option<&Binding>) -> Result<()> {
        match self.kernel.destroy_set(temp) {
            Ok(()) | Err(KernelError::NotFound(_)) => (),
            Err(e) => return Err(Error::kernel("destroy_set", temp, e)),
        }
        if let Some(binding) = binding {
            RuleBinder::new(self.kernel).attach(set, binding)?;
        }
        Ok(())
    }
}
