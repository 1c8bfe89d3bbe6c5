use std::{fmt::Display, net::Ipv4Addr, process::Command};

use ipnet::Ipv4Net;
use ipset::{Session, types::HashNet};
use iptables::IPTables;
use log::trace;

use super::{
    super::{
        Error, Result,
        error::KernelError,
        utils::{host_data, net_data},
    },
    FilterKernel, KernelResult, SetKernel,
};

/// The ipset binary, used for the commands libipset sessions do not cover
const IPSET_BIN: &str = "ipset";

/// Kernel capability backed by libipset and iptables
///
/// Privilege is verified once when the capability is opened, every
/// component receives it explicitly afterwards.
pub struct Netfilter {
    ipt: IPTables,
}

impl Netfilter {
    /// Check privileges and open the IPv4 iptables handle
    pub fn open() -> Result<Self> {
        check_root()?;
        let ipt = iptables::new(false).map_err(|e| Error::Kernel {
            op: "open",
            target: "iptables".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Netfilter { ipt })
    }

    fn session(name: &str) -> Session<HashNet> { Session::<HashNet>::new(name.to_owned()) }

    /// Run the ipset binary, returning stdout on success
    fn ipset_cmd(args: &[&str]) -> KernelResult<String> {
        trace!("EXEC [{} {}]", IPSET_BIN, args.join(" "));
        let output = Command::new(IPSET_BIN)
            .args(args)
            .output()
            .map_err(|e| KernelError::Failed(format!("Failed to execute {}: {}", IPSET_BIN, e)))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(KernelError::classify(
                String::from_utf8_lossy(&output.stderr).trim(),
            ))
        }
    }
}

/// Check if running as root (effective UID == 0)
fn check_root() -> Result<()> {
    // SAFETY: geteuid has no preconditions and cannot fail
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        return Err(Error::Privilege(
            "managing ipsets and iptables rules requires root (or CAP_NET_ADMIN)".to_string(),
        ));
    }
    Ok(())
}

fn kernel_err<E: Display>(e: E) -> KernelError { KernelError::classify(e.to_string()) }

/// Parse the member lines following the "Members:" header of `ipset list`
fn parse_members(output: &str) -> Vec<Ipv4Net> {
    output
        .lines()
        .skip_while(|line| !line.starts_with("Members:"))
        .skip(1)
        .filter_map(|line| {
            let entry = line.split_whitespace().next()?;
            if entry.contains('/') {
                entry.parse().ok()
            } else {
                entry
                    .parse::<Ipv4Addr>()
                    .ok()
                    .and_then(|ip| Ipv4Net::new(ip, 32).ok())
            }
        })
        .collect()
}

impl SetKernel for Netfilter {
    fn create_set(&self, name: &str) -> KernelResult<()> {
        Self::session(name)
            .create(|builder| builder.with_ipv6(false)?.build())
            .map_err(kernel_err)?;
        Ok(())
    }

    fn destroy_set(&self, name: &str) -> KernelResult<()> {
        Self::session(name).destroy().map_err(kernel_err)?;
        Ok(())
    }

    fn swap_sets(&self, a: &str, b: &str) -> KernelResult<()> {
        Self::ipset_cmd(&["swap", a, b]).map(|_| ())
    }

    fn add_member(&self, name: &str, net: &Ipv4Net) -> KernelResult<()> {
        Self::session(name)
            .add(net_data(net), &[])
            .map_err(kernel_err)?;
        Ok(())
    }

    fn list_members(&self, name: &str) -> KernelResult<Vec<Ipv4Net>> {
        Self::ipset_cmd(&["list", name]).map(|output| parse_members(&output))
    }

    fn list_sets(&self) -> KernelResult<Vec<String>> {
        Self::ipset_cmd(&["list", "-n"]).map(|output| {
            output
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    fn test_member(&self, name: &str, ip: Ipv4Addr) -> KernelResult<bool> {
        Self::session(name).test(host_data(ip)).map_err(kernel_err)
    }
}

impl FilterKernel for Netfilter {
    fn chain_exists(&self, table: &str, chain: &str) -> KernelResult<bool> {
        self.ipt.chain_exists(table, chain).map_err(kernel_err)
    }

    fn new_chain(&self, table: &str, chain: &str) -> KernelResult<()> {
        self.ipt.new_chain(table, chain).map_err(kernel_err)
    }

    fn delete_chain(&self, table: &str, chain: &str) -> KernelResult<()> {
        self.ipt.delete_chain(table, chain).map_err(kernel_err)
    }

    fn rule_exists(&self, table: &str, chain: &str, rule: &str) -> KernelResult<bool> {
        self.ipt.exists(table, chain, rule).map_err(kernel_err)
    }

    fn insert_rule(
        &self,
        table: &str,
        chain: &str,
        rule: &str,
        position: i32,
    ) -> KernelResult<()> {
        self.ipt
            .insert(table, chain, rule, position)
            .map_err(kernel_err)
    }

    fn delete_rule(&self, table: &str, chain: &str, rule: &str) -> KernelResult<()> {
        self.ipt.delete(table, chain, rule).map_err(kernel_err)
    }

    fn list_rules(&self, table: &str, chain: &str) -> KernelResult<Vec<String>> {
        let prefix = format!("-A {} ", chain);
        Ok(self
            .ipt
            .list(table, chain)
            .map_err(kernel_err)?
            .iter()
            .filter_map(|line| line.strip_prefix(&prefix))
            .map(str::to_string)
            .collect())
    }
}
