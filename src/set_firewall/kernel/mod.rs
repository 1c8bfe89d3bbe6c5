//! Kernel facilities consumed by the set and rule components.
//!
//! Both traits report `KernelError` so callers can tell an idempotent
//! no-op (`NotFound`, `AlreadyExists`) from a real failure.

#[cfg(test)]
pub(crate) mod memory;
mod netfilter;

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

pub use netfilter::Netfilter;

use super::error::KernelError;

pub type KernelResult<T> = std::result::Result<T, KernelError>;

/// Named address sets of kind "hash:net"
pub trait SetKernel {
    /// Create an empty IPv4 hash:net set
    fn create_set(&self, name: &str) -> KernelResult<()>;

    /// Destroy a set, `NotFound` when it is absent
    fn destroy_set(&self, name: &str) -> KernelResult<()>;

    /// Atomically exchange the members bound to `a` and `b`
    fn swap_sets(&self, a: &str, b: &str) -> KernelResult<()>;

    fn add_member(&self, name: &str, net: &Ipv4Net) -> KernelResult<()>;

    fn list_members(&self, name: &str) -> KernelResult<Vec<Ipv4Net>>;

    fn list_sets(&self) -> KernelResult<Vec<String>>;

    fn test_member(&self, name: &str, ip: Ipv4Addr) -> KernelResult<bool>;

    fn set_exists(&self, name: &str) -> KernelResult<bool> {
        Ok(self.list_sets()?.iter().any(|set| set == name))
    }
}

/// Packet filter chains and rules, rules given as iptables rule specs
pub trait FilterKernel {
    fn chain_exists(&self, table: &str, chain: &str) -> KernelResult<bool>;

    fn new_chain(&self, table: &str, chain: &str) -> KernelResult<()>;

    fn delete_chain(&self, table: &str, chain: &str) -> KernelResult<()>;

    fn rule_exists(&self, table: &str, chain: &str, rule: &str) -> KernelResult<bool>;

    /// Insert at a 1-based position
    fn insert_rule(&self, table: &str, chain: &str, rule: &str, position: i32)
    -> KernelResult<()>;

    /// Delete the first identical rule, `NotFound` when there is none
    fn delete_rule(&self, table: &str, chain: &str, rule: &str) -> KernelResult<()>;

    /// Rule specs of `chain` in order, without the "-A CHAIN" prefix
    fn list_rules(&self, table: &str, chain: &str) -> KernelResult<Vec<String>>;
}

/// Both kernel facilities behind one capability
pub trait Kernel: SetKernel + FilterKernel {}

impl<T: SetKernel + FilterKernel> Kernel for T {}
