use std::net::{IpAddr, Ipv4Addr};

use chrono::{DateTime, Local};
use ipnet::Ipv4Net;
use ipset::types::NetDataType;

/// Returns the current local time
pub fn now() -> DateTime<Local> { Local::now() }

/// Formats a timestamp the way status lines and notifications print it
pub fn format_time(time: &DateTime<Local>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Host identifier carried by notifications
///
/// Reads the kernel hostname, falls back to "unknown" when unavailable.
pub fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Conversion from a prefix to ipset's NetDataType for use with the ipset library
pub fn net_data(net: &Ipv4Net) -> NetDataType {
    NetDataType::new(IpAddr::V4(net.network()), net.prefix_len())
}

/// Conversion of a single address to a host-route NetDataType
pub fn host_data(ip: Ipv4Addr) -> NetDataType { NetDataType::new(IpAddr::V4(ip), 32) }

/// Padding the set name for aligned log output
pub fn padding(name: &str) -> String { format!("{:^width$}", name, width = 12) }
