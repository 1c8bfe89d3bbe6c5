//! Normalization and merging of raw list entries into IPv4 prefixes.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use log::{debug, trace};

/// Result of merging one batch of raw entries
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Merged {
    /// Minimal non-overlapping prefixes covering every valid entry, ascending
    pub nets: Vec<Ipv4Net>,
    /// Number of non-blank entries dropped as IPv6 or unparsable
    pub skipped: usize,
}

/// Normalizes one raw entry into an IPv4 prefix
///
/// Blank entries and anything containing an IPv6 separator yield `None`,
/// a bare address becomes a /32, host bits of a prefix are cleared.
pub fn normalize(token: &str) -> Option<Ipv4Net> {
    let token = token.trim();
    if token.is_empty() || token.contains(':') {
        return None;
    }
    if token.contains('/') {
        token.parse::<Ipv4Net>().ok().map(|net| net.trunc())
    } else {
        token
            .parse::<Ipv4Addr>()
            .ok()
            .and_then(|ip| Ipv4Net::new(ip, 32).ok())
    }
}

/// Merges raw entries into their minimal covering set of prefixes
///
/// The result depends only on the set of valid prefixes: reordering or
/// repeating entries does not change it. Invalid entries are skipped.
pub fn merge<I, S>(tokens: I) -> Merged
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut nets = Vec::new();
    let mut skipped = 0;
    for token in tokens {
        let token = token.as_ref();
        match normalize(token) {
            Some(net) => nets.push(net),
            None if token.trim().is_empty() => (),
            None => {
                trace!("SKIP ENTRY [{}]", token.trim());
                skipped += 1;
            }
        }
    }

    let valid = nets.len();
    let nets = Ipv4Net::aggregate(&nets);
    debug!(
        "MERGED [{}] VALID ENTRIES INTO [{}] PREFIXES, SKIPPED [{}]",
        valid,
        nets.len(),
        skipped
    );
    Merged { nets, skipped }
}

/// Returns the prefix in `nets` covering `ip`, if any
pub fn find_covering(nets: &[Ipv4Net], ip: Ipv4Addr) -> Option<Ipv4Net> {
    nets.iter().find(|net| net.contains(&ip)).copied()
}

/// Number of addresses covered by a list of non-overlapping prefixes
pub fn count_addresses(nets: &[Ipv4Net]) -> u64 {
    nets.iter()
        .map(|net| 1u64 << (32 - u32::from(net.prefix_len())))
        .sum()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn token_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            (any::<u32>(), 8u8..=32).prop_map(|(ip, len)| format!("{}/{}", Ipv4Addr::from(ip), len)),
            any::<u32>().prop_map(|ip| Ipv4Addr::from(ip).to_string()),
            Just(String::new()),
            Just("garbage".to_string()),
            Just("2001:db8::1".to_string()),
        ]
    }

    fn covered(tokens: &[String], ip: Ipv4Addr) -> bool {
        tokens
            .iter()
            .filter_map(|t| normalize(t))
            .any(|net| net.contains(&ip))
    }

    proptest! {
        #[test]
        fn prop_merge_idempotent(tokens in prop::collection::vec(token_strategy(), 0..60)) {
            let once = merge(&tokens).nets;
            let twice = merge(once.iter().map(|n| n.to_string())).nets;
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_merge_order_independent(
            tokens in prop::collection::vec(token_strategy(), 0..60),
            seed in any::<u64>()
        ) {
            let mut shuffled = tokens.clone();
            shuffled.extend(tokens.iter().take(5).cloned());
            // deterministic shuffle driven by the seed
            let len = shuffled.len();
            let mut state = seed;
            for i in (1..len).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                shuffled.swap(i, (state >> 33) as usize % (i + 1));
            }
            prop_assert_eq!(merge(&tokens).nets, merge(&shuffled).nets);
        }

        #[test]
        fn prop_merge_preserves_coverage(
            tokens in prop::collection::vec(token_strategy(), 0..40),
            samples in prop::collection::vec(any::<u32>(), 1..40)
        ) {
            let merged = merge(&tokens).nets;
            // check random addresses plus the edges of every input prefix
            let mut addrs: Vec<Ipv4Addr> = samples.into_iter().map(Ipv4Addr::from).collect();
            for net in tokens.iter().filter_map(|t| normalize(t)) {
                addrs.push(net.network());
                addrs.push(net.broadcast());
            }
            for ip in addrs {
                prop_assert_eq!(covered(&tokens, ip), find_covering(&merged, ip).is_some());
            }
        }

        #[test]
        fn prop_merge_non_overlapping(tokens in prop::collection::vec(token_strategy(), 0..60)) {
            let merged = merge(&tokens).nets;
            for pair in merged.windows(2) {
                prop_assert!(pair[0].broadcast() < pair[1].network());
            }
        }
    }
}
