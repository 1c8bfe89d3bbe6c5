use std::{fmt, result::Result as StdResult, str::FromStr, time::Duration};

use serde::Deserialize;

/// Target of the match rule bound to a set
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    Accept,
    #[default]
    Drop,
}

impl Policy {
    pub const ALL: [Policy; 2] = [Policy::Accept, Policy::Drop];

    pub fn target(&self) -> &'static str {
        match self {
            Policy::Accept => "ACCEPT",
            Policy::Drop => "DROP",
        }
    }
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> StdResult<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accept" => Ok(Policy::Accept),
            "drop" => Ok(Policy::Drop),
            _ => Err(format!("Invalid policy: {}", s)),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.target()) }
}

/// Which packet address is matched against the set
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Hash)]
pub enum Direction {
    #[default]
    #[serde(rename = "src", alias = "source")]
    Source,
    #[serde(rename = "dst", alias = "destination")]
    Destination,
}

impl Direction {
    pub fn flag(&self) -> &'static str {
        match self {
            Direction::Source => "src",
            Direction::Destination => "dst",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> StdResult<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "src" | "source" => Ok(Direction::Source),
            "dst" | "destination" => Ok(Direction::Destination),
            _ => Err(format!("Invalid direction: {}", s)),
        }
    }
}

/// Firewall defaults shared by every rule definition
///
/// Resolved once into concrete bindings before any kernel operation runs.
#[derive(Clone, Debug, Deserialize)]
pub struct FwOption {
    /// iptables table holding the match rules
    /// default is "filter"
    #[serde(default = "FwOption::default_table")]
    pub table: String,

    /// Base chain receiving the match rules, or the jump to `default_chain`
    /// default is "INPUT"
    #[serde(default = "FwOption::default_chain")]
    pub chain: String,

    /// 1-based position the match rules are inserted at
    /// default is 1
    #[serde(default = "FwOption::default_insert")]
    pub insert: i32,

    /// default is "drop"
    #[serde(default)]
    pub policy: Policy,

    /// default is ["src"]
    #[serde(default = "FwOption::default_directions")]
    pub directions: Vec<Direction>,

    /// Optional custom chain shared by the rule definitions, wired to
    /// `chain` with a single jump rule
    #[serde(default)]
    pub default_chain: Option<String>,

    /// Time (in milliseconds) to wait between detaching a rule and
    /// destroying the set it referenced
    #[serde(default = "FwOption::default_quiescence_ms")]
    pub quiescence_ms: u64,

    /// Keep processing the remaining rule definitions after a failure
    /// and report every failure at the end
    #[serde(default)]
    pub continue_on_error: bool,
}

impl FwOption {
    #[inline]
    fn default_table() -> String { "filter".to_string() }

    #[inline]
    fn default_chain() -> String { "INPUT".to_string() }

    #[inline]
    fn default_insert() -> i32 { 1 }

    #[inline]
    fn default_directions() -> Vec<Direction> { vec![Direction::Source] }

    #[inline]
    fn default_quiescence_ms() -> u64 { 500 }

    pub fn quiescence(&self) -> Quiescence {
        Quiescence::new(Duration::from_millis(self.quiescence_ms))
    }
}

impl Default for FwOption {
    fn default() -> Self {
        FwOption {
            table: FwOption::default_table(),
            chain: FwOption::default_chain(),
            insert: FwOption::default_insert(),
            policy: Policy::default(),
            directions: FwOption::default_directions(),
            default_chain: None,
            quiescence_ms: FwOption::default_quiescence_ms(),
            continue_on_error: false,
        }
    }
}

/// Wait inserted before destroying a set whose rule was just detached
///
/// Narrows the window in which a packet still being evaluated refers to
/// the set by name. A heuristic, not a guarantee.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quiescence {
    delay: Duration,
}

impl Quiescence {
    pub fn new(delay: Duration) -> Self { Quiescence { delay } }

    pub fn wait(&self) {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }
}

/// Where source lists are fetched from
#[derive(Clone, Debug, Deserialize)]
pub struct SourceOption {
    /// URL template for country lists, `{source}` is replaced with the
    /// lower-cased source identifier
    #[serde(default = "SourceOption::default_geo_url")]
    pub geo_url: String,

    /// URL of the Tor exit node list, used for the source "tor"
    #[serde(default = "SourceOption::default_tor_url")]
    pub tor_url: String,

    /// HTTP timeout in seconds
    /// default is 30
    #[serde(default = "SourceOption::default_timeout")]
    pub timeout: u64,
}

impl SourceOption {
    #[inline]
    fn default_geo_url() -> String {
        "https://raw.githubusercontent.com/herrbischoff/country-ip-blocks/master/ipv4/{source}.cidr"
            .to_string()
    }

    #[inline]
    fn default_tor_url() -> String {
        "https://raw.githubusercontent.com/SecOps-Institute/Tor-IP-Addresses/master/tor-exit-nodes.lst"
            .to_string()
    }

    #[inline]
    fn default_timeout() -> u64 { 30 }

    /// URL of the list for a source identifier
    pub fn url_for(&self, source: &str) -> String {
        let source = source.to_lowercase();
        if source == "tor" {
            self.tor_url.clone()
        } else {
            self.geo_url.replace("{source}", &source)
        }
    }
}

impl Default for SourceOption {
    fn default() -> Self {
        SourceOption {
            geo_url: SourceOption::default_geo_url(),
            tor_url: SourceOption::default_tor_url(),
            timeout: SourceOption::default_timeout(),
        }
    }
}

/// Mattermost incoming webhook settings
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NotifyOption {
    /// Base URL of the Mattermost server
    #[serde(default)]
    pub url: String,

    /// Webhook token, the hook is posted to `{url}/hooks/{token}`
    #[serde(default)]
    pub token: String,

    /// Host identifier placed in messages, defaults to the kernel hostname
    #[serde(default)]
    pub host: Option<String>,
}

impl NotifyOption {
    pub fn enabled(&self) -> bool { !self.url.is_empty() && !self.token.is_empty() }

    pub fn hook_url(&self) -> String {
        format!("{}/hooks/{}", self.url.trim_end_matches('/'), self.token)
    }
}
