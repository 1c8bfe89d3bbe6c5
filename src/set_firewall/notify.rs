use std::{
    fmt::{Display, Formatter},
    time::Duration,
};

use chrono::{DateTime, Local};
use log::{debug, warn};
use reqwest::Client;
use serde::Serialize;
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
};

use super::{
    Error, Result,
    option::NotifyOption,
    utils::{format_time, now},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Success,
    Failure,
}

/// A status or error message about one run step
#[derive(Clone, Debug)]
pub struct NotificationEvent {
    pub kind: EventKind,
    pub time: DateTime<Local>,
    pub host: String,
    pub message: String,
}

impl NotificationEvent {
    pub fn success(host: &str, message: impl Into<String>) -> Self {
        Self::new(EventKind::Success, host, message)
    }

    pub fn failure(host: &str, message: impl Into<String>) -> Self {
        Self::new(EventKind::Failure, host, message)
    }

    fn new(kind: EventKind, host: &str, message: impl Into<String>) -> Self {
        NotificationEvent {
            kind,
            time: now(),
            host: host.to_string(),
            message: message.into(),
        }
    }
}

impl Display for NotificationEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] [{}] {}",
            format_time(&self.time),
            self.host,
            self.message
        )
    }
}

/// Sink for notification events
///
/// Emitting never blocks on delivery and never fails the caller, a set
/// update that already happened stays in place whatever the sink does.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

/// Sink used when no endpoint is configured
pub struct Silent;

impl Notifier for Silent {
    fn notify(&self, event: NotificationEvent) {
        debug!("NOTIFY [SILENT] {}", event);
    }
}

#[derive(Serialize)]
struct Payload<'a> {
    text: &'a str,
}

/// Delivers events to a Mattermost incoming webhook from a background task
pub struct Mattermost {
    tx: UnboundedSender<NotificationEvent>,
}

impl Mattermost {
    /// Start the delivery task
    ///
    /// The returned handle finishes once every `Mattermost` clone is
    /// dropped and the queued events are delivered.
    pub fn spawn(option: &NotifyOption, timeout: Duration) -> Result<(Self, JoinHandle<()>)> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("ipsetfw/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        let (tx, rx) = unbounded_channel();
        let handle = tokio::spawn(deliver(client, option.hook_url(), rx));
        Ok((Mattermost { tx }, handle))
    }
}

impl Notifier for Mattermost {
    fn notify(&self, event: NotificationEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!("NOTIFY [MATTERMOST] DELIVERY TASK GONE, DROPPED [{}]", e.0);
        }
    }
}

async fn deliver(client: Client, url: String, mut rx: UnboundedReceiver<NotificationEvent>) {
    while let Some(event) = rx.recv().await {
        let text = event.to_string();
        match client.post(&url).json(&Payload { text: &text }).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("NOTIFY [MATTERMOST] SENT [{}]", event.message);
            }
            Ok(response) => {
                warn!("NOTIFY [MATTERMOST] FAILED WITH STATUS [{}]", response.status());
            }
            Err(e) => warn!("NOTIFY [MATTERMOST] FAILED: {}", e),
        }
    }
}
