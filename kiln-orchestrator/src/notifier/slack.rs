//! Slack notifier
//!
//! Posts a build summary to an incoming webhook. The webhook URL, channel and
//! bot username come from pipeline secrets.

use async_trait::async_trait;
use kiln_core::domain::build::BuildStatus;
use kiln_core::domain::notification::Notification;
use serde::Serialize;
use std::collections::BTreeMap;

use super::Notifier;

pub const KIND: &str = "slack";

#[derive(Debug, Serialize, PartialEq)]
struct Message {
    #[serde(skip_serializing_if = "String::is_empty")]
    channel: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    username: String,
    text: String,
    attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Attachment {
    color: &'static str,
    fallback: String,
    fields: Vec<Field>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Field {
    title: String,
    value: String,
    short: bool,
}

/// Slack incoming-webhook notifier
#[derive(Debug, Clone, Default)]
pub struct SlackNotifier {
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `client` for webhook requests, e.g. one with proxy settings.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn kind(&self) -> &str {
        KIND
    }

    fn default_metadata(&self) -> BTreeMap<String, String> {
        [
            ("channel", "slackchannel"),
            ("url", "slackurl"),
            ("username", "slackuser"),
        ]
        .into_iter()
        .map(|(key, secret)| (key.to_string(), secret.to_string()))
        .collect()
    }

    async fn send(&self, notification: &Notification, metadata: &BTreeMap<String, String>) -> bool {
        let Some(url) = metadata.get("url").filter(|url| !url.is_empty()) else {
            tracing::warn!("Slack notifier has no webhook url for {}", notification.pipeline);
            return false;
        };

        let response = self
            .client
            .post(url)
            .json(&message(notification, metadata))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!("Slack webhook answered {}", response.status());
                false
            }
            Err(e) => {
                tracing::warn!("Slack webhook request failed: {}", e);
                false
            }
        }
    }
}

fn message(notification: &Notification, metadata: &BTreeMap<String, String>) -> Message {
    let headline = format!(
        "Build #{} of {}: {}",
        notification.build_number, notification.pipeline, notification.build_status
    );

    let fields = notification
        .stages
        .iter()
        .map(|stage| Field {
            title: stage.name.clone(),
            value: stage.status.to_string(),
            short: true,
        })
        .collect();

    Message {
        channel: metadata.get("channel").cloned().unwrap_or_default(),
        username: metadata.get("username").cloned().unwrap_or_default(),
        text: headline.clone(),
        attachments: vec![Attachment {
            color: color(notification.build_status),
            fallback: headline,
            fields,
        }],
    }
}

fn color(status: BuildStatus) -> &'static str {
    match status {
        BuildStatus::Success => "good",
        BuildStatus::Fail => "danger",
        _ => "warning",
    }
}
