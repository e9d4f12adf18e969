//! Push notifications.
//!
//! A push payload is a JSON object; any of `title`, `body` and `tag` may be
//! missing and is filled with a default. The whole payload travels along as
//! [`Notification::data`] so the click handler can use fields the engine
//! does not know about.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Result;

/// Default notification title (the application name).
pub const DEFAULT_APP_NAME: &str = "Harambee Stars Connect";
/// Default notification body.
pub const DEFAULT_BODY: &str = "Mechi mpya!";
/// Default notification tag. Notifications sharing a tag replace each other.
pub const DEFAULT_TAG: &str = "match-update";
pub const DEFAULT_ICON: &str = "/icon-192.png";
pub const DEFAULT_BADGE: &str = "/badge-72.png";

/// Fields the engine reads from a push payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

/// A notification ready to be shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    /// The original payload.
    pub data: serde_json::Value,
}

impl Notification {
    /// Build a notification from a raw JSON payload.
    ///
    /// If `title`, `body` or `tag` has the wrong type, all three take
    /// their defaults.
    pub fn from_payload(app_name: &str, data: serde_json::Value) -> Self {
        let payload: PushPayload = serde_json::from_value(data.clone()).unwrap_or_default();
        Self {
            title: payload.title.unwrap_or_else(|| app_name.to_string()),
            body: payload.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
            icon: DEFAULT_ICON.to_string(),
            badge: DEFAULT_BADGE.to_string(),
            tag: payload.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
            data,
        }
    }
}

/// Displays notifications to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, notification: Notification) -> Result<()>;
}

/// Notifier that only logs. Default for headless hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn show(&self, notification: Notification) -> Result<()> {
        info!(
            title = %notification.title,
            body = %notification.body,
            tag = %notification.tag,
            "notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_fill_missing_fields() {
        let n = Notification::from_payload(DEFAULT_APP_NAME, json!({}));
        assert_eq!(n.title, "Harambee Stars Connect");
        assert_eq!(n.body, "Mechi mpya!");
        assert_eq!(n.tag, "match-update");
        assert_eq!(n.icon, "/icon-192.png");
        assert_eq!(n.badge, "/badge-72.png");
    }

    #[test]
    fn payload_fields_win_and_data_is_kept() {
        let payload = json!({"title": "Goal!", "body": "Kenya 1-0", "match_id": 7});
        let n = Notification::from_payload("App", payload.clone());
        assert_eq!(n.title, "Goal!");
        assert_eq!(n.body, "Kenya 1-0");
        assert_eq!(n.tag, DEFAULT_TAG);
        assert_eq!(n.data, payload);
    }

    #[test]
    fn mistyped_fields_are_ignored() {
        let n = Notification::from_payload("App", json!({"title": 5}));
        assert_eq!(n.title, "App");
    }
}
