//! Normalized event shapes plugins receive from the bridge.
//!
//! Platform adapters translate their native updates into these types and
//! hand them to the [`EventPublisher`](crate::bus::EventPublisher). Action
//! callbacks (`reply`, `approve`, ...) travel with the event so a plugin can
//! respond without knowing which platform produced it.

use std::{fmt, sync::Arc};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

/// Which side of the bridge an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Qq,
    Tg,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qq => "qq",
            Self::Tg => "tg",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Group,
    Private,
    Channel,
}

// ── Message events ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub user_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_nick: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_owner: bool,
}

impl Sender {
    /// Nickname when present, user name otherwise.
    pub fn display_name(&self) -> &str {
        self.user_nick
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.user_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotedMessage {
    pub id: String,
    pub user_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    pub id: String,
    pub text: String,
    /// Platform segments (images, mentions, ...) in adapter-specific form.
    #[serde(default)]
    pub segments: Vec<serde_json::Value>,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<QuotedMessage>,
}

/// Callbacks bound to the conversation a message arrived in.
#[async_trait]
pub trait MessageActions: Send + Sync {
    /// Reply quoting the triggering message.
    async fn reply(&self, text: &str) -> anyhow::Result<()>;
    /// Send into the same channel without quoting.
    async fn send(&self, text: &str) -> anyhow::Result<()>;
    /// Recall (delete) the triggering message.
    async fn recall(&self) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct MessageEvent {
    pub instance_id: i64,
    pub platform: Platform,
    pub channel_id: String,
    pub channel_kind: ChannelKind,
    pub thread_id: Option<i64>,
    pub sender: Sender,
    pub message: MessageContent,
    pub raw: serde_json::Value,
    pub actions: Arc<dyn MessageActions>,
}

impl MessageEvent {
    pub async fn reply(&self, text: &str) -> anyhow::Result<()> {
        self.actions.reply(text).await
    }

    pub async fn send(&self, text: &str) -> anyhow::Result<()> {
        self.actions.send(text).await
    }

    pub async fn recall(&self) -> anyhow::Result<()> {
        self.actions.recall().await
    }
}

impl fmt::Debug for MessageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEvent")
            .field("instance_id", &self.instance_id)
            .field("platform", &self.platform)
            .field("channel_id", &self.channel_id)
            .field("channel_kind", &self.channel_kind)
            .field("thread_id", &self.thread_id)
            .field("sender", &self.sender)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

// ── Requests ────────────────────────────────────────────────────────────────

/// Callbacks that settle a pending friend or group request.
#[async_trait]
pub trait RequestActions: Send + Sync {
    async fn approve(&self) -> anyhow::Result<()>;
    async fn reject(&self, reason: Option<&str>) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct FriendRequestEvent {
    pub instance_id: i64,
    pub platform: Platform,
    pub request_id: String,
    pub user_id: String,
    pub user_name: String,
    pub comment: Option<String>,
    pub timestamp: i64,
    pub actions: Arc<dyn RequestActions>,
}

impl fmt::Debug for FriendRequestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FriendRequestEvent")
            .field("instance_id", &self.instance_id)
            .field("platform", &self.platform)
            .field("request_id", &self.request_id)
            .field("user_id", &self.user_id)
            .field("comment", &self.comment)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRequestKind {
    Add,
    Invite,
}

#[derive(Clone)]
pub struct GroupRequestEvent {
    pub instance_id: i64,
    pub platform: Platform,
    pub request_id: String,
    pub group_id: String,
    pub user_id: String,
    pub user_name: String,
    pub comment: Option<String>,
    pub kind: Option<GroupRequestKind>,
    pub timestamp: i64,
    pub actions: Arc<dyn RequestActions>,
}

impl fmt::Debug for GroupRequestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupRequestEvent")
            .field("instance_id", &self.instance_id)
            .field("platform", &self.platform)
            .field("request_id", &self.request_id)
            .field("group_id", &self.group_id)
            .field("user_id", &self.user_id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

// ── Notices & status ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    GroupMemberIncrease,
    GroupMemberDecrease,
    GroupAdmin,
    GroupBan,
    GroupRecall,
    FriendAdd,
    FriendRecall,
    Poke,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeEvent {
    pub instance_id: i64,
    pub platform: Platform,
    pub kind: NoticeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
    /// Ban duration in seconds for [`NoticeKind::GroupBan`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    pub timestamp: i64,
    #[serde(default)]
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatusEvent {
    pub instance_id: i64,
    pub status: InstanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything that travels over the event bus.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    Message(MessageEvent),
    FriendRequest(FriendRequestEvent),
    GroupRequest(GroupRequestEvent),
    Notice(NoticeEvent),
    InstanceStatus(InstanceStatusEvent),
}

impl BridgeEvent {
    /// Short event name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::FriendRequest(_) => "friend-request",
            Self::GroupRequest(_) => "group-request",
            Self::Notice(_) => "notice",
            Self::InstanceStatus(_) => "instance-status",
        }
    }

    /// Bridge instance the event belongs to.
    pub fn instance_id(&self) -> i64 {
        match self {
            Self::Message(e) => e.instance_id,
            Self::FriendRequest(e) => e.instance_id,
            Self::GroupRequest(e) => e.instance_id,
            Self::Notice(e) => e.instance_id,
            Self::InstanceStatus(e) => e.instance_id,
        }
    }
}
