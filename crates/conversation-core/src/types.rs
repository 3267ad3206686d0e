use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Organization ID type
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct OrganizationId(pub uuid::Uuid);

impl OrganizationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Create from a UUID
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl std::fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// End-user identity as reported by a channel adapter (phone number, email
/// address, chat handle). Opaque to the orchestrator.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct EndUserId(pub String);

impl std::fmt::Display for EndUserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Communication channel a conversation lives on
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Channel {
    WebChat,
    Voice,
    Sms,
    WhatsApp,
    Email,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Channel::WebChat => "web-chat",
            Channel::Voice => "voice",
            Channel::Sms => "sms",
            Channel::WhatsApp => "whatsapp",
            Channel::Email => "email",
        };
        write!(f, "{}", name)
    }
}

/// Stable identity of one end-user's conversation on one channel within one
/// organization. This is the session lookup key: at most one live session
/// exists per key.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConversationKey {
    pub organization: OrganizationId,
    pub end_user: EndUserId,
    pub channel: Channel,
}

impl ConversationKey {
    pub fn new(organization: OrganizationId, end_user: EndUserId, channel: Channel) -> Self {
        Self {
            organization,
            end_user,
            channel,
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.organization, self.end_user, self.channel)
    }
}

/// Direction of a message relative to the platform
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// Who produced a message
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum MessageSender {
    EndUser,
    AiAgent,
    HumanAgent,
}

/// One transcript record. Sequence numbers are assigned by the orchestrator
/// at the moment the message is accepted into a session and are strictly
/// increasing, gap-free within that session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub key: ConversationKey,
    pub sequence: u64,
    pub direction: MessageDirection,
    pub sender: MessageSender,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CloseReason {
    EndUserRequest,
    IdleTimeout,
    Shutdown,
    Operator,
}

impl Default for CloseReason {
    fn default() -> Self {
        CloseReason::EndUserRequest
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CloseReason::EndUserRequest => "end-user request",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::Shutdown => "shutdown",
            CloseReason::Operator => "operator",
        };
        write!(f, "{}", name)
    }
}

/// Synchronization state of a session's external ticket
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum TicketStatus {
    /// Ticket exists in the external system and is up to date
    Open,
    /// The external system was unavailable; the ticket (or its latest
    /// update) has not been synchronized yet
    PendingSync,
}

/// Reference to a ticket in the external ITSM system. At most one open
/// ticket exists per session; repeat escalations update it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRef {
    pub key: ConversationKey,
    /// None while the initial open has never reached the external system
    pub external_id: Option<String>,
    pub status: TicketStatus,
}
