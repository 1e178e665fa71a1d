//! Normalized message records produced by classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{envelope::Envelope, group, markup};

// ── MessageVariant ──────────────────────────────────────────────────────────

/// Discriminant of a [`MessageRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageVariant {
    Text,
    Quote,
    Image,
    Voice,
    Video,
    Emoji,
    Location,
    Link,
    #[serde(rename = "MINIAPP")]
    MiniApp,
    File,
    FileNotice,
    Card,
    FriendRequest,
    ContactUpdated,
    ContactDeleted,
    GroupInvite,
    GroupInvited,
    GroupInfoUpdate,
    GroupTodo,
    Transfer,
    RedPacket,
    Finder,
    SystemNotice,
    Offline,
    Unknown,
}

impl MessageVariant {
    /// All variants, for iteration.
    pub const ALL: &'static [MessageVariant] = &[
        Self::Text,
        Self::Quote,
        Self::Image,
        Self::Voice,
        Self::Video,
        Self::Emoji,
        Self::Location,
        Self::Link,
        Self::MiniApp,
        Self::File,
        Self::FileNotice,
        Self::Card,
        Self::FriendRequest,
        Self::ContactUpdated,
        Self::ContactDeleted,
        Self::GroupInvite,
        Self::GroupInvited,
        Self::GroupInfoUpdate,
        Self::GroupTodo,
        Self::Transfer,
        Self::RedPacket,
        Self::Finder,
        Self::SystemNotice,
        Self::Offline,
        Self::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Quote => "QUOTE",
            Self::Image => "IMAGE",
            Self::Voice => "VOICE",
            Self::Video => "VIDEO",
            Self::Emoji => "EMOJI",
            Self::Location => "LOCATION",
            Self::Link => "LINK",
            Self::MiniApp => "MINIAPP",
            Self::File => "FILE",
            Self::FileNotice => "FILE_NOTICE",
            Self::Card => "CARD",
            Self::FriendRequest => "FRIEND_REQUEST",
            Self::ContactUpdated => "CONTACT_UPDATED",
            Self::ContactDeleted => "CONTACT_DELETED",
            Self::GroupInvite => "GROUP_INVITE",
            Self::GroupInvited => "GROUP_INVITED",
            Self::GroupInfoUpdate => "GROUP_INFO_UPDATE",
            Self::GroupTodo => "GROUP_TODO",
            Self::Transfer => "TRANSFER",
            Self::RedPacket => "RED_PACKET",
            Self::Finder => "FINDER",
            Self::SystemNotice => "SYSTEM_NOTICE",
            Self::Offline => "OFFLINE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for MessageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attachment kinds the outbound collaborator can resolve to a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Voice,
    Video,
    File,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Voice => "voice",
            Self::Video => "video",
            Self::File => "file",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Header ──────────────────────────────────────────────────────────────────

/// Fields shared by every record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageHeader {
    pub device_id: String,
    pub session_wxid: String,
    pub source_typename: String,
    pub message_id: String,
    /// Redelivery-safe id; falls back to `message_id` when the gateway did
    /// not send one.
    pub dedup_id: String,
    /// Epoch seconds, 0 when the envelope carries no timestamp.
    pub created_at: i64,
    pub from_id: String,
    pub to_id: String,
    /// Group id, empty outside group chats.
    pub room_id: String,
    /// In groups, the member who actually spoke; `from_id` otherwise.
    pub actual_sender_id: String,
    pub raw_content: String,
    #[serde(skip)]
    pub raw_envelope: Envelope,
}

impl MessageHeader {
    /// Build the header for `envelope` and return it together with the
    /// effective content (the content with any group sender prefix removed).
    pub fn resolve(envelope: &Envelope) -> (Self, String) {
        let raw_content = envelope.content().unwrap_or_default();
        // Contact events carry no sender; the contact that changed stands in
        // for it so group detection works for them too.
        let from_id = envelope
            .from_id()
            .or_else(|| envelope.contact_id())
            .unwrap_or_default();
        let to_id = envelope.to_id().unwrap_or_default();
        let context = group::resolve(from_id, to_id, raw_content);
        let message_id = envelope.message_id().unwrap_or_default();
        let dedup_id = envelope
            .new_message_id()
            .unwrap_or_else(|| message_id.clone());

        let header = Self {
            device_id: envelope.device_id().unwrap_or_default().to_string(),
            session_wxid: envelope.session_wxid().unwrap_or_default().to_string(),
            source_typename: envelope.typename().unwrap_or_default().to_string(),
            message_id,
            dedup_id,
            created_at: envelope.created_at().unwrap_or_default(),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            room_id: context.room_id,
            actual_sender_id: context.actual_sender_id,
            raw_content: raw_content.to_string(),
            raw_envelope: envelope.clone(),
        };
        (header, context.content)
    }

    #[must_use]
    pub fn is_group(&self) -> bool {
        !self.room_id.is_empty()
    }

    /// Where a reply to this message should go: the room in groups, the
    /// peer otherwise.
    pub fn reply_target(&self) -> &str {
        if self.is_group() {
            &self.room_id
        } else if self.from_id == self.session_wxid {
            &self.to_id
        } else {
            &self.from_id
        }
    }
}

// ── Variant payloads ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TextMessage {
    pub text: String,
    /// Ids mentioned with `@`, from the message source's `atuserlist`.
    pub at_list: Vec<String>,
    pub mentions_self: bool,
    pub mentions_all: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuotedMessage {
    pub msg_type: Option<i64>,
    pub svr_id: String,
    pub from_id: String,
    pub chat_id: String,
    pub display_name: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuoteMessage {
    pub text: String,
    pub quoted: QuotedMessage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageMessage {
    pub aes_key: String,
    pub cdn_url: String,
    pub md5: String,
    pub length: u64,
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VoiceMessage {
    pub duration_ms: u64,
    pub aes_key: String,
    pub voice_url: String,
    pub length: u64,
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoMessage {
    pub duration_secs: u64,
    pub aes_key: String,
    pub cdn_url: String,
    pub md5: String,
    pub length: u64,
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmojiMessage {
    pub md5: String,
    pub cdn_url: String,
    pub length: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocationMessage {
    pub latitude: f64,
    pub longitude: f64,
    pub label: String,
    pub poi_name: String,
    pub scale: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkMessage {
    pub title: String,
    pub description: String,
    pub url: String,
    pub thumb_url: String,
    pub source_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MiniAppMessage {
    pub title: String,
    pub app_id: String,
    pub page_path: String,
    pub source_username: String,
    pub source_name: String,
    pub icon_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileMessage {
    pub file_name: String,
    pub file_size: u64,
    pub file_ext: String,
    pub attachment_id: String,
    pub encryption_key: String,
    pub md5: String,
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileNoticeMessage {
    pub file_name: String,
    pub file_size: u64,
    pub file_ext: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CardMessage {
    pub user_name: String,
    pub nickname: String,
    pub alias: String,
    pub avatar_url: String,
    pub province: String,
    pub city: String,
    pub signature: String,
    /// Card of an official account rather than a person.
    pub is_official: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FriendRequestMessage {
    pub from_user: String,
    pub nickname: String,
    pub greeting: String,
    /// Encrypted user name, needed to accept the request.
    pub v3: String,
    /// Request ticket, needed to accept the request.
    pub v4: String,
    pub scene: u32,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContactUpdate {
    pub contact_id: String,
    pub nickname: String,
    pub remark: String,
    pub alias: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContactRemoval {
    pub contact_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupInviteMessage {
    pub title: String,
    pub description: String,
    pub url: String,
    pub thumb_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupInvitedNotice {
    pub text: String,
    pub inviter_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupInfoUpdate {
    pub name: String,
    pub owner: String,
    pub member_count: u32,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupTodo {
    pub todo_id: String,
    pub title: String,
    pub creator: String,
    pub operator: String,
    pub op: i64,
    pub related_msg_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransferMessage {
    pub fee_desc: String,
    pub transfer_id: String,
    pub transaction_id: String,
    /// 1 = sent, 3 = accepted, 4 = refunded.
    pub pay_subtype: i64,
    pub memo: String,
    pub payer: String,
    pub receiver: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RedPacketMessage {
    pub title: String,
    pub scene_text: String,
    pub native_url: String,
    pub pay_msg_id: String,
    pub inner_type: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinderMessage {
    pub object_id: String,
    pub nonce_id: String,
    pub nickname: String,
    pub username: String,
    pub avatar_url: String,
    pub description: String,
    pub media_count: u32,
    pub thumb_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemNotice {
    /// `type` attribute of a structured system message (`revokemsg`, `pat`, ...).
    pub notice_type: Option<String>,
    pub text: String,
}

// ── Body and record ─────────────────────────────────────────────────────────

/// Variant-specific part of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "variant", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageBody {
    Text(TextMessage),
    Quote(QuoteMessage),
    Image(ImageMessage),
    Voice(VoiceMessage),
    Video(VideoMessage),
    Emoji(EmojiMessage),
    Location(LocationMessage),
    Link(LinkMessage),
    #[serde(rename = "MINIAPP")]
    MiniApp(MiniAppMessage),
    File(FileMessage),
    FileNotice(FileNoticeMessage),
    Card(CardMessage),
    FriendRequest(FriendRequestMessage),
    ContactUpdated(ContactUpdate),
    ContactDeleted(ContactRemoval),
    GroupInvite(GroupInviteMessage),
    GroupInvited(GroupInvitedNotice),
    GroupInfoUpdate(GroupInfoUpdate),
    GroupTodo(GroupTodo),
    Transfer(TransferMessage),
    RedPacket(RedPacketMessage),
    Finder(FinderMessage),
    SystemNotice(SystemNotice),
    Offline,
    Unknown,
}

impl MessageBody {
    pub fn variant(&self) -> MessageVariant {
        match self {
            Self::Text(_) => MessageVariant::Text,
            Self::Quote(_) => MessageVariant::Quote,
            Self::Image(_) => MessageVariant::Image,
            Self::Voice(_) => MessageVariant::Voice,
            Self::Video(_) => MessageVariant::Video,
            Self::Emoji(_) => MessageVariant::Emoji,
            Self::Location(_) => MessageVariant::Location,
            Self::Link(_) => MessageVariant::Link,
            Self::MiniApp(_) => MessageVariant::MiniApp,
            Self::File(_) => MessageVariant::File,
            Self::FileNotice(_) => MessageVariant::FileNotice,
            Self::Card(_) => MessageVariant::Card,
            Self::FriendRequest(_) => MessageVariant::FriendRequest,
            Self::ContactUpdated(_) => MessageVariant::ContactUpdated,
            Self::ContactDeleted(_) => MessageVariant::ContactDeleted,
            Self::GroupInvite(_) => MessageVariant::GroupInvite,
            Self::GroupInvited(_) => MessageVariant::GroupInvited,
            Self::GroupInfoUpdate(_) => MessageVariant::GroupInfoUpdate,
            Self::GroupTodo(_) => MessageVariant::GroupTodo,
            Self::Transfer(_) => MessageVariant::Transfer,
            Self::RedPacket(_) => MessageVariant::RedPacket,
            Self::Finder(_) => MessageVariant::Finder,
            Self::SystemNotice(_) => MessageVariant::SystemNotice,
            Self::Offline => MessageVariant::Offline,
            Self::Unknown => MessageVariant::Unknown,
        }
    }
}

/// A classified message. Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    #[serde(flatten)]
    pub header: MessageHeader,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl MessageRecord {
    #[must_use]
    pub fn new(header: MessageHeader, body: MessageBody) -> Self {
        Self { header, body }
    }

    pub fn variant(&self) -> MessageVariant {
        self.body.variant()
    }

    #[must_use]
    pub fn is_group(&self) -> bool {
        self.header.is_group()
    }

    /// Plain text of text-bearing records.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(t) => Some(&t.text),
            MessageBody::Quote(q) => Some(&q.text),
            _ => None,
        }
    }

    /// Attachment kind, for records whose payload can be downloaded.
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self.body {
            MessageBody::Image(_) => Some(MediaKind::Image),
            MessageBody::Voice(_) => Some(MediaKind::Voice),
            MessageBody::Video(_) => Some(MediaKind::Video),
            MessageBody::File(_) => Some(MediaKind::File),
            _ => None,
        }
    }

    /// The markup document inside `raw_content`, without any sender prefix.
    pub fn markup(&self) -> Option<&str> {
        markup::locate_root(&self.header.raw_content)
    }

    pub fn download_url(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Image(m) => m.download_url.as_deref(),
            MessageBody::Voice(m) => m.download_url.as_deref(),
            MessageBody::Video(m) => m.download_url.as_deref(),
            MessageBody::File(m) => m.download_url.as_deref(),
            _ => None,
        }
    }

    /// Copy of this record with the attachment URL filled in. Records without
    /// an attachment are returned unchanged.
    #[must_use]
    pub fn with_download_url(&self, url: String) -> Self {
        let mut record = self.clone();
        match &mut record.body {
            MessageBody::Image(m) => m.download_url = Some(url),
            MessageBody::Voice(m) => m.download_url = Some(url),
            MessageBody::Video(m) => m.download_url = Some(url),
            MessageBody::File(m) => m.download_url = Some(url),
            _ => {},
        }
        record
    }
}
