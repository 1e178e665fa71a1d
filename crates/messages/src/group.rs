//! Group-chat context: which room a message belongs to and who really sent
//! it.
//!
//! The gateway reports group messages with the room as sender and prepends
//! the speaking member to the content as `member-id:\n...`. Detection is a
//! heuristic on id shapes; it never fails, it only decides whether a prefix
//! is present.

/// Suffix of group ids.
pub const GROUP_SUFFIX: &str = "@chatroom";

/// Prefix of synthetic user ids.
pub const SYNTHETIC_ID_PREFIX: &str = "wxid_";

/// Resolved group context of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupContext {
    /// Group id, empty outside group chats.
    pub room_id: String,
    /// Member who spoke in a group; `from_id` otherwise.
    pub actual_sender_id: String,
    /// Content with the sender prefix removed.
    pub content: String,
}

#[must_use]
pub fn is_group_id(id: &str) -> bool {
    id.ends_with(GROUP_SUFFIX)
}

/// The group a message between `from` and `to` belongs to, if any. Outgoing
/// group messages name the room as recipient.
pub fn room_of<'a>(from: &'a str, to: &'a str) -> Option<&'a str> {
    if is_group_id(from) {
        Some(from)
    } else if is_group_id(to) {
        Some(to)
    } else {
        None
    }
}

/// Whether `candidate` is shaped like a sender id. Text before an early
/// colon that happens to contain `@` passes too; that misfire is kept for
/// compatibility with existing deployments.
#[must_use]
pub fn looks_like_sender_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && (candidate.starts_with(SYNTHETIC_ID_PREFIX)
            || candidate.ends_with(GROUP_SUFFIX)
            || candidate.contains('@'))
}

/// Split `raw_content` into sender and body for a message between `from` and
/// `to`.
///
/// Outside groups the content is returned unchanged. In groups, text before
/// the first `:` is taken as the sender when it looks like an id; the rest,
/// with surrounding whitespace trimmed, becomes the content. Otherwise the
/// content stays verbatim and `from` is the sender.
#[must_use]
pub fn resolve(from: &str, to: &str, raw_content: &str) -> GroupContext {
    let Some(room) = room_of(from, to) else {
        return GroupContext {
            room_id: String::new(),
            actual_sender_id: from.to_string(),
            content: raw_content.to_string(),
        };
    };

    match raw_content.split_once(':') {
        Some((prefix, rest)) if looks_like_sender_id(prefix) => GroupContext {
            room_id: room.to_string(),
            actual_sender_id: prefix.to_string(),
            content: rest.trim().to_string(),
        },
        _ => GroupContext {
            room_id: room.to_string(),
            actual_sender_id: from.to_string(),
            content: raw_content.to_string(),
        },
    }
}
