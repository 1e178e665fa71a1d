//! Contact cards, friend requests and contact-list events.

use serde_json::Value;

use crate::{
    classify::{BySubType, Classifier, Inbound},
    envelope::{field, id_field, int_field, sub_type, text_field, typename},
    group,
    markup::extract,
    record::{
        ContactRemoval, ContactUpdate, GroupInfoUpdate, MessageBody, MessageRecord, MessageVariant,
    },
};

const NICKNAME: &[&str] = &["nickname", "NickName"];
const REMARK: &[&str] = &["remark", "Remark"];
const ALIAS: &[&str] = &["alias", "Alias"];
const AVATAR: &[&str] = &["avatar_url", "BigHeadImgUrl", "SmallHeadImgUrl"];
const OWNER: &[&str] = &["owner", "ChatRoomOwner"];
const ROOM_DATA: &[&str] = &["room_data", "NewChatroomData"];
const MEMBER_COUNT: &[&str] = &["member_count", "MemberCount"];
const MEMBERS: &[&str] = &["members", "ChatRoomMember"];
const MEMBER_ID: &[&str] = &["user_name", "UserName"];

/// Matches every envelope with one top-level `typename`.
pub struct ByTypename {
    pub name: &'static str,
    pub variant: MessageVariant,
    pub typename: &'static str,
    pub build: fn(&Inbound<'_>) -> MessageBody,
}

impl Classifier for ByTypename {
    fn name(&self) -> &'static str {
        self.name
    }

    fn variant(&self) -> MessageVariant {
        self.variant
    }

    fn matches(&self, msg: &Inbound<'_>) -> bool {
        msg.envelope().is_typename(self.typename)
    }

    fn build(&self, msg: &Inbound<'_>) -> MessageRecord {
        msg.record((self.build)(msg))
    }
}

pub(super) fn card() -> BySubType {
    BySubType {
        name: "card",
        variant: MessageVariant::Card,
        sub_type: sub_type::CARD,
        build: |msg| MessageBody::Card(msg.extract(extract::card)),
    }
}

pub(super) fn friend_request() -> BySubType {
    BySubType {
        name: "friend_request",
        variant: MessageVariant::FriendRequest,
        sub_type: sub_type::FRIEND_REQUEST,
        build: |msg| MessageBody::FriendRequest(msg.extract(extract::friend_request)),
    }
}

fn payload_text(msg: &Inbound<'_>, keys: &[&str]) -> String {
    msg.envelope()
        .payload()
        .and_then(|p| text_field(p, keys))
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn contact_id(msg: &Inbound<'_>) -> String {
    msg.envelope().contact_id().unwrap_or_default().to_string()
}

pub(super) fn contact_updated() -> ByTypename {
    ByTypename {
        name: "contact_updated",
        variant: MessageVariant::ContactUpdated,
        typename: typename::CONTACT_CHANGED,
        build: |msg| {
            MessageBody::ContactUpdated(ContactUpdate {
                contact_id: contact_id(msg),
                nickname: payload_text(msg, NICKNAME),
                remark: payload_text(msg, REMARK),
                alias: payload_text(msg, ALIAS),
                avatar_url: payload_text(msg, AVATAR),
            })
        },
    }
}

pub(super) fn contact_deleted() -> ByTypename {
    ByTypename {
        name: "contact_deleted",
        variant: MessageVariant::ContactDeleted,
        typename: typename::CONTACT_REMOVED,
        build: |msg| {
            MessageBody::ContactDeleted(ContactRemoval {
                contact_id: contact_id(msg),
            })
        },
    }
}

pub(super) fn offline() -> ByTypename {
    ByTypename {
        name: "offline",
        variant: MessageVariant::Offline,
        typename: typename::OFFLINE,
        build: |_| MessageBody::Offline,
    }
}

/// Contact-change events about a group: name, owner or membership changed.
pub struct GroupInfoClassifier;

impl Classifier for GroupInfoClassifier {
    fn name(&self) -> &'static str {
        "group_info_update"
    }

    fn variant(&self) -> MessageVariant {
        MessageVariant::GroupInfoUpdate
    }

    fn matches(&self, msg: &Inbound<'_>) -> bool {
        msg.envelope().is_typename(typename::CONTACT_CHANGED)
            && msg.envelope().contact_id().is_some_and(group::is_group_id)
    }

    fn build(&self, msg: &Inbound<'_>) -> MessageRecord {
        let room_data = msg
            .envelope()
            .payload()
            .and_then(|p| field(p, ROOM_DATA));
        let member_count = room_data
            .and_then(|d| int_field(d, MEMBER_COUNT))
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or_default();
        let members: Vec<String> = room_data
            .and_then(|d| field(d, MEMBERS))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|m| id_field(m, MEMBER_ID))
                    .collect()
            })
            .unwrap_or_default();

        msg.record(MessageBody::GroupInfoUpdate(GroupInfoUpdate {
            name: payload_text(msg, NICKNAME),
            owner: payload_text(msg, OWNER),
            member_count,
            members,
        }))
    }
}
