//! App messages (sub-type 49), told apart by the nested `appmsg/type`.

use crate::{
    classify::{Classifier, Inbound},
    envelope::sub_type,
    markup::extract::{self, app_type},
    record::{MessageBody, MessageRecord, MessageVariant, QuoteMessage},
};

/// Matches app messages whose nested type is one of `app_types`.
pub struct ByAppType {
    pub name: &'static str,
    pub variant: MessageVariant,
    pub app_types: &'static [i64],
    pub build: fn(&Inbound<'_>) -> MessageBody,
}

impl Classifier for ByAppType {
    fn name(&self) -> &'static str {
        self.name
    }

    fn variant(&self) -> MessageVariant {
        self.variant
    }

    fn matches(&self, msg: &Inbound<'_>) -> bool {
        msg.is_new_message(sub_type::APP)
            && msg
                .app_type()
                .is_some_and(|t| self.app_types.contains(&t))
    }

    fn build(&self, msg: &Inbound<'_>) -> MessageRecord {
        msg.record((self.build)(msg))
    }
}

pub(super) fn quote() -> ByAppType {
    ByAppType {
        name: "quote",
        variant: MessageVariant::Quote,
        app_types: &[app_type::QUOTE],
        build: |msg| {
            MessageBody::Quote(QuoteMessage {
                text: msg.extract(extract::app_title),
                quoted: msg.extract(extract::quoted),
            })
        },
    }
}

pub(super) fn transfer() -> ByAppType {
    ByAppType {
        name: "transfer",
        variant: MessageVariant::Transfer,
        app_types: &[app_type::TRANSFER],
        build: |msg| MessageBody::Transfer(msg.extract(extract::transfer)),
    }
}

pub(super) fn red_packet() -> ByAppType {
    ByAppType {
        name: "red_packet",
        variant: MessageVariant::RedPacket,
        app_types: &[app_type::RED_PACKET],
        build: |msg| MessageBody::RedPacket(msg.extract(extract::red_packet)),
    }
}

pub(super) fn file_notice() -> ByAppType {
    ByAppType {
        name: "file_notice",
        variant: MessageVariant::FileNotice,
        app_types: &[app_type::FILE_NOTICE],
        build: |msg| MessageBody::FileNotice(msg.extract(extract::file_notice)),
    }
}

pub(super) fn file() -> ByAppType {
    ByAppType {
        name: "file",
        variant: MessageVariant::File,
        app_types: &[app_type::FILE],
        build: |msg| MessageBody::File(msg.extract(extract::file)),
    }
}

pub(super) fn miniapp() -> ByAppType {
    ByAppType {
        name: "miniapp",
        variant: MessageVariant::MiniApp,
        app_types: &[app_type::MINIAPP, app_type::MINIAPP_SHARE],
        build: |msg| MessageBody::MiniApp(msg.extract(extract::miniapp)),
    }
}

pub(super) fn finder() -> ByAppType {
    ByAppType {
        name: "finder",
        variant: MessageVariant::Finder,
        app_types: &[app_type::FINDER],
        build: |msg| MessageBody::Finder(msg.extract(extract::finder)),
    }
}

/// A shared link that invites the recipient into a group.
pub struct GroupInviteClassifier;

impl Classifier for GroupInviteClassifier {
    fn name(&self) -> &'static str {
        "group_invite"
    }

    fn variant(&self) -> MessageVariant {
        MessageVariant::GroupInvite
    }

    fn matches(&self, msg: &Inbound<'_>) -> bool {
        msg.is_new_message(sub_type::APP)
            && msg.app_type() == Some(app_type::LINK)
            && msg.markup().is_some_and(extract::is_group_invite)
    }

    fn build(&self, msg: &Inbound<'_>) -> MessageRecord {
        msg.record(MessageBody::GroupInvite(msg.extract(extract::group_invite)))
    }
}

/// Any remaining app message that carries a URL, and every type-5 share.
pub struct LinkClassifier;

impl Classifier for LinkClassifier {
    fn name(&self) -> &'static str {
        "link"
    }

    fn variant(&self) -> MessageVariant {
        MessageVariant::Link
    }

    fn matches(&self, msg: &Inbound<'_>) -> bool {
        msg.is_new_message(sub_type::APP)
            && (msg.app_type() == Some(app_type::LINK)
                || msg
                    .markup()
                    .is_some_and(|root| !root.text_at("appmsg/url").is_empty()))
    }

    fn build(&self, msg: &Inbound<'_>) -> MessageRecord {
        msg.record(MessageBody::Link(msg.extract(extract::link)))
    }
}
