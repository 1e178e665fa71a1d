use crate::{
    classify::{Classifier, Inbound},
    envelope::sub_type,
    markup::extract,
    record::{MessageBody, MessageRecord, MessageVariant, TextMessage},
};

/// Id that stands for "everyone" in a mention list.
const MENTION_ALL: &str = "notify@all";

/// Matches new messages of one `sub_type`; the body comes from a builder
/// function.
pub struct BySubType {
    pub name: &'static str,
    pub variant: MessageVariant,
    pub sub_type: i64,
    pub build: fn(&Inbound<'_>) -> MessageBody,
}

impl Classifier for BySubType {
    fn name(&self) -> &'static str {
        self.name
    }

    fn variant(&self) -> MessageVariant {
        self.variant
    }

    fn matches(&self, msg: &Inbound<'_>) -> bool {
        msg.is_new_message(self.sub_type)
    }

    fn build(&self, msg: &Inbound<'_>) -> MessageRecord {
        msg.record((self.build)(msg))
    }
}

/// Plain text, with mentions recovered from the message source.
pub struct TextClassifier;

impl Classifier for TextClassifier {
    fn name(&self) -> &'static str {
        "text"
    }

    fn variant(&self) -> MessageVariant {
        MessageVariant::Text
    }

    fn matches(&self, msg: &Inbound<'_>) -> bool {
        msg.is_new_message(sub_type::TEXT)
    }

    fn build(&self, msg: &Inbound<'_>) -> MessageRecord {
        let at_list = msg
            .envelope()
            .msg_source()
            .map(extract::at_list)
            .unwrap_or_default();
        let session = &msg.header().session_wxid;
        let mentions_self = !session.is_empty() && at_list.iter().any(|id| id == session);
        let mentions_all = at_list.iter().any(|id| id == MENTION_ALL);
        msg.record(MessageBody::Text(TextMessage {
            text: msg.content().to_string(),
            at_list,
            mentions_self,
            mentions_all,
        }))
    }
}

pub(super) fn text() -> TextClassifier {
    TextClassifier
}

pub(super) fn image() -> BySubType {
    BySubType {
        name: "image",
        variant: MessageVariant::Image,
        sub_type: sub_type::IMAGE,
        build: |msg| MessageBody::Image(msg.extract(extract::image)),
    }
}

pub(super) fn voice() -> BySubType {
    BySubType {
        name: "voice",
        variant: MessageVariant::Voice,
        sub_type: sub_type::VOICE,
        build: |msg| MessageBody::Voice(msg.extract(extract::voice)),
    }
}

pub(super) fn video() -> BySubType {
    BySubType {
        name: "video",
        variant: MessageVariant::Video,
        sub_type: sub_type::VIDEO,
        build: |msg| MessageBody::Video(msg.extract(extract::video)),
    }
}

pub(super) fn emoji() -> BySubType {
    BySubType {
        name: "emoji",
        variant: MessageVariant::Emoji,
        sub_type: sub_type::EMOJI,
        build: |msg| MessageBody::Emoji(msg.extract(extract::emoji)),
    }
}

pub(super) fn location() -> BySubType {
    BySubType {
        name: "location",
        variant: MessageVariant::Location,
        sub_type: sub_type::LOCATION,
        build: |msg| MessageBody::Location(msg.extract(extract::location)),
    }
}
