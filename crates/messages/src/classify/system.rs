//! System notices (sub-types 10000 and 10002).

use crate::{
    classify::{Classifier, Inbound},
    envelope::sub_type,
    markup::extract,
    record::{GroupInvitedNotice, MessageBody, MessageRecord, MessageVariant, SystemNotice},
};

/// Phrases announcing that the session account was pulled into a group.
const INVITED_MARKERS: &[&str] = &[
    "邀请你加入了群聊",
    "邀请你和",
    "invited you to join the group chat",
    "invited you and",
];

fn is_system(msg: &Inbound<'_>) -> bool {
    msg.is_new_message(sub_type::SYSTEM_NOTICE) || msg.is_new_message(sub_type::SYSTEM_MESSAGE)
}

/// Readable text of a notice: structured system messages are rendered,
/// plain notices are taken as they are.
fn notice_text(msg: &Inbound<'_>) -> String {
    msg.markup()
        .and_then(extract::sysmsg_text)
        .unwrap_or_else(|| msg.content().trim().to_string())
}

/// Text between the first pair of straight or curly double quotes.
fn quoted_name(text: &str) -> Option<&str> {
    let (start, open) = text.char_indices().find(|&(_, c)| matches!(c, '"' | '“'))?;
    let close = if open == '“' { '”' } else { '"' };
    let rest = &text[start + open.len_utf8()..];
    rest.find(close).map(|end| rest[..end].trim())
}

pub struct GroupTodoClassifier;

impl Classifier for GroupTodoClassifier {
    fn name(&self) -> &'static str {
        "group_todo"
    }

    fn variant(&self) -> MessageVariant {
        MessageVariant::GroupTodo
    }

    fn matches(&self, msg: &Inbound<'_>) -> bool {
        msg.is_new_message(sub_type::SYSTEM_MESSAGE)
            && msg.markup().is_some_and(extract::has_group_todo)
    }

    fn build(&self, msg: &Inbound<'_>) -> MessageRecord {
        msg.record(MessageBody::GroupTodo(msg.extract(extract::group_todo)))
    }
}

pub struct GroupInvitedClassifier;

impl Classifier for GroupInvitedClassifier {
    fn name(&self) -> &'static str {
        "group_invited"
    }

    fn variant(&self) -> MessageVariant {
        MessageVariant::GroupInvited
    }

    fn matches(&self, msg: &Inbound<'_>) -> bool {
        is_system(msg) && {
            let text = notice_text(msg);
            INVITED_MARKERS.iter().any(|m| text.contains(m))
        }
    }

    fn build(&self, msg: &Inbound<'_>) -> MessageRecord {
        let text = notice_text(msg);
        let inviter_name = msg
            .markup()
            .and_then(extract::template_inviter)
            .or_else(|| quoted_name(&text).map(str::to_string))
            .unwrap_or_default();
        msg.record(MessageBody::GroupInvited(GroupInvitedNotice {
            text,
            inviter_name,
        }))
    }
}

/// Every remaining system notice.
pub struct SystemNoticeClassifier;

impl Classifier for SystemNoticeClassifier {
    fn name(&self) -> &'static str {
        "system_notice"
    }

    fn variant(&self) -> MessageVariant {
        MessageVariant::SystemNotice
    }

    fn matches(&self, msg: &Inbound<'_>) -> bool {
        is_system(msg)
    }

    fn build(&self, msg: &Inbound<'_>) -> MessageRecord {
        msg.record(MessageBody::SystemNotice(SystemNotice {
            notice_type: msg.sysmsg_type().map(str::to_string),
            text: notice_text(msg),
        }))
    }
}
