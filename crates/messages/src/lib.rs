//! Webhook envelope classification.
//!
//! Turns the chat gateway's weakly typed callbacks into [`MessageRecord`]s:
//! the [`envelope`] accessors read the raw notification, [`markup`] parses
//! the rich-content documents embedded in it, [`group`] recovers the real
//! sender of group messages, and the [`classify`] chain picks the variant.

pub mod classify;
pub mod collaborator;
pub mod envelope;
pub mod group;
pub mod markup;
pub mod record;

pub use {
    classify::{Classifier, ClassifierChain, Inbound},
    collaborator::{AttachmentResolver, MessageSender},
    envelope::Envelope,
    markup::MarkupNode,
    record::{MediaKind, MessageBody, MessageHeader, MessageRecord, MessageVariant},
};
