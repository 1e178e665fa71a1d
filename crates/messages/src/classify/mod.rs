//! The classifier chain: an ordered list of predicate/builder pairs that turns
//! an envelope into exactly one [`MessageRecord`].
//!
//! Several message kinds share one discriminant (every app message is
//! sub-type 49), so order matters: specific classifiers are registered before
//! the generic ones they overlap with, and the first match wins.

mod app;
mod contact;
mod media;
mod system;

use std::cell::OnceCell;

use tracing::{debug, trace};

use crate::{
    envelope::{Envelope, typename},
    markup::{MarkupNode, extract},
    record::{MessageBody, MessageHeader, MessageRecord, MessageVariant},
};

pub use {
    app::{ByAppType, GroupInviteClassifier, LinkClassifier},
    contact::{ByTypename, GroupInfoClassifier},
    media::{BySubType, TextClassifier},
    system::{GroupInvitedClassifier, GroupTodoClassifier, SystemNoticeClassifier},
};

// ── Inbound ─────────────────────────────────────────────────────────────────

/// An envelope under classification.
///
/// Header resolution and markup parsing are done at most once, on first use,
/// and shared by every classifier the envelope is offered to.
pub struct Inbound<'a> {
    envelope: &'a Envelope,
    resolved: OnceCell<(MessageHeader, String)>,
    markup: OnceCell<Option<MarkupNode>>,
}

impl<'a> Inbound<'a> {
    #[must_use]
    pub fn new(envelope: &'a Envelope) -> Self {
        Self {
            envelope,
            resolved: OnceCell::new(),
            markup: OnceCell::new(),
        }
    }

    pub fn envelope(&self) -> &'a Envelope {
        self.envelope
    }

    fn resolved(&self) -> &(MessageHeader, String) {
        self.resolved
            .get_or_init(|| MessageHeader::resolve(self.envelope))
    }

    pub fn header(&self) -> &MessageHeader {
        &self.resolved().0
    }

    /// Content with any group sender prefix removed.
    pub fn content(&self) -> &str {
        &self.resolved().1
    }

    /// Parsed markup document of the content, if it holds one.
    pub fn markup(&self) -> Option<&MarkupNode> {
        self.markup
            .get_or_init(|| self.envelope.content().and_then(MarkupNode::parse))
            .as_ref()
    }

    /// Run `extractor` on the markup, or return defaults when there is none.
    pub fn extract<T: Default>(&self, extractor: impl FnOnce(&MarkupNode) -> T) -> T {
        self.markup().map(extractor).unwrap_or_default()
    }

    #[must_use]
    pub fn is_new_message(&self, sub_type: i64) -> bool {
        self.envelope.is_new_message(sub_type)
    }

    /// Nested type of an app message.
    pub fn app_type(&self) -> Option<i64> {
        self.markup().and_then(extract::app_type)
    }

    pub fn sysmsg_type(&self) -> Option<&str> {
        self.markup().and_then(extract::sysmsg_type)
    }

    /// Assemble the record for `body` with this envelope's header.
    #[must_use]
    pub fn record(&self, body: MessageBody) -> MessageRecord {
        MessageRecord::new(self.header().clone(), body)
    }
}

// ── Classifier ──────────────────────────────────────────────────────────────

/// One entry of the chain.
pub trait Classifier: Send + Sync {
    /// Stable identifier used for logging and chain edits.
    fn name(&self) -> &'static str;

    /// The variant this classifier produces.
    fn variant(&self) -> MessageVariant;

    /// Whether this classifier recognizes the envelope. Must not panic on
    /// malformed input; missing or mistyped fields mean `false`.
    fn matches(&self, msg: &Inbound<'_>) -> bool;

    /// Build the record. Only called after [`Classifier::matches`] returned
    /// `true` for the same envelope.
    fn build(&self, msg: &Inbound<'_>) -> MessageRecord;
}

// ── Chain ───────────────────────────────────────────────────────────────────

/// Ordered classifier list. First match wins.
pub struct ClassifierChain {
    classifiers: Vec<Box<dyn Classifier>>,
}

impl ClassifierChain {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            classifiers: Vec::new(),
        }
    }

    /// The built-in chain, most specific classifiers first.
    #[must_use]
    pub fn builtin() -> Self {
        let mut chain = Self::empty();
        chain
            .push(media::text())
            .push(media::image())
            .push(media::voice())
            .push(media::video())
            .push(media::emoji())
            .push(media::location())
            .push(contact::card())
            .push(contact::friend_request())
            .push(app::quote())
            .push(app::transfer())
            .push(app::red_packet())
            .push(app::file_notice())
            .push(app::file())
            .push(app::miniapp())
            .push(app::finder())
            .push(GroupInviteClassifier)
            .push(LinkClassifier)
            .push(GroupTodoClassifier)
            .push(GroupInvitedClassifier)
            .push(SystemNoticeClassifier)
            .push(GroupInfoClassifier)
            .push(contact::contact_updated())
            .push(contact::contact_deleted())
            .push(contact::offline());
        chain
    }

    /// Append a classifier at the lowest priority.
    pub fn push(&mut self, classifier: impl Classifier + 'static) -> &mut Self {
        self.classifiers.push(Box::new(classifier));
        self
    }

    /// Insert a classifier ahead of the one named `anchor`. Returns `false`
    /// and appends it instead when no such classifier exists.
    pub fn insert_before(&mut self, anchor: &str, classifier: impl Classifier + 'static) -> bool {
        match self.classifiers.iter().position(|c| c.name() == anchor) {
            Some(idx) => {
                self.classifiers.insert(idx, Box::new(classifier));
                true
            },
            None => {
                self.classifiers.push(Box::new(classifier));
                false
            },
        }
    }

    /// Classifier names in priority order.
    pub fn names(&self) -> Vec<&'static str> {
        self.classifiers.iter().map(|c| c.name()).collect()
    }

    /// Variants the chain can produce, in priority order. `Unknown` is
    /// implicit.
    pub fn variants(&self) -> Vec<MessageVariant> {
        self.classifiers.iter().map(|c| c.variant()).collect()
    }

    pub fn len(&self) -> usize {
        self.classifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classifiers.is_empty()
    }

    /// Classify one envelope.
    ///
    /// Envelopes no classifier recognizes still yield an `UNKNOWN` record
    /// when their typename is one the gateway uses for messages and contact
    /// events; anything else is dropped.
    pub fn classify(&self, envelope: &Envelope) -> Option<MessageRecord> {
        let msg = Inbound::new(envelope);

        if let Some(classifier) = self.classifiers.iter().find(|c| c.matches(&msg)) {
            let variant = classifier.variant();
            trace!(classifier = classifier.name(), %variant, "envelope matched");
            let record = classifier.build(&msg);
            debug_assert_eq!(
                record.variant(),
                variant,
                "{} built the wrong variant",
                classifier.name()
            );
            return Some(record);
        }

        match envelope.typename() {
            Some(name) if typename::FALLBACK.contains(&name) => {
                debug!(typename = name, sub_type = ?envelope.sub_type(), "no classifier matched");
                Some(msg.record(MessageBody::Unknown))
            },
            other => {
                debug!(typename = ?other, "dropping unrecognized envelope");
                None
            },
        }
    }
}

impl Default for ClassifierChain {
    fn default() -> Self {
        Self::builtin()
    }
}
