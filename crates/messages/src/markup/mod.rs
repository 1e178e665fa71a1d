//! Best-effort parsing of the rich-content markup embedded in message
//! content.
//!
//! Parsing never fails loudly: malformed or truncated documents yield `None`
//! and callers fall back to default field values. The parser keeps no state
//! between calls, so parsing the same string twice gives equal trees.

pub mod extract;

use std::collections::BTreeMap;

use quick_xml::{
    events::{BytesStart, Event},
    reader::Reader,
};

/// One element of a parsed markup document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupNode {
    pub name: String,
    pub attrs: BTreeMap<String, String>,
    /// Concatenated text and CDATA directly inside this element.
    pub text: String,
    pub children: Vec<MarkupNode>,
}

impl MarkupNode {
    /// Parse the markup document inside `content`.
    ///
    /// `content` may carry a `sender:` prefix ahead of the document, as group
    /// messages do; the prefix is skipped before the root is located.
    #[must_use]
    pub fn parse(content: &str) -> Option<Self> {
        parse_document(locate_root(content)?)
    }

    pub fn child(&self, name: &str) -> Option<&MarkupNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MarkupNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a `/`-separated path of child names below this node.
    pub fn find(&self, path: &str) -> Option<&MarkupNode> {
        path.split('/')
            .filter(|seg| !seg.is_empty())
            .try_fold(self, |node, seg| node.child(seg))
    }

    /// Depth-first search for the first element called `name`, including
    /// this node itself.
    pub fn descendant(&self, name: &str) -> Option<&MarkupNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.descendant(name))
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Trimmed text of the element at `path`, or `""`.
    pub fn text_at(&self, path: &str) -> &str {
        self.find(path).map_or("", |n| n.text.trim())
    }

    /// Attribute `key` of the element at `path`, or `""`.
    pub fn attr_at(&self, path: &str, key: &str) -> &str {
        self.find(path).and_then(|n| n.attr(key)).unwrap_or("")
    }

    /// Text at `path` parsed as an integer.
    pub fn int_at(&self, path: &str) -> Option<i64> {
        self.text_at(path).parse().ok()
    }
}

/// Find where the markup document starts inside `content`.
///
/// Group messages are wrapped as `sender-id:\n<msg>...`; when the text
/// before the first colon holds no markup, everything up to that colon is an
/// outer wrapper and is skipped. Returns `None` when no element follows.
pub fn locate_root(content: &str) -> Option<&str> {
    let body = match content.split_once(':') {
        Some((head, tail)) if !head.contains('<') && tail.trim_start().starts_with('<') => tail,
        _ => content,
    };
    let start = body.find('<')?;
    Some(body[start..].trim_end())
}

fn parse_document(doc: &str) -> Option<MarkupNode> {
    let mut reader = Reader::from_str(doc);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<MarkupNode> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(open_element(&e)),
            Ok(Event::Empty(e)) => {
                let node = open_element(&e);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Some(node),
                }
            },
            Ok(Event::End(_)) => {
                let node = stack.pop()?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Some(node),
                }
            },
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    top.text.push_str(&text);
                }
            },
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            },
            // Root never closed, or the document is not markup at all.
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {},
        }
    }
}

fn open_element(e: &BytesStart<'_>) -> MarkupNode {
    let attrs = e
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            (key, value)
        })
        .collect();
    MarkupNode {
        name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        attrs,
        ..MarkupNode::default()
    }
}
