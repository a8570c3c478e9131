//! Minimal element tree over `quick_xml::Reader`.
//!
//! Feeds mix namespaces freely (`dc:`, `media:`, `yt:`, `atom:`), so names are
//! kept as local names and adapters look children up by local name.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ParseError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed text, `None` when blank.
    pub fn text(&self) -> Option<&str> {
        let t = self.text.trim();
        (!t.is_empty()).then_some(t)
    }

    /// First child called `name` with non-blank text.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.children
            .iter()
            .filter(|c| c.name == name)
            .find_map(XmlNode::text)
    }
}

fn local(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn open(e: &BytesStart<'_>) -> Result<XmlNode, ParseError> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ParseError::new("xml attribute", err))?;
        let key = local(attr.key.local_name().as_ref());
        let value = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
        attrs.push((key, value));
    }
    Ok(XmlNode {
        name: local(e.local_name().as_ref()),
        attrs,
        ..XmlNode::default()
    })
}

/// Parse a whole document and return its root element.
pub(crate) fn parse_document(input: &str) -> Result<XmlNode, ParseError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(open(&e)?),
            Ok(Event::Empty(e)) => {
                let node = open(&e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(cur) = stack.last_mut() {
                    // Unknown HTML entities are left as-is for normalize_text.
                    let s = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    cur.text.push_str(&s);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(cur) = stack.last_mut() {
                    cur.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| ParseError::new("xml", "unbalanced end tag"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ParseError::new(
                    "xml",
                    format!("at byte {}: {e}", reader.buffer_position()),
                ))
            }
        }
    }

    if !stack.is_empty() {
        return Err(ParseError::new("xml", "document ended inside an element"));
    }
    root.ok_or_else(|| ParseError::new("xml", "empty document"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_local_names_attributes_and_cdata() {
        let doc = r#"<?xml version="1.0"?>
            <rss xmlns:dc="http://purl.org/dc/elements/1.1/">
              <item><dc:creator>Ann</dc:creator><description><![CDATA[<b>x</b>]]></description>
              <enclosure url="https://cdn.test/a.mp3" length="1"/></item>
            </rss>"#;
        let root = parse_document(doc).unwrap();
        assert_eq!(root.name, "rss");
        let item = root.child("item").unwrap();
        assert_eq!(item.child_text("creator"), Some("Ann"));
        assert_eq!(item.child_text("description"), Some("<b>x</b>"));
        assert_eq!(
            item.child("enclosure").and_then(|e| e.attr("url")),
            Some("https://cdn.test/a.mp3")
        );
    }

    #[test]
    fn truncated_document_is_an_error() {
        assert!(parse_document("<rss><channel><item>").is_err());
        assert!(parse_document("").is_err());
    }
}
