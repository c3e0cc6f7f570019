use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{ErrorKind, ExtractError, ExtractResult};
use crate::{bail, extract_error};

/// One decoded XML element with namespace prefixes stripped from element and
/// attribute names.
///
/// The remote service varies the namespace prefix between deployments (the
/// same field arrives as `ns4:BID` on one server and `BID` on another), so
/// all lookups go through the local name only.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    /// Parses an XML document and returns its root element.
    pub fn parse(xml: &str) -> ExtractResult<Element> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    stack.push(Element::from_start(&start)?);
                }
                Event::Empty(start) => {
                    let element = Element::from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        extract_error!(ErrorKind::MalformedEnvelope, "unbalanced closing tag")
                    })?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions and doctypes
                // carry no protocol data.
                _ => {}
            }
        }

        if !stack.is_empty() {
            bail!(ErrorKind::MalformedEnvelope, "unterminated element in response");
        }

        root.ok_or_else(|| {
            extract_error!(ErrorKind::MalformedEnvelope, "response contained no root element")
        })
    }

    fn from_start(start: &BytesStart<'_>) -> ExtractResult<Element> {
        let name = local_name(&String::from_utf8_lossy(start.name().as_ref()));
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|err| {
                extract_error!(
                    ErrorKind::MalformedEnvelope,
                    "invalid attribute in response",
                    err
                )
            })?;
            let key = local_name(&String::from_utf8_lossy(attribute.key.as_ref()));
            let value = attribute.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Element {
            name,
            attributes,
            text: String::new(),
            children: Vec::new(),
        })
    }

    /// The element's local name, without any namespace prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The element's direct character data, surrounding whitespace trimmed.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Looks up an attribute by local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// Returns the first direct child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Like [`Element::child`], but a missing child is a protocol error.
    pub fn required_child(&self, name: &str) -> ExtractResult<&Element> {
        self.child(name).ok_or_else(|| {
            ExtractError::from((
                ErrorKind::MissingProtocolField,
                "response field missing",
                Cow::Owned(format!("expected <{name}> inside <{}>", self.name)),
            ))
        })
    }

    /// Iterates over all direct children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == name)
    }
}

fn attach(
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
    element: Element,
) -> ExtractResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_some() {
                bail!(ErrorKind::MalformedEnvelope, "response contained multiple root elements");
            }
            *root = Some(element);
        }
    }
    Ok(())
}

fn local_name(raw: &str) -> String {
    match raw.rsplit(':').next() {
        Some(local) => local.to_string(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_by_local_name() {
        let root = Element::parse(
            r#"<?xml version="1.0"?>
            <SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
              <SOAP-ENV:Body>
                <ns4:GetChangedBibsResponse>
                  <ns4:UpdatedBibs><ns4:BID> 12345 </ns4:BID><ns4:BID>678</ns4:BID></ns4:UpdatedBibs>
                </ns4:GetChangedBibsResponse>
              </SOAP-ENV:Body>
            </SOAP-ENV:Envelope>"#,
        )
        .unwrap();

        assert_eq!(root.name(), "Envelope");
        let updated = root
            .required_child("Body")
            .unwrap()
            .required_child("GetChangedBibsResponse")
            .unwrap()
            .required_child("UpdatedBibs")
            .unwrap();
        let ids: Vec<&str> = updated.children_named("BID").map(Element::text).collect();
        assert_eq!(ids, vec!["12345", "678"]);
    }

    #[test]
    fn attributes_lose_their_namespace_prefix() {
        let root =
            Element::parse(r#"<ns4:dataField ns4:tag="245" ind1=" ">x</ns4:dataField>"#).unwrap();
        assert_eq!(root.attr("tag"), Some("245"));
        assert_eq!(root.attr("ind1"), Some(" "));
        assert_eq!(root.attr("missing"), None);
    }

    #[test]
    fn missing_required_child_is_a_protocol_error() {
        let root = Element::parse("<Response><Other/></Response>").unwrap();
        let err = root.required_child("ResponseStatuses").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingProtocolField);
    }

    #[test]
    fn unbalanced_document_is_rejected() {
        let err = Element::parse("<a><b></b>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedEnvelope);
    }

    #[test]
    fn whitespace_only_text_reads_as_empty() {
        let root = Element::parse("<a>\n  \n</a>").unwrap();
        assert_eq!(root.text(), "");
    }
}
