//! XML extraction helpers for the container document families.
//!
//! All four parsers are event-streaming over `quick_xml` and tolerant of
//! sloppy input: extraction wants the character data, not a validated
//! tree.
//!
//! - [`xml_to_text`] — character data of every element, space separated
//!   (OpenDocument `content.xml`, OOXML part streams, AbiWord).
//! - [`MetaXmlParser`] — Dublin-Core-style document metadata
//!   (OpenDocument `meta.xml`, OOXML `docProps/core.xml`).
//! - [`SvgParser`] — text, title, description, and creator of an SVG.
//! - [`xps_to_text`] — `UnicodeString` attributes of `<Glyphs>` elements,
//!   tolerant of several concatenated page documents in one buffer.

use quick_xml::events::Event;
use quick_xml::Reader;

/// Extract all character data, separating element boundaries with spaces.
pub fn xml_to_text(xml: &[u8]) -> String {
    let mut out = String::new();
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(text)) => {
                let text = text.unescape().unwrap_or_default();
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(trimmed);
                }
            }
            Ok(Event::Eof) => break,
            // Tolerate malformed input: keep whatever text was gathered.
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    out
}

/// Document metadata pulled from an ODF `meta.xml` or OOXML `core.xml`.
#[derive(Debug, Default)]
pub struct MetaXmlParser {
    pub title: String,
    pub author: String,
    pub keywords: String,
    pub sample: String,
}

impl MetaXmlParser {
    pub fn parse(xml: &[u8]) -> MetaXmlParser {
        let mut meta = MetaXmlParser::default();
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        // Local name of the element whose text we are inside.
        let mut current: Option<Vec<u8>> = None;
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    current = Some(e.local_name().as_ref().to_vec());
                }
                Ok(Event::End(_)) => {
                    current = None;
                }
                Ok(Event::Text(text)) => {
                    let Some(element) = current.as_deref() else {
                        buf.clear();
                        continue;
                    };
                    let value = text.unescape().unwrap_or_default();
                    let value = value.trim();
                    if value.is_empty() {
                        buf.clear();
                        continue;
                    }
                    match element {
                        b"title" => meta.title.push_str(value),
                        b"creator" | b"initial-creator" => {
                            if meta.author.is_empty() {
                                meta.author.push_str(value);
                            }
                        }
                        b"keyword" | b"keywords" | b"subject" => {
                            if !meta.keywords.is_empty() {
                                meta.keywords.push(' ');
                            }
                            meta.keywords.push_str(value);
                        }
                        b"description" => meta.sample.push_str(value),
                        _ => {}
                    }
                }
                Ok(Event::Eof) | Err(_) => break,
                _ => {}
            }
            buf.clear();
        }
        meta
    }
}

/// Text and metadata of an SVG image.
#[derive(Debug, Default)]
pub struct SvgParser {
    pub body: String,
    pub title: String,
    pub keywords: String,
    pub author: String,
}

impl SvgParser {
    pub fn parse(xml: &[u8]) -> SvgParser {
        let mut svg = SvgParser::default();
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut stack: Vec<Vec<u8>> = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    stack.push(e.local_name().as_ref().to_vec());
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Text(text)) => {
                    let value = text.unescape().unwrap_or_default();
                    let value = value.trim();
                    if value.is_empty() {
                        buf.clear();
                        continue;
                    }
                    let element = stack.last().map(Vec::as_slice).unwrap_or(b"");
                    let target = match element {
                        b"text" | b"tspan" | b"textPath" => Some(&mut svg.body),
                        b"title" => Some(&mut svg.title),
                        b"desc" => Some(&mut svg.keywords),
                        b"creator" => Some(&mut svg.author),
                        _ => None,
                    };
                    if let Some(target) = target {
                        if !target.is_empty() {
                            target.push(' ');
                        }
                        target.push_str(value);
                    }
                }
                Ok(Event::Eof) | Err(_) => break,
                _ => {}
            }
            buf.clear();
        }
        svg
    }
}

/// Extract the `UnicodeString` attribute of every `<Glyphs>` element in an
/// XPS fixed-page stream.
pub fn xps_to_text(xml: &[u8]) -> String {
    let mut out = String::new();
    // Offset of the slice the current reader was built over; errors resume
    // one byte past the failure so concatenated page documents don't stop
    // extraction.
    let mut base = 0usize;
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"Glyphs" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"UnicodeString" {
                            if let Ok(value) = attr.unescape_value() {
                                let value = value.trim();
                                if !value.is_empty() {
                                    if !out.is_empty() {
                                        out.push(' ');
                                    }
                                    out.push_str(value);
                                }
                            }
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => {
                let resume = base + reader.buffer_position() as usize + 1;
                if resume >= xml.len() {
                    break;
                }
                base = resume;
                reader = Reader::from_reader(&xml[resume..]);
                reader.config_mut().trim_text(true);
            }
            _ => {}
        }
        buf.clear();
    }
    out
}
