//! Tolerant HTML tokenizer for the `text/html` extraction route.
//!
//! Real-world HTML is rarely well formed, so this is a forgiving scanner,
//! not a tree builder: it walks tags, comments, CDATA, and processing
//! instructions (including PHP blocks, which it drops), collapses
//! whitespace, decodes entities, and collects the handful of signals the
//! indexer cares about — body text, `<title>`, and the description /
//! keywords / author / robots `<meta>` tags.
//!
//! Charset discovery restarts parsing at most once: when a `<meta>`
//! declares a charset other than the one the document was decoded with,
//! [`HtmlParser::parse`] returns [`Parsed::CharsetChange`] and the caller
//! re-parses with the announced charset.

use crate::charset;

/// Outcome of one parse pass.
#[derive(Debug, PartialEq, Eq)]
pub enum Parsed {
    Done,
    /// The document announced a different charset; re-parse with it.
    CharsetChange(String),
}

/// Tag names that separate words in the extracted text.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "caption", "dd", "div", "dl", "dt",
    "fieldset", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "legend", "li", "main", "nav", "ol", "option", "p", "pre", "section", "select", "table",
    "tbody", "td", "textarea", "tfoot", "th", "thead", "tr", "ul",
];

#[derive(Debug, Default)]
pub struct HtmlParser {
    pub body: String,
    pub title: String,
    pub keywords: String,
    pub sample: String,
    pub author: String,
    /// Cleared by `<meta name=robots>` carrying `none` or `noindex`.
    pub indexing_allowed: bool,
    ignore_metarobots: bool,
    pending_space: bool,
}

impl HtmlParser {
    pub fn new() -> HtmlParser {
        HtmlParser {
            indexing_allowed: true,
            ..HtmlParser::default()
        }
    }

    /// Suppress `<meta name=robots>` handling for this parser.
    pub fn ignore_metarobots(&mut self) {
        self.ignore_metarobots = true;
    }

    /// Clear all extracted state ahead of a re-parse.
    pub fn reset(&mut self) {
        let ignore = self.ignore_metarobots;
        *self = HtmlParser::new();
        self.ignore_metarobots = ignore;
    }

    /// Scan `raw` decoded under `charset`.
    ///
    /// `charset_from_meta` marks a re-parse triggered by an in-document
    /// declaration; a second declaration then never restarts again.
    pub fn parse(&mut self, raw: &[u8], cs: &str, charset_from_meta: bool) -> Parsed {
        let text = charset::to_utf8(raw, cs);
        let chars: Vec<char> = text.chars().collect();
        let mut pos = 0usize;

        while pos < chars.len() {
            if chars[pos] == '&' {
                match decode_entity_at(&chars, pos) {
                    Some((ch, next)) => {
                        self.push_text_char(ch);
                        pos = next;
                    }
                    None => {
                        self.push_text_char('&');
                        pos += 1;
                    }
                }
                continue;
            }
            if chars[pos] != '<' {
                let ch = chars[pos];
                pos += 1;
                self.push_text_char(ch);
                continue;
            }

            // Comment?
            if starts_with_at(&chars, pos, "<!--") {
                pos = skip_until(&chars, pos + 4, "-->");
                continue;
            }
            // CDATA section: contents are literal text.
            if starts_with_at(&chars, pos, "<![CDATA[") {
                let end = find_at(&chars, pos + 9, "]]>").unwrap_or(chars.len());
                for &ch in &chars[pos + 9..end] {
                    self.push_text_char(ch);
                }
                pos = (end + 3).min(chars.len());
                continue;
            }
            // Processing instruction or PHP block.
            if starts_with_at(&chars, pos, "<?") {
                pos = skip_until(&chars, pos + 2, "?>");
                continue;
            }
            // Doctype or other declaration.
            if starts_with_at(&chars, pos, "<!") {
                pos = skip_past_char(&chars, pos + 2, '>');
                continue;
            }

            let (tag, attrs, closing, next) = match scan_tag(&chars, pos) {
                Some(parsed) => parsed,
                None => {
                    // A stray '<' that opens no tag is text.
                    self.push_text_char('<');
                    pos += 1;
                    continue;
                }
            };
            pos = next;

            if BLOCK_TAGS.binary_search(&tag.as_str()).is_ok() {
                self.pending_space = true;
            }

            if closing {
                continue;
            }

            match tag.as_str() {
                // Contents of script/style are never body text.
                "script" | "style" => {
                    pos = skip_element(&chars, pos, &tag);
                }
                "title" => {
                    let end_at = find_close_tag(&chars, pos, "title");
                    let raw_title: String = chars[pos..end_at.0].iter().collect();
                    self.title = collapse_whitespace(&decode_entities(&raw_title));
                    pos = end_at.1;
                }
                "meta" => {
                    if let Some(restart) = self.handle_meta(&attrs, cs, charset_from_meta) {
                        return restart;
                    }
                    if !self.indexing_allowed {
                        // No point scanning a document we may not index.
                        return Parsed::Done;
                    }
                }
                _ => {}
            }
        }
        Parsed::Done
    }

    fn handle_meta(
        &mut self,
        attrs: &[(String, String)],
        current_charset: &str,
        charset_from_meta: bool,
    ) -> Option<Parsed> {
        let get = |name: &str| {
            attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };

        if let Some(announced) = get("charset") {
            if !charset_from_meta && !charset_eq(announced, current_charset) {
                return Some(Parsed::CharsetChange(announced.to_string()));
            }
        }
        if let Some(equiv) = get("http-equiv") {
            if equiv.eq_ignore_ascii_case("content-type") {
                if let Some(content) = get("content") {
                    if let Some(announced) = charset_from_content_type(content) {
                        if !charset_from_meta && !charset_eq(&announced, current_charset) {
                            return Some(Parsed::CharsetChange(announced));
                        }
                    }
                }
            }
        }

        let name = get("name")?.to_ascii_lowercase();
        let content = get("content").unwrap_or("");
        match name.as_str() {
            "description" => {
                if self.sample.is_empty() {
                    self.sample = collapse_whitespace(&decode_entities(content));
                }
            }
            "keywords" => self.keywords = collapse_whitespace(&decode_entities(content)),
            "author" => self.author = collapse_whitespace(&decode_entities(content)),
            "robots" => {
                if !self.ignore_metarobots {
                    let value = content.to_ascii_lowercase();
                    if value
                        .split(|c: char| c == ',' || c.is_whitespace())
                        .any(|token| token == "none" || token == "noindex")
                    {
                        self.indexing_allowed = false;
                    }
                }
            }
            _ => {}
        }
        None
    }

    fn push_text_char(&mut self, ch: char) {
        if ch.is_whitespace() || ch == '\u{a0}' {
            self.pending_space = true;
            return;
        }
        if self.pending_space && !self.body.is_empty() {
            self.body.push(' ');
        }
        self.pending_space = false;
        self.body.push(ch);
    }
}

/// Decode the core named entities plus numeric references.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0usize;
    while pos < chars.len() {
        if chars[pos] == '&' {
            if let Some((ch, next)) = decode_entity_at(&chars, pos) {
                out.push(ch);
                pos = next;
                continue;
            }
        }
        out.push(chars[pos]);
        pos += 1;
    }
    out
}

/// Decode one entity reference starting at `pos` (which points at `&`).
/// Returns the character and the position past the `;`.
fn decode_entity_at(chars: &[char], pos: usize) -> Option<(char, usize)> {
    let semi = chars[pos + 1..]
        .iter()
        .take(10)
        .position(|&c| c == ';')
        .map(|offset| pos + 1 + offset)?;
    let entity: String = chars[pos + 1..semi].iter().collect();
    let decoded = match entity.as_str() {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                None
            }
        }
    };
    decoded.map(|ch| (ch, semi + 1))
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending = false;
    for ch in text.chars() {
        if ch.is_whitespace() || ch == '\u{a0}' {
            pending = !out.is_empty();
            continue;
        }
        if pending {
            out.push(' ');
            pending = false;
        }
        out.push(ch);
    }
    out
}

fn charset_eq(a: &str, b: &str) -> bool {
    normalize_charset(a) == normalize_charset(b)
}

fn normalize_charset(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Pull `charset=...` out of a Content-Type value.
fn charset_from_content_type(content: &str) -> Option<String> {
    let lower = content.to_ascii_lowercase();
    let at = lower.find("charset=")?;
    let rest = &content[at + "charset=".len()..];
    let value = rest
        .trim_start_matches(['"', '\''])
        .split(|c: char| c == ';' || c == '"' || c == '\'' || c.is_whitespace())
        .next()
        .unwrap_or("");
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse a tag starting at `pos` (which points at `<`). Returns the
/// lowercased name, attributes, whether it is a closing tag, and the
/// position just past the `>`.
#[allow(clippy::type_complexity)]
fn scan_tag(chars: &[char], pos: usize) -> Option<(String, Vec<(String, String)>, bool, usize)> {
    let mut cursor = pos + 1;
    let closing = matches!(chars.get(cursor), Some(&'/'));
    if closing {
        cursor += 1;
    }
    let name_start = cursor;
    while cursor < chars.len() && (chars[cursor].is_ascii_alphanumeric() || chars[cursor] == ':') {
        cursor += 1;
    }
    if cursor == name_start {
        return None;
    }
    let name: String = chars[name_start..cursor]
        .iter()
        .collect::<String>()
        .to_ascii_lowercase();

    let mut attrs = Vec::new();
    loop {
        while cursor < chars.len() && chars[cursor].is_whitespace() {
            cursor += 1;
        }
        match chars.get(cursor) {
            None => return Some((name, attrs, closing, cursor)),
            Some(&'>') => return Some((name, attrs, closing, cursor + 1)),
            Some(&'/') => {
                cursor += 1;
                continue;
            }
            _ => {}
        }
        let key_start = cursor;
        while cursor < chars.len()
            && !chars[cursor].is_whitespace()
            && !matches!(chars[cursor], '=' | '>' | '/')
        {
            cursor += 1;
        }
        if cursor == key_start {
            cursor += 1;
            continue;
        }
        let key: String = chars[key_start..cursor]
            .iter()
            .collect::<String>()
            .to_ascii_lowercase();
        while cursor < chars.len() && chars[cursor].is_whitespace() {
            cursor += 1;
        }
        let mut value = String::new();
        if matches!(chars.get(cursor), Some(&'=')) {
            cursor += 1;
            while cursor < chars.len() && chars[cursor].is_whitespace() {
                cursor += 1;
            }
            match chars.get(cursor) {
                Some(&quote) if quote == '"' || quote == '\'' => {
                    cursor += 1;
                    let value_start = cursor;
                    while cursor < chars.len() && chars[cursor] != quote {
                        cursor += 1;
                    }
                    value = chars[value_start..cursor].iter().collect();
                    cursor = (cursor + 1).min(chars.len());
                }
                _ => {
                    let value_start = cursor;
                    while cursor < chars.len()
                        && !chars[cursor].is_whitespace()
                        && chars[cursor] != '>'
                    {
                        cursor += 1;
                    }
                    value = chars[value_start..cursor].iter().collect();
                }
            }
        }
        attrs.push((key, value));
    }
}

/// Skip the contents and close tag of a raw-text element (script/style).
fn skip_element(chars: &[char], pos: usize, tag: &str) -> usize {
    find_close_tag(chars, pos, tag).1
}

/// Find the matching `</tag`, case-insensitively. Returns (content end,
/// position past the close tag); an unclosed element runs to the end.
fn find_close_tag(chars: &[char], pos: usize, tag: &str) -> (usize, usize) {
    let needle: Vec<char> = format!("</{}", tag).chars().collect();
    let mut cursor = pos;
    while cursor + needle.len() <= chars.len() {
        let matches = chars[cursor..cursor + needle.len()]
            .iter()
            .zip(&needle)
            .all(|(&a, &b)| a.to_ascii_lowercase() == b);
        if matches {
            let past = skip_past_char(chars, cursor + needle.len(), '>');
            return (cursor, past);
        }
        cursor += 1;
    }
    (chars.len(), chars.len())
}

fn starts_with_at(chars: &[char], pos: usize, needle: &str) -> bool {
    let needle: Vec<char> = needle.chars().collect();
    chars.len() >= pos + needle.len()
        && chars[pos..pos + needle.len()]
            .iter()
            .zip(&needle)
            .all(|(&a, &b)| a == b)
}

fn find_at(chars: &[char], pos: usize, needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() || chars.len() < needle.len() {
        return None;
    }
    (pos..=chars.len() - needle.len()).find(|&at| {
        chars[at..at + needle.len()]
            .iter()
            .zip(&needle)
            .all(|(&a, &b)| a == b)
    })
}

fn skip_until(chars: &[char], pos: usize, needle: &str) -> usize {
    match find_at(chars, pos, needle) {
        Some(at) => at + needle.chars().count(),
        None => chars.len(),
    }
}

fn skip_past_char(chars: &[char], pos: usize, needle: char) -> usize {
    let mut cursor = pos;
    while cursor < chars.len() && chars[cursor] != needle {
        cursor += 1;
    }
    (cursor + 1).min(chars.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> HtmlParser {
        let mut parser = HtmlParser::new();
        let outcome = parser.parse(html.as_bytes(), "utf-8", false);
        assert_eq!(outcome, Parsed::Done);
        parser
    }

    #[test]
    fn extracts_title_and_body() {
        let p = parse("<html><head><title>My  Page</title></head><body>Hello <b>world</b></body>");
        assert_eq!(p.title, "My Page");
        assert_eq!(p.body, "Hello world");
    }

    #[test]
    fn script_and_style_are_dropped() {
        let p = parse("<body>a<script>var x = '<b>';</script>b<style>p{}</style>c</body>");
        assert_eq!(p.body, "abc");
    }

    #[test]
    fn meta_fields_are_collected() {
        let p = parse(
            "<meta name=description content=\"A sample\">\
             <meta name=\"keywords\" content=\"one, two\">\
             <meta name=author content=Alice>body",
        );
        assert_eq!(p.sample, "A sample");
        assert_eq!(p.keywords, "one, two");
        assert_eq!(p.author, "Alice");
    }

    #[test]
    fn robots_none_blocks_indexing() {
        let p = parse("<meta name=robots content=none><p>text</p>");
        assert!(!p.indexing_allowed);

        let mut parser = HtmlParser::new();
        parser.ignore_metarobots();
        parser.parse(
            b"<meta name=robots content=noindex><p>text</p>",
            "utf-8",
            false,
        );
        assert!(parser.indexing_allowed);
        assert_eq!(parser.body, "text");
    }

    #[test]
    fn robots_nofollow_alone_still_indexes() {
        let p = parse("<meta name=robots content=nofollow>text");
        assert!(p.indexing_allowed);
    }

    #[test]
    fn charset_meta_triggers_one_restart() {
        let mut parser = HtmlParser::new();
        let html = b"<meta charset=utf-8>caf\xc3\xa9";
        match parser.parse(html, "iso-8859-1", false) {
            Parsed::CharsetChange(cs) => assert_eq!(cs, "utf-8"),
            other => panic!("expected charset change, got {:?}", other),
        }
        parser.reset();
        assert_eq!(parser.parse(html, "utf-8", true), Parsed::Done);
        assert_eq!(parser.body, "café");
    }

    #[test]
    fn http_equiv_content_type_charset() {
        let mut parser = HtmlParser::new();
        let html = b"<meta http-equiv=\"Content-Type\" \
                     content=\"text/html; charset=UTF-8\">x";
        match parser.parse(html, "iso-8859-1", false) {
            Parsed::CharsetChange(cs) => assert_eq!(cs, "UTF-8"),
            other => panic!("expected charset change, got {:?}", other),
        }
    }

    #[test]
    fn comments_and_php_are_skipped() {
        let p = parse("a<!-- hidden <b> -->b<?php echo 'no'; ?>c");
        assert_eq!(p.body, "abc");
    }

    #[test]
    fn entities_decode_in_text_slices() {
        assert_eq!(decode_entities("a &amp; b &#65; &#x42; &unknown; &"), "a & b A B &unknown; &");
    }

    #[test]
    fn block_tags_separate_words() {
        let p = parse("<p>one</p><p>two</p>three<br>four");
        assert_eq!(p.body, "one two three four");
    }

    #[test]
    fn default_latin1_decoding() {
        let mut parser = HtmlParser::new();
        parser.parse(b"caf\xe9", "iso-8859-1", false);
        assert_eq!(parser.body, "café");
    }
}
