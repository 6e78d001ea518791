//! MIME-dispatched text extraction for indexing.
//!
//! Given a filename (and optionally an explicit type), [`Extractor::convert`]
//! resolves a canonical MIME type, routes it to a handler — an external
//! filter command or a built-in parser — normalizes the result to UTF-8,
//! and fills a [`Fields`] record with body, metadata, a bounded sample,
//! the command actually executed, and an MD5 of the source file.
//!
//! Routing is two tables: extension → MIME (with an `ignore` sentinel) and
//! MIME → command template. A MIME whose filter turns out not to be
//! installed gets an empty template cached in the command table, so later
//! files of that type short-circuit to [`Status::FilterMissing`] without
//! spawning anything. The cache is per-extractor state, not global.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};
use tracing::debug;

use crate::charset;
use crate::error::SubprocessError;
use crate::htmlparse::{HtmlParser, Parsed};
use crate::mimemap;
use crate::quote::shell_protect;
use crate::runfilter::stdout_to_bytes;
use crate::xmlparse;

/// Default bound on the generated sample, in bytes.
pub const DEFAULT_SAMPLE_SIZE: usize = 512;

/// Result of one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Conversion succeeded.
    Ok,
    /// Extension or MIME type not known.
    UnknownType,
    /// Type is marked as not worth converting.
    Ignored,
    /// Indexing disallowed by a meta robots tag.
    BlockedByMeta,
    /// Filename cannot be safely passed to a shell.
    BadFilename,
    /// External filter for this type is not installed.
    FilterMissing,
    /// A command or file read failed.
    CommandFailed,
    /// MD5 of the source file could not be computed.
    HashFailed,
    /// No temporary directory available for staging.
    TmpdirUnavailable,
}

/// Conversion output record. All fields are UTF-8 after normalization.
#[derive(Debug, Default, Clone)]
pub struct Fields {
    pub body: String,
    pub title: String,
    pub author: String,
    pub keywords: String,
    pub sample: String,
    pub mime_type: String,
    /// The command line actually executed, or the quoter's complaint on
    /// [`Status::BadFilename`].
    pub command: String,
    /// Lowercase hex MD5 of the original file bytes.
    pub md5: String,
}

enum ConvertError {
    Filter(SubprocessError),
    Read,
    Blocked,
    Tmpdir,
    BadFilename(String),
    UnknownType,
}

impl From<SubprocessError> for ConvertError {
    fn from(e: SubprocessError) -> ConvertError {
        ConvertError::Filter(e)
    }
}

/// Converts common-format files to indexable text.
pub struct Extractor {
    mime_map: HashMap<String, String>,
    commands: HashMap<String, String>,
    ignore_exclusions: bool,
    sample_size: usize,
    pkglib_bin_dir: String,
    tmpdir: Option<tempfile::TempDir>,
}

impl Default for Extractor {
    fn default() -> Extractor {
        Extractor {
            mime_map: mimemap::default_mime_map(),
            commands: mimemap::default_commands(),
            ignore_exclusions: false,
            sample_size: DEFAULT_SAMPLE_SIZE,
            pkglib_bin_dir: "/usr/lib/index-harness/bin".to_string(),
            tmpdir: None,
        }
    }
}

impl Extractor {
    pub fn new() -> Extractor {
        Extractor::default()
    }

    /// Suppress meta-robots exclusions for HTML documents.
    pub fn set_ignore_exclusions(&mut self, ignore: bool) {
        self.ignore_exclusions = ignore;
    }

    pub fn set_sample_size(&mut self, size: usize) {
        self.sample_size = size;
    }

    /// Directory holding helper binaries shipped with the indexer.
    pub fn set_pkglib_bin_dir(&mut self, dir: impl Into<String>) {
        self.pkglib_bin_dir = dir.into();
    }

    /// Associate a filename extension with a MIME type.
    pub fn set_mimetype(&mut self, ext: &str, mime: &str) {
        self.mime_map.insert(ext.to_string(), mime.to_string());
    }

    /// Set the external command template for a MIME type.
    pub fn set_command(&mut self, mime: &str, template: &str) {
        self.commands.insert(mime.to_string(), template.to_string());
    }

    /// The command template currently registered for `mime`. An empty
    /// template records a filter known to be missing.
    pub fn command_for(&self, mime: &str) -> Option<&str> {
        self.commands.get(mime).map(String::as_str)
    }

    /// Extract `fields` from the file at `filepath`.
    ///
    /// `type_hint` may be a MIME type, an extension with a leading dot, or
    /// `None` to take the hint from the filename's extension.
    pub fn convert(
        &mut self,
        filepath: &str,
        type_hint: Option<&str>,
        fields: &mut Fields,
    ) -> Status {
        *fields = Fields::default();

        let hint = match type_hint {
            Some(hint) => hint,
            None => match filepath.rfind('.') {
                Some(dot) => &filepath[dot..],
                None => return Status::UnknownType,
            },
        };
        fields.mime_type = hint
            .strip_prefix('.')
            .unwrap_or(hint)
            .to_ascii_lowercase();
        if hint.starts_with('.') {
            match self.mime_map.get(&fields.mime_type) {
                Some(mime) => fields.mime_type = mime.clone(),
                None => return Status::UnknownType,
            }
        }
        if fields.mime_type == mimemap::IGNORE {
            return Status::Ignored;
        }

        match self.dispatch(filepath, fields) {
            Ok(()) => {}
            Err(ConvertError::Filter(SubprocessError::Missing)) => {
                debug!(mime = %fields.mime_type, "filter missing, caching");
                self.commands.insert(fields.mime_type.clone(), String::new());
                return Status::FilterMissing;
            }
            Err(ConvertError::Filter(_)) | Err(ConvertError::Read) => {
                return Status::CommandFailed
            }
            Err(ConvertError::Blocked) => return Status::BlockedByMeta,
            Err(ConvertError::Tmpdir) => return Status::TmpdirUnavailable,
            Err(ConvertError::BadFilename(message)) => {
                fields.command = message;
                return Status::BadFilename;
            }
            Err(ConvertError::UnknownType) => return Status::UnknownType,
        }

        if fields.md5.is_empty() {
            match md5_file(filepath) {
                Ok(digest) => fields.md5 = digest,
                Err(_) => return Status::HashFailed,
            }
        }
        Status::Ok
    }

    fn dispatch(&mut self, file: &str, out: &mut Fields) -> Result<(), ConvertError> {
        let mime = out.mime_type.clone();

        // External-command route first; an empty cached template means the
        // filter is already known to be missing.
        if let Some(template) = self.commands.get(&mime) {
            if template.is_empty() {
                return Err(ConvertError::Filter(SubprocessError::Missing));
            }
            out.command = format!("{}{}", template, quote(file)?);
            out.body = String::from_utf8_lossy(&stdout_to_bytes(&out.command)?).into_owned();
            return Ok(());
        }

        match mime.as_str() {
            "text/html" => {
                let raw = read_file(file)?;
                self.parse_html(&raw, false, out)?;
                out.md5 = md5_bytes(&raw);
            }
            "text/plain" => {
                let raw = read_file(file)?;
                out.md5 = md5_bytes(&raw);
                out.body = charset::normalize_text(&raw);
            }
            "text/csv" => {
                let raw = read_file(file)?;
                out.md5 = md5_bytes(&raw);
                out.body = charset::normalize_text(&raw);
                out.sample = generate_sample_from_csv(&out.body, self.sample_size);
            }
            "application/pdf" => {
                let safefile = quote(file)?;
                out.command = format!("pdftotext -enc UTF-8 {} -", safefile);
                out.body = String::from_utf8_lossy(&stdout_to_bytes(&out.command)?).into_owned();
                get_pdf_metainfo(&safefile, out)?;
            }
            "application/postscript" => {
                // No Unicode-capable PostScript-to-text converter exists;
                // go via PDF, which also yields the metadata pass.
                self.convert_postscript(file, out)?;
            }
            _ if mime.starts_with("application/vnd.sun.xml.")
                || mime.starts_with("application/vnd.oasis.opendocument.") =>
            {
                let safefile = quote(file)?;
                out.command = format!("unzip -p {} content.xml styles.xml", safefile);
                out.body = xmlparse::xml_to_text(&stdout_to_bytes(&out.command)?);
                out.command = format!("unzip -p {} meta.xml", safefile);
                let cmd = out.command.clone();
                apply_metadata_xml(&cmd, out)?;
            }
            "application/vnd.ms-excel" => {
                out.command = format!("xls2csv -c' ' -q0 -dutf-8 {}", quote(file)?);
                out.body = String::from_utf8_lossy(&stdout_to_bytes(&out.command)?).into_owned();
            }
            _ if mime.starts_with("application/vnd.openxmlformats-officedocument.") => {
                let tail = &mime["application/vnd.openxmlformats-officedocument.".len()..];
                // unzip exits 11 when a listed member is absent, which is
                // fine: a document may have no headers, notes, or comments.
                let args = if tail.starts_with("wordprocessingml.") {
                    " word/document.xml word/header\\*.xml word/footer\\*.xml 2>/dev/null||test $? = 11"
                } else if tail.starts_with("spreadsheetml.") {
                    " xl/sharedStrings.xml"
                } else if tail.starts_with("presentationml.") {
                    " ppt/slides/slide\\*.xml ppt/notesSlides/notesSlide\\*.xml ppt/comments/comment\\*.xml 2>/dev/null||test $? = 11"
                } else {
                    return Err(ConvertError::UnknownType);
                };
                let safefile = quote(file)?;
                out.command = format!("unzip -p {}{}", safefile, args);
                out.body = xmlparse::xml_to_text(&stdout_to_bytes(&out.command)?);
                out.command = format!("unzip -p {} docProps/core.xml", safefile);
                let cmd = out.command.clone();
                apply_metadata_xml(&cmd, out)?;
            }
            "application/x-abiword" => {
                let raw = read_file(file)?;
                out.body = xmlparse::xml_to_text(&raw);
                out.md5 = md5_bytes(&raw);
            }
            "application/x-abiword-compressed" => {
                out.command = format!("gzip -dc {}", quote(file)?);
                out.body = xmlparse::xml_to_text(&stdout_to_bytes(&out.command)?);
            }
            "text/rtf" => {
                // --text turns every non-ASCII character into '?', so take
                // the HTML output and feed it through the HTML parser.
                out.command = format!("unrtf --nopict --html 2>/dev/null {}", quote(file)?);
                let html = stdout_to_bytes(&out.command)?;
                let mut parser = HtmlParser::new();
                parser.ignore_metarobots();
                parser.parse(&html, "iso-8859-1", true);
                out.body = std::mem::take(&mut parser.body);
                out.title = std::mem::take(&mut parser.title);
                out.keywords = std::mem::take(&mut parser.keywords);
                out.sample = std::mem::take(&mut parser.sample);
            }
            "text/x-perl" => {
                // pod2text's output charset is undocumented; it reads as
                // iso-8859-1 in practice.
                out.command = format!("pod2text {}", quote(file)?);
                out.body = charset::latin1_to_utf8(&stdout_to_bytes(&out.command)?);
            }
            "application/x-dvi" => {
                out.command = format!("catdvi -e2 -s {}", quote(file)?);
                out.body = charset::latin1_to_utf8(&stdout_to_bytes(&out.command)?);
            }
            "application/vnd.ms-xpsdocument" => {
                out.command = format!("unzip -p {} Documents/1/Pages/\\*.fpage", quote(file)?);
                let pages = stdout_to_bytes(&out.command)?;
                let text = if pages.starts_with(b"\xfe\xff") || pages.starts_with(b"\xff\xfe") {
                    charset::utf16_to_utf8(&pages)
                } else {
                    String::from_utf8_lossy(&pages).into_owned()
                };
                out.body = xmlparse::xps_to_text(text.as_bytes());
            }
            "application/vnd.ms-outlook" => {
                out.command = format!("{}/outlookmsg2html {}", self.pkglib_bin_dir, quote(file)?);
                let html = stdout_to_bytes(&out.command)?;
                self.parse_html(&html, true, out)?;
            }
            "image/svg+xml" => {
                let raw = read_file(file)?;
                let svg = xmlparse::SvgParser::parse(&raw);
                out.body = svg.body;
                out.title = svg.title;
                out.keywords = svg.keywords;
                out.author = svg.author;
            }
            "application/x-debian-package" => {
                out.command = format!("dpkg-deb -f {} Description", quote(file)?);
                let desc = String::from_utf8_lossy(&stdout_to_bytes(&out.command)?).into_owned();
                split_title_body(&desc, out);
            }
            "application/x-redhat-package-manager" => {
                out.command = format!(
                    "rpm -q --qf '%{{SUMMARY}}\\n%{{DESCRIPTION}}' -p {}",
                    quote(file)?
                );
                let desc = String::from_utf8_lossy(&stdout_to_bytes(&out.command)?).into_owned();
                split_title_body(&desc, out);
            }
            _ => return Err(ConvertError::UnknownType),
        }
        Ok(())
    }

    /// The HTML route: default charset iso-8859-1, one restart on an
    /// in-document charset declaration, meta-robots honoured unless
    /// suppressed (or unless the input came from a filter, which never
    /// carries real robots directives).
    fn parse_html(
        &self,
        raw: &[u8],
        force_ignore_robots: bool,
        out: &mut Fields,
    ) -> Result<(), ConvertError> {
        let mut parser = HtmlParser::new();
        if self.ignore_exclusions || force_ignore_robots {
            parser.ignore_metarobots();
        }
        if let Parsed::CharsetChange(announced) = parser.parse(raw, "iso-8859-1", false) {
            parser.reset();
            parser.parse(raw, &announced, true);
        }
        if !parser.indexing_allowed {
            return Err(ConvertError::Blocked);
        }
        out.body = std::mem::take(&mut parser.body);
        out.title = std::mem::take(&mut parser.title);
        out.keywords = std::mem::take(&mut parser.keywords);
        out.sample = std::mem::take(&mut parser.sample);
        out.author = std::mem::take(&mut parser.author);
        Ok(())
    }

    fn convert_postscript(&mut self, file: &str, out: &mut Fields) -> Result<(), ConvertError> {
        let staging = self.staging_dir()?;
        let tmp_pdf = staging.join("tmp.pdf");
        let tmp_str = tmp_pdf.to_str().ok_or(ConvertError::Tmpdir)?.to_string();
        let safetmp = quote(&tmp_str)?;

        out.command = format!("ps2pdf {} {}", quote(file)?, safetmp);
        let result = (|| -> Result<(), ConvertError> {
            stdout_to_bytes(&out.command)?;
            out.command = format!("pdftotext -enc UTF-8 {} -", safetmp);
            out.body = String::from_utf8_lossy(&stdout_to_bytes(&out.command)?).into_owned();
            get_pdf_metainfo(&safetmp, out)?;
            Ok(())
        })();
        // The staged PDF goes away on success and failure alike.
        let _ = std::fs::remove_file(&tmp_pdf);
        result
    }

    /// Per-extractor staging directory, created on first use.
    fn staging_dir(&mut self) -> Result<&Path, ConvertError> {
        if self.tmpdir.is_none() {
            match tempfile::tempdir() {
                Ok(dir) => self.tmpdir = Some(dir),
                Err(_) => return Err(ConvertError::Tmpdir),
            }
        }
        Ok(self.tmpdir.as_ref().unwrap().path())
    }
}

fn quote(file: &str) -> Result<String, ConvertError> {
    shell_protect(file).map_err(|e| ConvertError::BadFilename(e.message))
}

fn read_file(file: &str) -> Result<Vec<u8>, ConvertError> {
    std::fs::read(file).map_err(|_| ConvertError::Read)
}

/// Run the metadata command and fold the result into `out`. A failing
/// command is non-fatal — the document is still indexed without metadata —
/// but a missing `unzip` propagates.
fn apply_metadata_xml(command: &str, out: &mut Fields) -> Result<(), ConvertError> {
    match stdout_to_bytes(command) {
        Ok(xml) => {
            let meta = xmlparse::MetaXmlParser::parse(&xml);
            out.title = meta.title;
            out.author = meta.author;
            out.keywords = meta.keywords;
            out.sample = meta.sample;
            Ok(())
        }
        Err(SubprocessError::Missing) => Err(ConvertError::Filter(SubprocessError::Missing)),
        Err(e) => {
            debug!(error = %e, "metadata pass failed, indexing without metadata");
            Ok(())
        }
    }
}

/// Run `pdfinfo` against an already-quoted path and pull Author, Keywords,
/// and Title out of its line-oriented output. Failures are non-fatal; a
/// missing binary propagates.
fn get_pdf_metainfo(safefile: &str, out: &mut Fields) -> Result<(), ConvertError> {
    let pdfinfo = match stdout_to_bytes(&format!("pdfinfo -enc UTF-8 {}", safefile)) {
        Ok(bytes) => bytes,
        Err(SubprocessError::Missing) => {
            return Err(ConvertError::Filter(SubprocessError::Missing))
        }
        Err(e) => {
            debug!(error = %e, "pdfinfo failed, indexing without metadata");
            return Ok(());
        }
    };
    let text = String::from_utf8_lossy(&pdfinfo);
    for line in text.split('\n') {
        if let Some(rest) = line.strip_prefix("Author:") {
            parse_pdfinfo_value(rest, &mut out.author);
        } else if let Some(rest) = line.strip_prefix("Keywords:") {
            parse_pdfinfo_value(rest, &mut out.keywords);
        } else if let Some(rest) = line.strip_prefix("Title:") {
            parse_pdfinfo_value(rest, &mut out.title);
        }
    }
    Ok(())
}

fn parse_pdfinfo_value(rest: &str, out: &mut String) {
    let value = rest.trim_start_matches(' ').trim_end_matches('\r');
    if !value.is_empty() {
        *out = value.to_string();
    }
}

/// First line becomes the title, the remainder the body (Debian/RPM
/// package descriptions).
fn split_title_body(desc: &str, out: &mut Fields) {
    match desc.find('\n') {
        Some(at) => {
            out.title = desc[..at].to_string();
            out.body = desc[at + 1..].to_string();
        }
        None => out.title = desc.to_string(),
    }
}

pub fn md5_bytes(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// MD5 of a file, streamed.
pub fn md5_file(path: &str) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Build a bounded preview from decoded CSV text: quotes unwrapped, commas
/// and whitespace runs collapsed to single spaces, truncated on a word
/// boundary unless the tail is one monster word.
pub fn generate_sample_from_csv(csv_data: &str, sample_size: usize) -> String {
    let mut sample = String::with_capacity(sample_size + 4);
    let mut last_word_end = 0usize;
    let mut in_space = true;
    let mut in_quotes = false;
    let mut iter = csv_data.chars();

    while let Some(next) = iter.next() {
        let mut ch = next;

        if !in_quotes {
            // Outside double quotes, '"' starts quoting and ',' starts a
            // new field.
            if ch == '"' {
                in_quotes = true;
                continue;
            }
            if ch == ',' {
                ch = ' ';
            }
        } else if ch == '"' {
            // Inside quotes, '""' is a literal quote; a lone '"' ends
            // quoting.
            match iter.next() {
                None => break,
                Some(following) => {
                    ch = following;
                    if ch != '"' {
                        in_quotes = false;
                        if ch == ',' {
                            ch = ' ';
                        }
                    }
                }
            }
        }

        if ch as u32 <= 0x20 || ch == '\u{a0}' {
            if in_space {
                continue;
            }
            last_word_end = sample.len();
            sample.push(' ');
            in_space = true;
        } else {
            sample.push(ch);
            in_space = false;
        }

        if sample.len() >= sample_size {
            if last_word_end <= sample_size / 2 {
                // Monster word: split it mid-way.
                let mut cut = sample_size.saturating_sub(3);
                while !sample.is_char_boundary(cut) {
                    cut -= 1;
                }
                sample.truncate(cut);
                sample.push_str("...");
            } else {
                sample.truncate(last_word_end);
                sample.push_str(" ...");
            }
            break;
        }
    }
    sample
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_csv_is_collapsed_verbatim() {
        let sample = generate_sample_from_csv("a,b,\"c, d\",  e", 512);
        assert_eq!(sample, "a b c, d e");
    }

    #[test]
    fn doubled_quotes_are_literal() {
        let sample = generate_sample_from_csv("\"say \"\"hi\"\"\",x", 512);
        assert_eq!(sample, "say \"hi\" x");
    }

    #[test]
    fn monster_word_is_split() {
        let sample = generate_sample_from_csv("a,b,\"c,d\",eeeeeeeeeeeeeeeeeeee", 20);
        assert_eq!(sample, "a b c,d eeeeeeeee...");
        assert_eq!(sample.len(), 20);
    }

    #[test]
    fn word_boundary_truncation() {
        let sample = generate_sample_from_csv("one,two,three,four,five,six,seven", 20);
        assert!(sample.ends_with(" ..."));
    }

    #[test]
    fn multibyte_truncation_stays_on_char_boundary() {
        let input = "ééééééééééééééééééééééééééé";
        let sample = generate_sample_from_csv(input, 20);
        assert!(sample.ends_with("..."));
        assert!(sample.is_char_boundary(sample.len() - 3));
    }

    #[test]
    fn pdfinfo_values_are_trimmed() {
        let mut out = String::new();
        parse_pdfinfo_value("   Alice\r", &mut out);
        assert_eq!(out, "Alice");
        let mut empty = String::new();
        parse_pdfinfo_value("  \r", &mut empty);
        assert_eq!(empty, "");
    }

    #[test]
    fn package_description_splits_on_first_newline() {
        let mut fields = Fields::default();
        split_title_body("Short summary\nLong description\nmore", &mut fields);
        assert_eq!(fields.title, "Short summary");
        assert_eq!(fields.body, "Long description\nmore");
    }

    #[test]
    fn md5_of_known_bytes() {
        // MD5("abc")
        assert_eq!(md5_bytes(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
