//! Integration tests for the MIME dispatcher.
//!
//! External document filters (pdftotext, unzip, …) are not assumed to be
//! installed; the shell route is exercised with `cat` and a deliberately
//! nonexistent command.

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use index_harness::extract::{md5_bytes, Extractor, Fields, Status};

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> String {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path.to_str().unwrap().to_string()
}

fn convert(extractor: &mut Extractor, path: &str) -> (Status, Fields) {
    let mut fields = Fields::default();
    let status = extractor.convert(path, None, &mut fields);
    (status, fields)
}

#[test]
fn utf8_bom_text_file() {
    let tmp = TempDir::new().unwrap();
    let raw = b"\xef\xbb\xbfHi";
    let path = write_file(tmp.path(), "readme.txt", raw);

    let (status, fields) = convert(&mut Extractor::new(), &path);
    assert_eq!(status, Status::Ok);
    assert_eq!(fields.body, "Hi");
    assert_eq!(fields.mime_type, "text/plain");
    // The hash covers the original bytes, BOM included.
    assert_eq!(fields.md5, md5_bytes(raw));
}

#[test]
fn utf16_text_file_is_converted() {
    let tmp = TempDir::new().unwrap();
    let raw = b"\xff\xfeH\x00i\x00";
    let path = write_file(tmp.path(), "notes.txt", raw);

    let (status, fields) = convert(&mut Extractor::new(), &path);
    assert_eq!(status, Status::Ok);
    assert_eq!(fields.body, "Hi");
    assert_eq!(fields.md5, md5_bytes(raw));
}

#[test]
fn extension_case_is_irrelevant() {
    let tmp = TempDir::new().unwrap();
    let upper = write_file(tmp.path(), "FOO.TXT", b"x");
    let lower = write_file(tmp.path(), "foo.txt", b"x");

    let mut extractor = Extractor::new();
    let (_, upper_fields) = convert(&mut extractor, &upper);
    let (_, lower_fields) = convert(&mut extractor, &lower);
    assert_eq!(upper_fields.mime_type, "text/plain");
    assert_eq!(upper_fields.mime_type, lower_fields.mime_type);
}

#[test]
fn unknown_and_missing_extensions() {
    let tmp = TempDir::new().unwrap();
    let mut extractor = Extractor::new();

    let unknown = write_file(tmp.path(), "data.qqqzz", b"x");
    assert_eq!(convert(&mut extractor, &unknown).0, Status::UnknownType);

    let mut fields = Fields::default();
    assert_eq!(
        extractor.convert("no-extension-here", None, &mut fields),
        Status::UnknownType
    );
}

#[test]
fn ignored_extensions_are_silently_skipped() {
    let tmp = TempDir::new().unwrap();
    let path = write_file(tmp.path(), "style.css", b"body{}");
    assert_eq!(convert(&mut Extractor::new(), &path).0, Status::Ignored);
}

#[test]
fn explicit_mime_hint_bypasses_the_extension_table() {
    let tmp = TempDir::new().unwrap();
    let path = write_file(tmp.path(), "blob.weird", b"plain enough");

    let mut extractor = Extractor::new();
    let mut fields = Fields::default();
    let status = extractor.convert(&path, Some("text/plain"), &mut fields);
    assert_eq!(status, Status::Ok);
    assert_eq!(fields.body, "plain enough");

    // A dotted hint goes through the extension table instead.
    let status = extractor.convert(&path, Some(".TXT"), &mut fields);
    assert_eq!(status, Status::Ok);
    assert_eq!(fields.mime_type, "text/plain");
}

#[test]
fn missing_file_is_a_command_failure() {
    let mut extractor = Extractor::new();
    let mut fields = Fields::default();
    assert_eq!(
        extractor.convert("/nonexistent/void.txt", None, &mut fields),
        Status::CommandFailed
    );
}

#[test]
fn html_fields_and_meta_robots() {
    let tmp = TempDir::new().unwrap();
    let html = b"<html><head><title>Notes</title>\
        <meta name=robots content=none>\
        <meta name=description content=\"the sample\">\
        <meta name=author content=Alice>\
        </head><body>Body text</body></html>";
    let path = write_file(tmp.path(), "notes.html", html);

    let mut extractor = Extractor::new();
    let (status, _) = convert(&mut extractor, &path);
    assert_eq!(status, Status::BlockedByMeta);

    extractor.set_ignore_exclusions(true);
    let (status, fields) = convert(&mut extractor, &path);
    assert_eq!(status, Status::Ok);
    assert_eq!(fields.title, "Notes");
    assert_eq!(fields.sample, "the sample");
    assert_eq!(fields.author, "Alice");
    assert_eq!(fields.body, "Body text");
    assert_eq!(fields.mime_type, "text/html");
    assert_eq!(fields.md5, md5_bytes(html));
}

#[test]
fn html_charset_override_reparses() {
    let tmp = TempDir::new().unwrap();
    // Without the meta charset this would decode as mojibake latin-1.
    let html = "<meta charset=\"utf-8\"><p>café</p>".as_bytes();
    let path = write_file(tmp.path(), "cafe.htm", html);

    let (status, fields) = convert(&mut Extractor::new(), &path);
    assert_eq!(status, Status::Ok);
    assert_eq!(fields.body, "café");
}

#[test]
fn php_files_ride_the_html_route() {
    let tmp = TempDir::new().unwrap();
    let path = write_file(
        tmp.path(),
        "index.php",
        b"<?php echo 'skipped'; ?><p>shown</p>",
    );
    let (status, fields) = convert(&mut Extractor::new(), &path);
    assert_eq!(status, Status::Ok);
    assert_eq!(fields.mime_type, "text/html");
    assert_eq!(fields.body, "shown");
}

#[test]
fn csv_body_and_sample() {
    let tmp = TempDir::new().unwrap();
    let raw = b"name,age\n\"Smith, Jane\",40\n";
    let path = write_file(tmp.path(), "people.csv", raw);

    let (status, fields) = convert(&mut Extractor::new(), &path);
    assert_eq!(status, Status::Ok);
    assert_eq!(fields.mime_type, "text/csv");
    assert_eq!(fields.body, String::from_utf8_lossy(raw));
    assert_eq!(fields.sample, "name age Smith, Jane 40 ");
    assert_eq!(fields.md5, md5_bytes(raw));
}

#[test]
fn csv_sample_respects_the_configured_bound() {
    let tmp = TempDir::new().unwrap();
    let raw = b"one,two,three,four,five,six,seven,eight,nine,ten";
    let path = write_file(tmp.path(), "long.csv", raw);

    let mut extractor = Extractor::new();
    extractor.set_sample_size(20);
    let (status, fields) = convert(&mut extractor, &path);
    assert_eq!(status, Status::Ok);
    assert!(fields.sample.len() <= 24);
    assert!(fields.sample.ends_with("..."));
}

#[test]
fn registered_command_route_runs_and_records_the_command() {
    let tmp = TempDir::new().unwrap();
    let path = write_file(tmp.path(), "payload.zzz", b"streamed through cat");

    let mut extractor = Extractor::new();
    extractor.set_mimetype("zzz", "text/x-zzz");
    extractor.set_command("text/x-zzz", "cat ");

    let (status, fields) = convert(&mut extractor, &path);
    assert_eq!(status, Status::Ok);
    assert_eq!(fields.body, "streamed through cat");
    assert_eq!(fields.command, format!("cat {}", path));
    assert_eq!(fields.md5, md5_bytes(b"streamed through cat"));
}

#[test]
fn quoting_survives_awkward_filenames() {
    let tmp = TempDir::new().unwrap();
    let path = write_file(tmp.path(), "a b'c.zzz", b"quoted ok");

    let mut extractor = Extractor::new();
    extractor.set_mimetype("zzz", "text/x-zzz");
    extractor.set_command("text/x-zzz", "cat ");

    let (status, fields) = convert(&mut extractor, &path);
    assert_eq!(status, Status::Ok);
    assert_eq!(fields.body, "quoted ok");
}

#[test]
fn missing_filter_is_cached_per_extractor() {
    let tmp = TempDir::new().unwrap();
    let path = write_file(tmp.path(), "doc.qfmt", b"x");

    let mut extractor = Extractor::new();
    extractor.set_mimetype("qfmt", "application/x-qfmt");
    extractor.set_command("application/x-qfmt", "idx-no-such-filter-zz ");

    assert_eq!(convert(&mut extractor, &path).0, Status::FilterMissing);
    // The failure is memoized as an empty template on this instance.
    assert_eq!(extractor.command_for("application/x-qfmt"), Some(""));
    assert_eq!(convert(&mut extractor, &path).0, Status::FilterMissing);

    // A fresh extractor knows nothing of the failure.
    let mut fresh = Extractor::new();
    assert_eq!(fresh.command_for("application/x-qfmt"), None);
    fresh.set_mimetype("qfmt", "application/x-qfmt");
    fresh.set_command("application/x-qfmt", "cat ");
    assert_eq!(convert(&mut fresh, &path).0, Status::Ok);
}

#[test]
fn failing_command_is_not_cached() {
    let tmp = TempDir::new().unwrap();
    let path = write_file(tmp.path(), "doc.ffmt", b"x");

    let mut extractor = Extractor::new();
    extractor.set_mimetype("ffmt", "application/x-ffmt");
    extractor.set_command("application/x-ffmt", "sh -c 'exit 3' ");

    assert_eq!(convert(&mut extractor, &path).0, Status::CommandFailed);
    assert_eq!(
        extractor.command_for("application/x-ffmt"),
        Some("sh -c 'exit 3' ")
    );
}

#[test]
fn svg_parses_in_process() {
    let tmp = TempDir::new().unwrap();
    let svg = br#"<svg xmlns="http://www.w3.org/2000/svg">
        <title>Diagram</title>
        <desc>Boxes and arrows</desc>
        <text>hello <tspan>svg</tspan></text>
      </svg>"#;
    let path = write_file(tmp.path(), "diagram.svg", svg);

    let (status, fields) = convert(&mut Extractor::new(), &path);
    assert_eq!(status, Status::Ok);
    assert_eq!(fields.mime_type, "image/svg+xml");
    assert_eq!(fields.title, "Diagram");
    assert_eq!(fields.keywords, "Boxes and arrows");
    assert_eq!(fields.body, "hello svg");
    assert_eq!(fields.md5, md5_bytes(svg));
}

#[test]
fn abiword_parses_as_local_xml() {
    let tmp = TempDir::new().unwrap();
    let abw = br#"<?xml version="1.0"?><abiword><section><p>First words</p></section></abiword>"#;
    let path = write_file(tmp.path(), "draft.abw", abw);

    let (status, fields) = convert(&mut Extractor::new(), &path);
    assert_eq!(status, Status::Ok);
    assert_eq!(fields.mime_type, "application/x-abiword");
    assert_eq!(fields.body, "First words");
    assert_eq!(fields.md5, md5_bytes(abw));
}

#[test]
fn compressed_abiword_goes_through_gzip() {
    // gzip -dc is in the default command path on any dev box; skip
    // gracefully if not.
    if !Path::new("/bin/gzip").exists() && !Path::new("/usr/bin/gzip").exists() {
        return;
    }
    let tmp = TempDir::new().unwrap();
    let xml = br#"<abiword><p>zipped words</p></abiword>"#;
    let plain = write_file(tmp.path(), "draft.xml", xml);
    let status = std::process::Command::new("gzip")
        .arg("-k")
        .arg(&plain)
        .status()
        .unwrap();
    assert!(status.success());
    let gz = tmp.path().join("draft.xml.gz");
    let zabw = tmp.path().join("draft.zabw");
    fs::rename(&gz, &zabw).unwrap();

    let (status, fields) = convert(&mut Extractor::new(), zabw.to_str().unwrap());
    assert_eq!(status, Status::Ok);
    assert_eq!(fields.body, "zipped words");
    assert!(fields.command.starts_with("gzip -dc "));
}

#[test]
fn macro_enabled_ooxml_resolves_to_the_same_type() {
    // The dispatch itself needs unzip; only the resolution is under test,
    // via an extractor whose command table already marks it missing.
    let mut extractor = Extractor::new();
    let mut fields = Fields::default();
    extractor.set_command(
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "",
    );
    let tmp = TempDir::new().unwrap();
    let docm = write_file(tmp.path(), "macro.docm", b"zip-ish");
    let status = extractor.convert(&docm, None, &mut fields);
    assert_eq!(status, Status::FilterMissing);
    assert_eq!(
        fields.mime_type,
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    );
}
