//! Default routing tables for the MIME dispatcher.
//!
//! Two tables drive dispatch: filename extension → canonical MIME type,
//! and MIME type → external command template. The literal value
//! [`IGNORE`] in the extension table marks extensions to skip silently.
//! Hosts extend both tables through the extractor's `set_mimetype` /
//! `set_command`.

use std::collections::HashMap;

/// Sentinel MIME value meaning "do not index, do not complain".
pub const IGNORE: &str = "ignore";

/// The built-in extension table.
pub fn default_mime_map() -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut add = |ext: &str, mime: &str| {
        map.insert(ext.to_string(), mime.to_string());
    };

    // Plain text:
    add("txt", "text/plain");
    add("text", "text/plain");

    // HTML; the HTML parser knows to skip PHP code sections.
    add("html", "text/html");
    add("htm", "text/html");
    add("shtml", "text/html");
    add("php", "text/html");

    // Comma-separated values:
    add("csv", "text/csv");

    // PDF:
    add("pdf", "application/pdf");

    // PostScript:
    add("ps", "application/postscript");
    add("eps", "application/postscript");
    add("ai", "application/postscript");

    // OpenDocument:
    add("odt", "application/vnd.oasis.opendocument.text");
    add("ods", "application/vnd.oasis.opendocument.spreadsheet");
    add("odp", "application/vnd.oasis.opendocument.presentation");
    add("odg", "application/vnd.oasis.opendocument.graphics");
    add("odc", "application/vnd.oasis.opendocument.chart");
    add("odf", "application/vnd.oasis.opendocument.formula");
    add("odb", "application/vnd.oasis.opendocument.database");
    add("odi", "application/vnd.oasis.opendocument.image");
    add("odm", "application/vnd.oasis.opendocument.text-master");
    add("ott", "application/vnd.oasis.opendocument.text-template");
    add("ots", "application/vnd.oasis.opendocument.spreadsheet-template");
    add("otp", "application/vnd.oasis.opendocument.presentation-template");
    add("otg", "application/vnd.oasis.opendocument.graphics-template");
    add("otc", "application/vnd.oasis.opendocument.chart-template");
    add("otf", "application/vnd.oasis.opendocument.formula-template");
    add("oti", "application/vnd.oasis.opendocument.image-template");
    add("oth", "application/vnd.oasis.opendocument.text-web");

    // OpenOffice/StarOffice:
    add("sxc", "application/vnd.sun.xml.calc");
    add("stc", "application/vnd.sun.xml.calc.template");
    add("sxd", "application/vnd.sun.xml.draw");
    add("std", "application/vnd.sun.xml.draw.template");
    add("sxi", "application/vnd.sun.xml.impress");
    add("sti", "application/vnd.sun.xml.impress.template");
    add("sxm", "application/vnd.sun.xml.math");
    add("sxw", "application/vnd.sun.xml.writer");
    add("sxg", "application/vnd.sun.xml.writer.global");
    add("stw", "application/vnd.sun.xml.writer.template");

    // OOXML document, template, and slideshow forms:
    add(
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    );
    add(
        "dotx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.template",
    );
    add(
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    );
    add(
        "xltx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.template",
    );
    add(
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    );
    add(
        "ppsx",
        "application/vnd.openxmlformats-officedocument.presentationml.slideshow",
    );
    add(
        "potx",
        "application/vnd.openxmlformats-officedocument.presentationml.template",
    );
    add("xps", "application/vnd.ms-xpsdocument");

    // Macro-enabled variants are the same container formats; map them to
    // the same types rather than doubling the dispatch table.
    add(
        "docm",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    );
    add(
        "dotm",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.template",
    );
    add(
        "xlsm",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    );
    add(
        "xltm",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.template",
    );
    add(
        "pptm",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    );
    add(
        "ppsm",
        "application/vnd.openxmlformats-officedocument.presentationml.slideshow",
    );
    add(
        "potm",
        "application/vnd.openxmlformats-officedocument.presentationml.template",
    );

    // Other word-processor formats:
    add("doc", "application/msword");
    add("dot", "application/msword");
    add("wpd", "application/vnd.wordperfect");
    add("wps", "application/vnd.ms-works");
    add("wpt", "application/vnd.ms-works");
    add("abw", "application/x-abiword");
    add("zabw", "application/x-abiword-compressed");
    add("rtf", "text/rtf");

    // Other MS formats:
    add("xls", "application/vnd.ms-excel");
    add("xlb", "application/vnd.ms-excel");
    add("xlt", "application/vnd.ms-excel");
    // Later Microsoft Works wrote XL format with its own extension.
    add("xlr", "application/vnd.ms-excel");
    add("ppt", "application/vnd.ms-powerpoint");
    add("pps", "application/vnd.ms-powerpoint");
    add("msg", "application/vnd.ms-outlook");

    // Perl:
    add("pl", "text/x-perl");
    add("pm", "text/x-perl");
    add("pod", "text/x-perl");

    // TeX DVI:
    add("dvi", "application/x-dvi");

    // DjVu:
    add("djv", "image/vnd.djvu");
    add("djvu", "image/vnd.djvu");

    // SVG:
    add("svg", "image/svg+xml");

    // Debian packages:
    add("deb", "application/x-debian-package");
    add("udeb", "application/x-debian-package");

    // RPM packages:
    add("rpm", "application/x-redhat-package-manager");

    // Extensions to quietly ignore:
    for ext in [
        "a", "dll", "dylib", "exe", "lib", "o", "obj", "so", "css", "js",
    ] {
        add(ext, IGNORE);
    }

    map
}

/// The built-in MIME → external command template table. The shell-quoted
/// filename is appended to the template at run time.
pub fn default_commands() -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut add = |mime: &str, command: &str| {
        map.insert(mime.to_string(), command.to_string());
    };

    add("application/msword", "antiword -mUTF-8.txt ");
    add("application/vnd.ms-powerpoint", "catppt -dutf-8 ");
    // wpd2text and wps2text both emit UTF-8 for the samples we have.
    add("application/vnd.wordperfect", "wpd2text ");
    add("application/vnd.ms-works", "wps2text ");
    // djvutxt documents its output as UTF-8.
    add("image/vnd.djvu", "djvutxt ");

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_extensions_resolve() {
        let map = default_mime_map();
        assert_eq!(map.get("txt").unwrap(), "text/plain");
        assert_eq!(map.get("php").unwrap(), "text/html");
        assert_eq!(map.get("css").unwrap(), IGNORE);
        assert_eq!(
            map.get("dotx").unwrap(),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.template"
        );
    }

    #[test]
    fn command_templates_end_with_a_space() {
        // The quoted filename is appended directly to the template.
        for template in default_commands().values() {
            assert!(template.ends_with(' '), "template {:?}", template);
        }
    }
}
