//! Shell-argument quoting for filenames handed to external filters.
//!
//! Command templates are composed as `template + quoted_path` and run via
//! the shell, so the path must not be interpretable as options, globs, or
//! word splits.

/// Error for a path the platform shell cannot be handed safely.
#[derive(Debug)]
pub struct IllegalFilename {
    pub message: String,
}

/// Quote `path` for safe appending to a shell command line.
///
/// POSIX: a leading `-` is defused with `./`, then every byte that is not
/// alphanumeric or one of `/._-` gets a backslash. Bytes ≥ 128 pass
/// through unescaped — multibyte UTF-8 sequences must not be split, and
/// locale-dependent shells are on their own with them (longstanding
/// behaviour, kept as is).
#[cfg(not(windows))]
pub fn shell_protect(path: &str) -> Result<String, IllegalFilename> {
    let mut out = String::with_capacity(path.len() + 8);
    if path.starts_with('-') {
        out.push_str("./");
    }
    for ch in path.chars() {
        if ch.is_ascii() && !ch.is_ascii_alphanumeric() && !matches!(ch, '/' | '.' | '_' | '-') {
            out.push('\\');
        }
        out.push(ch);
    }
    Ok(out)
}

/// Windows: `/` becomes `\`, a space forces double quoting, control bytes
/// and `<>"|*?` are rejected, a leading `-` is defused with `.\`.
#[cfg(windows)]
pub fn shell_protect(path: &str) -> Result<String, IllegalFilename> {
    let mut need_to_quote = false;
    let mut out = String::with_capacity(path.len() + 8);
    for ch in path.chars() {
        let mut ch = ch;
        if ch.is_ascii() && !ch.is_ascii_alphanumeric() {
            if ch == '/' {
                // External commands generally don't understand '/' in
                // paths, and may take a leading one as an option.
                ch = '\\';
            } else if ch == ' ' {
                need_to_quote = true;
            } else if (ch as u32) < 32 || "<>\"|*?".contains(ch) {
                return Err(IllegalFilename {
                    message: format!("Invalid character '{}' in filename \"{}\"", ch, path),
                });
            }
        }
        out.push(ch);
    }
    if out.starts_with('-') {
        out.insert_str(0, ".\\");
    }
    if need_to_quote {
        out.insert(0, '"');
        out.push('"');
    }
    Ok(out)
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::*;

    #[test]
    fn safe_characters_pass_through() {
        assert_eq!(shell_protect("/tmp/a_b-c.txt").unwrap(), "/tmp/a_b-c.txt");
    }

    #[test]
    fn spaces_and_metacharacters_are_escaped() {
        assert_eq!(shell_protect("a b").unwrap(), "a\\ b");
        assert_eq!(shell_protect("a$b`c").unwrap(), "a\\$b\\`c");
        assert_eq!(shell_protect("a'b\"c").unwrap(), "a\\'b\\\"c");
        assert_eq!(shell_protect("a;b|c").unwrap(), "a\\;b\\|c");
    }

    #[test]
    fn leading_dash_gets_dot_slash() {
        assert_eq!(shell_protect("-rf").unwrap(), "./-rf");
    }

    #[test]
    fn high_bytes_pass_through_unescaped() {
        assert_eq!(shell_protect("café").unwrap(), "café");
    }
}
