//! Byte-string helpers shared by the lexer, the field parsers and the
//! canonicalizer. Everything here operates on the assumption that mail is
//! mostly ASCII with occasional 8-bit bytes that must survive untouched.

pub const CRLF: &str = "\r\n";

fn is_wsp(c: u8) -> bool {
    c == 9 || c == 10 || c == 13 || c == 32
}

/// Returns a copy of `s` where each run of whitespace is compressed to a
/// single ASCII 32, and where leading and trailing whitespace is removed
/// altogether.
pub fn simplify(s: &str) -> String {
    let b = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut spaces = false;
    for (i, c) in s.char_indices() {
        if c.len_utf8() == 1 && is_wsp(b[i]) {
            spaces = true;
        } else {
            if spaces && !out.is_empty() {
                out.push(' ');
            }
            spaces = false;
            out.push(c);
        }
    }
    out
}

/// Returns a copy of `s` where leading and trailing whitespace have been
/// removed.
pub fn trim(s: &str) -> &str {
    s.trim_matches(|c| c == ' ' || c == '\t' || c == '\r' || c == '\n')
}

/// Returns a copy of `name` where all letters have been changed to conform
/// to typical mail header practice: letters following digits and other
/// letters are lower-cased, other letters are upper-cased (notably including
/// the very first character).
pub fn header_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for &c in name.as_bytes() {
        if upper && c.is_ascii_lowercase() {
            out.push((c - 32) as char);
        } else if !upper && c.is_ascii_uppercase() {
            out.push((c + 32) as char);
        } else {
            out.push(c as char);
        }
        upper = !c.is_ascii_alphanumeric();
    }
    out
}

/// Returns section `n` (1-based) of `s`, where a section is a run of text
/// separated by `sep`. If `sep` is empty or `n` is 0 the entire string is
/// returned; if there are fewer sections than `n`, the empty string.
pub fn section<'a>(s: &'a str, sep: &str, n: usize) -> &'a str {
    if sep.is_empty() || n == 0 {
        return s;
    }
    s.split(sep).nth(n - 1).unwrap_or("")
}

/// True if `s` is both non-empty and entirely printable ASCII-range bytes.
pub fn is_ascii(s: &str) -> bool {
    s.bytes().all(|c| c < 128)
}

/// True if `s` starts and ends with `q1` or with `q2`.
pub fn is_quoted(s: &str, q1: char, q2: char) -> bool {
    let b = s.as_bytes();
    b.len() > 1
        && ((b[0] == q1 as u8 && b[b.len() - 1] == q1 as u8)
            || (b[0] == q2 as u8 && b[b.len() - 1] == q2 as u8))
}

/// Returns `s` without one layer of surrounding `q1` or `q2` quotes, with
/// backslash escapes resolved. If `s` is not quoted it is returned as-is.
pub fn unquote(s: &str, q1: char, q2: char) -> String {
    if !is_quoted(s, q1, q2) {
        return s.to_string();
    }
    let inner = &s[1..s.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut esc = false;
    for c in inner.chars() {
        if esc {
            out.push(c);
            esc = false;
        } else if c == '\\' {
            esc = true;
        } else {
            out.push(c);
        }
    }
    out
}

/// Returns `s` surrounded by `q` quotes, with `q` and `esc` characters
/// escaped by `esc`.
pub fn quote(s: &str, q: char, esc: char) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push(q);
    for c in s.chars() {
        if c == q || c == esc {
            out.push('\\');
        }
        out.push(c);
    }
    out.push(q);
    out
}

/// Normalizes line endings to CRLF. Lone CR and lone LF both become CRLF.
pub fn crlf(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut cr = false;
    for c in s.chars() {
        match c {
            '\r' => {
                out.push_str(CRLF);
                cr = true;
            }
            '\n' => {
                if !cr {
                    out.push_str(CRLF);
                }
                cr = false;
            }
            _ => {
                out.push(c);
                cr = false;
            }
        }
    }
    out
}

/// Removes a single trailing CRLF (or lone CR/LF) from `s`.
pub fn strip_crlf(s: &str) -> &str {
    let s = s.strip_suffix('\n').unwrap_or(s);
    s.strip_suffix('\r').unwrap_or(s)
}

/// Folds `value` for emission after a `Name: ` prefix of length `first`,
/// breaking at spaces so no output line exceeds `limit` columns. Continuation
/// lines are indented with a single space.
pub fn fold(value: &str, first: usize, limit: usize) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    let mut col = first;
    let mut started = false;
    for word in value.split(' ') {
        if word.is_empty() {
            continue;
        }
        if started {
            if col + 1 + word.len() > limit {
                out.push_str(CRLF);
                out.push(' ');
                col = 1;
            } else {
                out.push(' ');
                col += 1;
            }
        }
        out.push_str(word);
        col += word.len();
        started = true;
    }
    out
}

/// Finds `key` in `line` at or after `ix_start`.
pub fn find_from(line: &str, ix_start: usize, key: &str) -> Option<usize> {
    line[ix_start..].find(key).map(|v| ix_start + v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simplify_whitespace() {
        assert_eq!(simplify("  a   b\r\n c  "), "a b c");
        assert_eq!(simplify(""), "");
        assert_eq!(simplify("\t\t"), "");
        assert_eq!(simplify("already simple"), "already simple");
    }

    #[test]
    fn header_casing() {
        assert_eq!(header_case("content-type"), "Content-Type");
        assert_eq!(header_case("MIME-VERSION"), "Mime-Version");
        assert_eq!(header_case("x-spam-flag"), "X-Spam-Flag");
        assert_eq!(header_case("dkim-signature"), "Dkim-Signature");
    }

    #[test]
    fn sections() {
        assert_eq!(section("a:b:c", ":", 2), "b");
        assert_eq!(section("a:b:c", ":", 4), "");
        assert_eq!(section("a:b:c", "", 4), "a:b:c");
    }

    #[test]
    fn quoting() {
        assert_eq!(unquote("\"a b\"", '"', '\''), "a b");
        assert_eq!(unquote("'a'", '"', '\''), "a");
        assert_eq!(unquote("plain", '"', '\''), "plain");
        assert_eq!(unquote(r#""a\"b""#, '"', '\''), "a\"b");
        assert_eq!(quote("a\"b", '"', '\\'), r#""a\"b""#);
    }

    #[test]
    fn line_endings() {
        assert_eq!(crlf("a\nb"), "a\r\nb");
        assert_eq!(crlf("a\r\nb"), "a\r\nb");
        assert_eq!(crlf("a\rb"), "a\r\nb");
        assert_eq!(strip_crlf("a\r\n"), "a");
        assert_eq!(strip_crlf("a"), "a");
    }

    #[test]
    fn folding() {
        let long = "one two three four five six seven eight nine ten";
        let folded = fold(long, 9, 20);
        for line in folded.split("\r\n") {
            assert!(line.len() <= 20);
        }
        assert_eq!(folded.replace("\r\n ", " "), long);
    }
}
