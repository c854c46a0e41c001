//! The low-level header lexer: a cursor over a byte string with a stack of
//! save/restore marks, recognizing the RFC 2822/2045/2047 terminal
//! productions. Nothing here throws; failed productions set the error slot
//! and callers that established a mark may roll back.

use crate::codec::{self, Codec};
use crate::error::MailError;
use crate::strings;

/// Which flavor of RFC 2047 encoded-text is permitted, which adjusts the
/// characters the encoded-text may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedTextKind {
    Text,
    Comment,
    Phrase,
}

/// Returns true if `c` belongs to the RFC 2822 'atext' production, and
/// false in all other circumstances.
pub fn is_atext(c: u8) -> bool {
    if c < 32 || c > 127 {
        return false;
    }
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'/'
                | b'='
                | b'?'
                | b'^'
                | b'_'
                | b'`'
                | b'{'
                | b'|'
                | b'}'
                | b'~'
        )
}

pub(crate) fn is_tspecial(c: u8) -> bool {
    matches!(
        c,
        b'(' | b')' | b'<' | b'>' | b'@' | b',' | b';' | b':' | b'\\' | b'"' | b'/' | b'[' | b']'
            | b'?' | b'='
    )
}

pub struct Cursor<'a> {
    input: &'a [u8],
    at: usize,
    error: Option<MailError>,
    marks: Vec<(usize, Option<MailError>)>,
    last_comment: String,
}

impl<'a> Cursor<'a> {
    pub fn new(input: &'a [u8]) -> Cursor<'a> {
        Cursor {
            input,
            at: 0,
            error: None,
            marks: Vec::new(),
            last_comment: String::new(),
        }
    }

    /// Returns the current (0-indexed) position of the cursor without
    /// changing anything.
    pub fn pos(&self) -> usize {
        self.at
    }

    /// Returns the next byte at the cursor without stepping. Returns 0 when
    /// the cursor is past the end of the input.
    pub fn next_char(&self) -> u8 {
        if self.at >= self.input.len() {
            0
        } else {
            self.input[self.at]
        }
    }

    /// Advances the cursor past `n` bytes of the input.
    pub fn step(&mut self, n: usize) {
        self.at += n;
    }

    /// Returns true if the entire input has been parsed.
    pub fn at_end(&self) -> bool {
        self.at >= self.input.len()
    }

    pub fn valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&MailError> {
        self.error.as_ref()
    }

    pub fn set_error(&mut self, e: MailError) {
        self.error = Some(e);
    }

    /// The contents of the last comment stepped past.
    pub fn last_comment(&self) -> &str {
        &self.last_comment
    }

    /// Saves the cursor position and error state, returning an identifier
    /// for the companion `restore`.
    pub fn mark(&mut self) -> usize {
        self.marks.push((self.at, self.error.clone()));
        self.marks.len()
    }

    /// Restores the cursor position and error state saved by mark `m`,
    /// clearing any error raised since. The mark itself survives, so it
    /// may be restored more than once.
    pub fn restore(&mut self, m: usize) {
        if m == 0 || m > self.marks.len() {
            return;
        }
        let (at, error) = self.marks[m - 1].clone();
        self.marks.truncate(m);
        self.at = at;
        self.error = error;
    }

    /// Returns a string of no more than 15 characters containing the first
    /// unparsed bits of input. Meant for use in error messages.
    fn following(&self) -> String {
        if self.at >= self.input.len() {
            return String::new();
        }
        let end = (self.at + 15).min(self.input.len());
        let f: String = self.input[self.at..end]
            .iter()
            .map(|&c| if c < 128 { c as char } else { '?' })
            .collect();
        strings::simplify(&f)
    }

    /// Moves the cursor to the first nonwhitespace character after the
    /// current point. ASCII 160 is absorbed too; mail that old still exists.
    pub fn whitespace(&mut self) -> String {
        let mut out = String::new();
        let mut c = self.next_char();
        while c == b' ' || c == 9 || c == 10 || c == 13 || c == 160 {
            out.push(c as char);
            self.step(1);
            c = self.next_char();
        }
        out
    }

    /// Moves the cursor past all comments and surrounding white space, and
    /// returns the contents of the last comment.
    ///
    /// Returns an empty string if there was no comment.
    pub fn comment(&mut self) -> String {
        let mut buf = String::new();
        self.whitespace();
        while self.present("(") {
            buf.clear();
            let mut level = 1;
            while level > 0 && !self.at_end() {
                let c = self.next_char();
                match c {
                    b'(' => {
                        buf.push(c as char);
                        level += 1;
                    }
                    b')' => {
                        level -= 1;
                        if level > 0 {
                            buf.push(c as char);
                        }
                    }
                    b'\\' => {
                        self.step(1);
                        buf.push(self.next_char() as char);
                    }
                    _ => buf.push(c as char),
                }
                self.step(1);
            }
            self.whitespace();
            self.last_comment = buf.clone();
        }
        buf
    }

    /// Returns a single atom, stepping past white space and comments before
    /// and after it.
    pub fn atom(&mut self) -> String {
        self.comment();
        let mut buf = String::new();
        while !self.at_end() && is_atext(self.next_char()) {
            buf.push(self.next_char() as char);
            self.step(1);
        }
        buf
    }

    /// Returns a dot-atom, stepping past all relevant whitespace and
    /// comments.
    pub fn dot_atom(&mut self) -> String {
        let mut result = self.atom();
        if result.is_empty() {
            return result;
        }
        loop {
            let m = self.mark();
            self.comment();
            self.require(".");
            self.comment();
            let a = self.atom();
            if a.is_empty() {
                self.set_error(MailError::Generic("Trailing dot in dot-atom"));
            }
            if self.valid() {
                result.push('.');
                result.push_str(&a);
            } else {
                self.restore(m);
                break;
            }
        }
        result
    }

    /// Steps past an atom or a quoted-string, and returns that text.
    pub fn string(&mut self) -> String {
        self.comment();
        if self.next_char() != b'"' {
            return self.atom();
        }
        let mut buf = String::new();
        self.step(1);
        let mut done = false;
        while !done && !self.at_end() {
            let c = self.next_char();
            self.step(1);
            if c == b'"' {
                done = true;
            } else if c == b'\\' {
                buf.push(self.next_char() as char);
                self.step(1);
            } else if c == 9 || c == b'\r' || c == b'\n' || c == b' ' {
                // a CRLF in a quoted-string collapses to a single space
                let wsp = self.pos() - 1;
                self.whitespace();
                let t: String = self.input[wsp..self.pos()]
                    .iter()
                    .map(|&b| b as char)
                    .collect();
                if t.contains('\r') || t.contains('\n') {
                    buf.push(' ');
                } else {
                    buf.push_str(&t);
                }
            } else {
                buf.push(c as char);
            }
        }
        buf
    }

    /// Steps past an RFC 2045 token and returns it.
    pub fn mime_token(&mut self) -> String {
        let mut buf = String::new();
        let mut c = self.next_char();
        while c > 32 && c < 127 && !is_tspecial(c) {
            buf.push(c as char);
            self.step(1);
            c = self.next_char();
        }
        buf
    }

    /// Steps past an RFC 2045 value, which is either a token or a
    /// quoted-string.
    pub fn mime_value(&mut self) -> String {
        if self.next_char() == b'"' {
            self.string()
        } else {
            self.mime_token()
        }
    }

    /// Checks whether the next characters in the input match `s`,
    /// case-insensitively. If so, steps past them and returns true.
    pub fn present(&mut self, s: &str) -> bool {
        if s.is_empty() {
            return true;
        }
        if self.at + s.len() > self.input.len() {
            return false;
        }
        let here = &self.input[self.at..self.at + s.len()];
        if !here.eq_ignore_ascii_case(s.as_bytes()) {
            return false;
        }
        self.step(s.len());
        true
    }

    /// Requires that the next characters match `s` (case-insensitively) and
    /// steps past them. A mismatch is an error.
    pub fn require(&mut self, s: &str) {
        if !self.present(s) {
            self.set_error(MailError::Parse(format!(
                "expected {:?}, got: {}",
                s,
                self.following()
            )));
        }
    }

    /// Steps past a MIME encoded-word (RFC 2047) and returns its decoded
    /// representation, or an empty string if the cursor does not point to a
    /// valid encoded-word. The caller is responsible for checking that the
    /// encoded-word is separated from neighbouring tokens by whitespace.
    pub fn encoded_word(&mut self, kind: EncodedTextKind) -> String {
        // encoded-word = "=?" charset '?' encoding '?' encoded-text "?="
        let m = self.mark();
        self.require("=?");
        if !self.valid() {
            self.restore(m);
            return String::new();
        }

        let mut cs = String::new();
        let mut c = self.next_char();
        while c > 32
            && c < 128
            && !matches!(
                c,
                b'(' | b')' | b'<' | b'>' | b'@' | b',' | b';' | b':' | b'[' | b']' | b'?' | b'='
                    | b'\\' | b'"' | b'/' | b'.'
            )
        {
            cs.push(c as char);
            self.step(1);
            c = self.next_char();
        }
        if cs.contains('*') {
            // the part after '*' is language information, which we discard
            cs = strings::section(&cs, "*", 1).to_string();
        }

        self.require("?");

        let base64_encoding = if self.present("q") {
            false
        } else if self.present("b") {
            true
        } else {
            self.set_error(MailError::Parse(format!(
                "unknown encoded-word encoding: {}",
                self.next_char() as char
            )));
            false
        };

        self.require("?");

        let mut buf = String::new();
        let mut c = self.next_char();
        if base64_encoding {
            while c.is_ascii_alphanumeric() || c == b'+' || c == b'/' || c == b'=' {
                buf.push(c as char);
                self.step(1);
                c = self.next_char();
            }
        } else {
            while c > 32
                && c < 128
                && c != b'?'
                && (kind != EncodedTextKind::Comment || (c != b'(' && c != b')' && c != b'\\'))
                && (kind != EncodedTextKind::Phrase
                    || c.is_ascii_alphanumeric()
                    || matches!(c, b'!' | b'*' | b'-' | b'/' | b'=' | b'_' | b'\''))
            {
                buf.push(c as char);
                self.step(1);
                c = self.next_char();
            }
        }

        self.require("?=");

        if !self.valid() {
            self.restore(m);
            return String::new();
        }

        let bytes = if base64_encoding {
            codec::de64(buf.as_bytes())
        } else {
            codec::de_qp(buf.as_bytes(), true)
        };

        let codec = match Codec::for_name(&cs) {
            Some(c) => c,
            None => {
                self.set_error(MailError::Encoding(format!("unknown character set: {}", cs)));
                self.restore(m);
                return String::new();
            }
        };
        let (decoded, _) = codec.decode(&bytes);

        let mut result = decoded;
        if result.contains('\r') || result.contains('\n') {
            // defend against =?ascii?q?x=0aEvil:_nasty?=
            result = strings::simplify(&result);
        }
        if result.contains('\u{7f}') {
            result = result.chars().filter(|&c| c != '\u{7f}').collect();
        }
        result
    }

    /// Steps past a sequence of adjacent encoded-words with whitespace in
    /// between and returns the decoded representation. Leading and trailing
    /// whitespace is trimmed, internal whitespace is kept as is.
    pub fn encoded_words(&mut self, kind: EncodedTextKind) -> String {
        let mut out = String::new();
        let mut m;
        loop {
            m = self.mark();
            self.whitespace();
            let n = self.pos();
            let s = self.encoded_word(kind);
            if n == self.pos() {
                break;
            }
            out.push_str(&s);
        }
        self.restore(m);
        strings::trim(&out).to_string()
    }

    /// Parses the RFC 2047-amended *text production: a sequence of words,
    /// some of which may be encoded-words.
    pub fn text(&mut self) -> String {
        let mut out = String::new();
        let mut space = self.whitespace();
        loop {
            let m = self.mark();
            let start = self.pos();
            let mut word = String::new();
            let mut encoded = false;

            if self.present("=?") {
                self.restore(m);
                encoded = true;
                word = self.encoded_words(EncodedTextKind::Text);
                if self.pos() == start {
                    encoded = false;
                }
            }

            if !encoded {
                let mut buf = String::new();
                let mut c = self.next_char();
                while !self.at_end() && c < 128 && c != b' ' && c != 9 && c != 10 && c != 13 {
                    buf.push(c as char);
                    self.step(1);
                    c = self.next_char();
                }
                word = buf;
            }

            if self.pos() == start {
                break;
            }
            out.push_str(&space);
            out.push_str(&word);
            space = self.whitespace();
            if space.contains('\r') || space.contains('\n') {
                space = " ".to_string();
            }
        }
        if !space.is_empty() {
            out.push_str(&space);
        }
        out
    }

    /// Steps past an RFC 822 phrase (a series of words and encoded-words)
    /// and returns its unicode representation, which may be an empty string.
    pub fn phrase(&mut self) -> String {
        let mut buf = String::new();
        self.comment();

        let mut was_encoded = false;
        let mut spaces = String::new();

        while !self.at_end() {
            let mut t = String::new();
            let mut encoded = false;
            let mut have = false;
            let start = self.pos();
            let m = self.mark();

            if self.present("=?") {
                self.restore(m);
                t = self.encoded_words(EncodedTextKind::Phrase);
                if start < self.pos() {
                    have = true;
                    encoded = true;
                }
            }
            if !have && self.present("\"") {
                self.restore(m);
                let s = self.string();
                let (d, _) = codec::to_ascii(&s);
                t = d;
                if start < self.pos() {
                    have = true;
                }
            }
            if !have {
                let a = self.atom();
                let (d, _) = codec::to_ascii(&a);
                t = d;
                if start < self.pos() {
                    have = true;
                }
            }

            if have || !t.is_empty() {
                // RFC 2047 says that spaces between adjacent encoded-words
                // are disregarded, so we do.
                if !encoded || !was_encoded {
                    buf.push_str(&spaces);
                }
                buf.push_str(&t);
                spaces = self.whitespace();
                let start = self.pos();
                self.comment();
                // a comment with no spaces around it still separates words
                if spaces.is_empty() && start < self.pos() {
                    spaces.push(' ');
                }
                // RFC violation: if the spaces included a CR/LF, changing
                // it all to a single space matches the expectations of most
                // senders better than the RFC rule.
                if spaces.contains('\r') || spaces.contains('\n') {
                    spaces = " ".to_string();
                }
                was_encoded = encoded;
            } else {
                break;
            }
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atoms_and_dot_atoms() {
        let mut p = Cursor::new(b"  foo.bar rest");
        assert_eq!(p.dot_atom(), "foo.bar");
        assert!(p.valid());

        let mut p = Cursor::new(b"foo. ");
        assert_eq!(p.dot_atom(), "foo");
        assert!(p.valid());
        assert_eq!(p.next_char(), b'.');
    }

    #[test]
    fn comments_nest() {
        let mut p = Cursor::new(b" (a (b) c) x");
        p.comment();
        assert_eq!(p.last_comment(), "a (b) c");
        assert_eq!(p.next_char(), b'x');
    }

    #[test]
    fn quoted_strings() {
        let mut p = Cursor::new(b"\"a \\\"b\\\" c\"");
        assert_eq!(p.string(), "a \"b\" c");
        let mut p = Cursor::new(b"\"fold\r\n here\"");
        assert_eq!(p.string(), "fold here");
    }

    #[test]
    fn present_is_case_insensitive() {
        let mut p = Cursor::new(b"FooBar");
        assert!(p.present("foo"));
        assert!(!p.present("foo"));
        assert!(p.present("BAR"));
        assert!(p.at_end());
    }

    #[test]
    fn mark_restore() {
        let mut p = Cursor::new(b"abc");
        let m = p.mark();
        p.step(2);
        p.require("zzz");
        assert!(!p.valid());
        p.restore(m);
        assert!(p.valid());
        assert_eq!(p.pos(), 0);
    }

    #[test]
    fn encoded_word_q() {
        let mut p = Cursor::new(b"=?ISO-8859-1?Q?foo_bar?=");
        assert_eq!(p.encoded_word(EncodedTextKind::Text), "foo bar");
        assert!(p.at_end());
    }

    #[test]
    fn encoded_word_b() {
        let mut p = Cursor::new(b"=?utf-8?b?aGVsbG8=?=");
        assert_eq!(p.encoded_word(EncodedTextKind::Text), "hello");
    }

    #[test]
    fn encoded_word_unknown_charset() {
        let mut p = Cursor::new(b"=?no-such?q?x?=");
        assert_eq!(p.encoded_word(EncodedTextKind::Text), "");
        // the failed attempt rolls back entirely
        assert_eq!(p.pos(), 0);
        assert!(p.valid());
    }

    #[test]
    fn encoded_word_header_injection() {
        let mut p = Cursor::new(b"=?us-ascii?q?x=0aEvil:_nasty?=");
        assert_eq!(p.encoded_word(EncodedTextKind::Text), "x Evil: nasty");
    }

    #[test]
    fn text_with_encoded_words() {
        let mut p = Cursor::new(b"=?ISO-8859-1?Q?foo?= bar");
        assert_eq!(p.text(), "foo bar");
        assert!(p.at_end());
    }

    #[test]
    fn phrase_suppresses_space_between_encoded_words() {
        let mut p = Cursor::new(b"=?us-ascii?q?foo?= =?us-ascii?q?bar?=");
        assert_eq!(p.phrase(), "foobar");
    }

    #[test]
    fn whitespace_accepts_nbsp() {
        let mut p = Cursor::new(b"\xa0 x");
        p.whitespace();
        assert_eq!(p.next_char(), b'x');
    }
}
