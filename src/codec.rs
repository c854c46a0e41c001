//! The character-set registry and the transfer codecs.
//!
//! The registry is a thin layer over the `charset` crate (and through it the
//! WHATWG encoding registry). Two synthetic codecs sit on top: a *strict*
//! us-ascii, because the WHATWG registry aliases us-ascii to windows-1252 and
//! that is far too forgiving for charset guessing, and `unknown-8bit`, the
//! label of last resort for bodies nothing could decode.

use charset::Charset;

use crate::strings;

#[derive(Clone)]
enum CodecKind {
    Registry(Charset),
    Ascii,
    Unknown8Bit,
}

/// A named decoder from some character set to Rust strings.
///
/// `decode` reports whether malformed sequences were seen; per the general
/// error policy nothing is thrown, the caller decides whether a lossy result
/// is good enough or whether to go guessing.
#[derive(Clone)]
pub struct Codec {
    name: String,
    kind: CodecKind,
}

impl Codec {
    /// Looks up `name` in the registry. Returns None for unknown charsets
    /// and for the empty name.
    pub fn for_name(name: &str) -> Option<Codec> {
        let lower = strings::trim(name).to_ascii_lowercase();
        if lower.is_empty() {
            return None;
        }
        match lower.as_str() {
            "us-ascii" | "ascii" | "ansi_x3.4-1968" | "iso-ir-6" | "646" | "us" => {
                return Some(Codec::ascii());
            }
            "unknown-8bit" | "x-unknown" | "x-user-defined" => {
                return Some(Codec::unknown_8bit());
            }
            _ => {}
        }
        // a few labels seen in real mail that the WHATWG registry spells
        // differently
        let label = match lower.as_str() {
            "cp-1252" => "windows-1252",
            "utf8" => "utf-8",
            other => other,
        };
        Charset::for_label_no_replacement(label.as_bytes()).map(|cs| Codec {
            name: lower,
            kind: CodecKind::Registry(cs),
        })
    }

    /// The strict 7-bit codec. Any byte above 127 is an error.
    pub fn ascii() -> Codec {
        Codec {
            name: "us-ascii".to_string(),
            kind: CodecKind::Ascii,
        }
    }

    /// The codec of last resort: 8-bit bytes survive as U+FFFD, nothing is
    /// ever an error.
    pub fn unknown_8bit() -> Codec {
        Codec {
            name: "unknown-8bit".to_string(),
            kind: CodecKind::Unknown8Bit,
        }
    }

    pub fn utf8() -> Codec {
        Codec::for_name("utf-8").unwrap()
    }

    /// The lowercased registry name of this codec.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decodes `bytes` to a string. The second element is true if malformed
    /// sequences were seen (and replaced with U+FFFD).
    pub fn decode(&self, bytes: &[u8]) -> (String, bool) {
        match &self.kind {
            CodecKind::Registry(cs) => {
                let (cow, malformed) = cs.decode_without_bom_handling(bytes);
                (cow.into_owned(), malformed)
            }
            CodecKind::Ascii => {
                let mut bad = false;
                let s = bytes
                    .iter()
                    .map(|&c| {
                        if c < 128 {
                            c as char
                        } else {
                            bad = true;
                            '\u{FFFD}'
                        }
                    })
                    .collect();
                (s, bad)
            }
            CodecKind::Unknown8Bit => {
                let s = bytes
                    .iter()
                    .map(|&c| if c < 128 { c as char } else { '\u{FFFD}' })
                    .collect();
                (s, false)
            }
        }
    }
}

/// Decodes a string of us-ascii bytes. The error slot is set when 8-bit
/// bytes are present; the lossy result is returned either way.
pub fn to_ascii(s: &str) -> (String, bool) {
    let mut bad = false;
    let out = s
        .chars()
        .map(|c| {
            if (c as u32) < 128 {
                c
            } else {
                bad = true;
                '\u{FFFD}'
            }
        })
        .collect();
    (out, bad)
}

const B64_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Decodes base64, coping with whitespace, garbage bytes and truncated
/// groups. Decoding stops at the first `=`.
pub fn de64(s: &[u8]) -> Vec<u8> {
    let mut cleaned = Vec::with_capacity(s.len());
    for &c in s {
        if c == b'=' {
            break;
        }
        if B64_ALPHABET.contains(&c) {
            cleaned.push(c);
        }
        // everything else may be ignored; whitespace is perfectly normal
        // and the rest is mail-munging breakage
    }
    if cleaned.len() % 4 == 1 {
        cleaned.pop();
    }
    base64::decode_config(
        &cleaned,
        base64::STANDARD_NO_PAD.decode_allow_trailing_bits(true),
    )
    .unwrap_or_default()
}

/// Encodes `data` as base64 broken into lines of at most `line_length`
/// characters, each terminated by CRLF.
pub fn e64(data: &[u8], line_length: usize) -> String {
    let encoded = base64::encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / line_length * 2 + 2);
    let b = encoded.as_bytes();
    let mut i = 0;
    while i < b.len() {
        let end = (i + line_length).min(b.len());
        out.push_str(&encoded[i..end]);
        out.push_str(strings::CRLF);
        i = end;
    }
    out
}

/// Decodes quoted-printable. Errors are overlooked, to cope with all the
/// mail-munging brokenware in the great big world.
///
/// If `underscore` is true, underscores in the input are translated into
/// spaces (as specified in RFC 2047).
pub fn de_qp(s: &[u8], underscore: bool) -> Vec<u8> {
    let input;
    let bytes = if underscore {
        input = s
            .iter()
            .map(|&c| if c == b'_' { b' ' } else { c })
            .collect::<Vec<u8>>();
        &input[..]
    } else {
        s
    };
    quoted_printable::decode(bytes, quoted_printable::ParseMode::Robust)
        .unwrap_or_else(|_| bytes.to_vec())
}

/// Encodes `text` as quoted-printable with soft line breaks so that no
/// output line exceeds `line_length` characters. CRLF in the input is
/// passed through as a hard break.
pub fn e_qp(text: &str, line_length: usize) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut col = 0;
    let b = text.as_bytes();
    let mut i = 0;
    while i < b.len() {
        let c = b[i];
        if c == b'\r' && i + 1 < b.len() && b[i + 1] == b'\n' {
            out.push_str(strings::CRLF);
            col = 0;
            i += 2;
            continue;
        }
        let literal = (c >= 33 && c <= 126 && c != b'=')
            || ((c == b' ' || c == b'\t')
                && !(i + 1 >= b.len() || b[i + 1] == b'\r' || b[i + 1] == b'\n'));
        let width = if literal { 1 } else { 3 };
        if col + width > line_length - 1 {
            out.push('=');
            out.push_str(strings::CRLF);
            col = 0;
        }
        if literal {
            out.push(c as char);
        } else {
            out.push('=');
            out.push_str(&format!("{:02X}", c));
        }
        col += width;
        i += 1;
    }
    out
}

/// Decodes the historical uuencode format. The optional `begin <mode>
/// <name>` and `end` lines are recognized and skipped; otherwise each line
/// carries its decoded length in the first character.
pub fn de_uu(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() * 3 / 4);
    for line in s.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let lower = line.to_ascii_lowercase();
        if lower.starts_with("begin ") {
            continue;
        }
        if lower == "end" {
            break;
        }
        let b = line.as_bytes();
        let n = ((b[0].wrapping_sub(32)) & 63) as usize;
        if n == 0 {
            continue;
        }
        let mut taken = 0;
        let mut i = 1;
        while taken < n && i + 1 < b.len() {
            let group: Vec<u8> = (0..4)
                .map(|k| {
                    if i + k < b.len() {
                        (b[i + k].wrapping_sub(32)) & 63
                    } else {
                        0
                    }
                })
                .collect();
            let bytes = [
                (group[0] << 2) | (group[1] >> 4),
                (group[1] << 4) | (group[2] >> 2),
                (group[2] << 6) | group[3],
            ];
            for &byte in bytes.iter().take(n - taken) {
                out.push(byte);
                taken += 1;
            }
            i += 4;
        }
    }
    out
}

/// True if `text` cannot be sent as-is in a 7-bit body: it contains NULs,
/// 8-bit bytes, or a line longer than 78 characters.
pub fn needs_qp(text: &str) -> bool {
    let mut line = 0;
    for &c in text.as_bytes() {
        if c == b'\n' || c == b'\r' {
            line = 0;
        } else {
            line += 1;
            if line > 78 {
                return true;
            }
        }
        if c == 0 || c >= 128 {
            return true;
        }
    }
    false
}

fn q_safe(c: u8) -> bool {
    c.is_ascii_alphanumeric()
        || c == b'!'
        || c == b'*'
        || c == b'+'
        || c == b'-'
        || c == b'/'
}

fn encoded_word(word: &str) -> String {
    let bytes = word.as_bytes();
    let awkward = bytes.iter().filter(|&&c| !q_safe(c)).count();
    if awkward * 3 > bytes.len() {
        format!("=?utf-8?b?{}?=", base64::encode(bytes))
    } else {
        let mut payload = String::with_capacity(bytes.len() * 2);
        for &c in bytes {
            if q_safe(c) {
                payload.push(c as char);
            } else if c == b' ' {
                payload.push('_');
            } else {
                payload.push('=');
                payload.push_str(&format!("{:02X}", c));
            }
        }
        format!("=?utf-8?q?{}?=", payload)
    }
}

/// Encodes `text` as a sequence of RFC 2047 encoded-words. Long input is
/// split so each encoded-word stays within the 75-character limit.
pub fn encode_word(text: &str) -> String {
    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in text.chars() {
        // budget: "=?utf-8?b?" + payload + "?=" must stay under 75 columns,
        // so roughly 45 raw bytes per word
        if chunk.len() + c.len_utf8() > 45 {
            words.push(encoded_word(&chunk));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(encoded_word(&chunk));
    }
    words.join(" ")
}

/// Encodes an RFC 2822 phrase (typically a display-name), using
/// encoded-words only for the words that need them.
pub fn encode_phrase(text: &str) -> String {
    let mut out = String::new();
    let mut pending = String::new();
    for word in strings::simplify(text).split(' ') {
        if strings::is_ascii(word) && !word.contains("=?") {
            if !pending.is_empty() {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(&encode_word(&pending));
                pending.clear();
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        } else {
            // adjacent non-ascii words are merged into one encoded-word so
            // the intervening space survives decoding
            if !pending.is_empty() {
                pending.push(' ');
            }
            pending.push_str(word);
        }
    }
    if !pending.is_empty() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&encode_word(&pending));
    }
    out
}

/// Encodes unstructured header text (Subject and friends): the text is
/// passed through when it is plain ASCII, and re-encoded word by word when
/// it is not.
pub fn encode_text(text: &str, avoid_utf8: bool) -> String {
    if !avoid_utf8 || strings::is_ascii(text) {
        return text.to_string();
    }
    encode_phrase(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookups() {
        assert!(Codec::for_name("ISO-8859-1").is_some());
        assert!(Codec::for_name("utf-8").is_some());
        assert!(Codec::for_name("cp-1252").is_some());
        assert!(Codec::for_name("gb2312").is_some());
        assert!(Codec::for_name("no-such-charset").is_none());
        assert!(Codec::for_name("").is_none());
        assert_eq!(Codec::for_name("US-ASCII").unwrap().name(), "us-ascii");
    }

    #[test]
    fn ascii_is_strict() {
        let (s, bad) = Codec::ascii().decode(b"hello");
        assert_eq!(s, "hello");
        assert!(!bad);
        let (_, bad) = Codec::ascii().decode(b"caf\xe9");
        assert!(bad);
        // the registry us-ascii must not silently accept 8-bit
        let (_, bad) = Codec::for_name("us-ascii").unwrap().decode(b"caf\xe9");
        assert!(bad);
    }

    #[test]
    fn latin1_decoding() {
        let (s, bad) = Codec::for_name("iso-8859-1").unwrap().decode(b"caf\xe9");
        assert_eq!(s, "café");
        assert!(!bad);
    }

    #[test]
    fn base64_round_trip() {
        let data = b"any carnal pleasure\x00\xff";
        assert_eq!(de64(e64(data, 72).as_bytes()), data.to_vec());
        // whitespace and garbage are ignored
        assert_eq!(de64(b"aGV s\nbG8="), b"hello".to_vec());
        // truncated input decodes what it can
        assert_eq!(de64(b"aGVsbG8"), b"hello".to_vec());
    }

    #[test]
    fn qp_round_trip() {
        let text = "Hello=world \u{e9}caf\r\nsecond line";
        let encoded = e_qp(text, 72);
        assert_eq!(de_qp(encoded.as_bytes(), false), text.as_bytes().to_vec());
        assert_eq!(de_qp(b"foo_bar", true), b"foo bar".to_vec());
        assert_eq!(de_qp(b"=41=42", false), b"AB".to_vec());
    }

    #[test]
    fn qp_line_length() {
        let long: String = std::iter::repeat('x').take(300).collect();
        let encoded = e_qp(&long, 72);
        for line in encoded.split("\r\n") {
            assert!(line.len() <= 72, "line too long: {}", line.len());
        }
        assert_eq!(de_qp(encoded.as_bytes(), false), long.as_bytes().to_vec());
    }

    #[test]
    fn uudecode() {
        let encoded = "begin 644 cat.txt\n#0V%T\n`\nend\n";
        assert_eq!(de_uu(encoded), b"Cat".to_vec());
    }

    #[test]
    fn qp_need_detection() {
        assert!(!needs_qp("short ascii\r\nlines"));
        assert!(needs_qp("caf\u{e9}"));
        let long: String = std::iter::repeat('y').take(100).collect();
        assert!(needs_qp(&long));
    }

    #[test]
    fn encoded_words() {
        assert_eq!(encode_text("plain", true), "plain");
        let e = encode_text("très bien", true);
        assert!(e.starts_with("=?utf-8?"), "{}", e);
        assert_eq!(encode_phrase("joe plain"), "joe plain");
    }
}
