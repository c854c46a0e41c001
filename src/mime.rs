//! The MIME header fields: Content-Type with its recovery ladder,
//! Content-Transfer-Encoding, Content-Disposition and Content-Language,
//! plus the shared `;`-separated parameter parser with its RFC 2231
//! fragment handling.

use crate::codec::Codec;
use crate::cursor::Cursor;
use crate::error::MailError;
use crate::field::{is_known_field, HeaderField};
use crate::strings;

/// A single MIME parameter. RFC 2231 splits long values into fragments
/// (`name*0=`, `name*1=`, ...); the fragments are kept by index and merged
/// into `value` once the whole field has been read.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub value: String,
    pub parts: Vec<(u32, String)>,
}

impl Parameter {
    fn new(name: &str) -> Parameter {
        Parameter {
            name: name.to_string(),
            value: String::new(),
            parts: Vec::new(),
        }
    }
}

fn value_is_token(v: &str) -> bool {
    !v.is_empty() && v.bytes().all(|c| c > 32 && c < 127 && !crate::cursor::is_tspecial(c))
}

/// Serializes `; name=value` pairs, quoting values that are not plain
/// tokens and folding so no line gets too long.
fn append_parameters(out: &mut String, params: &[Parameter]) {
    let mut col = out.rfind("\r\n").map(|p| out.len() - p - 2).unwrap_or(out.len());
    for p in params {
        let v = if value_is_token(&p.value) {
            p.value.clone()
        } else {
            strings::quote(&p.value, '"', '\\')
        };
        let piece = format!("; {}={}", p.name, v);
        if col + piece.len() > 76 {
            out.push_str(";\r\n ");
            out.push_str(&piece[2..]);
            col = 1 + piece.len() - 2;
        } else {
            out.push_str(&piece);
            col += piece.len();
        }
    }
}

fn find_parameter<'a>(params: &'a [Parameter], name: &str) -> Option<&'a Parameter> {
    params.iter().find(|p| p.name == name)
}

/// Parses `;`-separated `name=value` pairs with optional whitespace and
/// stray quotes. Stops quietly on spam of the form `c-t: ...; subject: ...`
/// and promotes a bare charset-name token to `charset=` inside
/// Content-Type.
pub(crate) fn parse_parameters(
    p: &mut Cursor,
    in_content_type: bool,
    params: &mut Vec<Parameter>,
    error: &mut Option<MailError>,
) {
    loop {
        p.comment();
        while p.present(";") || p.present("\"") {
            p.comment();
        }
        if p.at_end() {
            break;
        }

        let before = p.pos();
        let raw_name = p.mime_token().to_lowercase();
        if raw_name.is_empty() {
            // something that is not a parameter; give up on the rest
            if error.is_none() {
                *error = Some(MailError::Parse(format!(
                    "junk in parameters at position {}",
                    before
                )));
            }
            break;
        }

        p.comment();
        if !p.present("=") {
            if in_content_type
                && Codec::for_name(&raw_name).is_some()
                && find_parameter(params, "charset").is_none()
            {
                // a bare charset name; promote it to charset=
                let mut param = Parameter::new("charset");
                param.value = raw_name;
                params.push(param);
                continue;
            }
            if is_known_field(&strings::header_case(&raw_name)) && p.present(":") {
                // spam: "Content-Type: text/plain; subject: ..." - stop
                // believing anything that follows
                break;
            }
            if error.is_none() {
                *error = Some(MailError::Parse(format!(
                    "expected '=' after parameter name {:?}",
                    raw_name
                )));
            }
            break;
        }

        p.comment();

        let mut value;
        if p.next_char() == b'"' {
            value = p.string();
        } else {
            value = p.mime_value();
            // absorb dot-atoms and further tokens; boundaries and filenames
            // in the wild contain characters a strict token may not
            loop {
                let c = p.next_char();
                if c == b'.' {
                    p.step(1);
                    value.push('.');
                    value.push_str(&p.mime_token());
                } else if c == b'=' || c == b'@' || c == b'/' || c == b':' || c == b',' {
                    p.step(1);
                    value.push(c as char);
                    value.push_str(&p.mime_token());
                } else {
                    break;
                }
            }
        }

        // RFC 2231: name*N is fragment N of the parameter
        let mut fragment = None;
        let mut name = raw_name.clone();
        if raw_name.contains('*') {
            let base = strings::section(&raw_name, "*", 1).to_string();
            let ix = strings::section(&raw_name, "*", 2);
            if let Ok(n) = ix.parse::<u32>() {
                fragment = Some(n);
                name = base;
            } else {
                name = base;
            }
        }

        match params.iter_mut().find(|p| p.name == name) {
            Some(param) => {
                if let Some(ix) = fragment {
                    param.parts.push((ix, value));
                } else if param.value.is_empty() {
                    param.value = value;
                }
            }
            None => {
                let mut param = Parameter::new(&name);
                if let Some(ix) = fragment {
                    param.parts.push((ix, value));
                } else {
                    param.value = value;
                }
                params.push(param);
            }
        }

        if p.pos() == before {
            break;
        }
    }

    // merge RFC 2231 fragments in integer order
    for param in params.iter_mut() {
        if !param.parts.is_empty() {
            param.parts.sort_by_key(|&(ix, _)| ix);
            let mut merged = String::new();
            for (_, part) in &param.parts {
                merged.push_str(part);
            }
            param.value = merged;
        }
    }
}

/// The Content-Type field: a type/subtype pair and an ordered parameter
/// list. Parsing is aggressively tolerant; see the recovery ladder in
/// `parse`.
#[derive(Debug, Clone)]
pub struct ContentType {
    pub hf: HeaderField,
    pub type_: String,
    pub subtype: String,
    pub parameters: Vec<Parameter>,
}

impl ContentType {
    pub fn new() -> ContentType {
        ContentType {
            hf: HeaderField::named("Content-Type"),
            type_: String::new(),
            subtype: String::new(),
            parameters: Vec::new(),
        }
    }

    pub fn parameter(&self, name: &str) -> &str {
        find_parameter(&self.parameters, name)
            .map(|p| p.value.as_str())
            .unwrap_or("")
    }

    pub fn add_parameter(&mut self, name: &str, value: &str) {
        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(p) => p.value = value.to_string(),
            None => {
                let mut p = Parameter::new(name);
                p.value = value.to_string();
                self.parameters.push(p);
            }
        }
    }

    pub fn remove_parameter(&mut self, name: &str) {
        self.parameters.retain(|p| p.name != name);
    }

    pub fn parse(&mut self, s: &str) {
        let mut p = Cursor::new(s.as_bytes());
        p.whitespace();
        while p.present(":") {
            p.whitespace();
        }

        if p.at_end() {
            // empty content-type, as in "Content-Type:\r\n"
            self.type_ = "text".into();
            self.subtype = "plain".into();
            self.finish();
            return;
        }

        let mut error = None;
        self.type_ = p.mime_token().to_lowercase();
        p.comment();

        if p.present("/") {
            self.subtype = p.mime_token().to_lowercase();
            p.comment();
            if self.subtype.is_empty() {
                error = Some(MailError::Generic("empty subtype"));
            }
        } else if p.at_end() || p.next_char() == b';' {
            // a bare type; RFC 1049 allowed that for a few names
            match self.type_.as_str() {
                "text" => {
                    self.subtype = "plain".into();
                }
                "postscript" => {
                    self.type_ = "application".into();
                    self.subtype = "postscript".into();
                }
                "sgml" => {
                    self.type_ = "text".into();
                    self.subtype = "sgml".into();
                }
                "tex" => {
                    self.type_ = "application".into();
                    self.subtype = "x-tex".into();
                }
                "troff" => {
                    self.type_ = "application".into();
                    self.subtype = "x-troff".into();
                }
                "dvi" => {
                    self.type_ = "application".into();
                    self.subtype = "x-dvi".into();
                }
                _ => {
                    // an unknown bare word: treat the body as opaque bytes
                    // but remember what the sender said
                    let original = self.type_.clone();
                    self.type_ = "application".into();
                    self.subtype = "octet-stream".into();
                    self.add_parameter("original-type", &original);
                }
            }
        } else if self.type_.is_empty() || p.next_char() == b'=' {
            // a leading '/', a ';' with no type, or 'name=value' with no
            // type at all: assume text/plain and treat the rest (or the
            // whole input) as parameters
            self.type_ = "text".into();
            self.subtype = "plain".into();
            p = Cursor::new(s.as_bytes());
            p.whitespace();
            while p.present(":") || p.present("/") || p.present(";") {
                p.whitespace();
            }
        } else {
            error = Some(MailError::Parse(format!(
                "expected '/' after type {:?}",
                self.type_
            )));
        }

        parse_parameters(&mut p, true, &mut self.parameters, &mut error);

        if self.subtype.is_empty() && error.is_some() {
            // try to infer a subtype from the file name
            let filename = {
                let n = self.parameter("name");
                if n.is_empty() {
                    self.parameter("filename").to_string()
                } else {
                    n.to_string()
                }
            };
            let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
            match ext.as_str() {
                "jpg" | "jpeg" => {
                    self.type_ = "image".into();
                    self.subtype = "jpeg".into();
                    error = None;
                }
                "htm" | "html" => {
                    self.type_ = "text".into();
                    self.subtype = "html".into();
                    error = None;
                }
                _ => {
                    if self.type_ == "text" {
                        self.subtype = "plain".into();
                        error = None;
                    } else {
                        self.type_ = "application".into();
                        self.subtype = "octet-stream".into();
                        error = None;
                    }
                }
            }
        }

        if self.type_ == "multipart"
            && self.subtype == "appledouble"
            && self.parameter("boundary").is_empty()
        {
            // multipart/appledouble without a boundary cannot be split;
            // single-part appledouble exists in the wild
            self.type_ = "application".into();
            self.subtype = "octet-stream".into();
        }

        if self.type_ == "multipart"
            && self.parameter("boundary").is_empty()
            && s.to_lowercase().contains("boundary")
        {
            // a second, more permissive pass to scavenge the boundary
            let lower = s.to_lowercase();
            if let Some(ix) = lower.find("boundary") {
                let after = s[ix + "boundary".len()..]
                    .trim_start_matches(|c: char| " \t\r\n=:".contains(c));
                let v = if after.starts_with('"') {
                    match after[1..].find('"') {
                        Some(q) => &after[..q + 2],
                        None => &after[1..],
                    }
                } else {
                    after.split(|c: char| c == ';' || c.is_whitespace()).next().unwrap_or("")
                };
                let mut b = strings::simplify(&strings::unquote(strings::trim(v), '"', '\''));
                b = b.replace('\\', "");
                if !b.is_empty() {
                    self.add_parameter("boundary", &b);
                    error = None;
                }
            }
        }

        if self.type_ == "multipart" && self.parameter("boundary").is_empty() {
            error = Some(MailError::Generic("multipart without boundary"));
        }

        self.hf.error = error;
        self.finish();
    }

    fn finish(&mut self) {
        self.hf.value = format!("{}/{}", self.type_, self.subtype);
    }

    pub fn rfc822(&self) -> String {
        let mut out = format!("{}/{}", self.type_, self.subtype);
        append_parameters(&mut out, &self.parameters);
        out
    }
}

impl Default for ContentType {
    fn default() -> ContentType {
        ContentType::new()
    }
}

/// The transfer encodings a body can declare. `Binary` covers 7bit, 8bit
/// and binary alike: all three mean "no transformation".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Binary,
    QuotedPrintable,
    Base64,
    Uuencode,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Binary => "7bit",
            Encoding::QuotedPrintable => "quoted-printable",
            Encoding::Base64 => "base64",
            Encoding::Uuencode => "x-uuencode",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentTransferEncoding {
    pub hf: HeaderField,
    pub encoding: Encoding,
}

impl ContentTransferEncoding {
    pub fn new() -> ContentTransferEncoding {
        ContentTransferEncoding {
            hf: HeaderField::named("Content-Transfer-Encoding"),
            encoding: Encoding::Binary,
        }
    }

    pub fn parse(&mut self, s: &str) {
        let mut p = Cursor::new(s.as_bytes());
        p.comment();
        let t = strings::simplify(&p.mime_value()).to_lowercase();
        p.comment();

        self.encoding = if t == "7bit" || t == "8bit" || t == "8bits" || t == "binary"
            || t == "unknown"
        {
            Encoding::Binary
        } else if t == "quoted-printable" {
            Encoding::QuotedPrintable
        } else if t == "base64" {
            Encoding::Base64
        } else if t == "x-uuencode" || t == "uuencode" || t == "x-uue" {
            Encoding::Uuencode
        } else if t.contains("bit") && t.starts_with(|c: char| c.is_ascii_digit()) {
            // "7 bits", "8-bit" and other variations on the theme
            Encoding::Binary
        } else {
            self.hf.error = Some(MailError::Parse(format!(
                "invalid content-transfer-encoding: {:?}",
                t
            )));
            Encoding::Binary
        };
        self.hf.value = self.encoding.name().to_string();
    }

    pub fn rfc822(&self) -> String {
        self.encoding.name().to_string()
    }
}

impl Default for ContentTransferEncoding {
    fn default() -> ContentTransferEncoding {
        ContentTransferEncoding::new()
    }
}

#[derive(Debug, Clone)]
pub struct ContentDisposition {
    pub hf: HeaderField,
    pub disposition: String,
    pub parameters: Vec<Parameter>,
}

impl ContentDisposition {
    pub fn new() -> ContentDisposition {
        ContentDisposition {
            hf: HeaderField::named("Content-Disposition"),
            disposition: "attachment".to_string(),
            parameters: Vec::new(),
        }
    }

    pub fn parameter(&self, name: &str) -> &str {
        find_parameter(&self.parameters, name)
            .map(|p| p.value.as_str())
            .unwrap_or("")
    }

    pub fn parse(&mut self, s: &str) {
        let mut p = Cursor::new(s.as_bytes());
        p.comment();
        let t = p.mime_token().to_lowercase();
        // RFC 2183: unrecognized disposition types must be treated as
        // "attachment"
        self.disposition = if t == "inline" { "inline".into() } else { "attachment".into() };
        let mut error = None;
        parse_parameters(&mut p, false, &mut self.parameters, &mut error);
        self.hf.error = error;
        self.hf.value = self.disposition.clone();
    }

    pub fn rfc822(&self) -> String {
        let mut out = self.disposition.clone();
        append_parameters(&mut out, &self.parameters);
        out
    }
}

impl Default for ContentDisposition {
    fn default() -> ContentDisposition {
        ContentDisposition::new()
    }
}

#[derive(Debug, Clone)]
pub struct ContentLanguage {
    pub hf: HeaderField,
    pub languages: Vec<String>,
}

impl ContentLanguage {
    pub fn new() -> ContentLanguage {
        ContentLanguage {
            hf: HeaderField::named("Content-Language"),
            languages: Vec::new(),
        }
    }

    pub fn parse(&mut self, s: &str) {
        let mut p = Cursor::new(s.as_bytes());
        loop {
            p.comment();
            let t = p.mime_token();
            if !t.is_empty() {
                self.languages.push(t);
            }
            p.comment();
            if !p.present(",") {
                break;
            }
        }
        if !p.at_end() || self.languages.is_empty() {
            self.hf.error = Some(MailError::Generic("unparsable content-language"));
        }
        self.hf.value = self.languages.join(", ");
    }

    pub fn rfc822(&self) -> String {
        self.languages.join(", ")
    }
}

impl Default for ContentLanguage {
    fn default() -> ContentLanguage {
        ContentLanguage::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ct(s: &str) -> ContentType {
        let mut c = ContentType::new();
        c.parse(s);
        c
    }

    #[test]
    fn plain_content_type() {
        let c = ct("text/html; charset=utf-8");
        assert_eq!(c.type_, "text");
        assert_eq!(c.subtype, "html");
        assert_eq!(c.parameter("charset"), "utf-8");
        assert!(c.hf.valid());
    }

    #[test]
    fn quoted_parameter() {
        let c = ct("multipart/mixed; boundary=\"a b c\"");
        assert_eq!(c.parameter("boundary"), "a b c");
    }

    #[test]
    fn empty_means_text_plain() {
        let c = ct("");
        assert_eq!(c.hf.value(), "text/plain");
    }

    #[test]
    fn bare_text() {
        let c = ct("text");
        assert_eq!(c.hf.value(), "text/plain");
    }

    #[test]
    fn rfc_1049_types() {
        assert_eq!(ct("postscript").hf.value(), "application/postscript");
        assert_eq!(ct("sgml").hf.value(), "text/sgml");
    }

    #[test]
    fn unknown_bare_type() {
        let c = ct("weirdness");
        assert_eq!(c.hf.value(), "application/octet-stream");
        assert_eq!(c.parameter("original-type"), "weirdness");
    }

    #[test]
    fn parameter_with_no_type() {
        let c = ct("charset=iso-8859-1");
        assert_eq!(c.hf.value(), "text/plain");
        assert_eq!(c.parameter("charset"), "iso-8859-1");
    }

    #[test]
    fn bare_charset_is_promoted() {
        let c = ct("text/plain; iso-8859-1");
        assert_eq!(c.parameter("charset"), "iso-8859-1");
    }

    #[test]
    fn spam_header_names_stop_parsing() {
        let c = ct("text/plain; subject: buy stuff now");
        assert_eq!(c.hf.value(), "text/plain");
        assert_eq!(c.parameter("subject"), "");
    }

    #[test]
    fn rfc2231_fragments_merge() {
        let c = ct("application/pdf; name*1=two; name*0=one");
        assert_eq!(c.parameter("name"), "onetwo");
    }

    #[test]
    fn boundary_scavenging() {
        // no '=' at all, but the word "boundary" and a value are there
        let c = ct("multipart/mixed; boundary \"next-part\"");
        assert_eq!(c.parameter("boundary"), "next-part");
        assert!(c.hf.valid());
    }

    #[test]
    fn multipart_without_boundary_is_an_error() {
        let c = ct("multipart/mixed");
        assert!(!c.hf.valid());
    }

    #[test]
    fn appledouble_demotion() {
        let c = ct("multipart/appledouble");
        assert_eq!(c.hf.value(), "application/octet-stream");
    }

    #[test]
    fn content_type_round_trip() {
        let c = ct("text/html; charset=utf-8");
        let mut again = ContentType::new();
        again.parse(&c.rfc822());
        assert_eq!(again.rfc822(), c.rfc822());
    }

    #[test]
    fn transfer_encodings() {
        let mut e = ContentTransferEncoding::new();
        e.parse("base64");
        assert_eq!(e.encoding, Encoding::Base64);
        e.parse(" Quoted-Printable ");
        assert_eq!(e.encoding, Encoding::QuotedPrintable);
        e.parse("x-uuencode");
        assert_eq!(e.encoding, Encoding::Uuencode);
        e.parse("7bit");
        assert_eq!(e.encoding, Encoding::Binary);
        e.parse("8 bits");
        assert_eq!(e.encoding, Encoding::Binary);

        let mut bad = ContentTransferEncoding::new();
        bad.parse("florble");
        assert!(!bad.hf.valid());
    }

    #[test]
    fn dispositions() {
        let mut d = ContentDisposition::new();
        d.parse("inline");
        assert_eq!(d.disposition, "inline");
        d.parse("attachment; filename=a.txt");
        assert_eq!(d.disposition, "attachment");
        assert_eq!(d.parameter("filename"), "a.txt");
        // RFC 2183: unknown dispositions are attachments
        let mut u = ContentDisposition::new();
        u.parse("unheard-of");
        assert_eq!(u.disposition, "attachment");
    }

    #[test]
    fn languages() {
        let mut l = ContentLanguage::new();
        l.parse("en, de");
        assert_eq!(l.languages, vec!["en", "de"]);
        assert!(l.hf.valid());
    }
}
