//! The polymorphic field model: a tagged union of field kinds, each with
//! its own parse and serialize, sharing a common core of canonical name,
//! parsed value, raw unparsed value and error slot.

use chrono::{DateTime, FixedOffset};

use crate::address::{Address, AddressKind, AddressParser};
use crate::codec;
use crate::cursor::Cursor;
use crate::date;
use crate::error::MailError;
use crate::mime::{ContentDisposition, ContentLanguage, ContentTransferEncoding, ContentType};
use crate::strings;

/// The header field names this crate knows something about. Unknown names
/// parse as unstructured fields and are always valid.
pub(crate) static FIELD_NAMES: &[&str] = &[
    "From",
    "Resent-From",
    "Sender",
    "Resent-Sender",
    "Return-Path",
    "Reply-To",
    "To",
    "Cc",
    "Bcc",
    "Resent-To",
    "Resent-Cc",
    "Resent-Bcc",
    "Message-Id",
    "Resent-Message-Id",
    "In-Reply-To",
    "References",
    "Date",
    "Orig-Date",
    "Resent-Date",
    "Subject",
    "Comments",
    "Keywords",
    "Content-Type",
    "Content-Transfer-Encoding",
    "Content-Disposition",
    "Content-Description",
    "Content-Id",
    "Mime-Version",
    "Received",
    "Content-Language",
    "Content-Location",
    "Content-Md5",
    "List-Id",
    "Content-Base",
    "Errors-To",
];

pub(crate) fn is_known_field(name: &str) -> bool {
    FIELD_NAMES.contains(&name)
}

fn is_address_field_name(name: &str) -> bool {
    matches!(
        name,
        "From"
            | "Resent-From"
            | "Sender"
            | "Resent-Sender"
            | "Return-Path"
            | "Reply-To"
            | "To"
            | "Cc"
            | "Bcc"
            | "Resent-To"
            | "Resent-Cc"
            | "Resent-Bcc"
            | "Message-Id"
            | "Content-Id"
            | "Resent-Message-Id"
            | "References"
    )
}

/// The common core every field variant carries.
#[derive(Debug, Clone, Default)]
pub struct HeaderField {
    pub(crate) name: String,
    pub(crate) value: String,
    pub(crate) unparsed: Option<String>,
    pub(crate) error: Option<MailError>,
}

impl HeaderField {
    pub(crate) fn named(name: &str) -> HeaderField {
        HeaderField {
            name: strings::header_case(name),
            value: String::new(),
            unparsed: None,
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&MailError> {
        self.error.as_ref()
    }

    pub fn unparsed_value(&self) -> &str {
        self.unparsed.as_deref().unwrap_or("")
    }

    /// Parses the *text production from `s`, as modified to include
    /// encoded-words by RFC 2047. Used for Subject, Comments and
    /// Content-Description.
    fn parse_text(&mut self, s: &str) {
        let mut handled = false;

        let mut p = Cursor::new(s.as_bytes());
        let t = p.text();
        if p.at_end() {
            self.value = strings::trim(&t).to_string();
            handled = true;
        }

        if !handled {
            let simplified = strings::simplify(s);
            let mut p = Cursor::new(simplified.as_bytes());
            let t = p.text();
            if p.at_end() {
                self.value = t;
                handled = true;
            }
        }

        if (!handled && s.contains("=?") && s.contains("?="))
            || (self.value.contains("=?") && self.value.contains("?="))
        {
            // common: Subject: =?ISO-8859-1?q?foo bar baz?=
            // unusual, but seen: Subject: =?ISO-8859-1?q?foo bar?= baz
            let simplified = strings::simplify(s);
            let mut p1 = Cursor::new(simplified.as_bytes());
            let mut tmp = String::new();
            let mut in_word = false;
            while !p1.at_end() {
                if p1.present("=?") {
                    in_word = true;
                    tmp.push_str(" =?");
                } else if p1.present("?=") {
                    in_word = false;
                    tmp.push_str("?= ");
                } else if p1.whitespace().is_empty() {
                    tmp.push(p1.next_char() as char);
                    p1.step(1);
                } else if in_word {
                    tmp.push('_');
                } else {
                    tmp.push(' ');
                }
            }
            let mut p2 = Cursor::new(tmp.as_bytes());
            let t = strings::simplify(&p2.text());
            if p2.at_end() && !t.contains("?=") {
                self.value = t;
                handled = true;
            }
        }

        if !handled {
            self.error = Some(MailError::Generic("Error parsing text"));
        }
    }

    /// Parses the Mime-Version field and resolutely ignores all problems
    /// seen. Only version 1.0 is legal; since vast numbers of spammers send
    /// other version numbers, those become 1.0 plus a comment.
    fn parse_mime_version(&mut self, s: &str) {
        let mut p = Cursor::new(s.as_bytes());
        p.comment();
        let v = p.dot_atom();
        p.comment();
        let (mut c, bad) = codec::to_ascii(p.last_comment());
        if bad || c.contains('(') || c.contains(')') || c.contains('\\') {
            c = String::new();
        }
        if v != "1.0" || !p.at_end() {
            c = "Note: Original mime-version had syntax problems".to_string();
        }
        self.value = if c.is_empty() {
            "1.0".to_string()
        } else {
            format!("1.0({})", c)
        };
    }

    /// Parses a Content-Location field: an RFC 1738 URL, with stray bytes
    /// percent-escaped and common damage absorbed.
    fn parse_content_location(&mut self, s: &str) {
        let unquoted = strings::unquote(strings::trim(s), '"', '\'');
        let mut p = Cursor::new(unquoted.as_bytes());

        p.whitespace();
        let mut e = p.pos();
        let mut buf = String::new();
        let mut ok = true;
        while ok && !p.at_end() {
            let mut c = p.next_char();
            p.step(1);
            if c == b'%' {
                let h1 = p.next_char();
                p.step(1);
                let h2 = p.next_char();
                p.step(1);
                match u8::from_str_radix(&format!("{}{}", h1 as char, h2 as char), 16) {
                    Ok(v) => c = v,
                    Err(_) => ok = false,
                }
            }

            if c.is_ascii_alphanumeric()
                || matches!(c, b'$' | b'-' | b'_' | b'.' | b'+' | b'!' | b'*' | b'\'' | b'(' | b')' | b',')
            {
                // RFC 1738 unreserved
                buf.push(c as char);
            } else if matches!(c, b';' | b'/' | b'?' | b':' | b'@' | b'&' | b'=') {
                // RFC 1738 reserved
                buf.push(c as char);
            } else if c == b'%' || c >= 127 {
                // RFC 1738 escape
                buf.push_str(&format!("%{:02x}", c));
            } else if c == b' ' {
                // seen in real life, sent by buggy programs
                buf.push_str("%20");
            } else if c == b'\r' || c == b'\n' {
                // another kind of bug; absorb the line break quietly
                p.whitespace();
            } else {
                ok = false;
            }
            if ok {
                e = p.pos();
            }
        }
        p.whitespace();

        self.value = buf;
        if !p.at_end() {
            self.error = Some(MailError::Parse(format!(
                "junk at position {}: {}",
                e,
                unquoted.get(e..).unwrap_or("")
            )));
        }
    }

    /// Content-Base is a URL which must be absolute, which we check rather
    /// loosely: a colon somewhere makes it absolute enough.
    fn parse_content_base(&mut self, s: &str) {
        self.parse_content_location(s);
        if !self.valid() {
            return;
        }
        if !self.value.contains(':') {
            self.error = Some(MailError::Generic("URL has no scheme"));
        }
    }

    /// Stores localpart@domain if the field looks like a single reasonably
    /// error-free address, and an empty value if there is any doubt what to
    /// store. Never an error.
    fn parse_errors_to(&mut self, s: &str) {
        let p = AddressParser::new(s);
        if p.error().is_none() && p.addresses.len() == 1 {
            let a = &p.addresses[0];
            if a.kind() == AddressKind::Normal && a.valid() {
                self.value = a.lpdomain().to_lowercase();
            }
        }
    }

    /// Any otherwise uncovered (and presumably unstructured) field; an
    /// error is recorded if it contains NULs or 8-bit bytes.
    fn parse_other(&mut self, s: &str) {
        let (v, bad) = codec::to_ascii(s);
        if bad || s.contains('\0') {
            self.error = Some(MailError::Encoding(
                "NUL or 8-bit byte in header field".to_string(),
            ));
        }
        self.value = v;
    }
}

/// An address field: From, To, Message-Id, References and their relatives.
/// Holds the parsed address list; field-specific forgiveness is applied on
/// top of what the address parser reports.
#[derive(Debug, Clone)]
pub struct AddressField {
    pub hf: HeaderField,
    pub addresses: Vec<Address>,
}

impl AddressField {
    pub fn named(name: &str) -> AddressField {
        AddressField {
            hf: HeaderField::named(name),
            addresses: Vec::new(),
        }
    }

    fn parse(&mut self, s: &str) {
        match self.hf.name.as_str() {
            "Sender" | "Resent-Sender" => {
                self.parse_mailbox(s);
                if self.hf.name == "Sender" && !self.hf.valid() {
                    // a broken Sender is not worth an error; the header
                    // will drop the field
                    self.hf.error = None;
                }
            }
            "Return-Path" => {
                self.parse_mailbox(s);
                if self.addresses.len() == 1 {
                    let k = self.addresses[0].kind();
                    if k != AddressKind::Normal && k != AddressKind::Bounce {
                        self.hf.error = None;
                        self.addresses.clear();
                    }
                }
            }
            "From" | "Resent-From" => self.parse_mailbox_list(s),
            "To" | "Cc" | "Bcc" | "Reply-To" | "Resent-To" | "Resent-Cc" | "Resent-Bcc" => {
                self.parse_address_list(s)
            }
            "Content-Id" => self.parse_content_id(s),
            "Message-Id" | "Resent-Message-Id" => self.parse_message_id(s),
            "References" => self.parse_references(s),
            _ => self.parse_address_list(s),
        }

        // <> may appear only in Return-Path
        if self.hf.name != "Return-Path"
            && self.hf.valid()
            && self
                .addresses
                .iter()
                .any(|a| a.kind() == AddressKind::Bounce)
        {
            self.hf.error = Some(MailError::Generic(
                "No-bounce: <> is not a legal address here",
            ));
        }

        self.hf.value = self.rfc822(false);
    }

    fn parse_mailbox(&mut self, s: &str) {
        let p = AddressParser::new(s);
        self.hf.error = p.error().cloned();
        self.addresses = p.addresses;
        if self.hf.valid() && self.addresses.len() > 1 {
            self.hf.error = Some(MailError::Generic("expected a single address"));
        }
    }

    fn parse_mailbox_list(&mut self, s: &str) {
        let p = AddressParser::new(s);
        self.hf.error = p.error().cloned();
        self.addresses = p.addresses;
        if self.hf.valid() {
            if let Some(g) = self
                .addresses
                .iter()
                .find(|a| a.kind() == AddressKind::EmptyGroup)
            {
                self.hf.error = Some(MailError::Parse(format!(
                    "groups are not allowed here: {}",
                    g.rfc822(false)
                )));
            }
        }
    }

    fn parse_address_list(&mut self, s: &str) {
        let p = AddressParser::new(s);
        self.hf.error = p.error().cloned();
        self.addresses = p.addresses;

        if !self.hf.valid() && s.contains('~') {
            // leftovers from the /bin/mail escape key
            let stripped: String = s.chars().filter(|&c| c != '~').collect();
            let p = AddressParser::new(&stripped);
            if p.error().is_none() {
                self.addresses = p.addresses;
                self.hf.error = None;
                return;
            }
        }

        if s.contains("<>")
            && (!self.hf.valid()
                || self
                    .addresses
                    .iter()
                    .any(|a| a.kind() == AddressKind::Bounce))
        {
            // "To: <>" and friends; removing the <> often leaves a
            // parsable remnant
            let stripped = s.replace("<>", "");
            if !strings::simplify(&stripped).is_empty() {
                let p = AddressParser::new(&stripped);
                if p.error().is_none() {
                    self.addresses = p.addresses;
                    self.hf.error = None;
                    return;
                }
            }
        }

        // garbage that doesn't even contain an @ is silently dropped, both
        // when the parse failed and when stray words rode along with real
        // addresses
        let has_normal = self
            .addresses
            .iter()
            .any(|a| a.kind() == AddressKind::Normal);
        if !self.hf.valid() || has_normal {
            let had = self.addresses.len();
            self.addresses.retain(|a| {
                matches!(
                    a.kind(),
                    AddressKind::Normal | AddressKind::EmptyGroup | AddressKind::Bounce
                )
            });
            if self.addresses.len() < had && !self.hf.valid() {
                self.hf.error = None;
            }
        }
    }

    fn parse_content_id(&mut self, s: &str) {
        let p = AddressParser::new(s);
        self.hf.error = p.error().cloned();
        self.addresses = p.addresses;
        if self.addresses.len() != 1 {
            self.hf.error = Some(MailError::Generic("exactly one content-id required"));
        } else {
            match self.addresses[0].kind() {
                AddressKind::Normal | AddressKind::Local => {}
                _ => {
                    self.hf.error = Some(MailError::Generic("invalid content-id"));
                }
            }
        }
    }

    fn parse_message_id(&mut self, s: &str) {
        let p = AddressParser::references(s);
        self.addresses = p.addresses;
        if self.addresses.len() != 1 {
            self.addresses.clear();
            self.hf.error = Some(MailError::Generic("exactly one message-id required"));
        }
    }

    fn parse_references(&mut self, s: &str) {
        let p = AddressParser::references(s);
        self.addresses = p.addresses;
    }

    /// Serializes the address list per the field's own folding rules.
    pub fn rfc822(&self, avoid_utf8: bool) -> String {
        match self.hf.name.as_str() {
            "Return-Path" => match self.addresses.first() {
                Some(a) if a.kind() == AddressKind::Bounce => "<>".to_string(),
                Some(a) if a.kind() == AddressKind::Normal => {
                    format!("<{}>", a.lpdomain())
                }
                _ => String::new(),
            },
            "Message-Id" | "Resent-Message-Id" | "Content-Id" => match self.addresses.first() {
                Some(a) => format!("<{}>", a.lpdomain()),
                None => {
                    let raw = if self.hf.value.is_empty() {
                        self.hf.unparsed_value()
                    } else {
                        &self.hf.value
                    };
                    strings::fold(raw, self.hf.name.len() + 2, 78)
                }
            },
            "References" => {
                let mut out = String::new();
                let mut col = self.hf.name.len() + 2;
                for a in &self.addresses {
                    let s = format!("<{}@{}>", a.localpart, a.domain);
                    if !out.is_empty() {
                        if col + 1 + s.len() > 78 {
                            out.push_str("\r\n ");
                            col = 1;
                        } else {
                            out.push(' ');
                            col += 1;
                        }
                    }
                    col += s.len();
                    out.push_str(&s);
                }
                out
            }
            _ => {
                let mut out = String::new();
                let mut col = self.hf.name.len() + 2;
                let mut first = true;
                for a in &self.addresses {
                    let s = a.rfc822(avoid_utf8);
                    if s.is_empty() {
                        continue;
                    }
                    if !first {
                        out.push(',');
                        col += 1;
                        if col + 1 + s.len() >= 78 {
                            out.push_str("\r\n    ");
                            col = 4;
                        } else {
                            out.push(' ');
                            col += 1;
                        }
                    }
                    col += s.len();
                    out.push_str(&s);
                    first = false;
                }
                out
            }
        }
    }
}

/// A Date (or Orig-Date / Resent-Date) field.
#[derive(Debug, Clone)]
pub struct DateField {
    pub hf: HeaderField,
    pub date: Option<DateTime<FixedOffset>>,
}

impl DateField {
    pub fn named(name: &str) -> DateField {
        DateField {
            hf: HeaderField::named(name),
            date: None,
        }
    }

    fn parse(&mut self, s: &str) {
        self.date = date::parse_date(s);
        match &self.date {
            Some(d) => self.hf.value = date::format_date(d),
            None => {
                self.hf.error = Some(MailError::Parse(format!("invalid date: {:?}", s)));
            }
        }
    }
}

/// A header field. The variant picks the parse and serialize behavior; all
/// variants share the `HeaderField` core.
#[derive(Debug, Clone)]
pub enum Field {
    Plain(HeaderField),
    Addresses(AddressField),
    Date(DateField),
    ContentType(ContentType),
    ContentTransferEncoding(ContentTransferEncoding),
    ContentDisposition(ContentDisposition),
    ContentLanguage(ContentLanguage),
}

impl Field {
    /// Instantiates the right variant for `name` (header-cased), parses
    /// `value`, and retries after skipping leading ':' and spaces when the
    /// first attempt fails. A field that fails both attempts keeps its raw
    /// unparsed value.
    pub fn new(name: &str, value: &str) -> Field {
        let mut f = Field::named(name);
        f.parse(value);
        if f.valid() {
            return f;
        }

        // tolerate "Header: : value" and similar stuttering
        let skipped = value.trim_start_matches(|c| c == ':' || c == ' ');
        if skipped.len() != value.len() {
            let mut again = Field::named(name);
            again.parse(skipped);
            if again.valid() {
                return again;
            }
        }

        f.hf_mut().unparsed = Some(value.to_string());
        f
    }

    /// Instantiates the right (empty) variant for `name`.
    pub fn named(name: &str) -> Field {
        let n = strings::header_case(name);
        match n.as_str() {
            _ if is_address_field_name(&n) => Field::Addresses(AddressField::named(&n)),
            "Date" | "Orig-Date" | "Resent-Date" => Field::Date(DateField::named(&n)),
            "Content-Type" => Field::ContentType(ContentType::new()),
            "Content-Transfer-Encoding" => {
                Field::ContentTransferEncoding(ContentTransferEncoding::new())
            }
            "Content-Disposition" => Field::ContentDisposition(ContentDisposition::new()),
            "Content-Language" => Field::ContentLanguage(ContentLanguage::new()),
            _ => Field::Plain(HeaderField::named(&n)),
        }
    }

    pub(crate) fn parse(&mut self, value: &str) {
        match self {
            Field::Plain(hf) => match hf.name.clone().as_str() {
                "Subject" | "Comments" | "Content-Description" => hf.parse_text(value),
                "Mime-Version" => hf.parse_mime_version(value),
                "Content-Location" => hf.parse_content_location(value),
                "Content-Base" => hf.parse_content_base(value),
                "Errors-To" => hf.parse_errors_to(value),
                _ => hf.parse_other(value),
            },
            Field::Addresses(f) => f.parse(value),
            Field::Date(f) => f.parse(value),
            Field::ContentType(f) => f.parse(value),
            Field::ContentTransferEncoding(f) => f.parse(value),
            Field::ContentDisposition(f) => f.parse(value),
            Field::ContentLanguage(f) => f.parse(value),
        }
    }

    pub(crate) fn hf(&self) -> &HeaderField {
        match self {
            Field::Plain(hf) => hf,
            Field::Addresses(f) => &f.hf,
            Field::Date(f) => &f.hf,
            Field::ContentType(f) => &f.hf,
            Field::ContentTransferEncoding(f) => &f.hf,
            Field::ContentDisposition(f) => &f.hf,
            Field::ContentLanguage(f) => &f.hf,
        }
    }

    pub(crate) fn hf_mut(&mut self) -> &mut HeaderField {
        match self {
            Field::Plain(hf) => hf,
            Field::Addresses(f) => &mut f.hf,
            Field::Date(f) => &mut f.hf,
            Field::ContentType(f) => &mut f.hf,
            Field::ContentTransferEncoding(f) => &mut f.hf,
            Field::ContentDisposition(f) => &mut f.hf,
            Field::ContentLanguage(f) => &mut f.hf,
        }
    }

    pub fn name(&self) -> &str {
        self.hf().name()
    }

    pub fn value(&self) -> &str {
        self.hf().value()
    }

    pub fn valid(&self) -> bool {
        self.hf().valid()
    }

    pub fn error(&self) -> Option<&MailError> {
        self.hf().error()
    }

    pub fn unparsed_value(&self) -> &str {
        self.hf().unparsed_value()
    }

    pub fn as_addresses(&self) -> Option<&AddressField> {
        match self {
            Field::Addresses(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_addresses_mut(&mut self) -> Option<&mut AddressField> {
        match self {
            Field::Addresses(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_content_type(&self) -> Option<&ContentType> {
        match self {
            Field::ContentType(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_content_type_mut(&mut self) -> Option<&mut ContentType> {
        match self {
            Field::ContentType(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_transfer_encoding(&self) -> Option<&ContentTransferEncoding> {
        match self {
            Field::ContentTransferEncoding(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_transfer_encoding_mut(&mut self) -> Option<&mut ContentTransferEncoding> {
        match self {
            Field::ContentTransferEncoding(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_disposition(&self) -> Option<&ContentDisposition> {
        match self {
            Field::ContentDisposition(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_language(&self) -> Option<&ContentLanguage> {
        match self {
            Field::ContentLanguage(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateField> {
        match self {
            Field::Date(f) => Some(f),
            _ => None,
        }
    }

    /// The canonical serialized form of this field's value (without the
    /// `Name: ` prefix). Invalid fields reproduce their raw input so
    /// nothing is lost in a round trip.
    pub fn rfc822(&self, avoid_utf8: bool) -> String {
        if !self.valid() {
            if let Some(raw) = &self.hf().unparsed {
                return raw.clone();
            }
        }
        match self {
            Field::Plain(hf) => match hf.name.as_str() {
                "Subject" | "Comments" | "Content-Description" => {
                    codec::encode_text(&hf.value, avoid_utf8)
                }
                _ => hf.value.clone(),
            },
            Field::Addresses(f) => f.rfc822(avoid_utf8),
            Field::Date(f) => f.hf.value.clone(),
            Field::ContentType(f) => f.rfc822(),
            Field::ContentTransferEncoding(f) => f.rfc822(),
            Field::ContentDisposition(f) => f.rfc822(),
            Field::ContentLanguage(f) => f.rfc822(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_are_permissive() {
        let f = Field::new("X-Whatever", "anything at all");
        assert!(f.valid());
        assert_eq!(f.name(), "X-Whatever");
        assert_eq!(f.value(), "anything at all");
    }

    #[test]
    fn eight_bit_in_unstructured_other() {
        let f = Field::new("In-Reply-To", "caf\u{e9}");
        assert!(!f.valid());
    }

    #[test]
    fn subject_plain() {
        let f = Field::new("Subject", " Hi there ");
        assert!(f.valid());
        assert_eq!(f.value(), "Hi there");
    }

    #[test]
    fn subject_encoded_word() {
        let f = Field::new("Subject", "=?ISO-8859-1?Q?foo_bar?=");
        assert!(f.valid());
        assert_eq!(f.value(), "foo bar");
    }

    #[test]
    fn subject_encoded_word_with_spaces_inside() {
        // broken but common: spaces inside the encoded-word
        let f = Field::new("Subject", "=?ISO-8859-1?q?foo bar baz?=");
        assert!(f.valid());
        assert_eq!(f.value(), "foo bar baz");
    }

    #[test]
    fn mime_version_normalization() {
        let f = Field::new("Mime-Version", "1.0");
        assert_eq!(f.value(), "1.0");
        let f = Field::new("MIME-Version", "1.1");
        assert_eq!(
            f.value(),
            "1.0(Note: Original mime-version had syntax problems)"
        );
        assert!(f.valid());
    }

    #[test]
    fn content_location_escaping() {
        let f = Field::new("Content-Location", "http://x.example/a b");
        assert!(f.valid());
        assert_eq!(f.value(), "http://x.example/a%20b");
    }

    #[test]
    fn content_base_needs_scheme() {
        let f = Field::new("Content-Base", "no-scheme-here");
        assert!(!f.valid());
        let f = Field::new("Content-Base", "http://x.example/");
        assert!(f.valid());
    }

    #[test]
    fn errors_to_single_address() {
        let f = Field::new("Errors-To", "Owner <owner@lists.example>");
        assert!(f.valid());
        assert_eq!(f.value(), "owner@lists.example");
        let f = Field::new("Errors-To", "total rubbish");
        assert!(f.valid());
        assert_eq!(f.value(), "");
    }

    #[test]
    fn from_field() {
        let f = Field::new("From", "Foo Bar <foo@bar.example>");
        assert!(f.valid());
        let a = &f.as_addresses().unwrap().addresses;
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].raw_name(), "Foo Bar");
        assert_eq!(a[0].localpart, "foo");
        assert_eq!(a[0].domain, "bar.example");
    }

    #[test]
    fn bounce_outside_return_path_is_an_error() {
        let f = Field::new("From", "<>");
        assert!(!f.valid());
        let f = Field::new("Return-Path", "<>");
        assert!(f.valid());
    }

    #[test]
    fn to_drops_pure_garbage() {
        let f = Field::new("To", "some words, joe@example.org");
        assert!(f.valid());
        let a = &f.as_addresses().unwrap().addresses;
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].localpart, "joe");
    }

    #[test]
    fn message_id() {
        let f = Field::new("Message-Id", "<x@y.example>");
        assert!(f.valid());
        assert_eq!(f.rfc822(false), "<x@y.example>");
        let f = Field::new("Message-Id", "<a@b> <c@d>");
        assert!(!f.valid());
    }

    #[test]
    fn references_ignore_garbage() {
        let f = Field::new("References", "<a@b> garbage <c@d>");
        assert!(f.valid());
        assert_eq!(f.as_addresses().unwrap().addresses.len(), 2);
        assert_eq!(f.rfc822(false), "<a@b> <c@d>");
    }

    #[test]
    fn stuttering_colon_value() {
        // "Date: : <date>" style duplication; the retry skips the stutter
        let f = Field::new("Date", ": Sun, 25 Sep 2016 18:36:33 -0400");
        assert!(f.valid());
        assert_eq!(f.value(), "Sun, 25 Sep 2016 18:36:33 -0400");
    }

    #[test]
    fn date_field() {
        let f = Field::new("Date", "Sun, 25 Sep 2016 18:36:33 -0400");
        assert!(f.valid());
        assert_eq!(f.value(), "Sun, 25 Sep 2016 18:36:33 -0400");
        let f = Field::new("Date", "nonsense");
        assert!(!f.valid());
    }

    #[test]
    fn serialization_is_idempotent() {
        for (name, value) in &[
            ("Subject", "Hello world"),
            ("From", "Foo Bar <foo@bar.example>"),
            ("To", "a@one.test, b@two.test"),
            ("Date", "Sun, 25 Sep 2016 18:36:33 -0400"),
            ("Content-Type", "text/html; charset=utf-8"),
            ("Content-Transfer-Encoding", "base64"),
            ("References", "<a@b> <c@d>"),
            ("Mime-Version", "1.1"),
        ] {
            let f = Field::new(name, value);
            let once = f.rfc822(false);
            let again = Field::new(name, &once).rfc822(false);
            assert_eq!(once, again, "{}: {}", name, value);
        }
    }

    #[test]
    fn long_address_lists_fold() {
        let many: Vec<String> = (0..20)
            .map(|i| format!("person-number-{}@quite-long-domain.example", i))
            .collect();
        let f = Field::new("To", &many.join(", "));
        assert!(f.valid());
        let s = f.rfc822(false);
        for line in s.split("\r\n") {
            assert!(line.len() <= 78 + 4, "line too long: {}", line);
        }
    }
}
