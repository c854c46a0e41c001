//! The header: an ordered list of fields with by-name lookups, occurrence
//! checking, and the repair engine — a catalogue of heuristics that brings
//! ill-formed headers into a usable state without ever invalidating a
//! header that was already valid.

use chrono::{DateTime, FixedOffset};
use log::debug;

use charset::decode_latin1;

use crate::address::{self, Address, AddressKind, AddressParser};
use crate::date;
use crate::error::MailError;
use crate::field::{AddressField, Field};
use crate::mime::{ContentDisposition, ContentLanguage, ContentTransferEncoding, ContentType, Encoding};
use crate::part::Part;
use crate::strings::{self, CRLF};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMode {
    Rfc5322,
    Mime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultContentType {
    TextPlain,
    MessageRfc822,
}

struct Condition {
    name: &'static str,
    min: usize,
    max: usize,
    mode: HeaderMode,
}

static CONDITIONS: &[Condition] = &[
    Condition { name: "Sender", min: 0, max: 1, mode: HeaderMode::Rfc5322 },
    Condition { name: "Reply-To", min: 0, max: 1, mode: HeaderMode::Rfc5322 },
    Condition { name: "To", min: 0, max: 1, mode: HeaderMode::Rfc5322 },
    Condition { name: "Cc", min: 0, max: 1, mode: HeaderMode::Rfc5322 },
    Condition { name: "Bcc", min: 0, max: 1, mode: HeaderMode::Rfc5322 },
    Condition { name: "Message-Id", min: 0, max: 1, mode: HeaderMode::Rfc5322 },
    Condition { name: "References", min: 0, max: 1, mode: HeaderMode::Rfc5322 },
    Condition { name: "Subject", min: 0, max: 1, mode: HeaderMode::Rfc5322 },
    Condition { name: "From", min: 1, max: 1, mode: HeaderMode::Rfc5322 },
    Condition { name: "Date", min: 1, max: 1, mode: HeaderMode::Rfc5322 },
    Condition { name: "Mime-Version", min: 0, max: 1, mode: HeaderMode::Rfc5322 },
    Condition { name: "Mime-Version", min: 0, max: 1, mode: HeaderMode::Mime },
    Condition { name: "Content-Type", min: 0, max: 1, mode: HeaderMode::Rfc5322 },
    Condition { name: "Content-Type", min: 0, max: 1, mode: HeaderMode::Mime },
    Condition { name: "Content-Transfer-Encoding", min: 0, max: 1, mode: HeaderMode::Rfc5322 },
    Condition { name: "Content-Transfer-Encoding", min: 0, max: 1, mode: HeaderMode::Mime },
    Condition { name: "Return-Path", min: 0, max: 1, mode: HeaderMode::Rfc5322 },
];

/// True when both fields hold the same set of `localpart@domain` pairs,
/// compared with a case-insensitive domain.
fn same_addresses(a: Option<&AddressField>, b: Option<&AddressField>) -> bool {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };
    if a.addresses.is_empty() || b.addresses.is_empty() {
        return false;
    }
    if a.addresses.len() != b.addresses.len() {
        return false;
    }
    let key = |x: &Address| format!("{}@{}", x.localpart, x.domain.to_lowercase());
    let amap: Vec<String> = a.addresses.iter().map(key).collect();
    let bmap: Vec<String> = b.addresses.iter().map(key).collect();
    amap.iter().all(|k| bmap.contains(k)) && bmap.iter().all(|k| amap.contains(k))
}

/// An ordered list of header fields, plus the few bits of state that
/// control how they are interpreted: the header mode and the content type
/// a missing Content-Type implies.
#[derive(Debug, Clone)]
pub struct Header {
    pub fields: Vec<Field>,
    mode: HeaderMode,
    pub(crate) default_type: DefaultContentType,
    num_bytes: usize,
}

impl Header {
    pub fn new(mode: HeaderMode) -> Header {
        Header {
            fields: Vec::new(),
            mode,
            default_type: DefaultContentType::TextPlain,
            num_bytes: 0,
        }
    }

    /// Parses a header from the start of `raw`: a sequence of folded
    /// `Name: value` lines terminated by an empty line. An optional UTF-8
    /// BOM and a leading mbox `From ` line are skipped in RFC 5322 mode.
    /// The number of bytes consumed (including the blank line) is
    /// remembered so the caller knows where the body starts.
    pub fn read(raw: &[u8], mode: HeaderMode) -> Header {
        let mut h = Header::new(mode);
        let end = raw.len();
        let mut i = 0;

        loop {
            if i >= end {
                break;
            }

            if i + 2 < end && raw[i] == 0xEF && raw[i + 1] == 0xBB && raw[i + 2] == 0xBF {
                i += 3;
            }

            let mut j = i;
            while j < end && raw[j] >= 33 && raw[j] <= 127 && raw[j] != b':' {
                j += 1;
            }

            if j == i + 4
                && mode == HeaderMode::Rfc5322
                && j < end
                && raw[i..=j].eq_ignore_ascii_case(b"from ")
            {
                // an mbox-style envelope line; skip it
                while i < end && raw[i] != b'\r' && raw[i] != b'\n' {
                    i += 1;
                }
                while i < end && raw[i] == b'\r' {
                    i += 1;
                }
                if i < end && raw[i] == b'\n' {
                    i += 1;
                }
            } else if j > i && j < end && raw[j] == b':' {
                let name = decode_latin1(&raw[i..j]).into_owned();
                i = j + 1;
                while i < end && (raw[i] == b' ' || raw[i] == b'\t') {
                    i += 1;
                }
                j = i;
                // find the end of the value, folded lines included
                while j < end
                    && (raw[j] != b'\n'
                        || (j + 1 < end && (raw[j + 1] == b' ' || raw[j + 1] == b'\t')))
                {
                    j += 1;
                }
                let mut value_end = j;
                if value_end > i && raw[value_end - 1] == b'\r' {
                    value_end -= 1;
                }
                let value = unfold(&raw[i..value_end]);
                if !strings::simplify(&value).is_empty()
                    || name.to_lowercase().starts_with("x-")
                {
                    h.add(&name, &value);
                }
                i = j;
                if i + 1 < end && raw[i] == b'\r' && raw[i + 1] == b'\n' {
                    i += 1;
                }
                if i < end {
                    i += 1;
                }
            } else {
                break;
            }
        }

        // chomp the blank line that ends the header
        if i + 1 < raw.len() && raw[i] == b'\r' && raw[i + 1] == b'\n' {
            i += 2;
        } else if i < raw.len() && raw[i] == b'\n' {
            i += 1;
        }
        h.num_bytes = i;
        h
    }

    /// The number of input bytes this header occupied, blank line included.
    pub fn num_bytes(&self) -> usize {
        self.num_bytes
    }

    pub fn mode(&self) -> HeaderMode {
        self.mode
    }

    /// Returns true if this header fills all the conditions laid out in
    /// RFC 5322 for validity: every field is valid, and the occurrence
    /// table holds.
    pub fn valid(&self) -> bool {
        self.verify().is_none()
    }

    /// The first problem with this header, if any.
    pub fn verify(&self) -> Option<MailError> {
        for f in &self.fields {
            if !f.valid() {
                return Some(MailError::Parse(format!(
                    "{}: {}",
                    f.name(),
                    f.error().map(|e| e.to_string()).unwrap_or_default()
                )));
            }
        }
        for c in CONDITIONS {
            if c.mode != self.mode {
                continue;
            }
            let n = self.count(c.name);
            if (n < c.min) || (n > c.max) {
                return Some(MailError::Parse(format!(
                    "{} {} fields seen; between {} and {} may be present",
                    n, c.name, c.min, c.max
                )));
            }
        }
        // strictly speaking, if From contains more than one address, Sender
        // should contain one. we don't enforce that: it rejects mail that
        // would otherwise go through. the Resent-* restrictions are
        // graciously ignored for the same reason.
        None
    }

    pub(crate) fn count(&self, name: &str) -> usize {
        self.fields.iter().filter(|f| f.name() == name).count()
    }

    /// Adds a field. Adding a To/Cc/Bcc/Reply-To/From when one already
    /// exists appends its addresses to the existing field rather than
    /// creating an (illegal) duplicate.
    pub fn add(&mut self, name: &str, value: &str) {
        self.add_field(Field::new(name, value));
    }

    pub fn add_field(&mut self, f: Field) {
        if matches!(f.name(), "To" | "Cc" | "Bcc" | "Reply-To" | "From") {
            if let Some(next) = f.as_addresses() {
                let addrs = next.addresses.clone();
                if let Some(first) = self.address_field_mut(f.name(), 0) {
                    first.addresses.extend(addrs);
                    return;
                }
            }
        }
        self.fields.push(f);
    }

    pub fn remove_at(&mut self, i: usize) {
        self.fields.remove(i);
    }

    pub fn remove_all(&mut self, name: &str) {
        self.fields.retain(|f| !f.name().eq_ignore_ascii_case(name));
    }

    /// Gets the value of the first field named `name`, or "".
    pub fn get(&self, name: &str) -> &str {
        self.field(name, 0).map(|f| f.value()).unwrap_or("")
    }

    /// The `n`th (0-based) field named `name`.
    pub fn field(&self, name: &str, n: usize) -> Option<&Field> {
        self.fields.iter().filter(|f| f.name() == name).nth(n)
    }

    fn field_index(&self, name: &str, n: usize) -> Option<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.name() == name)
            .map(|(i, _)| i)
            .nth(n)
    }

    pub fn field_mut(&mut self, name: &str, n: usize) -> Option<&mut Field> {
        let ix = self.field_index(name, n)?;
        self.fields.get_mut(ix)
    }

    /// Removes every field named `name` except the one at index `keep`,
    /// which stays in place.
    fn keep_only(&mut self, name: &str, keep: usize) {
        let mut keep = keep;
        let mut i = 0;
        while i < self.fields.len() {
            if self.fields[i].name() == name && i != keep {
                self.remove_at(i);
                if i < keep {
                    keep -= 1;
                }
                continue;
            }
            i += 1;
        }
    }

    pub fn address_field(&self, name: &str, n: usize) -> Option<&AddressField> {
        self.field(name, n).and_then(|f| f.as_addresses())
    }

    pub fn address_field_mut(&mut self, name: &str, n: usize) -> Option<&mut AddressField> {
        self.field_mut(name, n).and_then(|f| f.as_addresses_mut())
    }

    /// The addresses in the `name` field, or an empty slice.
    pub fn addresses(&self, name: &str) -> &[Address] {
        self.address_field(name, 0)
            .map(|f| f.addresses.as_slice())
            .unwrap_or(&[])
    }

    pub fn content_type(&self) -> Option<&ContentType> {
        self.field("Content-Type", 0).and_then(|f| f.as_content_type())
    }

    pub fn content_type_mut(&mut self) -> Option<&mut ContentType> {
        self.field_mut("Content-Type", 0)
            .and_then(|f| f.as_content_type_mut())
    }

    pub fn content_transfer_encoding(&self) -> Option<&ContentTransferEncoding> {
        self.field("Content-Transfer-Encoding", 0)
            .and_then(|f| f.as_transfer_encoding())
    }

    pub fn content_disposition(&self) -> Option<&ContentDisposition> {
        self.field("Content-Disposition", 0).and_then(|f| f.as_disposition())
    }

    pub fn content_language(&self) -> Option<&ContentLanguage> {
        self.field("Content-Language", 0).and_then(|f| f.as_language())
    }

    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.field("Date", 0)
            .and_then(|f| f.as_date())
            .and_then(|d| d.date)
    }

    /// The value of the first Subject field, or "".
    pub fn subject(&self) -> &str {
        self.get("Subject")
    }

    /// The Message-Id, or "" if there is none (or more than one, which is
    /// illegal).
    pub fn message_id(&self) -> String {
        let ids = self.addresses("Message-Id");
        if ids.len() != 1 {
            return String::new();
        }
        format!("<{}@{}>", ids[0].localpart, ids[0].domain)
    }

    pub fn content_description(&self) -> String {
        self.field("Content-Description", 0)
            .map(|f| strings::simplify(&f.rfc822(false)))
            .unwrap_or_default()
    }

    pub fn content_location(&self) -> String {
        self.field("Content-Location", 0)
            .map(|f| f.rfc822(false))
            .unwrap_or_default()
    }

    /// Removes duplicates of singleton fields: later occurrences whose
    /// serialized form equals the first one's.
    fn drop_exact_duplicates(&mut self) {
        for c in CONDITIONS {
            if c.mode != self.mode || self.count(c.name) <= c.max {
                continue;
            }
            let first = match self.field(c.name, 0) {
                Some(f) => f.rfc822(false),
                None => continue,
            };
            let mut seen = 0;
            let mut i = 0;
            while i < self.fields.len() {
                if self.fields[i].name() == c.name {
                    seen += 1;
                    if seen > 1 && self.fields[i].rfc822(false) == first {
                        debug!("dropping exact duplicate of {}", c.name);
                        self.remove_at(i);
                        continue;
                    }
                }
                i += 1;
            }
        }
    }

    /// Repairs problems that can be repaired without knowing the
    /// associated bodypart. Only applied to invalid headers; never makes a
    /// valid header invalid.
    pub fn repair(&mut self) {
        if self.valid() {
            return;
        }

        // duplicates of fields that may occur only once. duplication has
        // been observed for Date/Subject/M-V/C-T-E/C-T/M-Id.
        self.drop_exact_duplicates();

        // if there are several content-type fields and they agree except
        // that one has parameters and the others not, keep that one
        if self.count("Content-Type") > 1 {
            let mut good: Option<usize> = None;
            let mut bad = false;
            let first = self.content_type().map(|ct| (ct.type_.clone(), ct.subtype.clone()));
            if let Some((t, st)) = first {
                for (i, f) in self.fields.iter().enumerate() {
                    let ct = match f.as_content_type() {
                        Some(ct) => ct,
                        None => continue,
                    };
                    if ct.type_ != t || ct.subtype != st {
                        bad = true;
                    } else if !ct.parameters.is_empty() {
                        if good.is_some() {
                            bad = true;
                        }
                        good = Some(i);
                    }
                }
                if let (Some(keep), false) = (good, bad) {
                    self.keep_only("Content-Type", keep);
                }
            }
        }

        // retain only the first valid Date, Return-Path, Message-Id,
        // References and Content-Type. when one or more valid fields
        // exist, invalid ones go; for all but Content-Type, later valid
        // ones go too (for Content-Type there is no strong reason to
        // believe the first one enables correct interpretation of the
        // body).
        for name in &["Date", "Return-Path", "Message-Id", "Content-Type", "References"] {
            if self.count(name) <= 1 {
                continue;
            }
            let first_valid = self
                .fields
                .iter()
                .position(|f| f.name() == *name && f.valid());
            if let Some(keep) = first_valid {
                let also_valid = *name != "Content-Type";
                let mut keep = keep;
                let mut i = 0;
                while i < self.fields.len() {
                    if i != keep
                        && self.fields[i].name() == *name
                        && (also_valid || !self.fields[i].valid())
                    {
                        self.remove_at(i);
                        if i < keep {
                            keep -= 1;
                        }
                        continue;
                    }
                    i += 1;
                }
            }
        }

        // Mime-Version is occasionally seen more than once, usually on
        // spam or mainsleaze
        if self.count("Mime-Version") > 1 {
            let n = self.count("Mime-Version");
            while self.count("Mime-Version") > 1 {
                let ix = self.field_index("Mime-Version", 1).unwrap_or(0);
                self.remove_at(ix);
            }
            if let Some(f) = self.field_mut("Mime-Version", 0) {
                f.parse(&format!(
                    "1.0 (Note: original message contained {} MIME-Version fields)",
                    n
                ));
            }
        }

        // Content-Transfer-Encoding should not occur on multiparts, and
        // when it does it usually has a syntax error we don't care about
        if self.count("Content-Transfer-Encoding") > 0 {
            let t = self.content_type().map(|ct| ct.type_.clone());
            if let Some(t) = t {
                if t == "multipart" || t == "message" {
                    self.remove_all("Content-Transfer-Encoding");
                }
            }
        }

        // Sender sometimes is a straight copy of From, even if From
        // contains more than one address. a copy (or even an illegal
        // subset) can be dropped.
        if self.count("Sender") > 0 {
            let senders: Vec<String> = self
                .addresses("Sender")
                .iter()
                .map(|a| a.lpdomain().to_lowercase())
                .collect();
            let from: Vec<String> = self
                .addresses("From")
                .iter()
                .map(|a| a.lpdomain().to_lowercase())
                .collect();
            if !senders.is_empty() && senders.iter().all(|s| from.contains(s)) {
                self.remove_all("Sender");
            }
        }
    }

    /// Repairs problems with the help of the body text and the headers of
    /// the enclosing parts (`ancestors`, outermost first). Like `repair`,
    /// never throws and never breaks a valid header.
    pub(crate) fn repair_with_body(&mut self, raw_body: &[u8], ancestors: &[&Header]) {
        if self.valid() {
            return;
        }
        let body = decode_latin1(raw_body).into_owned();

        self.drop_exact_duplicates();

        // if there is no valid Date and this is an RFC 5322 header, look
        // for a sensible one
        if self.mode == HeaderMode::Rfc5322
            && (self.count("Date") == 0
                || !self.field("Date", 0).map(|f| f.valid()).unwrap_or(false)
                || self.date().is_none())
        {
            let had_date = self.count("Date") > 0;
            let mut found: Option<DateTime<FixedOffset>> = None;
            for f in &self.fields {
                if f.name() != "Received" {
                    continue;
                }
                // the date is after the last ';' of the received field
                let v = f.rfc822(false);
                if let Some(ix) = v.rfind(';') {
                    if let Some(tmp) = date::parse_date(&v[ix + 1..]) {
                        match &found {
                            None => found = Some(tmp),
                            // the oldest plausible timestamp wins
                            Some(d) if tmp < *d => found = Some(tmp),
                            _ => {}
                        }
                    }
                }
            }

            if found.is_none() {
                for h in ancestors.iter().rev() {
                    if let Some(d) = h.date() {
                        found = Some(d);
                        break;
                    }
                }
            }

            if found.is_none() && !had_date {
                // as a last resort use the current date and time. this
                // only happens for newly submitted messages in practice.
                if let Some(zero) = FixedOffset::east_opt(0) {
                    found = Some(chrono::Utc::now().with_timezone(&zero));
                }
            }

            if let Some(d) = found {
                debug!("repairing absent or broken Date");
                self.remove_all("Date");
                self.add("Date", &date::format_date(&d));
            }
        }

        // if there is no From, try Return-Path or Sender from this header,
        // or From/Return-Path/Sender from the closest enclosing part that
        // has one
        if self.count("From") == 0 && self.mode == HeaderMode::Rfc5322 {
            let mut found: Option<Address> = None;
            let mut heads: Vec<&Header> = vec![&*self];
            heads.extend(ancestors.iter().rev());
            for head in heads {
                for name in &["From", "Return-Path", "Sender"] {
                    let a = head.addresses(name);
                    if !a.is_empty() && a[0].kind() == AddressKind::Normal {
                        found = Some(a[0].clone());
                        break;
                    }
                }
                if found.is_some() {
                    break;
                }
            }
            if found.is_none() {
                // an X-From-Line could be old damaged gnus mail, fcc'd
                // before a From line was added
                for f in &self.fields {
                    if f.name() == "X-From-Line" {
                        let mut ap =
                            AddressParser::new(strings::section(&f.rfc822(false), " ", 1));
                        ap.assert_single_address();
                        if ap.error().is_none() {
                            found = ap.addresses.into_iter().next();
                        }
                        break;
                    }
                }
            }
            if let Some(a) = found {
                debug!("supplying From from the surroundings");
                self.add("From", &a.rfc822(false));
            }
        }

        // some spammers like to get return receipts while hiding their
        // Fromness; if From is bad and Return-Receipt-To or
        // Disposition-Notification-To is good, use those
        if self.mode == HeaderMode::Rfc5322
            && (self.field("From", 0).is_none()
                || (!self.field("From", 0).map(|f| f.valid()).unwrap_or(true)
                    && self.addresses("From").is_empty()))
        {
            let mut found: Option<Address> = None;
            for f in &self.fields {
                if f.name() == "Return-Receipt-To" || f.name() == "Disposition-Notification-To" {
                    let mut ap = AddressParser::new(strings::section(&f.rfc822(false), " ", 1));
                    ap.assert_single_address();
                    if ap.error().is_none() {
                        found = ap.addresses.into_iter().next();
                    }
                }
                if found.is_some() {
                    break;
                }
            }
            if let Some(a) = found {
                self.remove_all("From");
                self.add("From", &a.rfc822(false));
            }
        }

        // if there is an unacceptable Received field somewhere, remove it
        // and all the older ones
        if self.count("Received") > 0 {
            let mut bad = false;
            let mut i = 0;
            while i < self.fields.len() {
                if self.fields[i].name() == "Received" {
                    if !self.fields[i].valid() {
                        bad = true;
                    }
                    if bad {
                        self.remove_at(i);
                        continue;
                    }
                }
                i += 1;
            }
        }

        // fields which can simply be dropped if they contain errors
        let mut i = 0;
        while i < self.fields.len() {
            let name = self.fields[i].name();
            if matches!(
                name,
                "Content-Location" | "Content-Disposition" | "Content-Id" | "Message-Id"
            ) && !self.fields[i].valid()
            {
                self.remove_at(i);
                continue;
            }
            i += 1;
        }

        // if there's more than one Sender, preserve the first that is
        // syntactically valid and different from From
        if self.count("Sender") > 1 {
            let from = self.address_field("From", 0).cloned();
            let good = self
                .fields
                .iter()
                .enumerate()
                .find(|(_, f)| {
                    f.name() == "Sender"
                        && f.valid()
                        && !same_addresses(f.as_addresses(), from.as_ref())
                })
                .map(|(i, _)| i);
            if let Some(keep) = good {
                self.keep_only("Sender", keep);
            }
        }

        // various spammers send two subject fields; the kinds of damage
        // are recognizable, and what remains afterwards is usable
        if self.count("Subject") > 1 {
            let mut bad_ix: Vec<usize> = Vec::new();
            for (i, s) in self.fields.iter().enumerate() {
                if s.name() != "Subject" {
                    continue;
                }
                let v = s.value().to_string();
                let mut b = false;
                if v.len() > 300 {
                    b = true;
                } else if v.len() > 80 {
                    let simple = strings::simplify(&v);
                    for w in simple.split(' ') {
                        if let Some(stripped) = w.strip_suffix(':') {
                            if strings::is_ascii(w)
                                && crate::field::is_known_field(&strings::header_case(stripped))
                            {
                                b = true;
                                break;
                            }
                        }
                    }
                } else if !strings::is_ascii(&v) {
                    b = true;
                }
                if b {
                    bad_ix.push(i);
                }
            }
            if bad_ix.len() < self.count("Subject") {
                for &i in bad_ix.iter().rev() {
                    self.remove_at(i);
                }
                // of the remaining candidates, prefer the last
                while self.count("Subject") > 1 {
                    let ix = self.field_index("Subject", 0).unwrap_or(0);
                    self.remove_at(ix);
                }
            }
        }

        // a multipart whose content-type could not be parsed: try to find
        // the boundary by inspecting the body
        if self.count("Content-Type") > 0 && !body.is_empty() {
            let needs_boundary = self
                .content_type()
                .map(|ct| {
                    !ct.hf.valid() && ct.type_ == "multipart" && ct.parameter("boundary").is_empty()
                })
                .unwrap_or(false);
            if needs_boundary {
                if let Some(boundary) = scavenge_boundary(&body) {
                    debug!("scavenged boundary {:?} from the body", boundary);
                    if let Some(ct) = self.content_type_mut() {
                        ct.add_parameter("boundary", &boundary);
                        ct.hf.error = None; // may override other errors. ok.
                    }
                }
            }
        }

        // if the From field is syntactically invalid but one or more good
        // addresses could be parsed, kill the bad ones and go ahead
        if self.count("From") == 1 {
            if let Some(from) = self.address_field_mut("From", 0) {
                if !from.hf.valid() {
                    let good: Vec<Address> = from
                        .addresses
                        .iter()
                        .filter(|a| a.valid() && a.kind() == AddressKind::Normal)
                        .cloned()
                        .collect();
                    if !good.is_empty() {
                        from.addresses = good;
                        from.hf.error = None;
                    }
                }
            }
        }

        // if From is bad but there's a good Sender or Return-Path, copy
        // that into From. only believed when the Received chain is
        // unbroken, a proxy test for a pure-smtp delivery path.
        if self.count("From") == 1
            && (self.count("Sender") == 1 || self.count("Return-Path") == 1)
            && !self.field("From", 0).map(|f| f.valid()).unwrap_or(true)
        {
            let mut seen_received = false;
            let mut seen_other = false;
            let mut unbroken = true;
            for f in &self.fields {
                if f.name() == "Received" {
                    if seen_other {
                        unbroken = false;
                        break;
                    }
                    seen_received = true;
                } else if seen_received {
                    seen_other = true;
                }
            }
            if unbroken {
                let candidate = self
                    .address_field("Return-Path", 0)
                    .filter(|f| f.hf.valid())
                    .and_then(|f| f.addresses.first())
                    .filter(|a| a.kind() != AddressKind::Bounce)
                    .cloned()
                    .or_else(|| {
                        self.address_field("Sender", 0)
                            .filter(|f| f.hf.valid())
                            .and_then(|f| f.addresses.first())
                            .filter(|a| a.kind() != AddressKind::Bounce)
                            .cloned()
                    });
                if let Some(a) = candidate {
                    if let Some(from) = self.address_field_mut("From", 0) {
                        from.addresses = vec![a];
                        from.hf.error = None;
                    }
                }
            }
        }

        // two content-types, one text/plain, the other neither text/plain
        // nor text/html: drop the text/plain one; it's frequently added as
        // a default by careless software
        if self.count("Content-Type") == 2 {
            let mut plain = false;
            let mut html = false;
            let mut keep: Option<usize> = None;
            for (i, f) in self.fields.iter().enumerate() {
                if let Some(ct) = f.as_content_type() {
                    if ct.type_ == "text" && ct.subtype == "plain" {
                        plain = true;
                    } else if ct.type_ == "text" && ct.subtype == "html" {
                        html = true;
                    } else {
                        keep = Some(i);
                    }
                }
            }
            if plain && !html {
                if let Some(keep) = keep {
                    self.keep_only("Content-Type", keep);
                }
            }
        }

        // several content-types: classify them as good, bad and neutral.
        // good multiparts have a boundary that occurs in the body; good
        // HTML starts with a doctype; syntactically invalid fields are
        // bad; all others are neutral. one good field wins; failing that,
        // a lone neutral one.
        if self.count("Content-Type") > 1 {
            let mut good: Vec<usize> = Vec::new();
            let mut neutral: Vec<usize> = Vec::new();
            for (i, f) in self.fields.iter().enumerate() {
                let ct = match f.as_content_type() {
                    Some(ct) => ct,
                    None => continue,
                };
                if !f.valid() {
                    // bad
                } else if ct.type_ == "text" && ct.subtype == "html" {
                    let head = strings::simplify(&body[..floor_char_boundary(&body, 2048)])
                        .to_lowercase();
                    if head.starts_with("<!doctype") || head.starts_with("<html") {
                        good.push(i);
                    }
                } else if ct.type_ == "multipart" {
                    let b = ct.parameter("boundary").to_string();
                    if !b.is_empty()
                        && b == strings::simplify(&b)
                        && (body.starts_with(&format!("--{}", b))
                            || body.contains(&format!("\n--{}", b)))
                    {
                        good.push(i);
                    }
                } else {
                    neutral.push(i);
                }
            }
            let keep = good.first().or_else(|| {
                if neutral.len() == 1 {
                    neutral.first()
                } else {
                    None
                }
            });
            if let Some(&keep) = keep {
                self.keep_only("Content-Type", keep);
            }
        }

        // several content-types, all text/html: just keep one
        if self.count("Content-Type") > 1 {
            let all_html = self
                .fields
                .iter()
                .filter_map(|f| f.as_content_type())
                .all(|ct| ct.hf.valid() && ct.type_ == "text" && ct.subtype == "html");
            if all_html {
                if let Some(keep) = self.field_index("Content-Type", 0) {
                    self.keep_only("Content-Type", keep);
                }
            }
        }

        // a Sender with several same-domain addresses followed by one from
        // a different domain is a known postfix+javamail fixup pattern;
        // only the last address means anything
        if self.addresses("Sender").len() > 1 {
            if let Some(sender) = self.address_field_mut("Sender", 0) {
                let domain = sender.addresses[0].domain.to_lowercase();
                let mut i = 0;
                while i < sender.addresses.len()
                    && sender.addresses[i].domain.to_lowercase() == domain
                {
                    i += 1;
                }
                if i == sender.addresses.len() - 1 {
                    let last = sender.addresses.pop();
                    sender.addresses = last.into_iter().collect();
                    sender.hf.error = None;
                }
            }
        }

        // some crapware sends DSNs without a From field; a quick and
        // careless parse of message/delivery-status gets us a postmaster
        // address to attribute the report to
        let from_bounce_error = self
            .field("From", 0)
            .and_then(|f| f.error())
            .map(|e| e.to_string().contains("No-bounce"))
            .unwrap_or(false);
        if self.mode == HeaderMode::Rfc5322
            && (self.field("From", 0).is_none() || from_bounce_error)
            && self
                .content_type()
                .map(|ct| {
                    ct.type_ == "multipart"
                        && ct.subtype == "report"
                        && ct.parameter("report-type") == "delivery-status"
                })
                .unwrap_or(false)
        {
            let boundary = self
                .content_type()
                .map(|ct| ct.parameter("boundary").to_string())
                .unwrap_or_default();
            if let Some(postmaster) = delivery_status_postmaster(raw_body, &boundary) {
                debug!("salvaging From from a delivery-status report");
                match self.address_field_mut("From", 0) {
                    Some(from) => {
                        from.hf.error = None;
                        from.addresses = vec![postmaster];
                    }
                    None => {
                        let mut from = AddressField::named("From");
                        from.addresses.push(postmaster);
                        self.fields.push(Field::Addresses(from));
                    }
                }
            }
        }

        // if From is the bounce address and the message-id wasn't added
        // locally, postmaster@<msgid-domain> may know the real origin
        if self.count("From") == 1 && self.count("Message-Id") == 1 {
            let bounce_from = self
                .address_field("From", 0)
                .map(|f| {
                    !f.hf.valid()
                        && f.addresses.len() == 1
                        && f.addresses[0].kind() == AddressKind::Bounce
                })
                .unwrap_or(false);
            if bounce_from {
                let msgid = self.addresses("Message-Id").first().cloned();
                if let Some(msgid) = msgid {
                    if let Some(victim) = registrable_domain(&msgid.domain.to_lowercase()) {
                        let me = "localhost";
                        if victim != me && !me.ends_with(&format!(".{}", victim)) {
                            let name = format!(
                                "postmaster (on behalf of unnamed {} user)",
                                msgid.domain
                            );
                            let replacement = Address::new(&name, "postmaster", &victim);
                            if let Some(from) = self.address_field_mut("From", 0) {
                                from.addresses = vec![replacement];
                                from.hf.error = None;
                            }
                        }
                    }
                }
            }
        }

        // if we still have no usable From, use invalid@invalid.invalid,
        // with a display-name if one can be dug out of the wreckage
        let from_hopeless = {
            match self.field("From", 0) {
                None => self.mode == HeaderMode::Rfc5322,
                Some(f) => {
                    self.mode == HeaderMode::Rfc5322
                        && ((!f.valid()
                            && f.as_addresses().map(|a| a.addresses.is_empty()).unwrap_or(false))
                            || f.error()
                                .map(|e| e.to_string().contains("No-bounce"))
                                .unwrap_or(false))
                }
            }
        };
        if from_hopeless {
            let raw = self
                .address_field("From", 0)
                .map(|f| f.hf.unparsed_value().to_string())
                .unwrap_or_default();
            let name = salvage_display_name(&raw);
            debug!("giving up on From, synthesizing invalid@invalid.invalid");
            let a = Address::new(&name, "invalid", "invalid.invalid");
            match self.address_field_mut("From", 0) {
                Some(from) => {
                    from.hf.error = None;
                    from.addresses = vec![a];
                }
                None => {
                    let mut from = AddressField::named("From");
                    from.addresses.push(a);
                    self.fields.push(Field::Addresses(from));
                }
            }
        }

        // a bad Reply-To next to a good From is not worth keeping
        if self.count("From") > 0 && self.count("Reply-To") > 0 {
            let from_ok = self
                .address_field("From", 0)
                .map(|f| f.hf.valid() && !f.addresses.is_empty())
                .unwrap_or(false);
            let rt_ok = self
                .field("Reply-To", 0)
                .map(|f| f.valid())
                .unwrap_or(true);
            if from_ok && !rt_ok {
                self.remove_all("Reply-To");
            }
        }

        // a bad (or duplicated) c-t-e can sometimes be deduced from the
        // body: many equally long lines look like base64, anything else is
        // better treated as no encoding at all
        if self.count("Content-Transfer-Encoding") > 0 {
            let broken = self.count("Content-Transfer-Encoding") > 1
                || !self
                    .field("Content-Transfer-Encoding", 0)
                    .map(|f| f.valid())
                    .unwrap_or(true);
            if broken {
                let mut minl = usize::MAX - 1;
                let mut maxl = 0;
                let mut l = 0;
                let mut n = 0;
                for &c in body.as_bytes() {
                    if c == b'\n' || c == b'\r' {
                        if l > 0 {
                            maxl = maxl.max(l);
                            minl = minl.min(l);
                            n += 1;
                        }
                        l = 0;
                    } else {
                        l += 1;
                    }
                }
                if l > 0 {
                    maxl = maxl.max(l);
                    minl = minl.min(l);
                    n += 1;
                }
                self.remove_all("Content-Transfer-Encoding");
                if n > 5 && maxl == minl && minl > 50 {
                    // more than five lines, all equally long: it really
                    // looks like base64
                    self.add("Content-Transfer-Encoding", "base64");
                }
            }
        }

        // some people don't know c-t from c-t-e
        if self.count("Content-Transfer-Encoding") == 0
            && self.count("Content-Type") > 0
            && !self.content_type().map(|ct| ct.hf.valid()).unwrap_or(true)
        {
            let raw = self
                .field("Content-Type", 0)
                .map(|f| f.unparsed_value().to_string())
                .unwrap_or_default();
            let mut phaps = ContentTransferEncoding::new();
            phaps.parse(&raw);
            if phaps.hf.valid() && !raw.is_empty() {
                debug!("found a c-t-e value in the Content-Type slot");
                self.remove_all("Content-Type");
                self.fields.push(Field::ContentTransferEncoding(phaps));
                self.add("Content-Type", "application/octet-stream");
            }
        }

        // a bad Content-Base or Content-Location is simply dropped
        let mut i = 0;
        while i < self.fields.len() {
            let name = self.fields[i].name();
            if (name == "Content-Base" || name == "Content-Location") && !self.fields[i].valid() {
                self.remove_at(i);
                continue;
            }
            i += 1;
        }
    }

    /// Removes fields that add no information, and simplifies the value of
    /// some. Only applied to headers that are already valid.
    pub fn simplify(&mut self) {
        if !self.valid() {
            return;
        }

        for name in &[
            "From", "Resent-From", "Sender", "Resent-Sender", "Return-Path", "Reply-To", "To",
            "Cc", "Bcc", "Resent-To", "Resent-Cc", "Resent-Bcc",
        ] {
            if let Some(af) = self.address_field_mut(name, 0) {
                address::uniquify(&mut af.addresses);
            }
        }

        if self.field("Content-Description", 0).is_some() && self.content_description().is_empty()
        {
            self.remove_all("Content-Description");
        }

        if let Some(cte) = self.content_transfer_encoding() {
            if cte.encoding == Encoding::Binary {
                self.remove_all("Content-Transfer-Encoding");
            }
        }

        if let Some(cdi) = self.content_disposition() {
            let text_type = self
                .content_type()
                .map(|ct| ct.type_ == "text")
                .unwrap_or(true);
            if self.mode == HeaderMode::Rfc5322
                && text_type
                && cdi.disposition == "inline"
                && cdi.parameters.is_empty()
            {
                self.remove_all("Content-Disposition");
            }
        }

        let have_cte = self.field("Content-Transfer-Encoding", 0).is_some();
        let have_cdi = self.field("Content-Disposition", 0).is_some();
        let have_cde = self.field("Content-Description", 0).is_some();
        if let Some(ct) = self.content_type() {
            if ct.parameters.is_empty()
                && !have_cte
                && !have_cdi
                && !have_cde
                && self.default_type == DefaultContentType::TextPlain
                && ct.type_ == "text"
                && ct.subtype == "plain"
            {
                self.remove_all("Content-Type");
            }
        }

        let have_mime_fields = self.field("Content-Type", 0).is_some()
            || self.field("Content-Transfer-Encoding", 0).is_some()
            || self.field("Content-Description", 0).is_some()
            || self.field("Content-Disposition", 0).is_some()
            || self.field("Content-Location", 0).is_some()
            || self.field("Content-Base", 0).is_some();
        if self.mode == HeaderMode::Mime || !have_mime_fields {
            self.remove_all("Mime-Version");
        }

        let nontext = self
            .content_type()
            .map(|ct| {
                matches!(
                    ct.type_.as_str(),
                    "multipart" | "message" | "image" | "audio" | "video"
                )
            })
            .unwrap_or(false);
        if nontext {
            if let Some(ct) = self.content_type_mut() {
                ct.remove_parameter("charset");
            }
        }

        if self.field("Errors-To", 0).is_some() {
            let et = self.get("Errors-To").to_lowercase();
            let rp = self.addresses("Return-Path");
            if rp.len() == 1 && rp[0].lpdomain().to_lowercase() == et {
                self.remove_all("Errors-To");
            }
        }

        if let Some(m) = self.field("Message-Id", 0) {
            if m.rfc822(false).is_empty() {
                self.remove_all("Message-Id");
            }
        }

        if same_addresses(
            self.address_field("From", 0),
            self.address_field("Reply-To", 0),
        ) {
            self.remove_all("Reply-To");
        }
        if same_addresses(
            self.address_field("From", 0),
            self.address_field("Sender", 0),
        ) {
            self.remove_all("Sender");
        }

        for name in &["Sender", "Return-Path", "To", "Cc", "Bcc", "Reply-To"] {
            if self.field(name, 0).is_some() && self.addresses(name).is_empty() {
                self.remove_all(name);
            }
        }
    }

    /// The canonical text of this header: each field as `Name: value` with
    /// CRLF line endings. Loses information rather than including UTF-8
    /// when `avoid_utf8` is true.
    pub fn as_text(&self, avoid_utf8: bool) -> String {
        let mut out = String::with_capacity(self.fields.len() * 100);
        for f in &self.fields {
            out.push_str(f.name());
            out.push_str(": ");
            out.push_str(&f.rfc822(avoid_utf8));
            out.push_str(CRLF);
        }
        out
    }
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Unfolds a header value: every line break plus its continuation
/// whitespace becomes a single space.
fn unfold(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let c = raw[i];
        if c == b'\r' || c == b'\n' {
            while i < raw.len() && (raw[i] == b'\r' || raw[i] == b'\n') {
                i += 1;
            }
            while i < raw.len() && (raw[i] == b' ' || raw[i] == b'\t') {
                i += 1;
            }
            out.push(' ');
        } else {
            out.push_str(&decode_latin1(&raw[i..i + 1]));
            i += 1;
        }
    }
    out
}

/// Scans a body for a consistent `--boundary` line pattern, accepting the
/// candidate only when it isn't contradicted before the closing
/// `--boundary--`.
fn scavenge_boundary(body: &str) -> Option<String> {
    let b = body.as_bytes();
    let mut cand = 0;
    while cand < b.len() && b[cand] == b'\n' {
        cand += 1;
    }
    let mut boundary: Option<String> = None;
    let mut done = false;
    let mut confused = false;
    while cand < b.len() && !done && !confused {
        if cand + 1 < b.len() && b[cand] == b'-' && b[cand + 1] == b'-' {
            let mut i = cand + 2;
            while i < b.len()
                && (b[i].is_ascii_alphanumeric()
                    || matches!(
                        b[i],
                        b'\'' | b'(' | b')' | b'+' | b'_' | b',' | b'-' | b'.' | b'/' | b':'
                            | b'=' | b'?' | b' '
                    ))
            {
                i += 1;
            }
            if i > cand + 2 && i < b.len() && (b[i] == b'\r' || b[i] == b'\n') {
                let s = &body[cand + 2..i];
                match &boundary {
                    None => boundary = Some(s.to_string()),
                    Some(known) if known == s => {}
                    Some(known)
                        if s.len() == known.len() + 2
                            && s.starts_with(known.as_str())
                            && s.ends_with("--") =>
                    {
                        done = true;
                    }
                    Some(_) if s.len() <= 70 => {
                        confused = true;
                    }
                    _ => {}
                }
            }
        }
        match strings::find_from(body, cand + 1, "\n--") {
            Some(next) => cand = next + 1,
            None => break,
        }
    }
    if confused {
        None
    } else {
        boundary
    }
}

/// A very quick job of parsing message/delivery-status: finds the
/// reporting MTA and a recipient domain, and builds the postmaster address
/// the report can be attributed to. xtext is not handled; this is an odd
/// error case in illegal mail, and the senders don't know the xtext rules
/// either.
fn delivery_status_postmaster(raw_body: &[u8], boundary: &str) -> Option<Address> {
    if boundary.is_empty() {
        return None;
    }
    let mut tmp = Part::new();
    tmp.parse_multipart(raw_body, boundary, false, &[]);
    for p in &tmp.parts {
        let is_status = p
            .header
            .as_ref()
            .and_then(|h| h.content_type())
            .map(|ct| ct.type_ == "message" && ct.subtype == "delivery-status")
            .unwrap_or(false);
        if !is_status {
            continue;
        }
        let text = decode_latin1(&p.data).into_owned();
        let mut reporting_mta = String::new();
        let mut address: Option<Address> = None;
        for l in text.lines() {
            let line = l.to_lowercase();
            let field = strings::simplify(strings::section(&line, ":", 1));
            let domain = strings::simplify(strings::section(
                strings::section(&line, ":", 2),
                ";",
                1,
            ));
            let value = strings::simplify(strings::section(
                strings::section(&line, ":", 2),
                ";",
                2,
            ));
            if field == "reporting-mta" && domain == "dns" && !value.is_empty() {
                reporting_mta = value;
            } else if (field == "final-recipient" || field == "original-recipient")
                && domain == "rfc822"
                && address.is_none()
                && !value.is_empty()
            {
                let ap = AddressParser::new(&value);
                address = ap
                    .addresses
                    .into_iter()
                    .find(|a| a.valid() && !a.domain.is_empty());
            }
        }
        if !reporting_mta.is_empty() {
            if let Some(a) = address {
                let name = format!("{} postmaster", reporting_mta);
                return Some(Address::new(&name, "postmaster", &a.domain.to_lowercase()));
            }
        }
    }
    None
}

/// Strips subdomains down to the registrable domain, e.g.
/// `deep.example.co.uk` to `example.co.uk`. Heuristic, not PSL-correct;
/// good enough to address a postmaster.
fn registrable_domain(victim: &str) -> Option<String> {
    if victim.is_empty() {
        return None;
    }
    let v = victim.as_bytes();
    let len = v.len();
    let mut tld = len;
    if len >= 3 && v[len - 3] == b'.' {
        tld -= 3; // .de
    } else if len >= 4 && v[len - 4] == b'.' {
        tld -= 4; // .com
    }
    if tld < len {
        if tld >= 3 && v[tld - 3] == b'.' {
            tld -= 3; // .co.uk
        } else if tld >= 4 && v[tld - 4] == b'.' {
            tld -= 4; // .com.au
        } else if tld == len - 2 && tld >= 5 && v[tld - 5] == b'.' {
            tld -= 5; // .priv.no
        }
    }
    let mut out = victim.to_string();
    let mut tld = tld;
    if let Some(dot) = victim.find('.') {
        if dot < tld {
            out = victim[dot + 1..].to_string();
            tld -= dot + 1;
        }
    }
    if tld < out.len() {
        Some(out)
    } else {
        None
    }
}

/// Digs a display-name out of an unparsable From value. Hackish hacks
/// abound, because the inputs are spam and damage.
fn salvage_display_name(raw: &str) -> String {
    let mut raw = strings::simplify(raw);
    if raw.ends_with("<>") {
        raw = strings::simplify(&raw[..raw.len() - 2]);
    }
    if raw.starts_with("\"\"") {
        raw = strings::simplify(&raw[2..]);
    }
    if raw.starts_with("\" \"") {
        raw = strings::simplify(&raw[3..]);
    }
    if let Some(lt) = raw.find('<') {
        if lt > 3 {
            raw = strings::section(&raw, "<", 1).to_string();
        }
    }
    if raw.starts_with('"') {
        if let Some(q) = raw[1..].find('"') {
            if q > 1 {
                raw = strings::section(&raw, "\"", 2).to_string();
            }
        }
    }
    raw = strings::simplify(&strings::unquote(
        &strings::unquote(&raw, '"', '\\'),
        '\'',
        '\\',
    ));
    if raw.contains('<') {
        let inner = strings::section(strings::section(&raw, "<", 2), ">", 1);
        if !inner.is_empty() {
            raw = strings::simplify(inner);
        }
    }
    if raw.starts_with('<') && raw.ends_with('>') {
        raw = strings::simplify(&raw[1..raw.len() - 1]);
    }
    if raw.len() < 3 {
        raw = String::new();
    }

    // get rid of <>@ and control characters; too little left means none
    let mut out = String::new();
    let mut known = 0;
    let mut gap = false;
    for c in raw.chars() {
        let u = c as u32;
        if c == '@' || c == '<' || c == '>' || u < 32 || (u >= 128 && u < 160) {
            gap = true;
        } else {
            if gap && !out.is_empty() {
                out.push('\u{FFFD}');
            }
            out.push(c);
            gap = false;
            known += 1;
        }
    }
    if known < 3 {
        return String::new();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(s: &str) -> Header {
        Header::read(s.as_bytes(), HeaderMode::Rfc5322)
    }

    #[test]
    fn basic_reading() {
        let h = read("From: a@b.example\r\nSubject: Hi\r\n\r\nbody");
        assert_eq!(h.fields.len(), 2);
        assert_eq!(h.get("Subject"), "Hi");
        assert_eq!(h.addresses("From").len(), 1);
        assert_eq!(h.num_bytes(), "From: a@b.example\r\nSubject: Hi\r\n\r\n".len());
    }

    #[test]
    fn folded_values() {
        let h = read("Subject: one\r\n two\r\n\r\n");
        assert_eq!(h.get("Subject"), "one two");
    }

    #[test]
    fn envelope_and_bom() {
        let h = Header::read(
            b"\xEF\xBB\xBFFrom joe Mon Sep 17 00:00:00 2001\nSubject: x\n\n",
            HeaderMode::Rfc5322,
        );
        assert_eq!(h.fields.len(), 1);
        assert_eq!(h.get("Subject"), "x");
    }

    #[test]
    fn name_casing() {
        let h = read("SUBJECT: x\r\ncontent-type: text/plain\r\n\r\n");
        assert_eq!(h.fields[0].name(), "Subject");
        assert_eq!(h.fields[1].name(), "Content-Type");
    }

    #[test]
    fn empty_fields_dropped_except_x() {
        let h = read("Subject:\r\nX-Empty:\r\nKeywords:\r\n\r\n");
        assert_eq!(h.fields.len(), 1);
        assert_eq!(h.fields[0].name(), "X-Empty");
    }

    #[test]
    fn multi_value_merge() {
        let h = read("To: a@x.example\r\nTo: b@y.example\r\n\r\n");
        assert_eq!(h.count("To"), 1);
        assert_eq!(h.addresses("To").len(), 2);
    }

    #[test]
    fn occurrence_conditions() {
        let h = read("Subject: a\r\nSubject: b\r\nFrom: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\n\r\n");
        assert!(!h.valid());
        let h = read("From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\n\r\n");
        assert!(h.valid());
        let h = read("Date: Sun, 25 Sep 2016 18:36:33 -0400\r\n\r\n");
        assert!(!h.valid()); // no From
    }

    #[test]
    fn repair_is_monotone() {
        let mut h = read("From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\n\r\n");
        assert!(h.valid());
        let before = h.as_text(false);
        h.repair();
        assert!(h.valid());
        assert_eq!(h.as_text(false), before);
    }

    #[test]
    fn repair_drops_exact_duplicates() {
        let mut h = read(
            "From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\n\r\n",
        );
        assert!(!h.valid());
        h.repair();
        assert!(h.valid());
        assert_eq!(h.count("Date"), 1);
    }

    #[test]
    fn repair_collapses_mime_versions() {
        let mut h = read(
            "From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nMime-Version: 1.0\r\nMime-Version: 1.1\r\n\r\n",
        );
        h.repair();
        assert_eq!(h.count("Mime-Version"), 1);
        assert!(h
            .get("Mime-Version")
            .contains("original message contained 2 MIME-Version fields"));
    }

    #[test]
    fn repair_prefers_parameterized_content_type() {
        let mut h = read(
            "From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nContent-Type: text/html\r\nContent-Type: text/html; charset=utf-8\r\n\r\n",
        );
        h.repair();
        assert_eq!(h.count("Content-Type"), 1);
        assert_eq!(h.content_type().unwrap().parameter("charset"), "utf-8");
    }

    #[test]
    fn repair_drops_cte_on_multipart() {
        let mut h = read(
            "From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nContent-Type: multipart/mixed; boundary=b\r\nContent-Transfer-Encoding: 8bit\r\nContent-Transfer-Encoding: 8bit\r\n\r\n",
        );
        h.repair();
        assert_eq!(h.count("Content-Transfer-Encoding"), 0);
    }

    #[test]
    fn repair_drops_sender_copy_of_from() {
        let mut h = read(
            "From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nSubject: a\r\nSubject: b\r\nSender: x@y.example\r\n\r\n",
        );
        h.repair();
        assert_eq!(h.count("Sender"), 0);
    }

    #[test]
    fn repair_with_body_supplies_date_from_received() {
        let mut h = read(
            "From: x@y.example\r\nReceived: from a by b; Sun, 25 Sep 2016 18:36:33 -0400\r\n\r\n",
        );
        assert!(!h.valid());
        h.repair_with_body(b"", &[]);
        assert!(h.valid());
        assert_eq!(h.get("Date"), "Sun, 25 Sep 2016 18:36:33 -0400");
    }

    #[test]
    fn repair_with_body_supplies_from() {
        let mut h = read(
            "Date: Sun, 25 Sep 2016 18:36:33 -0400\r\nReturn-Path: <bounces@lists.example>\r\n\r\n",
        );
        h.repair_with_body(b"", &[]);
        assert!(h.valid());
        assert_eq!(h.addresses("From")[0].lpdomain(), "bounces@lists.example");
    }

    #[test]
    fn repair_with_body_synthesizes_from() {
        let mut h = read("Date: Sun, 25 Sep 2016 18:36:33 -0400\r\n\r\n");
        h.repair_with_body(b"", &[]);
        assert!(h.valid());
        assert_eq!(h.addresses("From")[0].lpdomain(), "invalid@invalid.invalid");
    }

    #[test]
    fn repair_bounce_from_with_message_id() {
        let mut h = read(
            "From: <>\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nMessage-Id: <x@deep.example.co.uk>\r\n\r\n",
        );
        assert!(!h.valid());
        h.repair_with_body(b"", &[]);
        assert!(h.valid());
        let from = &h.addresses("From")[0];
        assert_eq!(from.lpdomain(), "postmaster@example.co.uk");
    }

    #[test]
    fn repair_keeps_good_subject() {
        let long_spam: String = std::iter::repeat('z').take(350).collect();
        let mut h = read(&format!(
            "From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nSubject: real one\r\nSubject: {}\r\n\r\n",
            long_spam
        ));
        h.repair_with_body(b"", &[]);
        assert!(h.valid());
        assert_eq!(h.get("Subject"), "real one");
    }

    #[test]
    fn repair_detects_base64_body() {
        let line = "YWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXphYmNkZWZnaGlqa2xtbm9wcXJzdHV2d3h5eg==";
        let body = format!("{0}\r\n{0}\r\n{0}\r\n{0}\r\n{0}\r\n{0}\r\n{0}\r\n", line);
        let mut h = read(
            "From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nContent-Transfer-Encoding: florble\r\n\r\n",
        );
        h.repair_with_body(body.as_bytes(), &[]);
        assert_eq!(h.get("Content-Transfer-Encoding"), "base64");
    }

    #[test]
    fn repair_scavenges_boundary() {
        let body = "\r\n--xyz\r\nContent-Type: text/plain\r\n\r\nA\r\n--xyz--\r\n";
        let mut h = read(
            "From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nContent-Type: multipart/mixed\r\n\r\n",
        );
        assert!(!h.valid());
        h.repair_with_body(body.as_bytes(), &[]);
        assert_eq!(h.content_type().unwrap().parameter("boundary"), "xyz");
        assert!(h.valid());
    }

    #[test]
    fn simplify_removes_redundancy() {
        let mut h = read(
            "From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nReply-To: x@y.example\r\nContent-Type: text/plain\r\nMime-Version: 1.0\r\n\r\n",
        );
        assert!(h.valid());
        h.simplify();
        assert_eq!(h.count("Reply-To"), 0);
        assert_eq!(h.count("Content-Type"), 0);
        assert_eq!(h.count("Mime-Version"), 0);
    }

    #[test]
    fn simplify_preserves_validity_and_never_adds() {
        let mut h = read(
            "From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nSubject: hi\r\n\r\n",
        );
        let n = h.fields.len();
        h.simplify();
        assert!(h.valid());
        assert!(h.fields.len() <= n);
    }

    #[test]
    fn as_text_round_trip() {
        let h = read("From: Foo Bar <foo@bar.example>\r\nSubject: Hi\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\n\r\n");
        let text = h.as_text(false);
        let again = Header::read(text.as_bytes(), HeaderMode::Rfc5322);
        assert_eq!(again.as_text(false), text);
    }

    #[test]
    fn registrable_domains() {
        assert_eq!(
            registrable_domain("deep.example.co.uk").as_deref(),
            Some("example.co.uk")
        );
        assert_eq!(
            registrable_domain("mail.example.com").as_deref(),
            Some("example.com")
        );
        assert_eq!(registrable_domain("uk").as_deref(), None);
    }

    #[test]
    fn display_name_salvage() {
        assert_eq!(salvage_display_name("\"Some One\" <>"), "Some One");
        assert_eq!(salvage_display_name("x"), "");
    }
}
