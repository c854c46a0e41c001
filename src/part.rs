//! The Part tree and the Message that roots it: multipart decomposition,
//! transfer decoding, text-codec inference, IMAP-style part lookup and
//! canonical serialization.

use charset::decode_latin1;
use chrono::{DateTime, FixedOffset};
use log::trace;

use crate::codec::{self, Codec};
use crate::error::MailError;
use crate::header::{DefaultContentType, Header, HeaderMode};
use crate::mime::Encoding;
use crate::strings::{self, CRLF};

/// One MIME bodypart. A Part owns its children; a `message/rfc822` part
/// owns the nested Message, whose own part tree carries the children.
#[derive(Debug, Clone)]
pub struct Part {
    pub header: Option<Header>,
    pub parts: Vec<Part>,
    pub number: usize,
    pub has_text: bool,
    pub text: String,
    pub data: Vec<u8>,
    pub message: Option<Box<Message>>,
    num_bytes: usize,
    num_encoded_bytes: usize,
    num_encoded_lines: usize,
    error: Option<MailError>,
}

/// A complete message: the root Part plus the size of its wire form and
/// the (caller-supplied) internal date.
#[derive(Debug, Clone)]
pub struct Message {
    pub part: Part,
    pub rfc822_size: usize,
    pub internal_date: Option<DateTime<FixedOffset>>,
}

/// Parses `raw` into a Message. Malformed input does not cause failure;
/// it produces parts and headers whose `valid()` is false, repaired as far
/// as the heuristics reach.
pub fn read_message(raw: &[u8]) -> Result<Message, MailError> {
    let mut m = Message::new();
    m.parse(raw, &[]);
    Ok(m)
}

fn crlf_bytes(b: &[u8]) -> Vec<u8> {
    strings::crlf(&decode_latin1(b)).bytes_latin1()
}

trait Latin1Out {
    fn bytes_latin1(&self) -> Vec<u8>;
}

impl Latin1Out for String {
    fn bytes_latin1(&self) -> Vec<u8> {
        // the inverse of decode_latin1 for strings it produced
        self.chars()
            .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
            .collect()
    }
}

fn encode_cte(data: &[u8], e: Encoding, line_length: usize) -> Vec<u8> {
    match e {
        Encoding::Binary => data.to_vec(),
        Encoding::QuotedPrintable => {
            codec::e_qp(&String::from_utf8_lossy(data), line_length).into_bytes()
        }
        Encoding::Base64 | Encoding::Uuencode => codec::e64(data, line_length).into_bytes(),
    }
}

impl Default for Part {
    fn default() -> Part {
        Part::new()
    }
}

impl Part {
    pub fn new() -> Part {
        Part {
            header: None,
            parts: Vec::new(),
            number: 0,
            has_text: false,
            text: String::new(),
            data: Vec::new(),
            message: None,
            num_bytes: 0,
            num_encoded_bytes: 0,
            num_encoded_lines: 0,
            error: None,
        }
    }

    pub fn error(&self) -> Option<&MailError> {
        self.error.as_ref()
    }

    /// The size of the decoded content in bytes.
    pub fn num_bytes(&self) -> usize {
        self.num_bytes
    }

    /// The size of the content in its transfer encoding.
    pub fn num_encoded_bytes(&self) -> usize {
        self.num_encoded_bytes
    }

    /// The number of encoded lines, counted for text and message parts.
    pub fn num_encoded_lines(&self) -> usize {
        self.num_encoded_lines
    }

    /// Splits `raw` into bodyparts along `--boundary` lines, parsing each
    /// segment as a MIME header plus body. `--boundary--` terminates the
    /// scan. Children get ascending 1-based part numbers; in a digest the
    /// default content type of each child is message/rfc822.
    pub(crate) fn parse_multipart(
        &mut self,
        raw: &[u8],
        boundary: &str,
        digest: bool,
        ancestors: &[&Header],
    ) {
        if boundary.is_empty() {
            return;
        }
        let delim = boundary.as_bytes();
        let end = raw.len();
        let mut i = 0;
        let mut start = 0;
        let mut last = false;
        let mut pn = 1;

        while !last && i <= end {
            let at_boundary = i >= end
                || (i + 2 + delim.len() <= end
                    && raw[i] == b'-'
                    && raw[i + 1] == b'-'
                    && (i == 0 || raw[i - 1] == b'\n' || raw[i - 1] == b'\r')
                    && &raw[i + 2..i + 2 + delim.len()] == delim);
            if at_boundary {
                let mut j = i;
                let mut l = false;
                if i >= end {
                    l = true;
                } else {
                    j = i + 2 + delim.len();
                    if j + 1 < end && raw[j] == b'-' && raw[j + 1] == b'-' {
                        j += 2;
                        l = true;
                    }
                }
                while j < end && (raw[j] == b' ' || raw[j] == b'\t') {
                    j += 1;
                }
                if j >= end || raw[j] == b'\r' || raw[j] == b'\n' {
                    // finally. we accept that as a boundary line.
                    if j < end && raw[j] == b'\r' {
                        j += 1;
                    }
                    if j < end && raw[j] == b'\n' {
                        j += 1;
                    }
                    if start > 0 {
                        let mut h = Header::read(&raw[start..j.min(end)], HeaderMode::Mime);
                        let body_start = start + h.num_bytes();
                        if digest {
                            h.default_type = DefaultContentType::MessageRfc822;
                        }
                        h.repair();

                        // strip the [CR]LF that belongs to the boundary
                        let mut body_end = i.min(end);
                        if body_end > 0 && raw[body_end - 1] == b'\n' {
                            body_end -= 1;
                            if body_end > 0 && raw[body_end - 1] == b'\r' {
                                body_end -= 1;
                            }
                        }
                        let slice = if body_start < body_end {
                            &raw[body_start..body_end]
                        } else {
                            &[][..]
                        };
                        trace!("multipart child {} is {} bytes", pn, slice.len());
                        h.repair_with_body(slice, ancestors);
                        let mut bp = parse_bodypart(slice, h, ancestors);
                        bp.number = pn;
                        pn += 1;
                        self.parts.push(bp);
                    }
                    last = l;
                    start = j;
                    i = j;
                }
            }
            while i < end && raw[i] != b'\r' && raw[i] != b'\n' {
                i += 1;
            }
            while i < end && (raw[i] == b'\r' || raw[i] == b'\n') {
                i += 1;
            }
        }
    }

    /// Appends the canonical text of this multipart entity.
    fn append_multipart(&self, buf: &mut Vec<u8>, avoid_utf8: bool) {
        let delim = self
            .header
            .as_ref()
            .and_then(|h| h.content_type())
            .map(|ct| ct.parameter("boundary").to_string())
            .unwrap_or_default();
        buf.extend_from_slice(b"--");
        buf.extend_from_slice(delim.as_bytes());
        for c in &self.parts {
            buf.extend_from_slice(CRLF.as_bytes());
            if let Some(h) = &c.header {
                buf.extend_from_slice(h.as_text(avoid_utf8).as_bytes());
            }
            buf.extend_from_slice(CRLF.as_bytes());
            self.append_any_part(buf, c, avoid_utf8);
            buf.extend_from_slice(CRLF.as_bytes());
            buf.extend_from_slice(b"--");
            buf.extend_from_slice(delim.as_bytes());
        }
        buf.extend_from_slice(b"--");
        buf.extend_from_slice(CRLF.as_bytes());
    }

    /// Appends the canonical text of the bodypart `bp`, which is a child
    /// of this part.
    fn append_any_part(&self, buf: &mut Vec<u8>, bp: &Part, avoid_utf8: bool) {
        let child_ct = bp.header.as_ref().and_then(|h| h.content_type());
        let child_type = child_ct.map(|ct| ct.type_.clone());
        let child_subtype = child_ct.map(|ct| ct.subtype.clone());
        let e = bp
            .header
            .as_ref()
            .and_then(|h| h.content_transfer_encoding())
            .map(|cte| cte.encoding)
            .unwrap_or(Encoding::Binary);
        let own_ct = self.header.as_ref().and_then(|h| h.content_type());
        let digest = own_ct
            .map(|ct| ct.type_ == "multipart" && ct.subtype == "digest")
            .unwrap_or(false);

        if child_type.as_deref() == Some("message") || (digest && child_type.is_none()) {
            if child_type.is_some() && child_subtype.as_deref() != Some("rfc822") {
                append_text_part(buf, bp, e);
            } else if let Some(m) = &bp.message {
                buf.extend_from_slice(&m.rfc822(avoid_utf8));
            } else {
                append_text_part(buf, bp, e);
            }
        } else if child_type.is_none() || child_type.as_deref() == Some("text") {
            append_text_part(buf, bp, e);
        } else if child_type.as_deref() == Some("multipart") {
            bp.append_multipart(buf, avoid_utf8);
        } else {
            buf.extend_from_slice(&encode_cte(&bp.data, e, 72));
        }
    }
}

fn append_text_part(buf: &mut Vec<u8>, bp: &Part, e: Encoding) {
    if bp.has_text {
        buf.extend_from_slice(&encode_cte(bp.text.as_bytes(), e, 72));
    } else {
        buf.extend_from_slice(&encode_cte(&bp.data, e, 72));
    }
}

/// Parses one bodypart: decodes the transfer encoding, infers or verifies
/// the text charset, recursively parses nested content, and updates the
/// header to describe what will actually be emitted.
pub(crate) fn parse_bodypart(raw: &[u8], mut h: Header, ancestors: &[&Header]) -> Part {
    let mut start = 0;
    if start < raw.len() && raw[start] == b'\r' {
        start += 1;
    }
    if start < raw.len() && raw[start] == b'\n' {
        start += 1;
    }

    let mut bp = Part::new();
    let body_raw = &raw[start.min(raw.len())..];

    // sometimes people send c-t-e: q-p _and_ c-t-e: 7bit or 8bit. if the
    // body has no '=' at all they are equivalent, and both can go.
    if !body_raw.contains(&b'=') && h.count("Content-Transfer-Encoding") > 1 {
        let any_qp = h
            .fields
            .iter()
            .filter_map(|f| f.as_transfer_encoding())
            .any(|cte| cte.encoding == Encoding::QuotedPrintable);
        if any_qp {
            h.remove_all("Content-Transfer-Encoding");
        }
    }

    let e = h
        .content_transfer_encoding()
        .map(|cte| cte.encoding)
        .unwrap_or(Encoding::Binary);

    let mut body: Vec<u8> = if body_raw.is_empty() {
        Vec::new()
    } else {
        match e {
            Encoding::Base64 => codec::de64(body_raw),
            Encoding::Uuencode => codec::de_uu(&decode_latin1(body_raw)),
            Encoding::QuotedPrintable => codec::de_qp(&crlf_bytes(body_raw), false),
            Encoding::Binary => crlf_bytes(body_raw),
        }
    };

    if h.content_type().is_none() {
        match h.default_type {
            DefaultContentType::TextPlain => h.add("Content-Type", "text/plain"),
            DefaultContentType::MessageRfc822 => h.add("Content-Type", "message/rfc822"),
        }
    }
    let ct_type = h.content_type().map(|ct| ct.type_.clone()).unwrap_or_default();
    let ct_subtype = h
        .content_type()
        .map(|ct| ct.subtype.clone())
        .unwrap_or_default();

    if ct_type == "text" {
        let csn = {
            let n = h
                .content_type()
                .map(|ct| ct.parameter("charset").to_string())
                .unwrap_or_default();
            if n.eq_ignore_ascii_case("default") {
                String::new()
            } else {
                n
            }
        };
        let mut specified = !csn.is_empty();
        let looked_up = Codec::for_name(&csn);
        let unknown = specified && looked_up.is_none();
        if let Some(c0) = &looked_up {
            if specified && c0.name() == "us-ascii" {
                // some MTAs say us-ascii without checking; if the body is
                // not ascii the charset guesser should get its chance
                let (_, bad) = c0.decode(&body);
                if bad {
                    specified = false;
                }
            }
        }
        let mut c = looked_up.unwrap_or_else(Codec::ascii);

        bp.has_text = true;
        let (t, mut decode_err) = c.decode(&crlf_bytes(&body));
        bp.text = t;

        let lenient = matches!(
            csn.to_lowercase().as_str(),
            "gb2312" | "iso-2022-jp" | "ks_c_5601-1987"
        );
        if lenient {
            // undefined code point usage in GB2312 spam is much too
            // common. the codec turns undefined code points into U+FFFD,
            // and we take that unicode form as canonical. the header may
            // also contain unencoded gb2312; bang the Subject by hand.
            let bad = decode_err;
            let subject_raw = h
                .field("Subject", 0)
                .filter(|f| !f.valid())
                .map(|f| f.unparsed_value().to_string());
            if let Some(raw_subject) = subject_raw {
                let (sv, serr) = c.decode(raw_subject.as_bytes());
                if let Some(f) = h.field_mut("Subject", 0) {
                    f.hf_mut().value = sv;
                    f.hf_mut().error = None;
                    decode_err = serr;
                }
            }
            if bad {
                body = bp.text.clone().into_bytes();
            }
        }

        if (!specified && (decode_err || ct_subtype == "html")) || (specified && decode_err) {
            let guess = if ct_subtype == "html" {
                guess_html_codec(&body)
            } else {
                guess_text_codec(&body)
            };
            match guess {
                None => {
                    if decode_err && (!specified || unknown) {
                        // nothing worked; give up and label it so
                        if bp.error.is_none() && specified {
                            bp.error = Some(MailError::Encoding(format!(
                                "Could not convert body to Unicode from {}: Character set not implemented",
                                csn
                            )));
                        }
                        let (t, _) = Codec::unknown_8bit().decode(&crlf_bytes(&body));
                        bp.text = t;
                        c = Codec::unknown_8bit();
                        decode_err = false;
                    } else if specified && decode_err {
                        // the specified codec produced errors but also a
                        // conversion result; keep the result (probably
                        // with U+FFFD in it) and relabel as UTF-8
                        c = Codec::utf8();
                        decode_err = false;
                    }
                }
                Some(g) => {
                    let (guessed, gerr) = g.decode(&crlf_bytes(&body));
                    if !gerr && decode_err {
                        c = g;
                        bp.text = guessed;
                        decode_err = false;
                    } else if specified && decode_err {
                        c = Codec::utf8();
                        decode_err = false;
                    }
                }
            }
        }

        // a 16-bit codec under q-p needs reevaluation without the trailing
        // CRLF the decoder tacked on
        if e == Encoding::QuotedPrintable && c.name().starts_with("utf-16") {
            let stripped = strings::strip_crlf(&decode_latin1(&body)).to_string();
            let (t, _) = c.decode(&stripped.bytes_latin1());
            bp.text = t;
        }

        if decode_err && bp.error.is_none() {
            let mut errmsg = String::from("Could not convert body to Unicode");
            if specified {
                let cs = if csn.is_empty() { c.name().to_string() } else { csn.clone() };
                errmsg.push_str(&format!(" from {}", cs));
            }
            if specified && unknown {
                errmsg.push_str(": Character set not implemented");
            }
            bp.error = Some(MailError::Encoding(errmsg));
        }

        if c.name() != "us-ascii" {
            let name = c.name().to_lowercase();
            if let Some(ct) = h.content_type_mut() {
                ct.add_parameter("charset", &name);
            }
        } else if let Some(ct) = h.content_type_mut() {
            ct.remove_parameter("charset");
        }

        // decide whether the converted form still needs a transfer
        // encoding, and make the header say so
        let qp = codec::needs_qp(&bp.text);
        let have_cte = h.content_transfer_encoding().is_some();
        if have_cte {
            if !qp {
                h.remove_all("Content-Transfer-Encoding");
            } else if let Some(f) = h.field_mut("Content-Transfer-Encoding", 0) {
                if let Some(cte) = f.as_transfer_encoding_mut() {
                    cte.encoding = Encoding::QuotedPrintable;
                    cte.hf.value = Encoding::QuotedPrintable.name().to_string();
                }
            }
        } else if qp {
            h.add("Content-Transfer-Encoding", "quoted-printable");
        }
        bp.num_bytes = bp.text.len();
    } else {
        bp.data = body.clone();
        if ct_type != "multipart" && ct_type != "message" {
            let text_form = decode_latin1(&body).into_owned();
            let mut chosen = Encoding::Base64;
            if ct_type == "application"
                && ct_subtype.starts_with("pgp-")
                && !codec::needs_qp(&text_form)
            {
                // some PGP things need "Version: 1" unencoded
                chosen = Encoding::Binary;
            } else if ct_type == "application"
                && ct_subtype == "octet-stream"
                && text_form.contains("BEGIN PGP MESSAGE")
            {
                // mutt cannot handle PGP in base64
                chosen = Encoding::Binary;
            }
            if chosen == Encoding::Binary {
                h.remove_all("Content-Transfer-Encoding");
            } else if h.content_transfer_encoding().is_some() {
                if let Some(f) = h.field_mut("Content-Transfer-Encoding", 0) {
                    if let Some(cte) = f.as_transfer_encoding_mut() {
                        cte.encoding = chosen;
                        cte.hf.value = chosen.name().to_string();
                    }
                }
            } else {
                h.add("Content-Transfer-Encoding", "base64");
            }
        }
    }

    if ct_type == "multipart" {
        let boundary = h
            .content_type()
            .map(|ct| ct.parameter("boundary").to_string())
            .unwrap_or_default();
        let digest = ct_subtype == "digest";
        let mut inner: Vec<&Header> = ancestors.to_vec();
        inner.push(&h);
        let mut container = Part::new();
        container.parse_multipart(body_raw, &boundary, digest, &inner);
        bp.parts = container.parts;
    } else if ct_type == "message" && ct_subtype == "rfc822" {
        // there are sometimes blank lines before the message
        let mut s = 0;
        while s < body_raw.len() && (body_raw[s] == b'\r' || body_raw[s] == b'\n') {
            s += 1;
        }
        let mut inner: Vec<&Header> = ancestors.to_vec();
        inner.push(&h);
        let mut m = Message::new();
        m.parse(&body_raw[s..], &inner);
        body = m.rfc822(false);
        bp.message = Some(Box::new(m));
    }

    if !bp.has_text {
        bp.num_bytes = body.len();
    }

    let encoded: Vec<u8> = match h.content_transfer_encoding().map(|cte| cte.encoding) {
        Some(enc) => {
            if bp.has_text {
                encode_cte(bp.text.as_bytes(), enc, 72)
            } else {
                encode_cte(&body, enc, 72)
            }
        }
        None => {
            if bp.has_text {
                bp.text.as_bytes().to_vec()
            } else {
                body.clone()
            }
        }
    };
    bp.num_encoded_bytes = encoded.len();
    if bp.has_text || (ct_type == "message" && ct_subtype == "rfc822") {
        let mut n = 0;
        for &c in &encoded {
            if c == b'\n' {
                n += 1;
            }
        }
        if !encoded.is_empty() && encoded[encoded.len() - 1] != b'\n' {
            n += 1;
        }
        bp.num_encoded_lines = n;
    }

    h.simplify();
    bp.header = Some(h);
    bp
}

/// The text-codec guessing order is fixed: iso-2022-jp (only with its
/// distinctive lead sequence), then strict ascii, then utf-8. Tests and
/// long-standing behavior depend on the priorities.
fn guess_text_codec(body: &[u8]) -> Option<Codec> {
    // iso-2022-jp goes first because it is so restrictive, and because
    // 2022 strings also match the ascii and utf-8 tests
    if body.len() >= 3
        && body[0] == 0x1B
        && (body[1] == b'(' || body[1] == b'$')
        && (body[2] == b'B' || body[2] == b'J' || body[2] == b'@')
    {
        let c = Codec::for_name("iso-2022-jp")?;
        let (_, bad) = c.decode(body);
        if !bad {
            return Some(c);
        }
    }

    // could it be pure ascii?
    let (_, bad) = Codec::ascii().decode(body);
    if !bad {
        return Some(Codec::ascii());
    }

    // does it look good as utf-8? (multibyte encodings that use only
    // 0x01-0x7f would have to be tried before this)
    let c = Codec::utf8();
    let (_, bad) = c.decode(body);
    if !bad {
        return Some(c);
    }

    None
}

/// For HTML, 8859-1 is the historical default and cp-1252 the common
/// reality; additionally a `<meta http-equiv>` tag may know better.
fn guess_html_codec(body: &[u8]) -> Option<Codec> {
    let mut guess = guess_text_codec(body);

    if guess.is_none() {
        if let Some(c) = Codec::for_name("iso-8859-1") {
            let (_, bad) = c.decode(body);
            if !bad {
                guess = Some(c);
            }
        }
    }
    if guess.is_none() {
        if let Some(c) = Codec::for_name("cp-1252") {
            let (_, bad) = c.decode(body);
            if !bad {
                guess = Some(c);
            }
        }
    }

    // some user-agents add a <meta http-equiv="content-type"> instead of
    // a Content-Type field. if it exists and decodes at least as well as
    // the guess, adopt it.
    let b = strings::simplify(&decode_latin1(body)).to_lowercase();
    let tag = "<meta http-equiv=\"content-type\" content=\"";
    let mut i = 0;
    while let Some(next) = strings::find_from(&b, i, tag) {
        i = next + tag.len();
        let mut j = i;
        let bb = b.as_bytes();
        while j < b.len() && bb[j] != b'"' {
            j += 1;
        }
        let hf = crate::field::Field::new("Content-Type", &b[i..j]);
        let cs = hf
            .as_content_type()
            .map(|ct| ct.parameter("charset").to_string())
            .unwrap_or_default();
        if !cs.is_empty() {
            if let Some(meta) = Codec::for_name(&cs) {
                let (m, merr) = meta.decode(body);
                let better = match &guess {
                    None => !merr,
                    Some(g) => {
                        let (gtext, gerr) = g.decode(body);
                        (!merr && (m == gtext || gerr || g.name() == "iso-8859-1"))
                            || (!merr && gerr)
                    }
                };
                if better {
                    guess = Some(meta);
                }
            }
        }
    }

    guess
}

impl Default for Message {
    fn default() -> Message {
        Message::new()
    }
}

impl Message {
    pub fn new() -> Message {
        Message {
            part: Part::new(),
            rfc822_size: 0,
            internal_date: None,
        }
    }

    /// Parses `raw`: reads and repairs the header, decomposes the body,
    /// and simplifies the result in place.
    pub(crate) fn parse(&mut self, raw: &[u8], ancestors: &[&Header]) {
        let mut h = Header::read(raw, HeaderMode::Rfc5322);
        self.rfc822_size = raw.len();
        h.repair();
        let body = &raw[h.num_bytes().min(raw.len())..];
        h.repair_with_body(body, ancestors);

        let multipart = h
            .content_type()
            .map(|ct| ct.type_ == "multipart")
            .unwrap_or(false);
        if multipart {
            let boundary = h
                .content_type()
                .map(|ct| ct.parameter("boundary").to_string())
                .unwrap_or_default();
            let digest = h
                .content_type()
                .map(|ct| ct.subtype == "digest")
                .unwrap_or(false);
            let mut inner: Vec<&Header> = ancestors.to_vec();
            inner.push(&h);
            let mut container = Part::new();
            container.parse_multipart(body, &boundary, digest, &inner);
            self.part = Part::new();
            self.part.parts = container.parts;
            self.part.header = Some(h);
        } else {
            self.part = parse_bodypart(body, h, ancestors);
        }

        if let Some(h) = &mut self.part.header {
            h.simplify();
        }
    }

    pub fn header(&self) -> Option<&Header> {
        self.part.header.as_ref()
    }

    /// Returns the message in canonical RFC 822 (really 2822) form: a
    /// re-expression of the parsed message, not whatever came in. Loses
    /// information rather than emitting UTF-8 when `avoid_utf8` is true.
    pub fn rfc822(&self, avoid_utf8: bool) -> Vec<u8> {
        let mut buf = Vec::with_capacity(if self.rfc822_size > 0 {
            self.rfc822_size
        } else {
            50000
        });
        if let Some(h) = &self.part.header {
            buf.extend_from_slice(h.as_text(avoid_utf8).as_bytes());
        }
        buf.extend_from_slice(CRLF.as_bytes());
        buf.extend_from_slice(&self.body(avoid_utf8));
        buf
    }

    /// The text representation of the body of this message.
    pub fn body(&self, avoid_utf8: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        let multipart = self
            .part
            .header
            .as_ref()
            .and_then(|h| h.content_type())
            .map(|ct| ct.type_ == "multipart")
            .unwrap_or(false);
        if multipart {
            self.part.append_multipart(&mut buf, avoid_utf8);
        } else {
            // the root part is its own single leaf
            let holder = Part::new();
            holder.append_any_part(&mut buf, &self.part, avoid_utf8);
        }
        buf
    }

    /// Finds (and with `create`, builds) the Bodypart with the IMAP-style
    /// dotted part number `s`, e.g. "1.2.3".
    pub fn body_part(&mut self, s: &str, create: bool) -> Option<&mut Part> {
        // the header that stands in for a headerless first child
        let root_header = match self.part.header.as_ref() {
            Some(h)
                if h.content_type()
                    .map(|ct| ct.type_ != "multipart")
                    .unwrap_or(true) =>
            {
                Some(h.clone())
            }
            _ => None,
        };

        let mut segments = Vec::new();
        for seg in s.split('.') {
            let n: usize = seg.parse().ok()?;
            if n == 0 {
                return None;
            }
            segments.push(n);
        }
        if segments.is_empty() {
            return None;
        }

        let mut current: &mut Part = &mut self.part;
        for (depth, n) in segments.into_iter().enumerate() {
            let here = current;
            let splice_header = if depth == 0 {
                root_header.clone()
            } else {
                // a nested message's own header can stand in for a
                // headerless first child
                here.message
                    .as_ref()
                    .and_then(|m| m.part.header.as_ref())
                    .filter(|h| {
                        h.content_type()
                            .map(|ct| ct.type_ != "multipart")
                            .unwrap_or(true)
                    })
                    .cloned()
            };
            // a message/rfc822 part keeps its children on the nested
            // message's root part
            let children = match here.message.as_mut() {
                Some(m) => &mut m.part.parts,
                None => &mut here.parts,
            };

            let pos = children.iter().position(|c| c.number >= n);
            let found = matches!(pos.map(|p| children[p].number), Some(m) if m == n);
            if found {
                let p = pos.unwrap_or(0);
                if n == 1 && children[p].header.is_none() {
                    // the parent message's header may function as the
                    // header of an only child; link it in if so
                    if let Some(h) = splice_header {
                        children[p].header = Some(h);
                    }
                }
                current = &mut children[p];
            } else if create {
                let mut child = Part::new();
                child.number = n;
                let at = pos.unwrap_or(children.len());
                children.insert(at, child);
                current = &mut children[at];
            } else {
                return None;
            }
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_message() {
        let msg =
            read_message(b"From: Foo Bar <foo@bar.example>\r\nSubject: Hi\r\n\r\nBody\r\n")
                .unwrap();
        let h = msg.header().unwrap();
        let from = h.addresses("From");
        assert_eq!(from.len(), 1);
        assert_eq!(from[0].raw_name(), "Foo Bar");
        assert_eq!(from[0].localpart, "foo");
        assert_eq!(from[0].domain, "bar.example");
        assert_eq!(h.subject(), "Hi");
        assert!(msg.part.has_text);
        assert_eq!(msg.part.text, "Body\r\n");
        assert_eq!(msg.body(false), b"Body\r\n".to_vec());
    }

    #[test]
    fn multipart_two_parts() {
        let png = base64::encode(b"\x89PNG\r\n\x1a\nfakeimagedata");
        let input = format!(
            "From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nMime-Version: 1.0\r\nContent-Type: multipart/mixed; boundary=b\r\n\r\n--b\r\nContent-Type: text/plain\r\n\r\nA\r\n--b\r\nContent-Type: image/png\r\nContent-Transfer-Encoding: base64\r\n\r\n{}\r\n--b--\r\n",
            png
        );
        let msg = read_message(input.as_bytes()).unwrap();
        assert_eq!(msg.part.parts.len(), 2);
        assert_eq!(msg.part.parts[0].number, 1);
        assert_eq!(msg.part.parts[1].number, 2);
        assert!(msg.part.parts[0].has_text);
        assert_eq!(msg.part.parts[0].text, "A");
        assert_eq!(
            msg.part.parts[1].data,
            b"\x89PNG\r\n\x1a\nfakeimagedata".to_vec()
        );
    }

    #[test]
    fn multipart_missing_terminator() {
        let input = "From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nContent-Type: multipart/mixed; boundary=b\r\n\r\n--b\r\nContent-Type: text/plain\r\n\r\nA\r\n--b\r\nContent-Type: text/plain\r\n\r\nB\r\n";
        let msg = read_message(input.as_bytes()).unwrap();
        assert_eq!(msg.part.parts.len(), 2);
        assert_eq!(msg.part.parts[0].text, "A");
        assert_eq!(msg.part.parts[1].text, "B");
    }

    #[test]
    fn encoded_word_subject() {
        let msg = read_message(b"Subject: =?ISO-8859-1?Q?foo_bar?=\r\n\r\n").unwrap();
        assert_eq!(msg.header().unwrap().subject(), "foo bar");
    }

    #[test]
    fn cfws_group_addresses() {
        let msg = read_message(
            b"To: A Group:Chris Jones <c@public.example>,joe@example.org,John <jdoe@one.test>;\r\n\r\n",
        )
        .unwrap();
        let to = msg.header().unwrap().addresses("To");
        assert_eq!(to.len(), 3);
        assert_eq!(to[0].raw_name(), "Chris Jones");
        assert_eq!(to[1].raw_name(), "");
        assert_eq!(to[2].raw_name(), "John");
    }

    #[test]
    fn quoted_printable_body() {
        let msg = read_message(
            b"Content-Type: text/plain; charset=utf-8\r\nContent-Transfer-Encoding: quoted-printable\r\n\r\ncaf=C3=A9\r\n",
        )
        .unwrap();
        assert!(msg.part.has_text);
        assert!(msg.part.text.starts_with("café"));
    }

    #[test]
    fn charset_inference_latin1_html() {
        let msg = read_message(
            b"Content-Type: text/html\r\n\r\n<html><body>caf\xe9</body></html>\r\n",
        )
        .unwrap();
        assert!(msg.part.text.contains("café"));
        let cs = msg
            .header()
            .unwrap()
            .content_type()
            .map(|ct| ct.parameter("charset").to_string())
            .unwrap_or_default();
        assert_eq!(cs, "iso-8859-1");
    }

    #[test]
    fn unknown_charset_is_labeled() {
        // 8-bit text that is valid neither as utf-8 nor as ascii, declared
        // with an unknown charset
        let msg = read_message(
            b"Content-Type: text/plain; charset=x-martian\r\n\r\nabc \xfe\xff def\r\n",
        )
        .unwrap();
        let cs = msg
            .header()
            .unwrap()
            .content_type()
            .map(|ct| ct.parameter("charset").to_string())
            .unwrap_or_default();
        assert_eq!(cs, "unknown-8bit");
    }

    #[test]
    fn nested_message() {
        let input = "From: outer@x.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nContent-Type: message/rfc822\r\n\r\nFrom: inner@y.example\r\nDate: Sun, 25 Sep 2016 17:00:00 -0400\r\nSubject: inner\r\n\r\ninner body\r\n";
        let msg = read_message(input.as_bytes()).unwrap();
        let nested = msg.part.message.as_ref().expect("nested message");
        assert_eq!(nested.header().unwrap().subject(), "inner");
        assert_eq!(
            nested.header().unwrap().addresses("From")[0].lpdomain(),
            "inner@y.example"
        );
    }

    #[test]
    fn body_part_lookup() {
        let input = "From: x@y.example\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nContent-Type: multipart/mixed; boundary=b\r\n\r\n--b\r\nContent-Type: text/plain\r\n\r\nA\r\n--b\r\nContent-Type: text/plain\r\n\r\nB\r\n--b--\r\n";
        let mut msg = read_message(input.as_bytes()).unwrap();
        assert_eq!(msg.body_part("1", false).map(|p| p.text.clone()), Some("A".to_string()));
        assert_eq!(msg.body_part("2", false).map(|p| p.text.clone()), Some("B".to_string()));
        assert!(msg.body_part("3", false).is_none());
        assert!(msg.body_part("1.1", false).is_none());
        assert!(msg.body_part("3", true).is_some());
    }

    #[test]
    fn round_trip_is_stable() {
        let input = "From: Foo Bar <foo@bar.example>\r\nDate: Sun, 25 Sep 2016 18:36:33 -0400\r\nSubject: Hi\r\n\r\nBody\r\n";
        let msg = read_message(input.as_bytes()).unwrap();
        let once = msg.rfc822(false);
        let again = read_message(&once).unwrap().rfc822(false);
        assert_eq!(once, again);
    }

    #[test]
    fn uuencoded_body() {
        let input = "Content-Type: application/octet-stream\r\nContent-Transfer-Encoding: x-uuencode\r\n\r\nbegin 644 cat.txt\r\n#0V%T\r\n`\r\nend\r\n";
        let msg = read_message(input.as_bytes()).unwrap();
        assert_eq!(msg.part.data, b"Cat".to_vec());
    }

    #[test]
    fn base64_sizes_are_counted() {
        let data = b"0123456789abcdef0123456789abcdef";
        let input = format!(
            "Content-Type: application/octet-stream\r\nContent-Transfer-Encoding: base64\r\n\r\n{}\r\n",
            base64::encode(data)
        );
        let msg = read_message(input.as_bytes()).unwrap();
        assert_eq!(msg.part.data, data.to_vec());
        assert_eq!(msg.part.num_bytes(), data.len());
        assert!(msg.part.num_encoded_bytes() > 0);
    }
}
