//! Addresses and the address-list parser.
//!
//! The parser scans *right to left*: RFC 2822 addresses are trailing-anchored
//! (the domain comes last), and a reverse scan copes with route-addrs,
//! trailing comments and `display-name <lp@dom>` far more robustly than a
//! forward parse of the same grammar. When the grammar-driven scan fails
//! there is a plan B (scavenge around `@` signs) and a plan C (salvage a
//! group name from `:;` syntax).

use std::fmt;

use crate::codec;
use crate::cursor::{Cursor, EncodedTextKind};
use crate::error::MailError;
use crate::strings;
use crate::tld;

/// What sort of thing an Address is.
///
/// `Bounce` is the empty address `<>`, legal only in Return-Path.
/// `EmptyGroup` is a memberless group, stored with the group display-name
/// and empty localpart/domain. `Local` has a localpart but no domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Normal,
    Bounce,
    EmptyGroup,
    Local,
    Invalid,
}

/// A single parsed address: optional display-name, localpart and domain.
/// Addresses are created by the parser and are effectively immutable
/// afterwards; duplication is by value.
#[derive(Debug, Clone)]
pub struct Address {
    name: String,
    pub localpart: String,
    pub domain: String,
    kind: AddressKind,
    pub error: Option<MailError>,
}

impl Address {
    pub fn new(name: &str, localpart: &str, domain: &str) -> Address {
        let kind = if !domain.is_empty() {
            AddressKind::Normal
        } else if !localpart.is_empty() {
            AddressKind::Local
        } else if !name.is_empty() {
            AddressKind::EmptyGroup
        } else {
            AddressKind::Bounce
        };
        Address {
            name: name.to_string(),
            localpart: localpart.to_string(),
            domain: domain.to_string(),
            kind,
            error: None,
        }
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn valid(&self) -> bool {
        self.error.is_none()
    }

    /// The display-name (for memberless groups, the group's name), quoted
    /// or RFC 2047-encoded as its content requires.
    pub fn name(&self, avoid_utf8: bool) -> String {
        let mut atom = true;
        let mut ascii = true;
        for c in self.name.chars() {
            let b = c as u32;
            if b < 128 && (crate::cursor::is_atext(b as u8) || c == ' ') {
                // still an atom
            } else if b >= 128 {
                ascii = false;
                if avoid_utf8 {
                    atom = false;
                }
            } else {
                atom = false;
            }
        }
        if atom || self.name.is_empty() {
            return self.name.clone();
        }
        if ascii || !avoid_utf8 {
            return strings::quote(&self.name, '"', '\\');
        }
        codec::encode_phrase(&self.name)
    }

    /// The raw, unquoted display-name.
    pub fn raw_name(&self) -> &str {
        &self.name
    }

    /// Returns the localpart and domain, quoting the localpart if needed.
    /// Falls back to `rfc822` for kinds without a localpart@domain shape.
    pub fn lpdomain(&self) -> String {
        let mut r = String::new();
        if self.kind == AddressKind::Normal || self.kind == AddressKind::Local {
            if self.localpart_is_sensible() {
                r = self.localpart.clone();
            } else {
                r = strings::quote(&self.localpart, '"', '\'');
            }
        }
        if self.kind == AddressKind::Normal {
            r.push('@');
            r.push_str(&self.domain);
        }
        if r.is_empty() {
            r = self.rfc822(false);
        }
        r
    }

    /// Returns an RFC 2822 representation of this address. If `avoid_utf8`
    /// is true the result avoids UTF-8 at all costs, even if that loses
    /// information.
    pub fn rfc822(&self, avoid_utf8: bool) -> String {
        match self.kind {
            AddressKind::Invalid => String::new(),
            AddressKind::Bounce => "<>".to_string(),
            AddressKind::EmptyGroup => format!("{}:;", self.name(true)),
            AddressKind::Local => {
                if avoid_utf8 && self.needs_unicode() {
                    "this-address@needs-unicode.invalid".to_string()
                } else if self.localpart_is_sensible() {
                    self.localpart.clone()
                } else {
                    strings::quote(&self.localpart, '"', '\'')
                }
            }
            AddressKind::Normal => {
                if avoid_utf8 && self.needs_unicode() {
                    return "this-address@needs-unicode.invalid".to_string();
                }
                let mut buf = String::new();
                let mut postfix = "";
                if !self.name.is_empty() {
                    buf.push_str(&self.name(avoid_utf8));
                    buf.push_str(" <");
                    postfix = ">";
                }
                if self.localpart_is_sensible() {
                    buf.push_str(&self.localpart);
                } else {
                    buf.push_str(&strings::quote(&self.localpart, '"', '\''));
                }
                buf.push('@');
                buf.push_str(&self.domain);
                buf.push_str(postfix);
                buf
            }
        }
    }

    /// Returns true if this is a sensible-looking localpart, and false if
    /// it needs quoting. We must permit foreign addresses that do.
    fn localpart_is_sensible(&self) -> bool {
        if self.localpart.is_empty() {
            return false;
        }
        let b = self.localpart.as_bytes();
        for (i, &c) in b.iter().enumerate() {
            if c == b'.' {
                if i + 1 >= b.len() || b[i + 1] == b'.' {
                    return false;
                }
            } else if !(crate::cursor::is_atext(c) || c >= 161) {
                return false;
            }
        }
        true
    }

    /// True if this address cannot be transmitted over plain old SMTP.
    /// The display-name can require unicode even when the address does not.
    fn needs_unicode(&self) -> bool {
        !(strings::is_ascii(&self.localpart) && strings::is_ascii(&self.domain))
    }

    fn uniquify_key(&self) -> String {
        format!(
            "{}@{}",
            self.localpart.to_lowercase(),
            self.domain.to_lowercase()
        )
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rfc822(false))
    }
}

impl PartialEq for Address {
    /// Equality is case-insensitive on the domain and exact on localpart
    /// and display-name; the error slot does not participate.
    fn eq(&self, other: &Address) -> bool {
        self.kind == other.kind
            && self.name == other.name
            && self.localpart == other.localpart
            && self.domain.eq_ignore_ascii_case(&other.domain)
    }
}

/// Removes addresses that exist twice in the list, comparing
/// `localpart@domain` case-insensitively and preferring a copy that carries
/// a display-name.
pub fn uniquify(list: &mut Vec<Address>) {
    if list.is_empty() {
        return;
    }
    let mut unique: Vec<Address> = Vec::with_capacity(list.len());
    for a in list.drain(..) {
        let key = a.uniquify_key();
        match unique.iter().position(|u| u.uniquify_key() == key) {
            Some(ix) => {
                if unique[ix].name.is_empty() && !a.name.is_empty() {
                    unique[ix] = a;
                }
            }
            None => unique.push(a),
        }
    }
    *list = unique;
}

/// Decodes a lone RFC 2047 encoded-word (or a run of them); empty if it
/// will not decode.
fn de2047(s: &str) -> String {
    let mut p = Cursor::new(s.as_bytes());
    let t = p.encoded_words(EncodedTextKind::Text);
    if p.at_end() {
        t
    } else {
        String::new()
    }
}

fn parse_ipv4(s: &str) -> Option<String> {
    let mut octets = Vec::new();
    for part in s.split('.') {
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let n: u32 = part.parse().ok()?;
        if n > 255 {
            return None;
        }
        octets.push(n);
    }
    if octets.len() != 4 {
        return None;
    }
    Some(format!(
        "{}.{}.{}.{}",
        octets[0], octets[1], octets[2], octets[3]
    ))
}

/// Removes quoted-pairs from `s` and turns all runs of whitespace into a
/// single space.
fn unqp(s: &[u8]) -> String {
    let mut out = String::with_capacity(s.len());
    let mut sp = false;
    let mut j = 0;
    while j < s.len() {
        let c = s[j];
        if c == b' ' || c == 9 || c == 10 || c == 13 {
            sp = true;
            j += 1;
        } else {
            if sp {
                out.push(' ');
                sp = false;
            }
            if c == b'\\' && j + 1 < s.len() {
                j += 1;
                out.push(s[j] as char);
            } else {
                out.push(c as char);
            }
            j += 1;
        }
    }
    out
}

/// The address-list parser.
///
/// In the interests of simplicity everything is parsed as if it were a list
/// of addresses, either the mailbox-list or the address-list production.
/// The caller must check that the result fits the (often more specific)
/// requirements of the field at hand. An empty address group becomes a
/// single `EmptyGroup` address; a nonempty group contributes its members.
///
/// The first error seen is kept and can be read with `error()`; each
/// parsed address additionally carries its own error slot.
pub struct AddressParser {
    s: Vec<u8>,
    first_error: Option<MailError>,
    recent_error: Option<MailError>,
    pub addresses: Vec<Address>,
    last_comment: String,
}

impl AddressParser {
    /// Parses `s` as an address list, falling back to the `@`-sweep and
    /// group-name salvage plans when the grammar-driven scan fails.
    pub fn new(s: &str) -> AddressParser {
        let mut p = AddressParser {
            s: s.as_bytes().to_vec(),
            first_error: None,
            recent_error: None,
            addresses: Vec::new(),
            last_comment: String::new(),
        };
        let mut i = p.s.len() as isize - 1;
        let mut j = i + 1;
        let colon = s.contains(':');
        while i >= 0 && i < j {
            j = i;
            i = p.address(i);
            while i < j && i >= 0 && (p.at(i) == b',' || (!colon && p.at(i) == b';')) {
                i -= 1;
                i = p.space(i);
            }
        }
        uniquify(&mut p.addresses);
        if i < 0 && p.first_error.is_none() {
            return p;
        }

        // Plan B: look for '@' signs and scan for addresses around them.
        // Use what's there.
        p.addresses.clear();
        p.plan_b();
        if !p.addresses.is_empty() {
            p.first_error = None;
            p.recent_error = None;
            uniquify(&mut p.addresses);
            return p;
        }

        // Plan C: is it an attempt at group syntax by someone who should
        // rather be filling shelves at a supermarket?
        if s.contains(":;") && !s.contains('@') {
            let ix = s.find(":;").unwrap_or(0);
            let n = strings::simplify(&s[..ix]);
            let mut buf = String::new();
            let mut bad = false;
            for c in n.chars() {
                if c.is_ascii_alphanumeric() || c == ' ' || c == '_' || c == '-' {
                    buf.push(c);
                } else {
                    bad = true;
                }
            }
            if !bad {
                p.first_error = None;
                p.recent_error = None;
                p.addresses = vec![Address::new(&buf, "", "")];
            }
        }
        p
    }

    /// The specialized variant used for References and Message-Id: the same
    /// reverse scan, but errors are silently discarded and tokens that do
    /// not parse as addresses are skipped.
    pub fn references(s: &str) -> AddressParser {
        let mut p = AddressParser {
            s: s.as_bytes().to_vec(),
            first_error: None,
            recent_error: None,
            addresses: Vec::new(),
            last_comment: String::new(),
        };
        let mut i = p.s.len() as isize - 1;
        while i >= 0 {
            let j = i;
            i = p.address(i);
            while i >= 0 && (p.at(i) == b',' || p.at(i) == b';') {
                i -= 1;
                i = p.space(i);
            }
            if i >= j {
                // no progress; skip one word leftwards and try again
                i = j - 1;
                while i >= 0 && !(p.at(i) == b' ' || p.at(i) == 9 || p.at(i) == 10 || p.at(i) == 13)
                {
                    i -= 1;
                }
                i = p.space(i);
            }
        }
        p.addresses
            .retain(|a| a.kind == AddressKind::Normal && a.error.is_none());
        for a in &mut p.addresses {
            a.error = None;
        }
        p.first_error = None;
        p.recent_error = None;
        uniquify(&mut p.addresses);
        p
    }

    pub fn error(&self) -> Option<&MailError> {
        self.first_error.as_ref()
    }

    /// Asserts that the parse produced a single regular fully-qualified
    /// address; `error()` reports the failure if not.
    pub fn assert_single_address(&mut self) {
        let mut normal = 0;
        for a in &mut self.addresses {
            if a.kind == AddressKind::Normal {
                normal += 1;
                if normal > 1 {
                    a.error = Some(MailError::Parse(format!(
                        "this is address no. {} of 1 allowed",
                        normal
                    )));
                }
            } else {
                a.error = Some(MailError::Parse(format!(
                    "expected normal email address (whatever@example.com), got {}",
                    a.rfc822(false)
                )));
            }
        }
        let errs: Vec<MailError> = self
            .addresses
            .iter()
            .filter_map(|a| a.error.clone())
            .collect();
        for e in errs {
            self.record(e);
        }
        if self.addresses.is_empty() {
            self.record(MailError::Generic("No address supplied"));
        }
    }

    fn at(&self, i: isize) -> u8 {
        if i < 0 || i as usize >= self.s.len() {
            0
        } else {
            self.s[i as usize]
        }
    }

    fn slice(&self, from: isize, to: isize) -> String {
        let from = from.max(0) as usize;
        let to = (to.max(0) as usize).min(self.s.len());
        if from >= to {
            return String::new();
        }
        String::from_utf8_lossy(&self.s[from..to]).into_owned()
    }

    fn record(&mut self, e: MailError) {
        self.recent_error = Some(e.clone());
        if self.first_error.is_none() {
            self.first_error = Some(e);
        }
    }

    fn set_error(&mut self, msg: &str, i: isize) {
        let i = i.max(0);
        let start = (i - 8).max(0);
        let end = (self.s.len() as isize).min(start + 20);
        let nearby = strings::simplify(&self.slice(start, end));
        self.record(MailError::Parse(format!(
            "{} at position {} (nearby text: {:?})",
            msg, i, nearby
        )));
    }

    /// This private helper adds the address with `name`, `localpart` and
    /// `domain` to the list, unless the localpart is unreasonably long.
    /// The name is adjusted heuristically.
    fn add(&mut self, name: &str, localpart: &str, domain: &str) {
        if localpart.len() > 256 {
            self.record(MailError::Parse(format!(
                "localpart too long ({} characters, RFC 2821's maximum is 64): {}@{}",
                localpart.len(),
                localpart,
                domain
            )));
            return;
        }

        // anti-outlook hackery, step 1: remove extra surrounding quotes
        let mut name = name.to_string();
        let nb = name.as_bytes();
        let mut i = 0;
        while i + 1 < nb.len()
            && nb[i] == nb[nb.len() - 1 - i]
            && (nb[i] == b'\'' || nb[i] == b'"')
        {
            i += 1;
        }
        if i > 0 {
            name = name[i..name.len() - i].to_string();
        }

        // for names, we treat all whitespace equally: "a b" == " a   b "
        name = strings::simplify(&name);

        // sometimes a@b (c) is munged as (c) <a@b>; unmunge that
        if name.len() > 1 && name.starts_with('(') && name.ends_with(')') {
            name = strings::simplify(&name[1..name.len() - 1]);
        }

        // anti-outlook, step 2: if the name is the same as the address,
        // just kill it
        if name.eq_ignore_ascii_case(localpart)
            || (name.len() == localpart.len() + 1 + domain.len()
                && name.eq_ignore_ascii_case(&format!("{}@{}", localpart, domain)))
        {
            name = String::new();
        }

        let mut a = Address::new(&name, localpart, domain);
        a.error = self.recent_error.clone();
        // the scan runs right to left, so prepending restores list order
        self.addresses.insert(0, a);
    }

    /// Parses an address ending at position `i` and adds it to the list,
    /// returning the position to the left of what was consumed. This is the
    /// dispatcher: what sits at `i` picks the production.
    fn address(&mut self, i: isize) -> isize {
        self.last_comment.clear();
        self.recent_error = None;
        let mut i = self.comment(i);
        while i > 0 && self.at(i) == b',' {
            i -= 1;
            i = self.comment(i);
        }
        while i > 0 && self.at(i) == b'>' && self.at(i - 1) == b'>' {
            i -= 1;
        }

        if i < 0 {
            // nothing there. error of some sort.
        } else if i > 0 && self.at(i - 1) == b'<' && self.at(i) == b'>' {
            // the address is <>. whether that's legal is another matter.
            self.add("", "", "");
            i -= 2;
            if i >= 0 && self.at(i) == b'<' {
                i -= 1;
            }
            let (_, ni) = self.phrase(i);
            i = ni;
        } else if i > 2 && self.at(i) == b'>' && self.at(i - 1) == b';' && self.at(i - 2) == b':' {
            // it's a microsoft-broken '<Unknown-Recipient:;>'
            i -= 3;
            let (name, ni) = self.phrase(i);
            i = ni;
            self.add(&name, "", "");
            if i >= 0 && self.at(i) == b'<' {
                i -= 1;
            }
        } else if i > 2
            && self.at(i) == b'>'
            && self.at(i - 1) == b';'
            && self.slice(0, i).contains(":@")
        {
            // it may be a sendmail-broken '<Unknown-Recipient:@x.y;>'
            let x = i;
            i -= 2;
            let (_, ni) = self.domain(i);
            i = ni;
            if i > 1 && self.at(i) == b'@' && self.at(i - 1) == b':' {
                i -= 2;
                let (name, ni) = self.phrase(i);
                i = ni;
                self.add(&name, "", "");
                if i >= 0 && self.at(i) == b'<' {
                    i -= 1;
                }
            } else {
                i = x;
            }
        } else if self.at(i) == b'>' {
            i = self.name_addr(i);
        } else if i > 1 && self.at(i) == b'=' && self.at(i - 1) == b'?' && self.at(i - 2) == b'>' {
            // we're looking at "=?charset?q?safdsafsdfs<a@b>?=". how ugly.
            i -= 3;
            let (dom, ni) = self.domain(i);
            i = ni;
            if self.at(i) == b'@' {
                i -= 1;
                while i > 0 && self.at(i) == b'@' {
                    i -= 1;
                }
                let (lp, ni) = self.localpart(i);
                i = ni;
                if self.at(i) == b'<' {
                    i -= 1;
                    let (_, ni) = self.atom(i); // discard the "supplied" display-name
                    i = ni;
                    self.add("", &lp, &dom);
                } else {
                    self.set_error("Expected '<' while in =?...?...<localpart@domain>?=", i);
                    return i;
                }
            } else {
                self.set_error("Expected '@' while in =?...?...<localpart@domain>?=", i);
                return i;
            }
        } else if self.at(i) == b';' && self.slice(0, i).contains(':') {
            // group
            let mut empty = true;
            i -= 1;
            self.comment(i);
            while i > 0 && self.at(i) != b':' {
                let j = i;
                i = self.address(i);
                empty = false;
                if i == j {
                    self.set_error("Parsing stopped while in group parser", i);
                    return i;
                }
                if self.at(i) == b',' {
                    i -= 1;
                } else if self.at(i) != b':' {
                    self.set_error("Expected ':' or ',' while parsing group", i);
                    return i;
                }
            }
            if self.at(i) == b':' {
                i -= 1;
                let (name, ni) = self.phrase(i);
                i = ni;
                if empty {
                    self.add(&name, "", "");
                }
            }
        } else if self.at(i) == b'"' && self.slice(0, i).contains("%\"") {
            // quite likely we're looking at x%"y@z", as once used on vms
            let mut x = i;
            x -= 1;
            let (dom, nx) = self.domain(x);
            x = nx;
            if x > 0 && self.at(x) == b'@' {
                x -= 1;
                let (lp, nx) = self.localpart(x);
                x = nx;
                if x > 2 && self.at(x) == b'"' && self.at(x - 1) == b'%' {
                    x -= 2;
                    let (_, nx) = self.domain(x);
                    self.add("", &lp, &dom);
                    i = nx;
                }
            }
        } else if self.at(i) == b'"' && self.slice(0, i).contains("::") {
            // we may be looking at NODE::USER "display-name"
            let mut b = i - 1;
            while b > 0 && self.at(b) != b'"' {
                b -= 1;
            }
            if self.at(b) == b'"' {
                // we don't want name <localpart>, so the quoted part is
                // discarded no matter how well-formed it is
                i = b - 1;
            }
            let (lp, ni) = self.atom(i);
            i = ni;
            if i > 2 && self.at(i) == b':' && self.at(i - 1) == b':' {
                i -= 2;
                let (a, ni) = self.atom(i);
                i = ni;
                let lp = format!("{}::{}", a, lp);
                self.add("", &lp, "");
            } else {
                self.set_error("Expected NODE::USER while parsing VMS address", i);
            }
        } else if i > 10
            && self.at(i).is_ascii_digit()
            && self.at(i - 2) == b'.'
            && self.slice(0, self.s.len() as isize).contains('"')
            && self.slice(0, self.s.len() as isize).contains("-19")
        {
            // we may be looking at A::B "display-name" date
            let mut x = i;
            while x > 0 && self.at(x) != b'"' {
                x -= 1;
            }
            let date = strings::simplify(&self.slice(x + 1, i + 1).to_lowercase());
            let all_datish = date.chars().all(|c| {
                c.is_ascii_alphanumeric() || c == ' ' || c == '-' || c == ':' || c == '.'
            });
            if all_datish && date.contains("-19") {
                // at least it resembles the kind of date field we skip
                i = x;
            }
        } else if strings::is_quoted(&self.slice(0, self.s.len() as isize), '"', '\'')
            && self.slice(0, self.s.len() as isize).contains('@')
        {
            let whole = self.slice(0, self.s.len() as isize);
            let wrapped = AddressParser::new(&strings::unquote(&whole, '"', '\''));
            if wrapped.first_error.is_none() {
                self.addresses.extend(wrapped.addresses);
                i = -1;
            } else {
                self.set_error("Unexpected quote character", i);
            }
        } else {
            i = self.addr_spec(i);
        }
        self.comment(i)
    }

    /// The name-addr production: `[display-name] <localpart@domain>`,
    /// including obsolete routes and several kinds of abuse.
    fn name_addr(&mut self, mut i: isize) -> isize {
        i -= 1;
        let (mut dom, ni) = self.domain(i);
        i = ni;
        let mut lp = String::new();
        let mut name = String::new();
        if self.at(i) == b'<' {
            lp = dom;
            dom = String::new();
        } else {
            if self.at(i) == b'@' {
                i -= 1;
                while i > 0 && self.at(i) == b'@' {
                    i -= 1;
                }
                let aftercomment = i;
                i = self.comment(i);
                if i >= 1 && self.at(i) == b';' {
                    let mut j = i - 1;
                    while j > 0 && self.at(j) == b' ' {
                        j -= 1;
                    }
                    if self.at(j) == b':' {
                        // <unlisted-recipients:; (no To-header on input)@do.ma.in>
                        j -= 1;
                        let (n, nj) = self.phrase(j);
                        if !n.is_empty() {
                            lp = String::new();
                            dom = String::new();
                            name = n;
                            i = nj;
                        }
                    }
                } else if aftercomment > i && i < 0 {
                    // To: <(Recipient list suppressed)@localhost>
                    let n = strings::simplify(&self.last_comment.clone());
                    lp = String::new();
                    dom = String::new();
                    let mut buf = String::new();
                    for c in n.chars() {
                        if c.is_ascii_alphanumeric() {
                            buf.push(c);
                        } else if c == ' ' || c == '_' || c == '-' {
                            buf.push('-');
                        } else {
                            self.set_error("Localpart contains parenthesis", i);
                        }
                    }
                    name = buf;
                } else {
                    let (l, ni) = self.localpart(i);
                    lp = l;
                    i = ni;
                    if self.at(i) != b'<' {
                        // hold on: '<name I@my.example>' perhaps?
                        let mut j = i;
                        while j >= 0
                            && (self.at(j).is_ascii_alphabetic() || self.at(j) == b' ')
                        {
                            j -= 1;
                        }
                        if j >= 0 && self.at(j) == b'<' {
                            let mut tmp = self.slice(j + 1, i + 1);
                            if self.at(i + 1) == b' ' {
                                tmp.push(' ');
                            }
                            lp = format!("{}{}", tmp, lp);
                            i = j;
                        }
                    }
                }
            }
            i = self.route(i);
        }
        if i >= 0 && self.at(i) == b'<' {
            i -= 1;
            while i >= 0 && self.at(i) == b'<' {
                i -= 1;
            }
            let (mut n, ni) = self.phrase(i);
            i = ni;
            while i >= 0 && (self.at(i) == b'@' || self.at(i) == b'<') {
                // we're looking at an unencoded 8-bit name, or at
                // 'lp@domain<lp@domain>', or at 'x<y<z@domain>'. we react
                // to that by ignoring the display-name.
                i -= 1;
                let (_, ni) = self.phrase(i);
                i = ni;
                n = String::new();
            }
            if !n.is_empty() {
                name = n;
            }
        }
        // if the display-name contains the unknown-8bit marker or
        // undisplayable control characters, we drop it entirely
        if name
            .chars()
            .any(|c| (c as u32) < 32 || c == '\u{7f}' || c == '\u{fffd}')
        {
            name = String::new();
        }
        self.add(&name, &lp, &dom);
        i
    }

    /// The plain addr-spec production, possibly with a comment that serves
    /// as a display-name.
    fn addr_spec(&mut self, mut i: isize) -> isize {
        let (mut name, err) = codec::to_ascii(&self.last_comment.clone());
        if err || self.last_comment.contains("=?") {
            name = String::new();
        }
        let (mut dom, ni) = self.domain(i);
        i = ni;
        let mut lp = String::new();
        if self.at(i) == b'@' {
            i -= 1;
            while i > 0 && self.at(i) == b'@' {
                i -= 1;
            }
            let aftercomment = i;
            i = self.comment(i);
            if i >= 1 && self.at(i) == b';' {
                let mut j = i - 1;
                while j > 0 && self.at(j) == b' ' {
                    j -= 1;
                }
                if self.at(j) == b':' {
                    // unlisted-recipients:; (no To-header on input)@do.ma.in
                    j -= 1;
                    let (n, nj) = self.phrase(j);
                    if !n.is_empty() {
                        lp = String::new();
                        dom = String::new();
                        name = n;
                        i = nj;
                    }
                }
            } else if aftercomment > i && i < 0 {
                // To: (Recipient list suppressed)@localhost
                let n = strings::simplify(&self.last_comment.clone());
                lp = String::new();
                dom = String::new();
                name = String::new();
                let mut buf = String::new();
                for c in n.chars() {
                    if c.is_ascii_alphanumeric() {
                        buf.push(c);
                    } else if c == ' ' || c == '_' || c == '-' {
                        buf.push('-');
                    } else {
                        self.set_error("Localpart contains parenthesis", i);
                    }
                }
                name = buf;
            } else {
                let (l, ni) = self.localpart(i);
                lp = l;
                i = ni;
            }
        } else {
            // no @: the token we read was a localpart after all
            lp = dom;
            dom = String::new();
        }
        i = self.route(i);
        i = self.comment(i);
        if !lp.is_empty() || !dom.is_empty() || !name.is_empty() {
            self.add(&name, &lp, &dom);
        }
        i
    }

    /// Skips past space at position `i`, or past nothing. Nothing is
    /// perfectly okay.
    fn space(&self, mut i: isize) -> isize {
        while i >= 0
            && (self.at(i) == 32 || self.at(i) == 9 || self.at(i) == 13 || self.at(i) == 10)
        {
            i -= 1;
        }
        i
    }

    /// Skips past a sequence of spaces and comments at `i`, or past
    /// nothing, recording the content of the last comment skipped.
    fn comment(&mut self, mut i: isize) -> isize {
        i = self.space(i);
        while i > 0 && self.at(i) == b')' {
            let j = i;
            i -= 1;
            i = self.ccontent(i);
            if self.at(i) != b'(' {
                self.set_error("Unbalanced comment", i);
            } else {
                let window = self.s[i as usize..=(j as usize)].to_vec();
                let mut ep = Cursor::new(&window);
                self.last_comment = ep.comment();
            }
            if i > 0 {
                i -= 1;
                i = self.space(i);
            }
        }
        i
    }

    /// Helps `comment` handle nested comments: advances `i` to the start
    /// of the current comment (where it points at '(').
    fn ccontent(&mut self, mut i: isize) -> isize {
        loop {
            if i > 0 && self.at(i - 1) == b'\\' {
                i -= 1;
            } else if self.at(i) == b')' {
                i = self.comment(i);
            } else if self.at(i) == b'(' {
                return i;
            }
            if i <= 0 {
                return i;
            }
            i -= 1;
        }
    }

    /// Picks up a domain ending at `i`. Only the syntax is checked; old
    /// mail contains domains that no longer (or never did) resolve.
    fn domain(&mut self, mut i: isize) -> (String, isize) {
        i = self.comment(i);
        let mut dom = String::new();
        if i < 0 {
            return (dom, i);
        }

        if self.at(i).is_ascii_digit() {
            // scan for an unquoted IPv4 address and turn that into an
            // address literal if found
            let j = i;
            let mut k = i;
            while k >= 0 && (self.at(k).is_ascii_digit() || self.at(k) == b'.') {
                k -= 1;
            }
            if let Some(ip) = parse_ipv4(&self.slice(k + 1, j + 1)) {
                return (format!("[{}]", ip), k);
            }
        }

        if self.at(i) == b']' {
            i -= 1;
            let j = i;
            while i >= 0 && self.at(i) != b'[' {
                i -= 1;
            }
            if i > 0 {
                // turn FWS into a single space and unquote quoted-pairs.
                // this part parses forward, because of quoted-pair.
                let inner = unqp(&self.s[(i + 1) as usize..(j + 1) as usize]);
                dom = format!("[{}]", inner);
                i -= 1;
            } else {
                self.set_error("literal domain missing [", i);
            }
        } else {
            // atoms, separated by '.' and (obsoletely) spaces; the spaces
            // are stripped
            let (a, ni) = self.atom(i);
            dom = a;
            i = ni;
            self.comment(i);
            while i >= 0 && self.at(i) == b'.' {
                i -= 1;
                let (a, ni) = self.atom(i);
                i = ni;
                if !a.is_empty() {
                    dom = format!("{}.{}", a, dom);
                }
            }
        }
        (dom, i)
    }

    /// Parses and returns the atom ending at `i`.
    fn atom(&mut self, mut i: isize) -> (String, isize) {
        i = self.comment(i);
        let j = i;
        while i >= 0 && (crate::cursor::is_atext(self.at(i)) || self.at(i) >= 128) {
            i -= 1;
        }
        let r = self.slice(i + 1, j + 1);
        i = self.comment(i);
        (r, i)
    }

    /// Parses an RFC 2822 phrase (a sequence of words, more or less)
    /// ending at `i`, and returns it.
    fn phrase(&mut self, mut i: isize) -> (String, isize) {
        let mut r = String::new();
        i = self.comment(i);
        let mut done = false;
        let mut drop = false;
        let mut enc = false;
        while !done && i >= 0 {
            let mut word = String::new();
            let mut encw = false;
            if i > 0 && self.at(i) == b'"' {
                // quoted phrase
                let j = i;
                i -= 1;
                loop {
                    if i > 1 && self.at(i - 1) == b'\\' {
                        i -= 2;
                    } else if i >= 0 && self.at(i) != b'"' {
                        i -= 1;
                    } else {
                        break;
                    }
                }
                if i < 0 || self.at(i) != b'"' {
                    self.set_error("quoted phrase must begin with '\"'", i);
                }
                let w = strings::unquote(&self.slice(i, j + 1), '"', '\'');
                // expand any encoded-words hiding inside the quotes
                let mut l = 0;
                while l < w.len() && !drop {
                    match strings::find_from(&w, l, "=?") {
                        Some(b) => {
                            let mut e = strings::find_from(&w, b + 2, "?"); // after charset
                            if let Some(x) = e {
                                e = strings::find_from(&w, x + 1, "?"); // after encoding
                            }
                            if let Some(x) = e {
                                e = strings::find_from(&w, x + 1, "?="); // at the end
                            }
                            if let Some(x) = e {
                                let tmp = de2047(&w[b..x + 2]);
                                word.push_str(&w[l..b]);
                                word.push_str(&tmp);
                                if tmp.is_empty() {
                                    drop = true;
                                }
                                l = x + 2;
                            } else {
                                drop = true;
                            }
                        }
                        None => {
                            word.push_str(&w[l..]);
                            l = w.len();
                        }
                    }
                }
                i -= 1;
            } else if self.at(i) == b'.' {
                // obs-phrase allows a single dot as alternative to word;
                // we also allow 'atom "." atom' to handle initials
                i -= 1;
                let (a, ni) = self.atom(i);
                i = ni;
                word = a;
                word.push('.');
            } else {
                // single word
                let (mut a, ni) = self.atom(i);
                i = ni;
                // outlook or something close to it seems to occasionally
                // put backslashes into otherwise unquoted names. work
                // around that.
                let mut l = a.len();
                while l > 0 && i >= 0 && self.at(i) == b'\\' {
                    i -= 1;
                    let (w, ni) = self.atom(i);
                    i = ni;
                    l = w.len();
                    a = format!("{}{}", w, a);
                }
                if a.is_empty() {
                    done = true;
                } else if a.starts_with("=?") {
                    let mut p = Cursor::new(a.as_bytes());
                    let tmp = strings::simplify(&p.phrase());
                    if tmp.starts_with("=?") || tmp.contains("=?") {
                        drop = true;
                    }
                    if p.at_end() {
                        word = tmp;
                        encw = true;
                    } else {
                        word = a;
                    }
                } else {
                    word = a;
                }
            }
            if r.is_empty() {
                r = word;
            } else if word.ends_with(' ') {
                r = format!("{}{}", word, r);
            } else if !word.is_empty() {
                if !enc || !encw || (word.len() + r.len() < 50 && r.as_bytes()[0] <= b'Z') {
                    word.push(' ');
                }
                r = format!("{}{}", word, r);
            }
            i = self.comment(i);
            enc = encw;
        }
        if drop {
            r = String::new();
        }
        (strings::simplify(&r), i)
    }

    /// Parses the localpart ending at `i`.
    fn localpart(&mut self, mut i: isize) -> (String, isize) {
        let mut r = String::new();
        let mut sep = String::new();
        let mut more = i >= 0;
        let mut atom_only = true;
        while more {
            let w;
            if self.at(i) == b'"' {
                atom_only = false;
                let (p, ni) = self.phrase(i);
                w = p;
                i = ni;
            } else {
                let (a, ni) = self.atom(i);
                w = a;
                i = ni;
            }
            r = format!("{}{}{}", w, sep, r);
            if i >= 0 && self.at(i) == b'.' {
                sep = ".".to_string();
                i -= 1;
            } else if w.starts_with('%') {
                sep = String::new();
            } else {
                more = false;
            }
        }
        if atom_only && r.is_empty() {
            self.set_error("Empty localpart", i);
        }
        (r, i)
    }

    /// If `i` points to an obs-route, silently skips the route.
    fn route(&mut self, mut i: isize) -> isize {
        if i < 0 || self.at(i) != b':' || self.first_error.is_some() {
            return i;
        }
        i -= 1;
        let (mut dom, ni) = self.domain(i);
        i = ni;
        if dom == "mailto" {
            return i;
        }
        while i >= 0 && !dom.is_empty() && (self.at(i) == b',' || self.at(i) == b'@') {
            if self.at(i) == b'@' {
                i -= 1;
            }
            while i >= 0 && self.at(i) == b',' {
                i -= 1;
            }
            let (d, ni) = self.domain(i);
            dom = d;
            i = ni;
        }
        self.first_error = None;
        self.recent_error = None;
        i
    }

    /// Plan B: one address per '@' sign, with word-like borders found
    /// heuristically on either side.
    fn plan_b(&mut self) {
        let s = &self.s;
        let mut left_border: isize = 0;
        let mut atsign = s.iter().position(|&c| c == b'@').map(|v| v as isize);
        while let Some(at) = atsign {
            let next_atsign = s[(at + 1) as usize..]
                .iter()
                .position(|&c| c == b'@')
                .map(|v| v as isize + at + 1);
            let right_border = match next_atsign {
                None => s.len() as isize,
                Some(next) => self.find_border(at + 1, next - 1),
            };
            if left_border > 0
                && (self.at(left_border) == b'.' || self.at(left_border) == b'>')
            {
                left_border += 1;
            }
            let mut end = at + 1;
            while end <= right_border && self.at(end) == b' ' {
                end += 1;
            }
            while end <= right_border
                && (self.at(end).is_ascii_alphanumeric()
                    || self.at(end) == b'.'
                    || self.at(end) == b'-')
            {
                end += 1;
            }
            let mut start = at;
            while start >= left_border && start > 0 && self.at(start - 1) == b' ' {
                start -= 1;
            }
            while start > left_border
                && start > 0
                && (self.at(start - 1).is_ascii_alphanumeric()
                    || self.at(start - 1) == b'.'
                    || self.at(start - 1) == b'-')
            {
                start -= 1;
            }
            let lp = strings::simplify(&self.slice(start, at));
            let dom = strings::simplify(&self.slice(at + 1, end));
            if !lp.is_empty() && !dom.is_empty() {
                self.addresses.push(Address::new("", &lp, &dom));
            }
            atsign = next_atsign;
            left_border = right_border;
        }
    }

    /// Finds the point between `left` and `right` which is most likely to
    /// be the border between two addresses. Mucho heuristics. Never used
    /// for correct addresses, only when we're grasping at straws.
    fn find_border(&self, left: isize, right: isize) -> isize {
        // if there's only one chance, that _is_ the border
        if right <= left {
            return left;
        }

        // comma? semicolon? angle brackets? To: <a@b.c><d@e.f>
        for &sep in &[b',', b';', b'<', b'>'] {
            if let Some(p) = self.s[left.max(0) as usize..]
                .iter()
                .position(|&c| c == sep)
            {
                let b = left + p as isize;
                if b <= right {
                    return b;
                }
            }
        }

        // whitespace?
        let mut b = left;
        while b <= right
            && self.at(b) != b' '
            && self.at(b) != b'\t'
            && self.at(b) != b'\r'
            && self.at(b) != b'\n'
        {
            b += 1;
        }
        if b >= left && b <= right {
            return b;
        }

        // try to scan for the end of the presumed right-hand-side domain
        let mut b = left;
        let mut dot = b;
        while b <= right {
            let mut any = false;
            while b <= right
                && (self.at(b).is_ascii_alphanumeric() || self.at(b) == b'-')
            {
                any = true;
                b += 1;
            }
            // did we see a domain component at all?
            if !any {
                if b > left && self.at(b - 1) == b'.' {
                    return b - 1; // no, but we just saw a dot: border there
                }
                return b; // no, and no dot, so put the border here
            }
            if b <= right {
                // if we don't see a dot here, the domain cannot go on
                if self.at(b) != b'.' {
                    return b;
                }
                dot = b;
                b += 1;
                // is the next domain component a top-level domain?
                for tld in tld::TLDS {
                    let l = tld.len() as isize;
                    if b + l <= right {
                        let c = self.at(b + l);
                        if !c.is_ascii_alphanumeric()
                            && self.slice(b, b + l).to_lowercase() == *tld
                        {
                            return b + l;
                        }
                    }
                }
            }
        }
        // the entire area is legal in a domain, but we have to draw the
        // line somewhere: the rightmost dot seen in the middle
        if dot > left && dot < right {
            return dot;
        }

        // the entire area is a single word. what can we do?
        if right + 1 >= self.s.len() as isize {
            return right;
        }
        left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Vec<Address> {
        AddressParser::new(s).addresses
    }

    #[test]
    fn simple_addr_spec() {
        let a = parse("foo@bar.example");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].localpart, "foo");
        assert_eq!(a[0].domain, "bar.example");
        assert_eq!(a[0].kind(), AddressKind::Normal);
    }

    #[test]
    fn name_addr() {
        let a = parse("Foo Bar <foo@bar.example>");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].raw_name(), "Foo Bar");
        assert_eq!(a[0].localpart, "foo");
        assert_eq!(a[0].domain, "bar.example");
    }

    #[test]
    fn quoted_name() {
        let a = parse("\"Bar, Foo\" <foo@bar.example>");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].raw_name(), "Bar, Foo");
    }

    #[test]
    fn address_list() {
        let a = parse("a@one.test, b@two.test , c@three.test");
        assert_eq!(a.len(), 3);
        // reverse scan, but the list order is restored by the caller; here
        // we just check the members arrived
        let mut lps: Vec<&str> = a.iter().map(|a| a.localpart.as_str()).collect();
        lps.sort_unstable();
        assert_eq!(lps, vec!["a", "b", "c"]);
    }

    #[test]
    fn group_with_members() {
        let a = parse("A Group:Chris Jones <c@public.example>,joe@example.org,John <jdoe@one.test>;");
        assert_eq!(a.len(), 3);
        let names: Vec<String> = a.iter().map(|a| a.raw_name().to_string()).collect();
        assert!(names.contains(&"Chris Jones".to_string()));
        assert!(names.contains(&"John".to_string()));
        assert!(names.contains(&"".to_string()));
    }

    #[test]
    fn empty_group() {
        let a = parse("Undisclosed-Recipients:;");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].kind(), AddressKind::EmptyGroup);
        assert_eq!(a[0].raw_name(), "Undisclosed-Recipients");
    }

    #[test]
    fn microsoft_empty_group() {
        let a = parse("<Unknown-Recipient:;>");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].kind(), AddressKind::EmptyGroup);
    }

    #[test]
    fn bounce() {
        let a = parse("<>");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].kind(), AddressKind::Bounce);
        assert_eq!(a[0].rfc822(false), "<>");
    }

    #[test]
    fn route_addr() {
        let a = parse("<@gateway.example:joe@one.test>");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].localpart, "joe");
        assert_eq!(a[0].domain, "one.test");
    }

    #[test]
    fn name_same_as_address_is_dropped() {
        let a = parse("\"foo@bar.example\" <foo@bar.example>");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].raw_name(), "");
    }

    #[test]
    fn comment_as_name() {
        let a = parse("foo@bar.example (Foo B.)");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].raw_name(), "Foo B.");
    }

    #[test]
    fn domain_literal() {
        let a = parse("joe@[127.0.0.1]");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].domain, "[127.0.0.1]");
    }

    #[test]
    fn plan_b_salvage() {
        // the grammar scan gets stuck on the dangling '<', so the @-sweep
        // takes over
        let a = parse("x <someone@example.org");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].localpart, "someone");
        assert_eq!(a[0].domain, "example.org");
    }

    #[test]
    fn plan_c_salvage() {
        // the doubled ';' breaks the group parser; the group name is still
        // salvageable
        let a = parse("friends:;;");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].kind(), AddressKind::EmptyGroup);
        assert_eq!(a[0].raw_name(), "friends");
    }

    #[test]
    fn group_name_only() {
        let a = parse("my friends-list:;");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].kind(), AddressKind::EmptyGroup);
    }

    #[test]
    fn vms_percent_address() {
        let a = parse("gw%\"user@inner.example\"");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].localpart, "user");
        assert_eq!(a[0].domain, "inner.example");
    }

    #[test]
    fn vms_node_user() {
        let a = parse("NODE::USER \"Some Name\"");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].localpart, "NODE::USER");
        assert_eq!(a[0].kind(), AddressKind::Local);
    }

    #[test]
    fn quoted_whole_input() {
        let a = parse("\"joe@one.test\"");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].localpart, "joe");
        assert_eq!(a[0].domain, "one.test");
    }

    #[test]
    fn overlong_localpart_is_rejected() {
        let lp: String = std::iter::repeat('x').take(300).collect();
        let p = AddressParser::new(&format!("{}@", lp));
        assert!(p.addresses.is_empty());
        assert!(p.error().is_some());
    }

    #[test]
    fn uniquify_prefers_named() {
        let mut l = vec![
            Address::new("", "a", "ex.test"),
            Address::new("Ann", "A", "EX.test"),
        ];
        uniquify(&mut l);
        assert_eq!(l.len(), 1);
        assert_eq!(l[0].raw_name(), "Ann");
    }

    #[test]
    fn references_variant() {
        let p = AddressParser::references("<a@b> garbage <c@d>");
        assert!(p.error().is_none());
        assert_eq!(p.addresses.len(), 2);
        let mut lps: Vec<&str> = p.addresses.iter().map(|a| a.localpart.as_str()).collect();
        lps.sort_unstable();
        assert_eq!(lps, vec!["a", "c"]);
    }

    #[test]
    fn round_trip() {
        for s in &[
            "foo@bar.example",
            "Foo Bar <foo@bar.example>",
            "<>",
            "Undisclosed-Recipients:;",
        ] {
            let a = parse(s);
            assert_eq!(a.len(), 1, "{}", s);
            let again = parse(&a[0].rfc822(false));
            assert_eq!(again.len(), 1, "{}", s);
            assert_eq!(again[0], a[0], "{}", s);
        }
    }
}
