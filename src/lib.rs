//! A tolerant parser, repair engine and canonicalizer for RFC 5322 / 2822 /
//! 822 mail messages and their MIME extensions.
//!
//! Real-world mail is frequently malformed, so this crate is written as a
//! best-effort recognizer: it classifies, repairs and salvages messages
//! rather than rejecting them. Parsing never fails on malformed input;
//! instead, fields, headers and parts carry error slots, a catalogue of
//! repair heuristics clears up what it can, and `valid()` tells you how
//! the patient is doing. Serializing the result produces a canonical wire
//! form with folded, properly encoded headers and recomposed multiparts.
//!
//! # Examples
//! ```
//!     use mailsoup::read_message;
//!     let msg = read_message(concat!(
//!             "From: Foo Bar <foo@bar.example>\r\n",
//!             "Subject: =?ISO-8859-1?Q?foo_bar?=\r\n",
//!             "\r\n",
//!             "Body\r\n").as_bytes())
//!         .unwrap();
//!     let header = msg.header().unwrap();
//!     assert_eq!(header.subject(), "foo bar");
//!     assert_eq!(header.addresses("From")[0].localpart, "foo");
//!     assert_eq!(msg.part.text, "Body\r\n");
//! ```

mod address;
mod codec;
mod cursor;
mod date;
mod error;
mod field;
mod header;
mod mime;
mod part;
mod strings;
mod tld;

pub use crate::address::{uniquify, Address, AddressKind, AddressParser};
pub use crate::codec::Codec;
pub use crate::cursor::{Cursor, EncodedTextKind};
pub use crate::date::{format_date, parse_date};
pub use crate::error::MailError;
pub use crate::field::{AddressField, DateField, Field, HeaderField};
pub use crate::header::{DefaultContentType, Header, HeaderMode};
pub use crate::mime::{
    ContentDisposition, ContentLanguage, ContentTransferEncoding, ContentType, Encoding, Parameter,
};
pub use crate::part::{read_message, Message, Part};
pub use crate::strings::CRLF;
