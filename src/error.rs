use thiserror::Error;

/// An error type that represents the different kinds of problems that may be
/// encountered while parsing or re-encoding a message.
///
/// Errors of this type are rarely returned; they are usually *stored*. A
/// malformed field keeps parsing and records the first problem in its error
/// slot, and `Header::valid()` / `Part::error()` surface the stored errors to
/// callers that care.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    /// Data that was specified as being in the quoted-printable transfer
    /// encoding could not be decoded as quoted-printable data.
    #[error("quoted-printable decode error: {0}")]
    QuotedPrintable(String),
    /// Data that was specified as being in the base64 transfer encoding
    /// could not be decoded as base64 data.
    #[error("base64 decode error: {0}")]
    Base64(String),
    /// The raw bytes could not be converted to text using the character set
    /// named in the message, or that character set is not in the registry.
    #[error("encoding error: {0}")]
    Encoding(String),
    /// A syntax problem, with position and nearby-text context.
    #[error("{0}")]
    Parse(String),
    /// Some other problem; the description provides the details.
    #[error("{0}")]
    Generic(&'static str),
}

impl From<quoted_printable::QuotedPrintableError> for MailError {
    fn from(err: quoted_printable::QuotedPrintableError) -> MailError {
        MailError::QuotedPrintable(err.to_string())
    }
}

impl From<base64::DecodeError> for MailError {
    fn from(err: base64::DecodeError) -> MailError {
        MailError::Base64(err.to_string())
    }
}
