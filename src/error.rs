use crate::asn1::Asn1Error;
use std::fmt;
use std::io;

/// Build a [`ParseError::MalformedChunk`] from a format string.
macro_rules! malformed {
    ($msg:literal) => {
        $crate::error::ParseError::MalformedChunk($msg.to_string())
    };
    ($fmtstr:literal, $($args:tt)*) => {
        $crate::error::ParseError::MalformedChunk(format!($fmtstr, $($args)*))
    };
}

/// Return early with a [`ParseError::MalformedChunk`].
macro_rules! bail_malformed {
    ($($args:tt)*) => {
        return Err($crate::error::malformed!($($args)*))
    };
}

pub(crate) use bail_malformed;
pub(crate) use malformed;

/// Result alias used by every decoder in the crate.
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors surfaced while reading an APK or one of its binary structures.
#[derive(Debug)]
pub enum ParseError {
    /// The archive has no end-of-central-directory record, or is too short to hold one.
    MalformedContainer(String),
    /// A requested archive entry does not exist.
    MissingEntry(String),
    /// An ARSC/AXML chunk had an unexpected type or size, or a read ran off the buffer.
    MalformedChunk(String),
    /// A string pool offset or index is out of range.
    MalformedPool(String),
    /// A certificate or PKCS#7 blob failed to decode.
    Asn1(Asn1Error),
    /// The platform X.509/CMS backend rejected a certificate.
    Certificate(String),
    /// An icon XML file is not a vector drawable.
    UnsupportedVectorIcon(String),
    Io(io::Error),
    Zip(zip::result::ZipError),
}

/// The closed error taxonomy reported to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedContainer,
    MissingEntry,
    MalformedChunk,
    MalformedPool,
    Asn1DecodingFailure,
    IntegerOverflow,
    UnsupportedVectorIcon,
    Io,
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::MalformedContainer(_) => ErrorKind::MalformedContainer,
            ParseError::MissingEntry(_) => ErrorKind::MissingEntry,
            ParseError::MalformedChunk(_) => ErrorKind::MalformedChunk,
            ParseError::MalformedPool(_) => ErrorKind::MalformedPool,
            ParseError::Asn1(Asn1Error::IntegerOverflow(_)) => ErrorKind::IntegerOverflow,
            ParseError::Asn1(_) | ParseError::Certificate(_) => ErrorKind::Asn1DecodingFailure,
            ParseError::UnsupportedVectorIcon(_) => ErrorKind::UnsupportedVectorIcon,
            ParseError::Io(_) => ErrorKind::Io,
            ParseError::Zip(zip::result::ZipError::Io(_)) => ErrorKind::Io,
            ParseError::Zip(_) => ErrorKind::MalformedContainer,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ErrorKind::MalformedContainer => "MalformedContainer",
            ErrorKind::MissingEntry => "MissingEntry",
            ErrorKind::MalformedChunk => "MalformedChunk",
            ErrorKind::MalformedPool => "MalformedPool",
            ErrorKind::Asn1DecodingFailure => "Asn1DecodingFailure",
            ErrorKind::IntegerOverflow => "IntegerOverflow",
            ErrorKind::UnsupportedVectorIcon => "UnsupportedVectorIcon",
            ErrorKind::Io => "Io",
        };
        f.write_str(tag)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MalformedContainer(msg) => write!(f, "Malformed container: {msg}"),
            ParseError::MissingEntry(path) => write!(f, "Entry not found: {path}"),
            ParseError::MalformedChunk(msg) => write!(f, "Malformed chunk: {msg}"),
            ParseError::MalformedPool(msg) => write!(f, "Malformed string pool: {msg}"),
            ParseError::Asn1(err) => write!(f, "ASN.1 error: {err}"),
            ParseError::Certificate(msg) => write!(f, "Certificate error: {msg}"),
            ParseError::UnsupportedVectorIcon(path) => {
                write!(f, "Icon {path} is not a vector drawable")
            }
            ParseError::Io(err) => write!(f, "I/O error: {err}"),
            ParseError::Zip(err) => write!(f, "ZIP error: {err}"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Asn1(err) => Some(err),
            ParseError::Io(err) => Some(err),
            ParseError::Zip(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Asn1Error> for ParseError {
    fn from(value: Asn1Error) -> Self {
        ParseError::Asn1(value)
    }
}

impl From<io::Error> for ParseError {
    fn from(value: io::Error) -> Self {
        ParseError::Io(value)
    }
}

impl From<zip::result::ZipError> for ParseError {
    fn from(value: zip::result::ZipError) -> Self {
        ParseError::Zip(value)
    }
}

impl From<der::Error> for ParseError {
    fn from(value: der::Error) -> Self {
        ParseError::Certificate(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_render() {
        let err = malformed!("bad chunk type 0x{:04x}", 0x9999);
        assert_eq!(err.kind(), ErrorKind::MalformedChunk);
        assert_eq!(err.to_string(), "Malformed chunk: bad chunk type 0x9999");
        assert_eq!(err.kind().to_string(), "MalformedChunk");
    }

    #[test]
    fn integer_overflow_is_its_own_kind() {
        let err = ParseError::from(Asn1Error::IntegerOverflow("9 bytes into i64".into()));
        assert_eq!(err.kind(), ErrorKind::IntegerOverflow);
        let err = ParseError::from(Asn1Error::Decoding("truncated".into()));
        assert_eq!(err.kind(), ErrorKind::Asn1DecodingFailure);
    }
}
