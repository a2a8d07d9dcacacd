use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("InternalError: {message}, {location}"))]
    Internal {
        message: String,
        location: snafu::Location,
    },
    #[snafu(display("IoError: {message}, {location}"))]
    Io {
        message: String,
        location: snafu::Location,
    },
    #[snafu(display("UnreachableError: {message}, {location}"))]
    Unreachable {
        message: String,
        location: snafu::Location,
    },
    #[snafu(display("TimeoutError: {message}, {location}"))]
    Timeout {
        message: String,
        location: snafu::Location,
    },
    #[snafu(display("CryptoError: {message}, {location}"))]
    Crypto {
        message: String,
        location: snafu::Location,
    },
    #[snafu(display("InvalidData: {message}, {location}"))]
    InvalidData {
        message: String,
        location: snafu::Location,
    },
    #[snafu(display("ProstEncodeError: {message}, {location}"))]
    ProstEncode {
        message: String,
        location: snafu::Location,
    },
    #[snafu(display("ProstDecodeError: {message}, {location}"))]
    ProstDecode {
        message: String,
        location: snafu::Location,
    },
    #[snafu(display("AddrParseError: {message}, {location}"))]
    AddrParse {
        message: String,
        location: snafu::Location,
    },
}

impl Error {
    /// Whether the error means the destination could not be reached at all,
    /// as opposed to a local send failure.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Error::Unreachable { .. })
    }
}

trait SnafuLocationExt {
    fn to_snafu_location(&'static self) -> snafu::Location;
}

impl SnafuLocationExt for std::panic::Location<'static> {
    fn to_snafu_location(&'static self) -> snafu::Location {
        snafu::Location::new(self.file(), self.line(), self.column())
    }
}

macro_rules! make_error_from {
    ($from: ty, $to: ident) => {
        impl From<$from> for Error {
            #[track_caller]
            fn from(value: $from) -> Self {
                Self::$to {
                    message: value.to_string(),
                    location: std::panic::Location::caller().to_snafu_location(),
                }
            }
        }
    };
}

impl From<std::io::Error> for Error {
    #[track_caller]
    fn from(value: std::io::Error) -> Self {
        use std::io::ErrorKind::*;

        let message = value.to_string();
        let location = std::panic::Location::caller().to_snafu_location();

        match value.kind() {
            ConnectionRefused | ConnectionReset | NotConnected | AddrNotAvailable => {
                Self::Unreachable { message, location }
            }
            TimedOut => Self::Timeout { message, location },
            _ => Self::Io { message, location },
        }
    }
}

make_error_from!(prost::DecodeError, ProstDecode);
make_error_from!(prost::EncodeError, ProstEncode);
make_error_from!(std::net::AddrParseError, AddrParse);
make_error_from!(tokio::time::error::Elapsed, Timeout);
