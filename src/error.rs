use std::fmt::Display;

use hyper::{
    http::uri::{InvalidUri, InvalidUriParts},
    StatusCode,
};
use poem::error::ResponseError;
use tracing::{error, warn};

/// Struct to represent when the proxy encounters an error,
///
/// Every error surfaces to the registry client as a generic server error, the category is kept
/// for logging and for tests.
///
#[derive(Debug)]
pub struct Error {
    category: ErrorCategory,
}

impl Error {
    /// The upstream responded in a way that breaks the registry auth protocol,
    ///
    pub fn protocol(reason: &'static str) -> Self {
        warn!("Protocol error from upstream, reason: {reason}");
        Error {
            category: ErrorCategory::Protocol(reason),
        }
    }

    /// The requested operation cannot be completed w/ the given settings,
    ///
    pub fn invalid_operation(reason: &'static str) -> Self {
        error!("Error while executing an operation, reason: {reason}");
        Error {
            category: ErrorCategory::InvalidOperation(reason),
        }
    }

    /// Returns an error that indicates a data-format issue,
    ///
    pub fn data_format() -> Self {
        Error {
            category: ErrorCategory::DataFormat,
        }
    }

    /// Returns an error that indicates that there was an error calling an upstream registry,
    ///
    pub fn external_dependency() -> Self {
        Error {
            category: ErrorCategory::ExternalDependency,
        }
    }

    /// Returns an error that indicates that there was an error with the system env. For example reading a file, etc.
    ///
    pub fn system_environment() -> Self {
        Error {
            category: ErrorCategory::SystemEnvironment,
        }
    }

    /// Returns true if this error was caused by a malformed upstream auth exchange,
    ///
    pub fn is_protocol(&self) -> bool {
        matches!(self.category, ErrorCategory::Protocol(_))
    }

    /// Returns true if this error was caused by malformed input data,
    ///
    pub fn is_data_format(&self) -> bool {
        matches!(self.category, ErrorCategory::DataFormat)
    }

    /// Returns true if this error was caused by the upstream transport,
    ///
    pub fn is_external_dependency(&self) -> bool {
        matches!(self.category, ErrorCategory::ExternalDependency)
    }
}

#[derive(Debug)]
enum ErrorCategory {
    DataFormat,
    Protocol(&'static str),
    ExternalDependency,
    SystemEnvironment,
    InvalidOperation(&'static str),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.category {
            ErrorCategory::Protocol(reason) | ErrorCategory::InvalidOperation(reason) => {
                write!(f, "{reason}")
            }
            category => write!(f, "{:?}", category),
        }
    }
}

impl ResponseError for Error {
    fn status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<InvalidUri> for Error {
    fn from(value: InvalidUri) -> Self {
        error!("Error parsing uri, {value}");
        Self::data_format()
    }
}

impl From<InvalidUriParts> for Error {
    fn from(value: InvalidUriParts) -> Self {
        error!("Error building uri, {value}");
        Self::data_format()
    }
}

impl From<hyper::Error> for Error {
    fn from(value: hyper::Error) -> Self {
        error!("Error making http request, {value}");
        Self::external_dependency()
    }
}

impl From<hyper::http::Error> for Error {
    fn from(value: hyper::http::Error) -> Self {
        error!("Error building http request, {value}");
        Self::data_format()
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        error!("Error w/ system i/o, {value}");
        Self::system_environment()
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        error!("Error with json serialization, {value}");
        Self::data_format()
    }
}

impl From<toml::de::Error> for Error {
    fn from(value: toml::de::Error) -> Self {
        error!("Error reading toml config, {value}");
        Self::data_format()
    }
}

impl From<serde_urlencoded::ser::Error> for Error {
    fn from(value: serde_urlencoded::ser::Error) -> Self {
        error!("Error encoding query string, {value}");
        Self::data_format()
    }
}
