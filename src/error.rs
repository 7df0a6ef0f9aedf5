use std::{
    error::Error,
    fmt::{Display, Formatter},
    path::PathBuf,
};

/// Errors raised by the port finding library itself.
///
/// Plumbing errors (I/O, SQLite, zip archives) are passed through as boxed errors via
/// [PortsResult](crate::PortsResult).
#[derive(Debug, Clone, PartialEq)]
pub enum PortsError {
    /// The input table is missing required fields. This is fatal for the whole pipeline.
    MissingFields(Vec<&'static str>),
    /// A threshold or tuning parameter is out of range.
    InvalidParameter(String),
    /// The clustering algorithm failed internally.
    Clustering(String),
    /// An input path that is not a csv file, zip archive, or directory.
    UnsupportedSource(PathBuf),
}

impl Display for PortsError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        match self {
            Self::MissingFields(fields) => {
                write!(f, "input is missing required fields: {}", fields.join(", "))
            }
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
            Self::Clustering(msg) => write!(f, "clustering failed: {}", msg),
            Self::UnsupportedSource(path) => {
                write!(f, "unsupported input source: {}", path.display())
            }
        }
    }
}

impl Error for PortsError {}
