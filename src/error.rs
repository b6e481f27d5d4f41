use std::fmt;

pub type DcResult<T> = Result<T, DcError>;

#[derive(Debug)]
pub enum DcError {
    Message(String),
    IOError(std::io::Error),
    Chain(String, Box<Self>),
    Config(String),
    AddrParseError(std::net::AddrParseError),
}

impl DcError {
    pub fn msg<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::Message(msg.into())
    }

    pub fn config<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::Config(msg.into())
    }

    pub fn wrap<S>(msg: S, chained: Self) -> Self
    where
        S: Into<String>,
    {
        Self::Chain(msg.into(), Box::new(chained))
    }
}

pub trait DcWrap<T, E> {
    /// Wrap the error value with additional context.
    fn wrap<C>(self, context: C) -> DcResult<T>
    where
        C: Into<String>,
        E: Into<DcError>;
}

impl<T, E> DcWrap<T, E> for Result<T, E>
where
    E: Into<DcError>,
{
    fn wrap<C>(self, msg: C) -> DcResult<T>
    where
        C: Into<String>,
        E: Into<DcError>,
    {
        // Not using map_err to save 2 useless frames off the captured backtrace
        // in ext_context.
        match self {
            Ok(ok) => Ok(ok),
            Err(error) => Err(DcError::wrap(msg, error.into())),
        }
    }
}

impl fmt::Display for DcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(s) => write!(f, "{s}"),
            Self::Chain(s, e) => write!(f, "{s}: {e}"),
            Self::IOError(e) => write!(f, "IO error: {e}"),
            Self::Config(s) => write!(f, "configuration error: {s}"),
            Self::AddrParseError(e) => write!(f, "parse address: {e}"),
        }
    }
}

impl std::error::Error for DcError {}

impl From<std::io::Error> for DcError {
    fn from(err: std::io::Error) -> Self {
        Self::IOError(err)
    }
}

impl From<std::net::AddrParseError> for DcError {
    fn from(err: std::net::AddrParseError) -> Self {
        Self::AddrParseError(err)
    }
}

impl From<serde_yaml::Error> for DcError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<regex::Error> for DcError {
    fn from(err: regex::Error) -> Self {
        Self::Config(format!("invalid regex: {err}"))
    }
}
