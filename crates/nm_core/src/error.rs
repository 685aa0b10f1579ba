use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or incomplete site definitions. Fatal at startup.
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Network failure, timeout or non-success status while fetching a page.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// A selector matched no nodes on the fetched page.
    #[error("Selector error: {0}")]
    Selector(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// True for failures that happened while talking to a remote page.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Error::Fetch(_) | Error::Http(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidUrl(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
