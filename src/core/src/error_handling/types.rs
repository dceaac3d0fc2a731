use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    NotInRange(String),
    DirectoryDoesNotExist(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::DirectoryDoesNotExist(e) => write!(f, "Directory error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Errors raised by a capture provider or its frame source.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// The provider could not open the requested interface.
    ProviderOpen(String),
    /// The provider failed while waiting for the next frame.
    ProviderRead(String),
    /// A blocked read was released by a forced abort.
    Aborted,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::ProviderOpen(e) => write!(f, "Capture provider open failed: {}", e),
            CaptureError::ProviderRead(e) => write!(f, "Capture provider read failed: {}", e),
            CaptureError::Aborted => write!(f, "Capture aborted"),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Reasons a single frame could not be turned into a record.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    MissingTimestamp,
    MissingProtocol,
    MissingLength,
    InvalidLength(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MissingTimestamp => write!(f, "Frame has no capture timestamp"),
            ParseError::MissingProtocol => write!(f, "Frame has no protocol layer"),
            ParseError::MissingLength => write!(f, "Frame has no length"),
            ParseError::InvalidLength(v) => write!(f, "Invalid frame length: {}", v),
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq)]
pub enum PublishError {
    NoSubscribers,
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::NoSubscribers => write!(f, "No subscriber is listening"),
        }
    }
}

impl std::error::Error for PublishError {}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    ConnectionFailed,
    WriteFailed,
    ReadFailed,
    NotFound(String),
    InvalidKey(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed => write!(f, "Storage connection failed"),
            StorageError::WriteFailed => write!(f, "Storage write failed"),
            StorageError::ReadFailed => write!(f, "Storage read failed"),
            StorageError::NotFound(key) => write!(f, "Object not found: {}", key),
            StorageError::InvalidKey(key) => write!(f, "Invalid object key: {}", key),
        }
    }
}

impl std::error::Error for StorageError {}

/// Failures of the durable sink handoff.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkError {
    Serialize(String),
    Upload(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Serialize(e) => write!(f, "Staging serialization failed: {}", e),
            SinkError::Upload(e) => write!(f, "Upload failed: {}", e),
        }
    }
}

impl std::error::Error for SinkError {}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    AlreadyRunning,
    NotFound,
    NotRunning,
    InvalidPacketLimit,
    CaptureError(CaptureError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::AlreadyRunning => write!(f, "already running"),
            SessionError::NotFound => write!(f, "not found"),
            SessionError::NotRunning => write!(f, "no capture running"),
            SessionError::InvalidPacketLimit => write!(f, "packet limit must be positive"),
            SessionError::CaptureError(e) => write!(f, "Capture error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        SessionError::CaptureError(err)
    }
}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Web server bind failed: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    StorageError(StorageError),
    CaptureError(CaptureError),
    WebError(WebError),
    InitializationFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::StorageError(e) => write!(f, "Storage error: {}", e),
            ControllerError::CaptureError(e) => write!(f, "Capture error: {}", e),
            ControllerError::WebError(e) => write!(f, "Web error: {}", e),
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}
