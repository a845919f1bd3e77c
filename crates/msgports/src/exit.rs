use std::fmt;
use std::io;

use msgports::port::PortError;
use msgports::wire::WireError;

// Process exit codes. USAGE follows sysexits(3); DATA_INVALID marks a bad script or capture.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// A scenario script that names something it never created, or misuses it.
    pub fn script(step: usize, message: impl fmt::Display) -> Self {
        Self::new(DATA_INVALID, format!("script step {step}: {message}"))
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => USAGE,
        io::ErrorKind::BrokenPipe | io::ErrorKind::WriteZero => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn json_error(context: &str, err: serde_json::Error) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn port_error(step: usize, err: PortError) -> CliError {
    CliError::script(step, err)
}

pub fn wire_error(context: &str, err: WireError) -> CliError {
    match err {
        WireError::Io(source) => io_error(context, source),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use msgports::port::{ChannelId, PortId};

    use super::*;

    #[test]
    fn missing_file_is_usage() {
        let err = io_error("read script", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.code, USAGE);
        assert!(err.message.starts_with("read script: "));
    }

    #[test]
    fn wire_io_maps_through_io_kind() {
        let err = wire_error(
            "decode",
            WireError::Io(io::Error::from(io::ErrorKind::PermissionDenied)),
        );
        assert_eq!(err.code, PERMISSION_DENIED);
    }

    #[test]
    fn malformed_capture_is_data_invalid() {
        assert_eq!(wire_error("decode", WireError::InvalidMagic).code, DATA_INVALID);
        assert_eq!(
            wire_error("decode", WireError::ConnectionClosed).code,
            DATA_INVALID
        );
    }

    #[test]
    fn port_errors_name_the_step() {
        let err = port_error(3, PortError::UnknownChannel(ChannelId::new(9)));
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("script step 3: "));

        let err = port_error(0, PortError::UnknownPort(PortId::new(2)));
        assert_eq!(err.code, DATA_INVALID);
    }
}
