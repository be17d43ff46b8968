use std::{fmt, io};

/// Errors raised while decoding bus frames and driving the vehicle.
/// Nothing in here is fatal to the control loop, the controller
/// decides per variant whether to drop the frame and carry on.
#[derive(Debug)]
pub enum EcuError {
    /// The payload was too short to hold a sign, integer and fraction byte.
    MalformedFrame {
        /// Identifier of the offending frame.
        id: u32,
        /// Number of payload bytes that were received.
        len: usize,
    },
    /// The actuator could not accept a command.
    ActuatorUnavailable(io::Error),
    /// Opening, reading or closing the CAN bus failed.
    Bus(io::Error),
    /// A configuration file could not be read or parsed.
    Config(config::ConfigError),
    /// The identifier mapping is ambiguous, i.e. one id feeds two channels.
    InvalidMapping(String),
    /// A configuration value is outside its usable range.
    InvalidConfig(String),
}

impl fmt::Display for EcuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcuError::MalformedFrame { id, len } => write!(
                f,
                "malformed frame {id:#x}: payload has {len} bytes, expected at least 3"
            ),
            EcuError::ActuatorUnavailable(e) => write!(f, "actuator unavailable: {e}"),
            EcuError::Bus(e) => write!(f, "canbus error: {e}"),
            EcuError::Config(e) => write!(f, "configuration error: {e}"),
            EcuError::InvalidMapping(reason) => write!(f, "invalid command mapping: {reason}"),
            EcuError::InvalidConfig(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for EcuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EcuError::ActuatorUnavailable(e) | EcuError::Bus(e) => Some(e),
            EcuError::Config(e) => Some(e),
            EcuError::MalformedFrame { .. }
            | EcuError::InvalidMapping(_)
            | EcuError::InvalidConfig(_) => None,
        }
    }
}

impl From<config::ConfigError> for EcuError {
    fn from(e: config::ConfigError) -> Self {
        EcuError::Config(e)
    }
}
