use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Actuator channel a command is destined for.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandChannel {
    /// Front wheel steering.
    Steering,
    /// Drive motor throttle.
    Throttle,
}

/// A normalised actuation command derived from one canbus frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Command {
    /// Steering value, sign follows the vehicle convention.
    Steering(f64),
    /// Throttle value, negative values reverse.
    Throttle(f64),
}

impl Command {
    /// Channel the command targets.
    pub fn channel(&self) -> CommandChannel {
        match self {
            Command::Steering(_) => CommandChannel::Steering,
            Command::Throttle(_) => CommandChannel::Throttle,
        }
    }

    /// Raw command value.
    pub fn value(&self) -> f64 {
        match self {
            Command::Steering(value) | Command::Throttle(value) => *value,
        }
    }
}

/// Message written to the vehicle driver process, one JSON
/// object per line.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ActuationMessage {
    /// Which actuator to drive.
    pub channel: CommandChannel,
    /// Value to apply. Clamping is left to the driver.
    pub value: f64,
    /// UTC time the command left the control loop.
    pub issued_at: DateTime<Utc>,
}

impl ActuationMessage {
    /// Stamp a command with the current time.
    pub fn new(command: Command) -> Self {
        Self {
            channel: command.channel(),
            value: command.value(),
            issued_at: Utc::now(),
        }
    }

    /// Serialise into a newline terminated JSON line.
    pub fn to_line(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}
