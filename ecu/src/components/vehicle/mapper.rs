use crate::{
    devices::hardware::{
        actuator::VehicleActuator,
        bus::{BusFrame, COMMAND_PAYLOAD_LEN},
    },
    errors::EcuError,
    messages::control::command::Command,
};
use serde::{Deserialize, Serialize};

/// Scale applied to the hundredths byte of a command payload.
const FRACTION_SCALE: f64 = 0.01;

/// Value of the sign byte that marks a negative magnitude.
const NEGATIVE_FLAG: u8 = 1;

/// Which frame ids feed which actuator, and the gain applied on the
/// way through. The defaults match the vehicle wiring: id 0 steers
/// (inverted), id 1 drives the throttle.
#[derive(Deserialize, Serialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct CommandMappingConfig {
    /// Frame id carrying steering commands.
    pub steering_id: u32,
    /// Frame id carrying throttle commands.
    pub throttle_id: u32,
    /// Gain applied to the decoded steering magnitude.
    pub steering_gain: f64,
    /// Gain applied to the decoded throttle magnitude.
    pub throttle_gain: f64,
}

impl Default for CommandMappingConfig {
    fn default() -> Self {
        Self {
            steering_id: 0,
            throttle_id: 1,
            steering_gain: -0.9,
            throttle_gain: 0.9,
        }
    }
}

impl CommandMappingConfig {
    /// An id may select one channel only.
    pub fn validate(&self) -> Result<(), EcuError> {
        if self.steering_id == self.throttle_id {
            return Err(EcuError::InvalidMapping(format!(
                "steering and throttle both use frame id {:#x}",
                self.steering_id
            )));
        }
        Ok(())
    }
}

/// Decode the signed magnitude carried in a command payload:
/// `payload[1] + payload[2] * 0.01`, negated when `payload[0]` is 1.
///
/// * `frame`: frame to decode, only the first three bytes are read.
pub fn magnitude(frame: &BusFrame) -> Result<f64, EcuError> {
    let [sign, integer, fraction] = match frame.payload.get(..COMMAND_PAYLOAD_LEN) {
        Some(&[sign, integer, fraction]) => [sign, integer, fraction],
        _ => {
            return Err(EcuError::MalformedFrame {
                id: frame.id,
                len: frame.payload.len(),
            })
        }
    };
    let magnitude = f64::from(integer) + f64::from(fraction) * FRACTION_SCALE;
    if sign == NEGATIVE_FLAG {
        Ok(-magnitude)
    } else {
        Ok(magnitude)
    }
}

/// Stateless mapper from canbus frames to actuator commands.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMapper {
    config: CommandMappingConfig,
}

impl CommandMapper {
    /// Create a mapper, rejecting ambiguous id mappings.
    ///
    /// * `config`: ids and gains to map with.
    pub fn new(config: CommandMappingConfig) -> Result<Self, EcuError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Mapping the mapper was built with.
    pub fn config(&self) -> &CommandMappingConfig {
        &self.config
    }

    /// Turn a frame into a command. Frames with an unknown id give
    /// `Ok(None)` and their payload is never looked at.
    pub fn decode(&self, frame: &BusFrame) -> Result<Option<Command>, EcuError> {
        if frame.id == self.config.steering_id {
            Ok(Some(Command::Steering(
                magnitude(frame)? * self.config.steering_gain,
            )))
        } else if frame.id == self.config.throttle_id {
            Ok(Some(Command::Throttle(
                magnitude(frame)? * self.config.throttle_gain,
            )))
        } else {
            Ok(None)
        }
    }

    /// Decode a frame and make exactly one actuator call for it when
    /// the id is recognised. Returns the command that was sent.
    ///
    /// * `frame`: frame received from the bus.
    /// * `actuator`: outputs to drive.
    pub async fn decode_and_dispatch<A>(
        &self,
        frame: &BusFrame,
        actuator: &mut A,
    ) -> Result<Option<Command>, EcuError>
    where
        A: VehicleActuator + ?Sized,
    {
        match self.decode(frame)? {
            Some(command) => {
                actuator.apply(command).await?;
                Ok(Some(command))
            }
            None => Ok(None),
        }
    }
}

impl Default for CommandMapper {
    fn default() -> Self {
        Self {
            config: CommandMappingConfig::default(),
        }
    }
}
