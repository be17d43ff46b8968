use crate::errors::EcuError;
use async_trait::async_trait;
use log::{info, warn};
use socketcan::{tokio::CanSocket as AsyncCanSocket, CanFrame, EmbeddedFrame, Id};
use std::io;
use uuid::Uuid;

/// Minimum payload a frame needs to carry a command: sign flag,
/// integer part and hundredths.
pub const COMMAND_PAYLOAD_LEN: usize = 3;

/// A frame taken off the canbus. The identifier is flattened to its
/// raw value so standard and extended frames are handled the same.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusFrame {
    /// Raw arbitration id.
    pub id: u32,
    /// Data bytes, up to eight for classic CAN.
    pub payload: Vec<u8>,
}

impl BusFrame {
    /// Create a frame from an id and payload.
    pub fn new(id: u32, payload: &[u8]) -> Self {
        Self {
            id,
            payload: payload.to_vec(),
        }
    }

    /// Convert a socketcan frame. Error frames are reported as a bus
    /// error, remote frames come through with an empty payload.
    pub fn from_can_frame(frame: &CanFrame) -> Result<Self, EcuError> {
        if let CanFrame::Error(error_frame) = frame {
            return Err(EcuError::Bus(io::Error::new(
                io::ErrorKind::Other,
                format!("received error frame {error_frame:?}"),
            )));
        }
        let id = match frame.id() {
            Id::Standard(id) => u32::from(id.as_raw()),
            Id::Extended(id) => id.as_raw(),
        };
        Ok(Self::new(id, frame.data()))
    }
}

/// Source of canbus frames for the control loop.
#[async_trait]
pub trait BusReceiver: Send {
    /// Wait for the next frame. Implementations must be cancel safe as
    /// the controller drops this future on timeout and on shutdown.
    async fn receive(&mut self) -> Result<BusFrame, EcuError>;

    /// Release the bus. Closing an already closed bus is a no-op.
    fn close(&mut self) -> Result<(), EcuError>;
}

/// SocketCAN backed receiver. The socket is owned for the lifetime of
/// the struct and released by [`BusReceiver::close`] or on drop,
/// whichever comes first.
pub struct CanBus {
    /// Unique identifier for the bus connection, used in the logs.
    uuid: Uuid,
    /// Canbus interface name, i.e. can0.
    channel: String,
    /// `None` once the bus has been closed.
    socket: Option<AsyncCanSocket>,
}

impl CanBus {
    /// Open the named interface.
    ///
    /// * `channel`: interface name, i.e. can0, vcan0.
    pub fn open(channel: &str) -> Result<Self, EcuError> {
        let socket = AsyncCanSocket::open(channel).map_err(EcuError::Bus)?;
        let uuid = Uuid::new_v4();
        info!("Opened canbus {channel} ({uuid})");
        Ok(Self {
            uuid,
            channel: channel.to_string(),
            socket: Some(socket),
        })
    }

    /// Interface name the bus was opened on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// True until the bus is closed.
    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}

#[async_trait]
impl BusReceiver for CanBus {
    async fn receive(&mut self) -> Result<BusFrame, EcuError> {
        let socket = self.socket.as_ref().ok_or_else(|| {
            EcuError::Bus(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("canbus {} is closed", self.channel),
            ))
        })?;
        let frame = socket.read_frame().await.map_err(EcuError::Bus)?;
        BusFrame::from_can_frame(&frame)
    }

    fn close(&mut self) -> Result<(), EcuError> {
        if let Some(socket) = self.socket.take() {
            drop(socket);
            info!("Closed canbus {} ({})", self.channel, self.uuid);
        }
        Ok(())
    }
}

impl Drop for CanBus {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("Canbus {} dropped while open, closing", self.channel);
            if let Err(e) = self.close() {
                warn!("Failed to close canbus {}: {e}", self.channel);
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use rstest::rstest;
    use socketcan::{ExtendedId, StandardId};

    #[rstest]
    #[case(0, vec![0, 10, 50])]
    #[case(1, vec![1, 2, 0])]
    #[case(0x7ff, vec![0, 0, 0, 4, 5, 6, 7, 8])]
    fn test_standard_frame_conversion(#[case] id: u16, #[case] payload: Vec<u8>) {
        let frame = CanFrame::new(StandardId::new(id).unwrap(), &payload).unwrap();
        let converted = BusFrame::from_can_frame(&frame).unwrap();
        assert_eq!(converted, BusFrame::new(u32::from(id), &payload));
    }

    #[test]
    fn test_extended_frame_keeps_raw_id() {
        let frame = CanFrame::new(ExtendedId::new(0x18fe_f100).unwrap(), &[0, 1, 2]).unwrap();
        let converted = BusFrame::from_can_frame(&frame).unwrap();
        assert_eq!(converted.id, 0x18fe_f100);
        assert_eq!(converted.payload, vec![0, 1, 2]);
    }

    #[test]
    fn test_remote_frame_has_empty_payload() {
        let frame = CanFrame::new_remote(StandardId::new(1).unwrap(), 0).unwrap();
        let converted = BusFrame::from_can_frame(&frame).unwrap();
        assert!(converted.payload.len() < COMMAND_PAYLOAD_LEN);
    }

    /// Requires a virtual can interface: `ip link add dev vcan0 type vcan`.
    #[cfg(feature = "hardware_test")]
    #[tokio::test]
    async fn test_open_and_close_vcan() {
        let mut bus = CanBus::open("vcan0").expect("vcan0 not available");
        assert!(bus.is_open());
        bus.close().unwrap();
        bus.close().unwrap();
        assert!(!bus.is_open());
        assert!(bus.receive().await.is_err());
    }
}
