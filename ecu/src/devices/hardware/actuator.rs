use crate::{
    errors::EcuError,
    messages::control::command::{ActuationMessage, Command},
};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{io, time::Duration};
use tokio::{io::AsyncWriteExt, net::TcpStream, time::timeout};

/// Default bound on connecting to, or writing to, the vehicle driver.
const DEFAULT_TCP_TIMEOUT_MS: u64 = 100;

fn default_tcp_timeout_ms() -> u64 {
    DEFAULT_TCP_TIMEOUT_MS
}

/// Steering and throttle outputs of the vehicle. Values are passed
/// through untouched, clamping to the valid range is the job of the
/// implementation.
#[async_trait]
pub trait VehicleActuator: Send {
    /// Set the steering value.
    async fn set_steering(&mut self, value: f64) -> Result<(), EcuError>;

    /// Set the throttle value.
    async fn set_throttle(&mut self, value: f64) -> Result<(), EcuError>;

    /// Route a command to the matching output.
    async fn apply(&mut self, command: Command) -> Result<(), EcuError> {
        match command {
            Command::Steering(value) => self.set_steering(value).await,
            Command::Throttle(value) => self.set_throttle(value).await,
        }
    }
}

/// Which actuator backend to build.
#[derive(Deserialize, Serialize, PartialEq, Eq, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActuatorConfig {
    /// Forward commands to the vehicle driver process over TCP.
    Tcp {
        /// Address of the driver, i.e. 127.0.0.1:17660.
        address: String,
        /// Longest a connect or a write may take, in milliseconds.
        #[serde(default = "default_tcp_timeout_ms")]
        timeout_ms: u64,
    },
    /// Log commands only, nothing is driven.
    DryRun,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        ActuatorConfig::Tcp {
            address: String::from("127.0.0.1:17660"),
            timeout_ms: DEFAULT_TCP_TIMEOUT_MS,
        }
    }
}

impl ActuatorConfig {
    /// A zero timeout would fail every command.
    pub fn validate(&self) -> Result<(), EcuError> {
        match self {
            ActuatorConfig::Tcp { timeout_ms: 0, .. } => Err(EcuError::InvalidConfig(
                String::from("actuator timeout_ms must be greater than zero"),
            )),
            _ => Ok(()),
        }
    }

    /// Build the configured actuator.
    pub fn build(&self) -> Box<dyn VehicleActuator> {
        match self {
            ActuatorConfig::Tcp {
                address,
                timeout_ms,
            } => Box::new(TcpActuator::new(
                address.clone(),
                Duration::from_millis(*timeout_ms),
            )),
            ActuatorConfig::DryRun => Box::new(DryRunActuator::default()),
        }
    }
}

/// Sends each command as a JSON line to the process that owns the
/// motor driver. The connection is opened on the first command and
/// re-opened on the command after a failure. Connects and writes
/// are bounded so an unreachable driver cannot stall the caller.
pub struct TcpActuator {
    /// Address of the driver process.
    address: String,
    /// Bound on a single connect or write.
    timeout: Duration,
    /// Live connection, `None` until connected or after a failure.
    stream: Option<TcpStream>,
}

impl TcpActuator {
    /// Create an actuator for the driver at `address`, no connection
    /// is made until the first command.
    ///
    /// * `address`: driver address, i.e. 127.0.0.1:17660.
    /// * `timeout`: bound on a single connect or write.
    pub fn new(address: String, timeout: Duration) -> Self {
        Self {
            address,
            timeout,
            stream: None,
        }
    }

    /// True while a connection to the driver is held.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, command: Command) -> Result<(), EcuError> {
        let line = ActuationMessage::new(command).to_line().map_err(|e| {
            EcuError::ActuatorUnavailable(io::Error::new(io::ErrorKind::InvalidData, e))
        })?;

        if self.stream.is_none() {
            let stream = timeout(self.timeout, TcpStream::connect(&self.address))
                .await
                .map_err(|_| self.timed_out("connecting"))?
                .map_err(EcuError::ActuatorUnavailable)?;
            stream.set_nodelay(true).map_err(EcuError::ActuatorUnavailable)?;
            info!("Connected to vehicle driver at {}", self.address);
            self.stream = Some(stream);
        }

        if let Some(stream) = self.stream.as_mut() {
            let written = match timeout(self.timeout, stream.write_all(&line)).await {
                Ok(written) => written,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("writing timed out after {:?}", self.timeout),
                )),
            };
            if let Err(e) = written {
                // A partial line may be on the wire, start over on a new connection.
                warn!("Lost vehicle driver at {}: {e}", self.address);
                self.stream = None;
                return Err(EcuError::ActuatorUnavailable(e));
            }
        }
        Ok(())
    }

    fn timed_out(&self, action: &str) -> EcuError {
        EcuError::ActuatorUnavailable(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{action} to {} timed out after {:?}", self.address, self.timeout),
        ))
    }
}

#[async_trait]
impl VehicleActuator for TcpActuator {
    async fn set_steering(&mut self, value: f64) -> Result<(), EcuError> {
        self.send(Command::Steering(value)).await
    }

    async fn set_throttle(&mut self, value: f64) -> Result<(), EcuError> {
        self.send(Command::Throttle(value)).await
    }
}

/// Bench actuator that only logs, handy when running against a
/// virtual canbus with no vehicle attached.
#[derive(Default, Debug)]
pub struct DryRunActuator {
    /// Last steering value received.
    pub steering: f64,
    /// Last throttle value received.
    pub throttle: f64,
}

#[async_trait]
impl VehicleActuator for DryRunActuator {
    async fn set_steering(&mut self, value: f64) -> Result<(), EcuError> {
        debug!("steering -> {value:.3}");
        self.steering = value;
        Ok(())
    }

    async fn set_throttle(&mut self, value: f64) -> Result<(), EcuError> {
        debug!("throttle -> {value:.3}");
        self.throttle = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::messages::control::command::CommandChannel;
    use rstest::rstest;
    use tokio::{
        io::{AsyncBufReadExt, BufReader},
        net::TcpListener,
    };

    #[tokio::test]
    async fn test_dry_run_keeps_last_values() {
        let mut actuator = DryRunActuator::default();
        actuator.apply(Command::Steering(-9.45)).await.unwrap();
        actuator.apply(Command::Throttle(-1.8)).await.unwrap();
        actuator.apply(Command::Throttle(0.9)).await.unwrap();
        assert_eq!(actuator.steering, -9.45);
        assert_eq!(actuator.throttle, 0.9);
    }

    #[tokio::test]
    async fn test_tcp_actuator_writes_json_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let driver = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(socket).lines();
            let mut received = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                received.push(serde_json::from_str::<ActuationMessage>(&line).unwrap());
                if received.len() == 2 {
                    break;
                }
            }
            received
        });

        let mut actuator = TcpActuator::new(address, Duration::from_millis(100));
        actuator.set_steering(-9.45).await.unwrap();
        actuator.set_throttle(-1.8).await.unwrap();
        assert!(actuator.is_connected());

        let received = driver.await.unwrap();
        assert_eq!(received[0].channel, CommandChannel::Steering);
        assert_eq!(received[0].value, -9.45);
        assert_eq!(received[1].channel, CommandChannel::Throttle);
        assert_eq!(received[1].value, -1.8);
    }

    #[tokio::test]
    async fn test_tcp_actuator_unavailable_driver() {
        // Bind then drop to get a port nothing listens on.
        let address = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let mut actuator = TcpActuator::new(address, Duration::from_millis(100));
        let result = actuator.set_throttle(0.5).await;
        assert!(matches!(result, Err(EcuError::ActuatorUnavailable(_))));
        assert!(!actuator.is_connected());
    }

    #[tokio::test]
    async fn test_tcp_actuator_bounds_a_stalled_write() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        // Driver accepts and then never reads, so the socket buffers fill up.
        let driver = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
            drop(socket);
        });

        let mut actuator = TcpActuator::new(address, Duration::from_millis(50));
        let mut stalled = None;
        for _ in 0..2_000_000 {
            if let Err(e) = actuator.set_throttle(0.5).await {
                stalled = Some(e);
                break;
            }
        }
        driver.abort();

        match stalled {
            Some(EcuError::ActuatorUnavailable(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::TimedOut)
            }
            other => panic!("expected a timed out write, got {other:?}"),
        }
        assert!(!actuator.is_connected());
    }

    #[rstest]
    #[case("type: tcp\naddress: 10.0.0.2:17660\n", 100)]
    #[case("type: tcp\naddress: 10.0.0.2:17660\ntimeout_ms: 20\n", 20)]
    fn test_actuator_config_from_yaml(#[case] raw: &str, #[case] timeout_ms: u64) {
        let tcp: ActuatorConfig = serde_yaml::from_str(raw).unwrap();
        assert_eq!(
            tcp,
            ActuatorConfig::Tcp {
                address: String::from("10.0.0.2:17660"),
                timeout_ms,
            }
        );
        assert!(tcp.validate().is_ok());
        let dry_run: ActuatorConfig = serde_yaml::from_str("type: dry_run\n").unwrap();
        assert_eq!(dry_run, ActuatorConfig::DryRun);
    }

    #[test]
    fn test_zero_tcp_timeout_is_rejected() {
        let config = ActuatorConfig::Tcp {
            address: String::from("127.0.0.1:17660"),
            timeout_ms: 0,
        };
        assert!(matches!(config.validate(), Err(EcuError::InvalidConfig(_))));
    }
}
