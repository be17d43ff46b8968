use crate::{
    components::vehicle::mapper::{CommandMapper, CommandMappingConfig},
    devices::hardware::{
        actuator::{ActuatorConfig, VehicleActuator},
        bus::{BusReceiver, CanBus},
    },
    errors::EcuError,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{ffi::OsStr, future::Future, path::Path, time::Duration};
use tokio::time::timeout;
use uuid::Uuid;

/// Set the configuration for the vehicle control component. The
/// defaults reproduce the vehicle wiring: can0 in, steering on id 0,
/// throttle on id 1, commands forwarded to the local driver process.
#[derive(Deserialize, Serialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct VehicleControlConfig {
    /// The addressable canbus interface ID.
    canbus_id: String,
    /// Longest the loop waits on the bus before checking in, in milliseconds.
    receive_timeout_ms: u64,
    /// Zero the throttle once when the bus goes quiet for a full timeout.
    failsafe_on_timeout: bool,
    /// Frame id to channel mapping and gains.
    mapping: CommandMappingConfig,
    /// Actuator backend.
    actuator: ActuatorConfig,
}

impl Default for VehicleControlConfig {
    fn default() -> Self {
        Self {
            canbus_id: String::from("can0"),
            receive_timeout_ms: 100,
            failsafe_on_timeout: false,
            mapping: CommandMappingConfig::default(),
            actuator: ActuatorConfig::default(),
        }
    }
}

impl VehicleControlConfig {
    /// Vehicle control configuration with the default mapping.
    ///
    /// * `canbus_id`: String for the bus i.e., can0.
    /// * `actuator`: backend the commands are sent to.
    pub fn new(canbus_id: String, actuator: ActuatorConfig) -> Self {
        Self {
            canbus_id,
            actuator,
            ..Self::default()
        }
    }

    /// Replace the frame id mapping.
    pub fn with_mapping(mut self, mapping: CommandMappingConfig) -> Self {
        self.mapping = mapping;
        self
    }

    /// Set the receive timeout in milliseconds.
    pub fn with_receive_timeout_ms(mut self, receive_timeout_ms: u64) -> Self {
        self.receive_timeout_ms = receive_timeout_ms;
        self
    }

    /// Enable or disable the throttle failsafe on bus silence.
    pub fn with_failsafe_on_timeout(mut self, failsafe_on_timeout: bool) -> Self {
        self.failsafe_on_timeout = failsafe_on_timeout;
        self
    }

    /// Canbus interface the component listens on.
    pub fn canbus_id(&self) -> &str {
        &self.canbus_id
    }

    /// A zero receive timeout would spin the loop on a quiet bus.
    pub fn validate(&self) -> Result<(), EcuError> {
        if self.receive_timeout_ms == 0 {
            return Err(EcuError::InvalidConfig(String::from(
                "receive_timeout_ms must be greater than zero",
            )));
        }
        self.mapping.validate()?;
        self.actuator.validate()
    }

    /// Read the configuration from a yaml file.
    ///
    /// * `filepath`: filepath to the stored parameters.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self, EcuError> {
        let file = Path::new(&filepath);
        if !file.is_file() {
            return Err(EcuError::Config(config::ConfigError::Message(format!(
                "Could not locate the config file {:?}",
                file
            ))));
        }
        let config_file = config::Config::builder()
            .add_source(config::File::new(
                &file.to_string_lossy(),
                config::FileFormat::Yaml,
            ))
            .build()?;

        Ok(config_file.try_deserialize::<VehicleControlConfig>()?)
    }
}

/// Counters reported when the control loop exits.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    /// Frames that produced an actuator call.
    pub dispatched: u64,
    /// Frames with an id that maps to no channel.
    pub ignored: u64,
    /// Frames dropped for a short payload.
    pub malformed: u64,
    /// Actuator calls that failed.
    pub actuator_failures: u64,
    /// Failed bus reads.
    pub bus_errors: u64,
    /// Receive timeouts.
    pub timeouts: u64,
}

/// Component that turns canbus frames into steering and throttle
/// commands for the vehicle.
pub struct VehicleControl {
    /// Unique identifier for the component.
    uuid: Uuid,
    /// Canbus interface name.
    canbus_id: String,
    /// Upper bound on a single bus read.
    receive_timeout: Duration,
    /// Send a zero throttle once the bus goes quiet.
    failsafe_on_timeout: bool,
    /// Frame to command mapping.
    mapper: CommandMapper,
    /// Outputs driven by the mapped commands.
    actuator: Box<dyn VehicleActuator>,
}

impl VehicleControl {
    /// Create a new component from a config struct, building the
    /// configured actuator.
    ///
    /// * `config`: Struct containing the parameters for configuration.
    pub fn new(config: VehicleControlConfig) -> Result<Self, EcuError> {
        let actuator = config.actuator.build();
        Self::with_actuator(config, actuator)
    }

    /// Create a component that drives the given actuator instead of
    /// the one named in the config.
    pub fn with_actuator(
        config: VehicleControlConfig,
        actuator: Box<dyn VehicleActuator>,
    ) -> Result<Self, EcuError> {
        config.validate()?;
        Ok(Self {
            uuid: Uuid::new_v4(),
            canbus_id: config.canbus_id,
            receive_timeout: Duration::from_millis(config.receive_timeout_ms),
            failsafe_on_timeout: config.failsafe_on_timeout,
            mapper: CommandMapper::new(config.mapping)?,
            actuator,
        })
    }

    /// Create a new component by reading the config parameters from a file.
    ///
    /// * `filepath`: path to config file.
    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self, EcuError> {
        let config = VehicleControlConfig::from_file(filepath)?;
        Self::new(config)
    }

    /// Return the unique id of the component.
    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }

    /// Canbus interface the component listens on.
    pub fn canbus_id(&self) -> &str {
        &self.canbus_id
    }
}

/// Closes the wrapped bus when dropped, so the bus is released even
/// when the controller future is dropped part way through.
struct OpenBus<B: BusReceiver>(B);

impl<B: BusReceiver> Drop for OpenBus<B> {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            warn!("Failed to close canbus: {e}");
        }
    }
}

/// Unit struct for adding controlling behaviour to the vehicle control.
pub struct VehicleControlController;

impl VehicleControlController {
    /// Open the canbus named by the component, run the control loop
    /// until `shutdown` resolves, then release the bus.
    ///
    /// * `vehicle_control`: component
    /// * `shutdown`: resolves when the loop should stop, i.e. ctrl-c.
    pub async fn start<S>(
        vehicle_control: VehicleControl,
        shutdown: S,
    ) -> Result<LoopSummary, EcuError>
    where
        S: Future<Output = ()>,
    {
        let bus = CanBus::open(&vehicle_control.canbus_id)?;
        Self::start_with(vehicle_control, bus, shutdown).await
    }

    /// Run the control loop on an already open bus and take ownership
    /// of closing it, on return or when this future is dropped.
    ///
    /// * `vehicle_control`: component
    /// * `bus`: open bus, closed before this returns.
    /// * `shutdown`: resolves when the loop should stop.
    pub async fn start_with<B, S>(
        mut vehicle_control: VehicleControl,
        bus: B,
        shutdown: S,
    ) -> Result<LoopSummary, EcuError>
    where
        B: BusReceiver,
        S: Future<Output = ()>,
    {
        let mut bus = OpenBus(bus);
        let summary = Self::run(&mut vehicle_control, &mut bus.0, shutdown).await;
        bus.0.close()?;
        Ok(summary)
    }

    /// The control loop. Every await in here races `shutdown`, so a
    /// stop request is seen within one poll. Nothing else ends the
    /// loop: bad frames, failed reads and failed actuator calls are
    /// logged and the next frame is awaited.
    ///
    /// * `vehicle_control`: component
    /// * `bus`: open bus, still open when this returns.
    /// * `shutdown`: resolves when the loop should stop.
    pub async fn run<B, S>(
        vehicle_control: &mut VehicleControl,
        bus: &mut B,
        shutdown: S,
    ) -> LoopSummary
    where
        B: BusReceiver + ?Sized,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = LoopSummary::default();
        // Set once the failsafe has fired, cleared by the next frame.
        let mut failsafe_sent = false;

        info!(
            "Vehicle control {} listening on {}",
            vehicle_control.uuid, vehicle_control.canbus_id
        );

        'control: loop {
            let received = tokio::select! {
                biased;
                _ = &mut shutdown => break 'control,
                received = timeout(vehicle_control.receive_timeout, bus.receive()) => received,
            };

            match received {
                Ok(Ok(frame)) => {
                    failsafe_sent = false;
                    let VehicleControl { mapper, actuator, .. } = &mut *vehicle_control;
                    let dispatched = tokio::select! {
                        biased;
                        _ = &mut shutdown => break 'control,
                        dispatched = mapper.decode_and_dispatch(&frame, &mut **actuator) => dispatched,
                    };
                    match dispatched {
                        Ok(Some(command)) => {
                            debug!("{:#x} -> {} {:.3}", frame.id, command.channel(), command.value());
                            summary.dispatched += 1;
                        }
                        Ok(None) => summary.ignored += 1,
                        Err(e @ EcuError::MalformedFrame { .. }) => {
                            warn!("Dropping frame: {e}, data: {:?}", frame.payload);
                            summary.malformed += 1;
                        }
                        Err(e) => {
                            warn!("Command for frame {:#x} not applied: {e}", frame.id);
                            summary.actuator_failures += 1;
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!("Failed to read from {}: {e}", vehicle_control.canbus_id);
                    summary.bus_errors += 1;
                    // Back off so a dead bus does not spin the loop.
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => break 'control,
                        _ = tokio::time::sleep(vehicle_control.receive_timeout) => {}
                    }
                }
                Err(_) => {
                    summary.timeouts += 1;
                    debug!(
                        "No frame on {} within {:?}",
                        vehicle_control.canbus_id, vehicle_control.receive_timeout
                    );
                    if vehicle_control.failsafe_on_timeout && !failsafe_sent {
                        failsafe_sent = true;
                        warn!("Canbus {} silent, zeroing throttle", vehicle_control.canbus_id);
                        let applied = tokio::select! {
                            biased;
                            _ = &mut shutdown => break 'control,
                            applied = vehicle_control.actuator.set_throttle(0.0) => applied,
                        };
                        if let Err(e) = applied {
                            warn!("Failsafe not applied: {e}");
                            summary.actuator_failures += 1;
                        }
                    }
                }
            }
        }
        info!("Exiting...");
        info!("Vehicle control stopped: {:?}", summary);
        summary
    }
}
