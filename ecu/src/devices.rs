/// Devices are the atomic units that can be combined together
/// into components. Their core responsibilities do not change
/// based on location, name etc.
pub mod hardware {
    /// Device interface for the vehicle actuators (steering and throttle).
    pub mod actuator;
    /// Device interface for the canbus receiver.
    pub mod bus;
}
