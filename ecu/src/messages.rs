/// Standardise how messages are sent out of the current
/// control system. Provide test suite to ensure interfaces
/// are respected.
pub mod control {
    /// Actuation messages go to the vehicle driver process.
    /// They carry a single steering or throttle value.
    pub mod command;
}
