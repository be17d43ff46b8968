/// Components that drive the vehicle itself.
pub mod vehicle {
    /// Maps decoded canbus frames onto actuator commands.
    pub mod mapper;
    /// The control component that ties the canbus to the actuators.
    pub mod control;
}

/// Helpful prelude when working with components.
pub mod prelude {
    pub use crate::components::vehicle::control::*;
    pub use crate::components::vehicle::mapper::*;
}
