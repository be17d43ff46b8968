/**
The ecu control system follows the same micro-service split used across the
vehicle software: a small binary per function, built from a shared library of
devices and components. This crate bridges the vehicle CAN bus to the
steering and throttle actuators.
*/

/// Components in the system are created by grouping together
/// devices into a logical unit that performs some function
/// for the overall control system.
pub mod components;
/// Devices that are an atomic unit, and can be composed
/// with other devices into components to perform some function.
pub mod devices;
/// Error type shared by devices and components.
pub mod errors;
/// Message structure for communication out of the control
/// system, such as the commands forwarded to the vehicle driver.
pub mod messages;
/// Development utilities for testing.
pub mod utils;
