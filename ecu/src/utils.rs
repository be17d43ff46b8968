/// Test helpers for locating fixture files.
pub mod tests;
