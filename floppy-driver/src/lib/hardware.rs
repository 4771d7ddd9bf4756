mod hardware_interface;
mod hardware_sim;

pub use hardware_interface::*;
pub use hardware_sim::{DriveEvent, DriveProbe, SimOptions, SimulatedFloppy};

// Mock implementation for testing.
#[cfg(test)]
mod hardware_mock;
#[cfg(test)]
pub use hardware_mock::{MockFloppy, MockRecord, RegisterWrite};
