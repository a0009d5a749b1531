pub mod device_state;
pub mod sample;
pub mod scan;

pub use device_state::DeviceState;
pub use sample::Sample;
pub use scan::{Scan, ScanSequence};
