pub mod probe;
pub mod supervisor;

pub use probe::{HealthProber, HttpHealthProber, ProbeError};
pub use supervisor::HealthSupervisor;
