pub mod credentials;
pub mod engine;
pub mod events;
pub mod index;

pub use engine::{RegistryEngine, RegistryError};
pub use events::RegistryEvent;
