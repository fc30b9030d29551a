pub mod authorization;
pub mod config;
pub mod display;
pub mod error;
pub mod metrics;
pub mod plate;
pub mod plate_detection;
pub mod registry;
pub mod route;
pub mod utils;

pub use authorization::{Debounce, Decision, SideEffectRequest, Status};
pub use config::GateConfig;
pub use error::{CapabilityError, ConfigError, RegistryError, SessionError};
pub use plate::{normalize, NormalizedPlate};
pub use registry::{VehicleRecord, VehicleRegistry};
