pub mod clock;
pub mod config;
pub mod duration;

pub use clock::epoch_secs;
pub use config::{ConfigError, EngineConfig, LogConfig, StoreConfig, VmscaleConfig};
pub use duration::{parse_duration, DurationError};
