// Configuration module
// Public interface for configuration loading

pub mod constants;
mod loader;
mod settings;

pub use loader::{load_config, load_from_file, parse_config};
pub use settings::{config_home, BackendConfig, Config, PhaseTemperatures, PipelineConfig};
