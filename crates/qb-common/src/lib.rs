pub mod env_config;
pub mod error;
pub mod settings;

pub use env_config::EnvConfig;
pub use error::QuickBuyError;
pub use settings::Settings;
