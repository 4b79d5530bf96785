pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    AuthConfig, CommandsConfig, Config, ConfigMetadata, DatabaseConfig, DirectoryFeedConfig,
    DirectoryFeedMode, JobsConfig, ServerConfig, TransportConfig,
};
pub use validation::{ConfigWarning, ConfigWarnings};
