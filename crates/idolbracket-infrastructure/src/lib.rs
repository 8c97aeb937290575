//! Concrete adapters for the bracket engine: persistence side-channels, image
//! storage, configuration files and log output.

pub mod config;
pub mod image_resolver;
pub mod logging;
pub mod side_channel;

pub use config::{load_config, parse_config};
pub use image_resolver::DirectoryImageResolver;
pub use logging::{GameEvent, GameEventLayer, LogFormat, init_tracing};
pub use side_channel::{FileSideChannel, MemorySideChannel};
