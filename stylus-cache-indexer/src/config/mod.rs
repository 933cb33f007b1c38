//! Configuration loading and validation.

mod settings;

pub use settings::{
    ChainSettings, DatabaseSettings, LoggingSettings, PollerSettings, Settings, SyncSettings,
    WebSocketSettings,
};
