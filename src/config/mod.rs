/// Installation-wide configuration file
pub mod app;
/// Alert-time configuration and resolved batch settings
pub mod settings;

pub use app::{AppConfig, MispSetup, SubmissionConfig, DEFAULT_CONFIG_PATH};
pub use settings::{AlertConfig, Settings, DEFAULT_EVENT_INFO, DEFAULT_EVENT_KEY};
