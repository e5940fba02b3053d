pub mod config;
pub mod icon;
pub mod logging;
pub mod protocol;
pub mod sanitize;
pub mod tokio;
pub mod utils;

pub use reqwest::Url;
