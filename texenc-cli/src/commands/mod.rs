//! CLI command implementations

mod config;
mod encode;
mod info;

pub use config::{config, ConfigArgs};
pub use encode::{encode, EncodeArgs};
pub use info::{info, InfoArgs};
