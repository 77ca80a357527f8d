pub mod client;
pub mod context;
pub mod diff;
pub mod engine;
pub mod import_id;
pub mod poll;

pub use crate::domain::ports::{ConfigProvider, Resource, ResourceHandler, Storage};
pub use crate::utils::error::Result;
