#![allow(clippy::type_complexity)]
#![warn(missing_docs)]
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod api;
mod apn;
mod error;
mod events;
mod store;
mod subscriber;
mod sync_options;
mod table;
#[cfg(test)]
mod test_backend;
mod token_cache;
mod utils;

pub use api::*;
pub use apn::*;
pub use error::*;
pub use events::{SyncEvent, SyncEventVariant};
pub use store::*;
pub use subscriber::*;
pub use sync_options::*;
pub use table::*;
pub use token_cache::*;
