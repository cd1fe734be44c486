pub mod connection;
pub mod hub;

pub use hub::{ClientKey, ConnectionLookup, Hub, HubClient};
