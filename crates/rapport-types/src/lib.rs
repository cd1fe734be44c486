//! Shared domain models, API payloads and gateway events for rapport.

pub mod api;
pub mod events;
pub mod models;
pub mod pagination;
