//! Request / response bodies of the HTTP API.

pub mod rooms;
pub mod sessions;
pub mod summarize;
