pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod scrapers;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use error::ScoutError;
