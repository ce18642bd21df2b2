mod client;
mod config;
mod document_store;

pub use client::*;
pub use config::*;
pub use document_store::*;
