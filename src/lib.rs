pub mod abi;
pub mod chains;
pub mod config;
pub mod decoder;
pub mod error;
pub mod explorer;
pub mod fetcher;
pub mod query;
pub mod reconciler;
pub mod repository;
pub mod resolver;
pub mod revocation;
pub mod service;
