#![doc = "cdf-cli-core: core logic library for the cdf files CLI."]

//! This crate contains the data model, the backend contract, credential
//! resolution, the batching upload queue and the upload/delete pipelines.
//! Transport to the data platform lives in the CLI crate behind
//! [`contract::FilesBackend`].
//!
//! # Usage
//! Implement [`contract::FilesBackend`] for a client, then drive
//! [`upload::upload_path`] or [`delete::delete_files`] with it.

pub mod contract;
pub mod credentials;
pub mod delete;
pub mod enumerate;
pub mod error;
pub mod queue;
pub mod upload;

pub use error::{CdfError, Result};
