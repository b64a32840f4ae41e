//! # GMR Common Library
//!
//! Shared code for the GMR metadata registry:
//! - Database schema initialization and shared row models
//! - Error types
//! - Configuration loading
//! - Identifier helpers

pub mod config;
pub mod db;
pub mod error;
pub mod ids;

pub use error::{Error, Result};
