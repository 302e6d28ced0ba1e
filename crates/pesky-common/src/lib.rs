//! Common utilities for pesky
//!
//! This crate provides the error taxonomy shared by every pesky crate.

pub mod error;

pub use error::{OrmError, Result, ValidationErrors};
