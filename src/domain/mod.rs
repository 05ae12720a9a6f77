//! Core domain types for the grant console.
//!
//! This module contains pure domain types with no persistence dependencies:
//! - Grant requests and their status machine
//! - Draft review of a request's narrative

pub mod request;
pub mod review;
