//! Order book state and diff application.
//!
//! This module provides the in-memory book that segment replay drives.

pub mod state;

pub use state::BookState;
