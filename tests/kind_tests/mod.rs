//! Integration tests for the Helidon operator
//!
//! These tests tell the story of how application teams see the operator work
//! against a real API server.
//!
//! - `app_lifecycle`: a HelidonApp is driven pass by pass from nothing to a
//!   running Deployment and Service, then edited and corrected
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored
//! ```

mod app_lifecycle;
mod helpers;
