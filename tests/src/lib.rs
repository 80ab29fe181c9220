//! # Pipe Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Ready-made Pipes on both transports, shared routes
//! └── integration/      # Cross-crate behavior
//!     ├── scenarios.rs  # Transport-agnostic checks
//!     ├── messaging.rs
//!     ├── http.rs
//!     ├── security.rs
//!     └── lifecycle.rs
//!
//! tests/benches/        # Signing, verification and routing throughput
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p pipe-tests
//!
//! # By category
//! cargo test -p pipe-tests integration::security::
//!
//! # Benchmarks
//! cargo bench -p pipe-tests
//! ```

pub mod fixtures;
pub mod integration;
