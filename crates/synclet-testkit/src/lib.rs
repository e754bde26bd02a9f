//! # Synclet Testkit
//!
//! Testing utilities for Synclet.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Messages with their exact wire encodings for
//!   cross-implementation verification
//! - **Generators**: Proptest strategies for addresses, atoms, nodes and
//!   write sets
//! - **Fixtures**: Replica pools over a shared in-memory transport, with
//!   convergence helpers
//!
//! ## Golden Vectors
//!
//! ```rust
//! use synclet_testkit::vectors::verify_all_vectors;
//!
//! verify_all_vectors().unwrap();
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use synclet_testkit::generators::message;
//!
//! proptest! {
//!     #[test]
//!     fn codec_round_trip(m in message(2)) {
//!         let wire = synclet_core::encode_message(&m).unwrap();
//!         prop_assert_eq!(synclet_core::decode_message(&wire).unwrap(), m);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use synclet_testkit::fixtures::ReplicaPool;
//!
//! # async fn example() -> synclet::Result<()> {
//! let mut pool = ReplicaPool::new(1);
//! let a = pool.add("a")?;
//! pool.add("b")?;
//! pool.start_all().await?;
//! a.set_atom(&synclet::Address::new(["k"]), "v").await?;
//! assert!(pool.settle(Duration::from_secs(1)).await?);
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{init_tracing, wait_until, MemorySynclet, ReplicaPool};
pub use generators::LeafWrite;
pub use vectors::{all_vectors, verify_all_vectors, WireVector};
