//! # cvmatch-shared
//!
//! Types and helpers shared by the store and the command-line front end:
//! content fingerprints, resume payloads and the analysis outcome union.

pub mod constants;
pub mod hash;
pub mod types;

pub use hash::{content_hash, normalize_text};
pub use types::*;
