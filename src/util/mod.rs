//! Determinism utilities shared across the engine.
//!
//! - [`det_rng`]: seeded xorshift64 generator driving the built-in random
//!   scheduling oracle. Same seed, same interleaving decisions.
//! - [`det_hash`]: fixed-seed hasher and hash collections, used for
//!   execution hashes and identity-keyed tracker tables so that hashes
//!   recorded in one invocation are meaningful in the next.

pub mod det_hash;
pub mod det_rng;

pub use det_hash::{DetBuildHasher, DetHasher, DetHashMap, DetHashSet};
pub use det_rng::DetRng;
