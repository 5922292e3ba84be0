// ── Cookielens Atoms Layer ─────────────────────────────────────────────────
// Pure constants, data types, traits, and error types — zero side effects.
// Dependency rule: atoms may only depend on std and external pure crates.
// Nothing here may import from engine/ or lib.rs.

pub mod classify_types;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;
