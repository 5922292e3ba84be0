// ── Cookielens Engine ──────────────────────────────────────────────────────
// Behavior layer: everything that touches I/O, time, or shared state.
// Pure types live in atoms/.

pub mod auto_process;
pub mod classifier;
pub mod config;
pub mod persist;
pub mod providers;
pub mod rate_limit;
pub mod replay;
pub mod solver;
pub mod state;
pub mod store;
