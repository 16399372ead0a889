pub mod heuristic;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use heuristic::ColorHeuristicBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
