//! Detection-feedback optimization loop
//!
//! Chooses the rewrite intensity for each OPTIMIZING pass from the previous
//! detection score. The controller issues no provider calls itself.

pub mod controller;
pub mod traits;
pub mod types;

pub use controller::EscalatingController;
pub use traits::StrategyController;
pub use types::StrategyProfile;
