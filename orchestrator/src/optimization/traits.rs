//! Optimization loop controller trait

use shared::StrategyLevel;

/// Picks the strategy level for the next optimization attempt
#[mockall::automock]
pub trait StrategyController: Send + Sync {
    /// Strategy for `attempt` given the previous detection score and level
    ///
    /// `last_score` and `previous` are `None` on the first attempt.
    fn next_strategy(
        &self,
        attempt: u32,
        last_score: Option<f64>,
        threshold: f64,
        previous: Option<StrategyLevel>,
    ) -> StrategyLevel;
}
