//! Escalating strategy controller

use shared::StrategyLevel;

use super::traits::StrategyController;
use crate::config::OptimizationConfig;

/// Starts LIGHT, escalates one level per failed attempt, and jumps straight
/// to AGGRESSIVE when the last score exceeds the threshold by at least
/// `aggressive_margin`.
#[derive(Debug, Clone)]
pub struct EscalatingController {
    aggressive_margin: f64,
}

impl EscalatingController {
    pub fn new(aggressive_margin: f64) -> Self {
        Self { aggressive_margin }
    }

    pub fn from_config(config: &OptimizationConfig) -> Self {
        Self::new(config.aggressive_margin)
    }
}

impl Default for EscalatingController {
    fn default() -> Self {
        Self::from_config(&OptimizationConfig::default())
    }
}

impl StrategyController for EscalatingController {
    fn next_strategy(
        &self,
        attempt: u32,
        last_score: Option<f64>,
        threshold: f64,
        previous: Option<StrategyLevel>,
    ) -> StrategyLevel {
        if attempt == 0 {
            return StrategyLevel::Light;
        }

        if let Some(score) = last_score {
            if score - threshold >= self.aggressive_margin {
                return StrategyLevel::Aggressive;
            }
        }

        previous.unwrap_or(StrategyLevel::Light).escalate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: f64 = 25.0;

    #[test]
    fn test_first_attempt_is_light() {
        let controller = EscalatingController::default();
        assert_eq!(controller.next_strategy(0, None, THRESHOLD, None), StrategyLevel::Light);
        // A stale score never overrides the first attempt
        assert_eq!(
            controller.next_strategy(0, Some(99.0), THRESHOLD, Some(StrategyLevel::Standard)),
            StrategyLevel::Light
        );
    }

    #[test]
    fn test_far_above_threshold_jumps_to_aggressive() {
        let controller = EscalatingController::default();
        assert_eq!(
            controller.next_strategy(1, Some(80.0), THRESHOLD, Some(StrategyLevel::Light)),
            StrategyLevel::Aggressive
        );
    }

    #[test]
    fn test_near_threshold_escalates_one_level() {
        let controller = EscalatingController::default();
        assert_eq!(
            controller.next_strategy(1, Some(27.0), THRESHOLD, Some(StrategyLevel::Light)),
            StrategyLevel::Standard
        );
        assert_eq!(
            controller.next_strategy(2, Some(27.0), THRESHOLD, Some(StrategyLevel::Standard)),
            StrategyLevel::Aggressive
        );
        assert_eq!(
            controller.next_strategy(3, Some(27.0), THRESHOLD, Some(StrategyLevel::Aggressive)),
            StrategyLevel::Aggressive
        );
    }

    #[test]
    fn test_margin_boundary() {
        let controller = EscalatingController::new(30.0);
        assert_eq!(
            controller.next_strategy(1, Some(55.0), THRESHOLD, Some(StrategyLevel::Light)),
            StrategyLevel::Aggressive
        );
        assert_eq!(
            controller.next_strategy(1, Some(54.9), THRESHOLD, Some(StrategyLevel::Light)),
            StrategyLevel::Standard
        );
    }
}
