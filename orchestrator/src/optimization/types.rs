//! Provider-call parameters per strategy level

use shared::StrategyLevel;

use crate::traits::TransformParams;

/// Rewrite settings associated with a strategy level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyProfile {
    pub level: StrategyLevel,
    pub intensity: f32,
    pub temperature: f32,
}

impl StrategyProfile {
    pub fn for_level(level: StrategyLevel) -> Self {
        let (intensity, temperature) = match level {
            StrategyLevel::Light => (0.3, 0.5),
            StrategyLevel::Standard => (0.6, 0.7),
            StrategyLevel::Aggressive => (0.9, 0.9),
        };
        Self {
            level,
            intensity,
            temperature,
        }
    }

    pub fn params(&self, target_language: Option<String>) -> TransformParams {
        TransformParams {
            intensity: self.intensity,
            temperature: self.temperature,
            target_language,
        }
    }
}
