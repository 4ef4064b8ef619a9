//! Bayesian averaging of small-sample win rates
//!
//! Win rates from few games are pulled towards a 50% prior. The prior weighs
//! as much as `confidence_games` phantom games, so cards with many real games
//! are barely affected.

use serde::{Deserialize, Serialize};

/// Configuration for Bayesian averaging
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BayesianConfig {
    pub enabled: bool,
    /// Prior wins, expressed in percent-games (1000 = 20 games at 50%)
    pub confidence_wins: f64,
    /// Prior games added to every sample
    pub confidence_games: f64,
    /// Samples smaller than this are treated as "no data" when disabled
    pub min_sample_size: u32,
}

impl Default for BayesianConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_wins: 1000.0,
            confidence_games: 20.0,
            min_sample_size: 200,
        }
    }
}

impl BayesianConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Adjusted win rate (percent, two decimals) for a raw rate and sample size.
pub fn calculate_win_rate(win_rate: f64, sample_size: u32, config: &BayesianConfig) -> f64 {
    if !config.enabled {
        if sample_size < config.min_sample_size {
            return 0.0;
        }
        return win_rate;
    }

    let games = f64::from(sample_size);
    let wins = win_rate * games / 100.0;
    let adjusted = (wins + config.confidence_wins / 100.0) / (games + config.confidence_games) * 100.0;

    (adjusted * 100.0).round() / 100.0
}

/// Whether smoothing moves this rate enough to be worth flagging in the UI.
pub fn is_significantly_adjusted(win_rate: f64, sample_size: u32, config: &BayesianConfig) -> bool {
    if !config.enabled {
        return false;
    }

    let adjusted = calculate_win_rate(win_rate, sample_size, config);
    let diff = (win_rate - adjusted).abs();

    diff > 2.0 || f64::from(sample_size) < config.confidence_games * 5.0
}

/// "*" for significantly adjusted rates, "" otherwise
pub fn adjustment_indicator(win_rate: f64, sample_size: u32, config: &BayesianConfig) -> &'static str {
    if is_significantly_adjusted(win_rate, sample_size, config) {
        "*"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_sample_example() {
        let config = BayesianConfig::default();
        // ((0.8 * 5 + 10) / (5 + 20)) * 100
        assert_eq!(calculate_win_rate(80.0, 5, &config), 56.0);
    }

    #[test]
    fn test_zero_games_is_prior() {
        let config = BayesianConfig::default();
        assert_eq!(calculate_win_rate(80.0, 0, &config), 50.0);
        assert_eq!(calculate_win_rate(0.0, 0, &config), 50.0);
    }

    #[test]
    fn test_large_sample_converges_to_raw_rate() {
        let config = BayesianConfig::default();
        let adjusted = calculate_win_rate(58.5, 1_000_000, &config);
        assert!((adjusted - 58.5).abs() < 0.01);

        let smaller = calculate_win_rate(58.5, 1_000, &config);
        let larger = calculate_win_rate(58.5, 10_000, &config);
        assert!((58.5 - larger).abs() < (58.5 - smaller).abs());
    }

    #[test]
    fn test_deterministic() {
        let config = BayesianConfig::default();
        let first = calculate_win_rate(61.27, 431, &config);
        let second = calculate_win_rate(61.27, 431, &config);
        assert_eq!(first, second);
    }

    #[test]
    fn test_rounds_to_two_decimals() {
        let config = BayesianConfig::default();
        let adjusted = calculate_win_rate(57.123, 333, &config);
        assert_eq!((adjusted * 100.0).round() / 100.0, adjusted);
    }

    #[test]
    fn test_disabled_applies_min_sample_size() {
        let config = BayesianConfig::disabled();
        assert_eq!(calculate_win_rate(62.0, 199, &config), 0.0);
        assert_eq!(calculate_win_rate(62.0, 200, &config), 62.0);
        assert_eq!(calculate_win_rate(62.0, 5000, &config), 62.0);
    }

    #[test]
    fn test_significant_adjustment() {
        let config = BayesianConfig::default();
        // Small sample, large pull towards 50
        assert!(is_significantly_adjusted(80.0, 5, &config));
        // Under confidence_games * 5 even when the shift is small
        assert!(is_significantly_adjusted(50.5, 99, &config));
        // Plenty of games and the shift stays under two points
        assert!(!is_significantly_adjusted(55.0, 5000, &config));
        assert_eq!(adjustment_indicator(55.0, 5000, &config), "");
        assert_eq!(adjustment_indicator(80.0, 5, &config), "*");
    }

    #[test]
    fn test_disabled_never_flags() {
        let config = BayesianConfig::disabled();
        assert!(!is_significantly_adjusted(80.0, 5, &config));
    }
}
