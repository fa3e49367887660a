//! Exponential back-off between same-tier retries:
//! `base * 3^(attempt-1)` seconds, capped.
//!
//! A direct, self-contained implementation of the formula rather than a
//! dependency on a general-purpose retry-policy crate — there's exactly one
//! formula and one caller.

use std::time::Duration;

use sg_config::EngineConfig;

/// Delay before the `attempt`-th same-tier retry (1-based: `attempt=1` is
/// the delay before the *second* attempt at a tier). Grows by a factor of
/// 3 per retry, base and cap taken from `config`.
pub fn delay_for(attempt: u32, config: &EngineConfig) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let factor = 3u64.saturating_pow(exponent);
    let seconds = config.back_off_base_s.saturating_mul(factor).min(config.back_off_cap_s);
    Duration::from_secs(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig { back_off_base_s: 10, back_off_cap_s: 300, ..EngineConfig::default() }
    }

    #[test]
    fn first_retry_waits_one_base_interval() {
        assert_eq!(delay_for(1, &config()), Duration::from_secs(10));
    }

    #[test]
    fn second_retry_triples() {
        assert_eq!(delay_for(2, &config()), Duration::from_secs(30));
    }

    #[test]
    fn third_retry_triples_again() {
        assert_eq!(delay_for(3, &config()), Duration::from_secs(90));
    }

    #[test]
    fn delay_is_capped() {
        assert_eq!(delay_for(10, &config()), Duration::from_secs(300));
    }

    #[test]
    fn zero_attempt_still_yields_base_delay() {
        assert_eq!(delay_for(0, &config()), Duration::from_secs(10));
    }
}
