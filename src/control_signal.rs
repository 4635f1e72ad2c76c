use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

// Control signal parameters
pub const CONTROL_MIN: f64 = -1.0;
pub const CONTROL_MAX: f64 = 1.0;
pub const JITTER_AMPLITUDE: f64 = 0.1; // uniform noise in [-0.1, 0.1]
pub const CONTROL_DECIMALS: i32 = 3;

/// Round to `CONTROL_DECIMALS` places.
pub fn round_control(value: f64) -> f64 {
    let scale = 10f64.powi(CONTROL_DECIMALS);
    (value * scale).round() / scale
}

/// Sine of `t_secs` plus `jitter`, rounded and then clamped to [-1, 1].
///
/// Rounding happens on the raw sum, before the clamp.
pub fn control_value(t_secs: f64, jitter: f64) -> f64 {
    round_control(t_secs.sin() + jitter).clamp(CONTROL_MIN, CONTROL_MAX)
}

// Oscillating control value source, one per connection
pub struct ControlSignal {
    epoch: Instant,
    rng: StdRng,
}

impl ControlSignal {
    pub fn new(epoch: Instant) -> Self {
        Self::with_rng(epoch, StdRng::from_entropy())
    }

    pub fn with_rng(epoch: Instant, rng: StdRng) -> Self {
        Self { epoch, rng }
    }

    pub fn next_value(&mut self) -> f64 {
        let t_secs = self.epoch.elapsed().as_secs_f64();
        let jitter = self.rng.gen_range(-JITTER_AMPLITUDE..=JITTER_AMPLITUDE);
        control_value(t_secs, jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn values_stay_in_range_and_rounded() {
        let mut signal = ControlSignal::with_rng(Instant::now(), StdRng::seed_from_u64(42));
        for _ in 0..10_000 {
            let x = signal.next_value();
            assert!((CONTROL_MIN..=CONTROL_MAX).contains(&x), "out of range: {x}");
            assert_eq!(round_control(x), x);
        }
    }

    #[test]
    fn clamps_at_the_peaks() {
        assert_eq!(control_value(FRAC_PI_2, 0.1), 1.0);
        assert_eq!(control_value(-FRAC_PI_2, -0.1), -1.0);
    }

    #[test]
    fn rounds_before_clamping() {
        // 0.99 + 0.0096 rounds up to 1.0 and passes the clamp unchanged
        let t = 0.99f64.asin();
        assert_eq!(control_value(t, 0.0096), 1.0);
        assert_eq!(control_value(0.0, 0.0004), 0.0);
        assert_eq!(control_value(0.0, 0.0456), 0.046);
    }

    #[test]
    fn sweeps_over_every_jitter_extreme() {
        for step in 0..=628 {
            let t = f64::from(step) / 100.0;
            for jitter in [-JITTER_AMPLITUDE, 0.0, JITTER_AMPLITUDE] {
                let x = control_value(t, jitter);
                assert!((CONTROL_MIN..=CONTROL_MAX).contains(&x));
                assert_eq!(round_control(x), x);
            }
        }
    }
}
