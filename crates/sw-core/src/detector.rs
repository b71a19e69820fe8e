//! Removal detection.
//!
//! Turns a stream of damped weight samples into discrete removal events.
//!
//! # Algorithm
//!
//! 1. During quiet hours, follow the weight and never alert
//! 2. During a post-alert cooldown, follow the weight and never alert
//! 3. With no baseline, the sample becomes the baseline
//! 4. `delta = baseline - sample`; deltas below the noise floor (including
//!    increases) are drift and become the new baseline
//! 5. `units = round(delta / unit_weight, 2)`; below the debounce fraction the
//!    sample becomes the new baseline
//! 6. Otherwise emit a [`RemovalEvent`] and drop the baseline so the same step
//!    change cannot be counted twice

use chrono::{DateTime, Duration, Utc};

use crate::quiet::QuietHours;
use crate::types::{CalibrationProfile, RemovalEvent, ValidationError, WeightSample, round2};

/// Tunables for the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    pub calibration: CalibrationProfile,
    /// Fraction of one unit that counts as a removal. Default: 0.85.
    pub debounce_fraction: f64,
    /// Window after an event during which samples only update the baseline.
    /// Default: zero (no cooldown).
    pub cooldown: Duration,
}

impl DetectorConfig {
    pub fn new(
        calibration: CalibrationProfile,
        debounce_fraction: f64,
        cooldown: Duration,
    ) -> Result<Self, ValidationError> {
        if !debounce_fraction.is_finite() || debounce_fraction <= 0.0 {
            return Err(ValidationError::NotPositive {
                field: "debounce_fraction",
                value: debounce_fraction,
            });
        }
        Ok(Self {
            calibration,
            debounce_fraction,
            cooldown,
        })
    }
}

/// Mutable detector state: the running baseline and an optional cooldown.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DetectorState {
    pub last_stable_sample: Option<WeightSample>,
    pub suppressed_until: Option<DateTime<Utc>>,
}

/// Stateful removal detector.
#[derive(Debug)]
pub struct EventDetector<Q> {
    config: DetectorConfig,
    quiet: Q,
    state: DetectorState,
}

impl<Q: QuietHours> EventDetector<Q> {
    pub fn new(config: DetectorConfig, quiet: Q) -> Self {
        Self {
            config,
            quiet,
            state: DetectorState::default(),
        }
    }

    /// Current state, for inspection.
    pub const fn state(&self) -> &DetectorState {
        &self.state
    }

    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Drops the baseline; the next sample re-acquires it.
    pub fn reset(&mut self) {
        self.state.last_stable_sample = None;
    }

    /// Feeds one sample, returning an event if a removal was detected.
    pub fn observe(&mut self, sample: WeightSample) -> Option<RemovalEvent> {
        if !sample.grams.is_finite() {
            tracing::warn!(grams = sample.grams, "ignoring non-finite weight sample");
            return None;
        }

        if self.quiet.is_quiet(sample.timestamp) {
            tracing::trace!(grams = sample.grams, "quiet hours; following weight");
            self.state.last_stable_sample = Some(sample);
            return None;
        }

        if let Some(until) = self.state.suppressed_until {
            if sample.timestamp < until {
                tracing::trace!(grams = sample.grams, %until, "cooling down; following weight");
                self.state.last_stable_sample = Some(sample);
                return None;
            }
            self.state.suppressed_until = None;
        }

        let Some(baseline) = self.state.last_stable_sample else {
            tracing::debug!(grams = sample.grams, "acquired baseline");
            self.state.last_stable_sample = Some(sample);
            return None;
        };

        let calibration = &self.config.calibration;
        let delta = baseline.grams - sample.grams;
        if delta < calibration.noise_floor_grams() {
            self.state.last_stable_sample = Some(sample);
            return None;
        }

        let units = round2(delta / calibration.unit_weight_grams());
        if units < self.config.debounce_fraction {
            tracing::debug!(delta, units, "sub-threshold change absorbed into baseline");
            self.state.last_stable_sample = Some(sample);
            return None;
        }

        match RemovalEvent::new(units, baseline.grams, sample.timestamp) {
            Ok(event) => {
                tracing::info!(
                    units,
                    previous_grams = baseline.grams,
                    grams = sample.grams,
                    "removal detected"
                );
                self.state.last_stable_sample = None;
                if self.config.cooldown > Duration::zero() {
                    self.state.suppressed_until = Some(sample.timestamp + self.config.cooldown);
                }
                Some(event)
            }
            Err(err) => {
                tracing::warn!(%err, "discarding invalid removal");
                self.state.last_stable_sample = Some(sample);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: f64 = 18.3;

    fn never_quiet(_: DateTime<Utc>) -> bool {
        false
    }

    fn always_quiet(_: DateTime<Utc>) -> bool {
        true
    }

    fn config(cooldown: Duration) -> DetectorConfig {
        DetectorConfig::new(CalibrationProfile::new(UNIT, 5.0).unwrap(), 0.85, cooldown).unwrap()
    }

    fn detector() -> EventDetector<fn(DateTime<Utc>) -> bool> {
        EventDetector::new(config(Duration::zero()), never_quiet as fn(DateTime<Utc>) -> bool)
    }

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-29T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Feeds weights one second apart, collecting any events.
    fn feed<Q: QuietHours>(detector: &mut EventDetector<Q>, weights: &[f64]) -> Vec<RemovalEvent> {
        let base = start();
        weights
            .iter()
            .enumerate()
            .filter_map(|(i, grams)| {
                let at = base + Duration::seconds(i64::try_from(i).unwrap());
                detector.observe(WeightSample::new(*grams, at))
            })
            .collect()
    }

    #[test]
    fn first_sample_becomes_baseline() {
        let mut detector = detector();
        assert!(feed(&mut detector, &[500.0]).is_empty());
        let baseline = detector.state().last_stable_sample.unwrap();
        assert!((baseline.grams - 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn jitter_below_noise_floor_never_alerts() {
        let mut detector = detector();
        let weights = [500.0, 499.0, 501.2, 497.5, 498.9, 500.3, 496.0, 495.1];
        assert!(feed(&mut detector, &weights).is_empty());
    }

    #[test]
    fn slow_drift_is_absorbed() {
        let mut detector = detector();
        // 4g per step: every step is below the noise floor, 40g in total.
        let weights: Vec<f64> = (0..11).map(|i| 500.0 - f64::from(i) * 4.0).collect();
        assert!(feed(&mut detector, &weights).is_empty());
        let baseline = detector.state().last_stable_sample.unwrap();
        assert!((baseline.grams - 460.0).abs() < 1e-9);
    }

    #[test]
    fn weight_increase_never_alerts() {
        let mut detector = detector();
        assert!(feed(&mut detector, &[500.0, 600.0, 800.0]).is_empty());
        let baseline = detector.state().last_stable_sample.unwrap();
        assert!((baseline.grams - 800.0).abs() < f64::EPSILON);
    }

    #[test]
    fn one_unit_step_emits_one_event() {
        let mut detector = detector();
        let events = feed(&mut detector, &[500.0, 500.0 - UNIT]);
        assert_eq!(events.len(), 1);
        let event = events[0];
        assert!((event.estimated_units_removed() - 1.0).abs() < 0.01);
        assert!((event.previous_weight_grams() - 500.0).abs() < f64::EPSILON);
        assert!(detector.state().last_stable_sample.is_none());
    }

    #[test]
    fn baseline_reset_prevents_double_counting() {
        let mut detector = detector();
        let lower = 500.0 - 2.0 * UNIT;
        let events = feed(&mut detector, &[500.0, lower, lower, lower]);
        assert_eq!(events.len(), 1);
        assert!((events[0].estimated_units_removed() - 2.0).abs() < 0.01);
    }

    #[test]
    fn sub_threshold_step_is_absorbed() {
        let mut detector = detector();
        // 14g is above the noise floor but only 0.77 of a unit.
        assert!(feed(&mut detector, &[500.0, 486.0]).is_empty());
        let baseline = detector.state().last_stable_sample.unwrap();
        assert!((baseline.grams - 486.0).abs() < f64::EPSILON);
    }

    #[test]
    fn threshold_is_compared_after_rounding() {
        // 15.5 / 18.3 = 0.847, which rounds to 0.85.
        let mut rounded_up = detector();
        let events = feed(&mut rounded_up, &[500.0, 499.0, 483.5]);
        assert_eq!(events.len(), 1);
        assert!((events[0].estimated_units_removed() - 0.85).abs() < 1e-9);
        assert!((events[0].previous_weight_grams() - 499.0).abs() < f64::EPSILON);

        // 15.3 / 18.3 = 0.836, which rounds to 0.84.
        let mut rounded_down = detector();
        assert!(feed(&mut rounded_down, &[500.0, 484.7]).is_empty());
    }

    #[test]
    fn quiet_hours_follow_weight_without_alerting() {
        let mut detector = EventDetector::new(config(Duration::zero()), always_quiet);
        assert!(feed(&mut detector, &[500.0, 100.0, 20.0]).is_empty());
        let baseline = detector.state().last_stable_sample.unwrap();
        assert!((baseline.grams - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn quiet_sample_resets_baseline_before_active_hours() {
        let quiet_until = start() + Duration::seconds(2);
        let mut detector = EventDetector::new(config(Duration::zero()), move |at: DateTime<Utc>| at < quiet_until);
        // Restocking during quiet hours, then a removal once active.
        let events = feed(&mut detector, &[200.0, 500.0, 500.0, 500.0 - UNIT]);
        assert_eq!(events.len(), 1);
        assert!((events[0].previous_weight_grams() - 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cooldown_suppresses_follow_up_events() {
        let mut detector = EventDetector::new(config(Duration::seconds(3)), never_quiet);
        let weights = [
            500.0,
            500.0 - UNIT,       // event at t=1, cooldown until t=4
            500.0 - UNIT,       // t=2 follows
            500.0 - 3.0 * UNIT, // t=3 follows, no event
            500.0 - 3.0 * UNIT, // t=4 cooldown over, baseline kept
            500.0 - 4.0 * UNIT, // t=5 event
        ];
        let events = feed(&mut detector, &weights);
        assert_eq!(events.len(), 2);
        assert!((events[1].estimated_units_removed() - 1.0).abs() < 0.01);
    }

    #[test]
    fn non_finite_samples_are_ignored() {
        let mut detector = detector();
        assert!(feed(&mut detector, &[500.0, f64::NAN]).is_empty());
        let baseline = detector.state().last_stable_sample.unwrap();
        assert!((baseline.grams - 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reset_forces_reacquisition() {
        let mut detector = detector();
        feed(&mut detector, &[500.0]);
        detector.reset();
        assert!(detector.state().last_stable_sample.is_none());
        assert!(feed(&mut detector, &[400.0]).is_empty());
    }

    #[test]
    fn config_rejects_non_positive_fraction() {
        let calibration = CalibrationProfile::new(UNIT, 5.0).unwrap();
        assert!(DetectorConfig::new(calibration, 0.0, Duration::zero()).is_err());
        assert!(DetectorConfig::new(calibration, f64::NAN, Duration::zero()).is_err());
    }
}
