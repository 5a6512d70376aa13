//! Threshold-band state machine.
//!
//! Tracks one band per coin and raises a signal only when the band changes to
//! a different non-zero value after the baseline is established. Crossing
//! back into the zero band updates the state silently so the next outward
//! crossing is detectable.

use std::collections::HashMap;

use crate::models::Signal;

#[derive(Debug, Clone, Copy, Default)]
struct BandState {
    last_band: i8,
    established: bool,
}

/// Per-coin edge detector over delta bands.
pub struct BandTracker {
    threshold: f64,
    states: HashMap<String, BandState>,
}

impl BandTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            states: HashMap::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Feed one observed (delta, band) for a coin. `payload` is evaluated
    /// lazily so the snapshot render only happens on an actual signal.
    pub fn observe(
        &mut self,
        coin: &str,
        delta: f64,
        band: i8,
        payload: impl FnOnce() -> String,
    ) -> Option<Signal> {
        let state = self.states.entry(coin.to_string()).or_default();

        if !state.established {
            state.last_band = band;
            state.established = true;
            return None;
        }

        if band == state.last_band {
            return None;
        }

        let fired = band != 0;
        state.last_band = band;
        if !fired {
            return None;
        }

        Some(Signal {
            coin: coin.to_string(),
            delta,
            band,
            threshold: self.threshold,
            payload: payload(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observe(t: &mut BandTracker, delta: f64, band: i8) -> Option<Signal> {
        t.observe("BTC", delta, band, || "snap".to_string())
    }

    #[test]
    fn first_observation_establishes_baseline_silently() {
        let mut t = BandTracker::new(5.0);
        assert!(observe(&mut t, 6.0, 1).is_none());
    }

    #[test]
    fn same_band_never_fires() {
        let mut t = BandTracker::new(5.0);
        observe(&mut t, 6.0, 1);
        assert!(observe(&mut t, 7.0, 1).is_none());
    }

    #[test]
    fn crossing_after_reset_through_zero_fires() {
        let mut t = BandTracker::new(5.0);
        observe(&mut t, 6.0, 1); // baseline
        assert!(observe(&mut t, 4.0, 0).is_none()); // back inside, silent reset
        let sig = observe(&mut t, 12.0, 1).expect("outward crossing fires");
        assert_eq!(sig.band, 1);
        assert_eq!(sig.delta, 12.0);
        assert_eq!(sig.payload, "snap");
    }

    #[test]
    fn sign_flip_through_zero() {
        let mut t = BandTracker::new(5.0);
        observe(&mut t, 6.0, 1); // baseline at +1
        assert!(observe(&mut t, 1.0, 0).is_none());
        let sig = observe(&mut t, -6.0, -1).expect("negative crossing fires");
        assert_eq!(sig.band, -1);
        assert_eq!(sig.delta, -6.0);
    }

    #[test]
    fn direct_band_flip_fires() {
        let mut t = BandTracker::new(5.0);
        observe(&mut t, 6.0, 1);
        let sig = observe(&mut t, -7.0, -1).expect("flip without zero stop fires");
        assert_eq!(sig.band, -1);
    }

    #[test]
    fn zero_band_signal_never_emitted() {
        let mut t = BandTracker::new(5.0);
        observe(&mut t, 6.0, 1);
        assert!(observe(&mut t, 0.5, 0).is_none());
        assert!(observe(&mut t, -0.5, 0).is_none());
    }

    #[test]
    fn coins_tracked_independently() {
        let mut t = BandTracker::new(5.0);
        t.observe("BTC", 6.0, 1, || String::new());
        t.observe("ETH", -6.0, -1, || String::new());
        assert!(t.observe("BTC", 7.0, 1, || String::new()).is_none());
        assert!(t.observe("ETH", 6.0, 1, || String::new()).is_some());
    }
}
