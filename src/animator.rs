use std::f64::consts::TAU;
use std::time::{Duration, Instant};

use crate::params::WaveParameters;
use crate::record::Record;

/// Owns the wave parameters and the phase accumulator for the frame loop.
///
/// Records arrive through [`Animator::ingest`]; [`Animator::tick`] runs once per
/// displayed frame.
pub struct Animator {
    params: WaveParameters,
    phase: f64,
    last_input: Instant,
    fallback_window: Duration,
    in_fallback: bool,
}

impl Animator {
    pub fn new(params: WaveParameters, fallback_window: Duration, now: Instant) -> Self {
        Animator {
            params,
            phase: 0.0,
            last_input: now,
            fallback_window,
            in_fallback: false,
        }
    }

    pub fn params(&self) -> &WaveParameters {
        &self.params
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Time since the last accepted record.
    pub fn quiet_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_input)
    }

    pub fn in_fallback(&self) -> bool {
        self.in_fallback
    }

    pub fn ingest(&mut self, record: Record, now: Instant) {
        self.params.update(record.value, record.speed);
        self.last_input = now;
        self.in_fallback = false;
    }

    /// Applies any pending records (the newest wins) and returns how many were read.
    pub fn ingest_all<I>(&mut self, records: I, now: Instant) -> usize
    where
        I: IntoIterator<Item = Record>,
    {
        let mut count = 0;
        for record in records {
            self.ingest(record, now);
            count += 1;
        }
        count
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        self.quiet_for(now) > self.fallback_window
    }

    /// Advances one frame. Returns true when this frame entered fallback.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut entered = false;
        if self.is_stale(now) {
            // reasserted every stale frame, not only on the transition
            self.params.apply_fallback();
            entered = !self.in_fallback;
            self.in_fallback = true;
        }
        // wrapped to [0, 2π)
        let next = (self.phase + self.params.speed).rem_euclid(TAU);
        self.phase = if next.is_finite() { next } else { 0.0 };
        entered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback_params() -> WaveParameters {
        let mut p = WaveParameters::default();
        p.apply_fallback();
        p
    }

    #[test]
    fn fresh_input_is_kept() {
        let start = Instant::now();
        let mut anim = Animator::new(WaveParameters::default(), Duration::from_millis(1000), start);
        anim.ingest(Record { value: 0.125, speed: 1.0 }, start);
        anim.tick(start + Duration::from_millis(999));
        assert_eq!(anim.params().lines, 2);
        assert!(!anim.in_fallback());
    }

    #[test]
    fn stale_input_reverts_every_frame() {
        let start = Instant::now();
        let mut anim = Animator::new(WaveParameters::default(), Duration::from_millis(1000), start);
        anim.ingest(Record { value: 1.0, speed: 2.0 }, start);

        let t = start + Duration::from_millis(1001);
        assert!(anim.tick(t));
        assert_eq!(anim.params(), &fallback_params());

        anim.params.update(0.9, 0.1);
        assert!(!anim.tick(t + Duration::from_millis(16)));
        assert_eq!(anim.params(), &fallback_params());
    }

    #[test]
    fn new_input_ends_fallback() {
        let start = Instant::now();
        let mut anim = Animator::new(WaveParameters::default(), Duration::from_millis(1000), start);
        let late = start + Duration::from_secs(5);
        anim.tick(late);
        assert!(anim.in_fallback());

        anim.ingest(Record { value: 0.0, speed: 0.0 }, late);
        anim.tick(late + Duration::from_millis(10));
        assert!(!anim.in_fallback());
        assert_eq!(anim.params().lines, 1);
    }

    #[test]
    fn phase_advances_by_current_speed() {
        let start = Instant::now();
        let mut anim = Animator::new(WaveParameters::default(), Duration::from_millis(1000), start);
        anim.ingest(Record { value: 0.5, speed: 1.0 }, start);
        anim.tick(start);
        anim.tick(start);
        assert!((anim.phase() - 0.006).abs() < 1e-12);
    }

    #[test]
    fn phase_stays_finite_after_extreme_speeds() {
        let start = Instant::now();
        let mut anim = Animator::new(WaveParameters::default(), Duration::from_millis(1000), start);
        for _ in 0..1000 {
            anim.ingest(Record { value: 0.5, speed: 1e308 }, start);
            anim.tick(start);
        }
        assert!(anim.phase().is_finite());

        anim.tick(start + Duration::from_secs(10));
        assert!(anim.in_fallback());
        assert!((0.0..TAU).contains(&anim.phase()));
        let y = crate::render::wave_y(0.0, anim.params(), anim.phase(), 0.0, 100.0);
        assert!(y.is_finite());
    }

    #[test]
    fn non_finite_speed_resets_phase() {
        let start = Instant::now();
        let mut anim = Animator::new(WaveParameters::default(), Duration::from_millis(1000), start);
        anim.params.speed = f64::INFINITY;
        anim.tick(start);
        assert_eq!(anim.phase(), 0.0);
    }

    #[test]
    fn quiet_time_counts_from_last_record() {
        let start = Instant::now();
        let mut anim = Animator::new(WaveParameters::default(), Duration::from_millis(1000), start);
        anim.ingest(Record { value: 0.5, speed: 0.5 }, start + Duration::from_millis(200));
        assert_eq!(anim.quiet_for(start + Duration::from_millis(450)), Duration::from_millis(250));
        assert_eq!(anim.quiet_for(start), Duration::ZERO);
    }

    #[test]
    fn last_of_several_pending_records_wins() {
        let start = Instant::now();
        let mut anim = Animator::new(WaveParameters::default(), Duration::from_millis(1000), start);
        let pending = vec![
            Record { value: 0.1, speed: 0.1 },
            Record { value: 0.9, speed: 0.3 },
            Record { value: 0.5, speed: 0.5 },
        ];
        assert_eq!(anim.ingest_all(pending, start), 3);
        assert_eq!(anim.params().lines, 5);
    }
}
