use log::{debug, info};
use smallvec::SmallVec;
use thiserror::Error;

/// Interface to the audio/playback collaborator. The engine never decodes or
/// mixes audio itself; it only asks the playback side where the song is.
///
/// `reported_position_seconds` is the coarse position of the last mixed
/// buffer, so the precise song position is
/// `reported + time_since_last_mix - output_latency`.
pub trait PlaybackSource {
    fn reported_position_seconds(&self) -> f32;
    fn time_since_last_mix(&self) -> f32;
    fn output_latency(&self) -> f32;
    fn start(&mut self, offset_seconds: f32);
    fn stop(&mut self);
}

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("bpm must be positive, got {0}")]
    NonPositiveBpm(f32),
    #[error("measures per phrase must be at least 1, got {0}")]
    NoMeasures(i32),
}

/// One reported beat. `measure` cycles 1..=measures_per_phrase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeatTick {
    pub beat: i32,
    pub measure: i32,
}

/// Derives discrete beat ticks from a continuously advancing song position.
///
/// Each integer beat is reported exactly once, in increasing order. If the
/// polling interval is coarse enough to skip several beats, every skipped
/// intermediate beat is still emitted in the same poll (catch-up), so
/// downstream choreography never misses a rule.
#[derive(Clone, Debug)]
pub struct Conductor {
    bpm: f32,
    sec_per_beat: f32,
    measures_per_phrase: i32,
    last_reported_beat: i32,
    measure: i32,
    playing: bool,
    song_position: f32,
}

impl Conductor {
    pub fn new(bpm: f32, measures_per_phrase: i32) -> Result<Self, ClockError> {
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(ClockError::NonPositiveBpm(bpm));
        }
        if measures_per_phrase < 1 {
            return Err(ClockError::NoMeasures(measures_per_phrase));
        }
        Ok(Self {
            bpm,
            sec_per_beat: 60.0 / bpm,
            measures_per_phrase,
            last_reported_beat: 0,
            measure: 1,
            playing: false,
            song_position: 0.0,
        })
    }

    #[inline(always)]
    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    #[inline(always)]
    pub fn sec_per_beat(&self) -> f32 {
        self.sec_per_beat
    }

    #[inline(always)]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    #[inline(always)]
    pub fn last_reported_beat(&self) -> i32 {
        self.last_reported_beat
    }

    /// Last corrected song position fed to `advance`.
    #[inline(always)]
    pub fn song_position(&self) -> f32 {
        self.song_position
    }

    /// Starts playback at `offset_seconds` into the song. Beats that lie
    /// before the offset never elapsed under this clock, so the beat counter
    /// is fast-forwarded past them instead of flooding catch-up ticks.
    pub fn start<P: PlaybackSource>(&mut self, playback: &mut P, offset_seconds: f32) {
        playback.start(offset_seconds);
        let skipped = (offset_seconds / self.sec_per_beat).floor().max(0.0) as i32;
        self.last_reported_beat = skipped;
        self.measure = (skipped % self.measures_per_phrase) + 1;
        self.song_position = offset_seconds;
        self.playing = true;
        info!(
            "Conductor started at {:.3}s ({} bpm, from beat {})",
            offset_seconds, self.bpm, skipped
        );
    }

    pub fn stop<P: PlaybackSource>(&mut self, playback: &mut P) {
        playback.stop();
        self.playing = false;
        debug!("Conductor stopped at beat {}", self.last_reported_beat);
    }

    /// Samples the playback collaborator, applies the buffer-lag correction
    /// and advances the beat counter.
    pub fn poll<P: PlaybackSource>(&mut self, playback: &P) -> SmallVec<[BeatTick; 4]> {
        if !self.playing {
            return SmallVec::new();
        }
        let position = playback.reported_position_seconds() + playback.time_since_last_mix()
            - playback.output_latency();
        self.advance(position)
    }

    /// Advances to `position_seconds` (already corrected for buffering lag),
    /// emitting one tick per elapsed integer beat. A no-op while stopped, and
    /// a position that moves backwards never un-reports a beat.
    pub fn advance(&mut self, position_seconds: f32) -> SmallVec<[BeatTick; 4]> {
        let mut ticks = SmallVec::new();
        if !self.playing {
            return ticks;
        }
        self.song_position = position_seconds;
        let beat_index = (position_seconds / self.sec_per_beat).floor() as i32;
        while self.last_reported_beat < beat_index {
            self.last_reported_beat += 1;
            if self.measure > self.measures_per_phrase {
                self.measure = 1;
            }
            ticks.push(BeatTick {
                beat: self.last_reported_beat,
                measure: self.measure,
            });
            self.measure += 1;
        }
        ticks
    }

    /// Song time at which `beat` lands.
    #[inline(always)]
    pub fn time_for_beat(&self, beat: i32) -> f32 {
        beat as f32 * self.sec_per_beat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakePlayback {
        position: f32,
        since_mix: f32,
        latency: f32,
        playing: bool,
    }

    impl PlaybackSource for FakePlayback {
        fn reported_position_seconds(&self) -> f32 {
            self.position
        }
        fn time_since_last_mix(&self) -> f32 {
            self.since_mix
        }
        fn output_latency(&self) -> f32 {
            self.latency
        }
        fn start(&mut self, offset_seconds: f32) {
            self.position = offset_seconds;
            self.playing = true;
        }
        fn stop(&mut self) {
            self.playing = false;
        }
    }

    fn started(bpm: f32, measures: i32) -> Conductor {
        let mut c = Conductor::new(bpm, measures).expect("valid clock");
        let mut p = FakePlayback { position: 0.0, since_mix: 0.0, latency: 0.0, playing: false };
        c.start(&mut p, 0.0);
        c
    }

    #[test]
    fn rejects_non_positive_bpm() {
        assert!(matches!(Conductor::new(0.0, 4), Err(ClockError::NonPositiveBpm(_))));
        assert!(matches!(Conductor::new(-155.0, 4), Err(ClockError::NonPositiveBpm(_))));
        assert!(matches!(Conductor::new(f32::NAN, 4), Err(ClockError::NonPositiveBpm(_))));
        assert!(matches!(Conductor::new(120.0, 0), Err(ClockError::NoMeasures(0))));
    }

    #[test]
    fn beat_is_floor_of_position_over_beat_duration() {
        let mut c = started(155.0, 4);
        let spb = 60.0 / 155.0;
        for expected in 1..=32 {
            let ticks = c.advance(expected as f32 * spb + 1e-4);
            assert_eq!(ticks.len(), 1, "one tick per beat boundary");
            assert_eq!(ticks[0].beat, expected);
        }
    }

    #[test]
    fn catch_up_emits_every_intermediate_beat_once() {
        let mut c = started(120.0, 4);
        let spb = 0.5;
        // Land just past beat 3, then jump straight past beat 7.
        let first = c.advance(3.0 * spb + 0.01);
        assert_eq!(first.iter().map(|t| t.beat).collect::<Vec<_>>(), vec![1, 2, 3]);
        let ticks = c.advance(7.0 * spb + 0.01);
        assert_eq!(ticks.iter().map(|t| t.beat).collect::<Vec<_>>(), vec![4, 5, 6, 7]);
        // Re-polling the same position reports nothing new.
        assert!(c.advance(7.0 * spb + 0.01).is_empty());
    }

    #[test]
    fn position_jitter_never_regresses_the_counter() {
        let mut c = started(120.0, 4);
        c.advance(2.6);
        assert_eq!(c.last_reported_beat(), 5);
        // A backwards sample (buffer correction jitter) must not re-report.
        assert!(c.advance(2.2).is_empty());
        assert_eq!(c.last_reported_beat(), 5);
        let ticks = c.advance(3.1);
        assert_eq!(ticks.iter().map(|t| t.beat).collect::<Vec<_>>(), vec![6]);
    }

    #[test]
    fn measures_cycle_through_the_phrase() {
        let mut c = started(120.0, 4);
        let ticks = c.advance(5.0);
        let measures: Vec<i32> = ticks.iter().map(|t| t.measure).collect();
        assert_eq!(measures, vec![1, 2, 3, 4, 1, 2, 3, 4, 1, 2]);
    }

    #[test]
    fn advance_is_noop_while_stopped() {
        let mut c = Conductor::new(120.0, 4).expect("valid clock");
        assert!(c.advance(10.0).is_empty());
        assert_eq!(c.last_reported_beat(), 0);
    }

    #[test]
    fn start_with_offset_skips_elapsed_beats() {
        let mut c = Conductor::new(120.0, 4).expect("valid clock");
        let mut p = FakePlayback { position: 0.0, since_mix: 0.0, latency: 0.0, playing: false };
        // 10s at 120bpm = beat 20; those beats never play back.
        c.start(&mut p, 10.0);
        let ticks = c.advance(10.6);
        assert_eq!(ticks.iter().map(|t| t.beat).collect::<Vec<_>>(), vec![21]);
        assert_eq!(ticks[0].measure, 1, "beat 21 opens a phrase of 4");
    }

    #[test]
    fn poll_applies_the_buffer_lag_correction() {
        let mut c = Conductor::new(120.0, 4).expect("valid clock");
        let mut p = FakePlayback { position: 0.0, since_mix: 0.0, latency: 0.0, playing: false };
        c.start(&mut p, 0.0);
        p.position = 1.0;
        p.since_mix = 0.04;
        p.latency = 0.03;
        c.poll(&p);
        assert!((c.song_position() - 1.01).abs() < 1e-6);
    }
}
