use crate::config;
use crate::core::clock::PlaybackSource;
use crate::game::script::{self, Pattern, StageScript};
use crate::game::stage::{Stage, StageEvent, TargetActor};
use glam::Vec2;
use log::{debug, error, info, warn};
use std::cell::RefCell;
use std::rc::Rc;

/// Stand-in for the audio collaborator. Playback advances in fixed mix-buffer
/// chunks with a constant output latency, so the conductor's position
/// correction (`reported + since_mix - latency`) is exercised exactly as it
/// would be against a real audio backend.
pub struct SimulatedPlayback {
    mixed_position: f32,
    since_mix: f32,
    mix_interval: f32,
    latency: f32,
    playing: bool,
}

impl SimulatedPlayback {
    pub fn new(mix_interval: f32, latency: f32) -> Self {
        Self { mixed_position: 0.0, since_mix: 0.0, mix_interval, latency, playing: false }
    }

    /// Advances wall time. The reported position only moves when a buffer
    /// mix boundary passes; the remainder shows up as `time_since_last_mix`.
    pub fn advance(&mut self, dt: f32) {
        if !self.playing {
            return;
        }
        self.since_mix += dt;
        while self.since_mix >= self.mix_interval {
            self.mixed_position += self.mix_interval;
            self.since_mix -= self.mix_interval;
        }
    }
}

impl PlaybackSource for SimulatedPlayback {
    fn reported_position_seconds(&self) -> f32 {
        self.mixed_position
    }

    fn time_since_last_mix(&self) -> f32 {
        self.since_mix
    }

    fn output_latency(&self) -> f32 {
        self.latency
    }

    fn start(&mut self, offset_seconds: f32) {
        self.mixed_position = offset_seconds;
        self.since_mix = 0.0;
        self.playing = true;
    }

    fn stop(&mut self) {
        self.playing = false;
    }
}

const TARGET_MAX_HEALTH: i32 = 3;
const MERCY_WINDOW: f32 = 1.0;

/// Scripted stand-in for the player: drifts around the field on a fixed
/// curve and soaks damage behind a short mercy window, like the real actor
/// would.
pub struct WanderingTarget {
    center: Vec2,
    position: Vec2,
    age: f32,
    health: i32,
    mercy: f32,
}

impl WanderingTarget {
    pub fn new(center: Vec2) -> Self {
        Self { center, position: center, age: 0.0, health: TARGET_MAX_HEALTH, mercy: 0.0 }
    }

    pub fn integrate(&mut self, dt: f32) {
        self.age += dt;
        self.mercy = (self.mercy - dt).max(0.0);
        // Incommensurate frequencies keep the path from closing on itself.
        self.position = self.center
            + Vec2::new((self.age * 0.83).sin() * 560.0, (self.age * 0.53 + 1.0).sin() * 380.0);
    }

    #[inline(always)]
    pub fn health(&self) -> i32 {
        self.health
    }

    #[inline(always)]
    pub fn defeated(&self) -> bool {
        self.health <= 0
    }
}

impl TargetActor for WanderingTarget {
    fn position(&self) -> Vec2 {
        self.position
    }

    fn apply_damage(&mut self, amount: i32) {
        if self.mercy > 0.0 || self.health <= 0 {
            return;
        }
        self.health -= amount;
        self.mercy = MERCY_WINDOW;
        info!("target hit for {amount}, {} health left", self.health.max(0));
    }
}

fn load_script(config: &config::Config) -> StageScript {
    match &config.stage_script {
        Some(path) => match StageScript::load(path) {
            Ok(script) => {
                info!("Loaded stage script '{path}'");
                script
            }
            Err(e) => {
                // The demo can still run; fall back to the built-in stage.
                error!("Failed to load stage script '{path}': {e}");
                script::vapor()
            }
        },
        None => script::vapor(),
    }
}

#[derive(Default)]
struct RunStats {
    hazards: u64,
    projectiles: u64,
    damage: i64,
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::get();
    let script = load_script(&config);
    info!(
        "Stage '{}' ({}): {:.0} bpm, {} beats, {} rules",
        script.title,
        script.artist,
        script.bpm,
        script.song_length_beats,
        script.rules.len()
    );

    let mut stage = Stage::from_script(&script, config.seed)?;
    let stats = Rc::new(RefCell::new(RunStats::default()));
    let sink = Rc::clone(&stats);
    stage.observe(Box::new(move |event| {
        let mut stats = sink.borrow_mut();
        match event {
            StageEvent::HazardSpawned { id, kind, anchor, .. } => {
                stats.hazards += 1;
                debug!("{id} spawned: {kind} at ({:.0}, {:.0})", anchor.x, anchor.y);
            }
            StageEvent::HazardStateChanged { id, state } => {
                debug!("{id} -> {}", state.as_str());
            }
            StageEvent::ProjectileSpawned { .. } => stats.projectiles += 1,
            StageEvent::TargetDamaged { amount } => stats.damage += i64::from(*amount),
        }
    }));

    // 10ms mix buffers and 25ms of output latency, in the range a real
    // audio device would report.
    let mut playback = SimulatedPlayback::new(0.010, 0.025);
    let mut target = WanderingTarget::new(stage.field().center());
    let dt = 1.0 / config.tick_hz as f32;
    let sec_per_beat = 60.0 / script.bpm;

    // Pre-song warm-up: one passive square wave telegraphs while the intro
    // plays out, then the music starts.
    stage.dispatch_pattern(&Pattern::SideSquares { shoot: false }, Some(&target));
    let warmup_ticks = (2.0 * sec_per_beat / dt).ceil() as u32;
    for _ in 0..warmup_ticks {
        target.integrate(dt);
        stage.tick(dt, &playback, Some(&mut target));
    }

    stage.start(&mut playback, 0.0);

    // Fixed-rate loop until the stage winds down, with a hard tick cap in
    // case a script misconfiguration keeps hazards alive forever.
    let song_seconds = script.song_length_beats as f32 * sec_per_beat;
    let max_ticks = ((song_seconds + 30.0) / dt).ceil() as u64;
    let mut ticks: u64 = 0;
    while !stage.finished() && ticks < max_ticks {
        playback.advance(dt);
        target.integrate(dt);
        stage.tick(dt, &playback, Some(&mut target));
        ticks += 1;
        if target.defeated() {
            info!("target defeated at beat {}", stage.beat());
            break;
        }
    }
    stage.stop(&mut playback);
    if ticks >= max_ticks {
        warn!("run loop hit the tick cap before the stage finished");
    }

    let stats = stats.borrow();
    info!(
        "Run complete: {} beats, {} hazards, {} projectiles, {} damage dealt, {:.1}s simulated",
        stage.beat(),
        stats.hazards,
        stats.projectiles,
        stats.damage,
        stage.clock()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_playback_quantizes_to_mix_boundaries() {
        let mut playback = SimulatedPlayback::new(0.010, 0.025);
        playback.start(0.0);
        playback.advance(0.0245);
        // Two full 10ms buffers mixed, 4.5ms since the last one.
        assert!((playback.reported_position_seconds() - 0.020).abs() < 1e-6);
        assert!((playback.time_since_last_mix() - 0.0045).abs() < 1e-6);
        assert!((playback.output_latency() - 0.025).abs() < 1e-6);
        // Corrected position: 0.020 + 0.0045 - 0.025 = -0.0005, still before
        // the first beat; the conductor clamps nothing and reports nothing.
        let corrected = playback.reported_position_seconds() + playback.time_since_last_mix()
            - playback.output_latency();
        assert!(corrected < 0.0);
    }

    #[test]
    fn stopped_playback_does_not_advance() {
        let mut playback = SimulatedPlayback::new(0.010, 0.025);
        playback.advance(1.0);
        assert_eq!(playback.reported_position_seconds(), 0.0);
        playback.start(2.5);
        assert_eq!(playback.reported_position_seconds(), 2.5);
        playback.stop();
        playback.advance(1.0);
        assert_eq!(playback.reported_position_seconds(), 2.5);
    }

    #[test]
    fn mercy_window_soaks_repeat_hits() {
        let mut target = WanderingTarget::new(Vec2::new(960.0, 540.0));
        target.apply_damage(1);
        target.apply_damage(1);
        assert_eq!(target.health(), TARGET_MAX_HEALTH - 1, "second hit lands inside mercy");
        target.integrate(MERCY_WINDOW + 0.01);
        target.apply_damage(1);
        assert_eq!(target.health(), TARGET_MAX_HEALTH - 2);
    }
}
