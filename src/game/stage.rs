use crate::core::clock::{ClockError, Conductor, PlaybackSource};
use crate::core::events::{Observers, ObserverToken};
use crate::core::scheduler::Scheduler;
use crate::game::director::{Director, DirectorError, HazardTemplates, SpawnCommand};
use crate::game::geometry::{cone_directions, FieldSpec, GridSpec, SlotSpec};
use crate::game::hazard::{
    HazardEngine, HazardEvent, HazardForm, HazardId, HazardState, VolleyDischarge,
};
use crate::game::projectile::{ProjectileEngine, ProjectileSpec};
use crate::game::script::{Pattern, ScriptError, StageScript};
use glam::Vec2;
use log::debug;
use thiserror::Error;

/// How far past the top edge a serpent tail may climb before the stage
/// despawns it.
const OFFSCREEN_MARGIN: f32 = 100.0;
/// Probe radius of the target actor's hitbox.
const TARGET_RADIUS: f32 = 20.0;

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Clock(#[from] ClockError),
    #[error(transparent)]
    Director(#[from] DirectorError),
}

/// The player collaborator. Movement, input and invulnerability windows are
/// its own concern; the stage only reads a position and reports hits.
pub trait TargetActor {
    fn position(&self) -> Vec2;
    fn apply_damage(&mut self, amount: i32);
}

/// Render-facing feed. The stage emits these through the observer registry
/// and never waits on the renderer.
#[derive(Clone, Debug)]
pub enum StageEvent {
    HazardSpawned {
        id: HazardId,
        kind: &'static str,
        anchor: Vec2,
        orientation: f32,
        form: HazardForm,
    },
    HazardStateChanged {
        id: HazardId,
        state: HazardState,
    },
    ProjectileSpawned {
        position: Vec2,
        orientation: f32,
    },
    TargetDamaged {
        amount: i32,
    },
}

impl From<HazardEvent> for StageEvent {
    fn from(event: HazardEvent) -> Self {
        match event {
            HazardEvent::Spawned { id, kind, anchor, orientation, form } => {
                Self::HazardSpawned { id, kind, anchor, orientation, form }
            }
            HazardEvent::StateChanged { id, state } => Self::HazardStateChanged { id, state },
        }
    }
}

/// Owns the conductor, director, hazard and projectile engines and runs the
/// per-tick pipeline: poll playback, dispatch beats, commit lifecycle
/// transitions, integrate motion, then resolve collisions against the
/// target. One logical timeline, no parallel contexts.
pub struct Stage {
    conductor: Conductor,
    director: Director,
    engine: HazardEngine,
    projectiles: ProjectileEngine,
    /// Rain drops scheduled behind their beat.
    drops: Scheduler<ProjectileSpec>,
    observers: Observers<StageEvent>,
    pending: Vec<StageEvent>,
    field: FieldSpec,
    song_length_beats: i32,
    clock: f32,
}

impl Stage {
    /// Builds a stage from a validated script with the default field layout
    /// and hazard roster. The seed fixes every random choice for the run.
    pub fn from_script(script: &StageScript, seed: u64) -> Result<Self, StageError> {
        Self::with_layout(
            script,
            HazardTemplates::default(),
            FieldSpec::default(),
            GridSpec::default(),
            SlotSpec::default(),
            seed,
        )
    }

    pub fn with_layout(
        script: &StageScript,
        templates: HazardTemplates,
        field: FieldSpec,
        grid: GridSpec,
        slots: SlotSpec,
        seed: u64,
    ) -> Result<Self, StageError> {
        script.validate()?;
        let conductor = Conductor::new(script.bpm, script.measures_per_phrase)?;
        let director = Director::new(
            script.rules.clone(),
            templates,
            field,
            grid,
            slots,
            conductor.sec_per_beat(),
            seed,
        )?;
        Ok(Self {
            conductor,
            director,
            engine: HazardEngine::new(field),
            projectiles: ProjectileEngine::new(),
            drops: Scheduler::new(),
            observers: Observers::new(),
            pending: Vec::new(),
            field,
            song_length_beats: script.song_length_beats,
            clock: 0.0,
        })
    }

    pub fn observe(&mut self, callback: Box<dyn FnMut(&StageEvent)>) -> ObserverToken {
        self.observers.register(callback)
    }

    pub fn unobserve(&mut self, token: ObserverToken) -> bool {
        self.observers.unsubscribe(token)
    }

    pub fn start<P: PlaybackSource>(&mut self, playback: &mut P, offset_seconds: f32) {
        self.conductor.start(playback, offset_seconds);
    }

    pub fn stop<P: PlaybackSource>(&mut self, playback: &mut P) {
        self.conductor.stop(playback);
    }

    #[inline(always)]
    pub fn beat(&self) -> i32 {
        self.conductor.last_reported_beat()
    }

    #[inline(always)]
    pub fn clock(&self) -> f32 {
        self.clock
    }

    #[inline(always)]
    pub fn hazard_count(&self) -> usize {
        self.engine.len()
    }

    #[inline(always)]
    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    #[inline(always)]
    pub fn field(&self) -> &FieldSpec {
        &self.field
    }

    /// The song has run out and every hazard and projectile has wound down.
    pub fn finished(&self) -> bool {
        self.conductor.last_reported_beat() >= self.song_length_beats
            && self.engine.is_empty()
            && self.projectiles.is_empty()
    }

    /// Dispatches a pattern outside the choreography table (the pre-song
    /// warm-up wave). Spawns land on the stage clock like any other.
    pub fn dispatch_pattern<T: TargetActor>(&mut self, pattern: &Pattern, target: Option<&T>) {
        let snapshot = target.map(TargetActor::position);
        let mut commands = Vec::new();
        self.director.realize(pattern, snapshot, &mut commands);
        self.execute(commands);
    }

    /// One simulation step. Beat dispatch is fully synchronous: every rule
    /// matching a delivered beat fires, and every spawn lands, before
    /// lifecycle commits and collision resolution run for this tick.
    pub fn tick<P: PlaybackSource, T: TargetActor>(
        &mut self,
        dt: f32,
        playback: &P,
        mut target: Option<&mut T>,
    ) {
        self.clock += dt;

        // 1. Beats. The director sees the target where it is right now;
        // aimed patterns snapshot this position and never re-aim.
        let snapshot = target.as_deref().map(TargetActor::position);
        let ticks = self.conductor.poll(playback);
        for tick in ticks {
            if tick.beat > self.song_length_beats {
                break;
            }
            debug!("beat {} (measure {})", tick.beat, tick.measure);
            let commands = self.director.on_beat(tick, snapshot);
            self.execute(commands);
        }

        // 2. Lifecycle transitions commit together; activation volleys fire
        // from the committed state.
        let volleys = self.engine.tick(self.clock);
        for volley in volleys {
            self.fire_volley(&volley);
        }

        // 3. Delayed rain drops that came due this tick.
        for spec in self.drops.drain_due(self.clock) {
            self.spawn_projectile(&spec);
        }

        // 4. Continuous motion.
        self.engine.integrate(dt);
        self.projectiles.integrate(dt, &self.field);

        // Serpents that slithered off the top edge leave through the
        // cancellation path, not by timing out.
        for id in self.engine.offscreen_serpents(OFFSCREEN_MARGIN) {
            self.engine.despawn(id);
        }

        // 5. Collision, against the fully committed world.
        if let Some(target) = target.as_deref_mut() {
            let center = target.position();
            let mut hits: Vec<i32> = Vec::new();
            self.engine.collide_target(center, TARGET_RADIUS, |_, damage| hits.push(damage));
            self.projectiles.collide_target(center, TARGET_RADIUS, |damage| hits.push(damage));
            for amount in hits {
                target.apply_damage(amount);
                self.pending.push(StageEvent::TargetDamaged { amount });
            }
        }

        // 6. Render feed, strictly after the simulation is consistent.
        for event in self.engine.drain_events() {
            self.observers.emit(&event.into());
        }
        let pending = std::mem::take(&mut self.pending);
        for event in &pending {
            self.observers.emit(event);
        }
    }

    fn execute(&mut self, commands: Vec<SpawnCommand>) {
        for command in commands {
            match command {
                SpawnCommand::Hazard(spec) => {
                    self.engine.spawn(spec, self.clock);
                }
                SpawnCommand::Projectile(spec) => self.spawn_projectile(&spec),
                SpawnCommand::DelayedProjectile { delay, spec } => {
                    self.drops.schedule_at(self.clock + delay, spec);
                }
            }
        }
    }

    fn fire_volley(&mut self, volley: &VolleyDischarge) {
        let spec = volley.spec;
        let origin = volley.origin + spec.direction * spec.muzzle_offset;
        for direction in cone_directions(spec.direction, spec.count, spec.total_spread) {
            self.spawn_projectile(&ProjectileSpec {
                position: origin,
                direction,
                speed: spec.speed,
                gravity: 0.0,
                damage: spec.damage,
                radius: spec.projectile_radius,
            });
        }
    }

    fn spawn_projectile(&mut self, spec: &ProjectileSpec) {
        let orientation = self.projectiles.spawn(spec);
        self.pending.push(StageEvent::ProjectileSpawned { position: spec.position, orientation });
    }
}
