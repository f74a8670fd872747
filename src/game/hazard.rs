use crate::core::scheduler::{Scheduler, TimerHandle};
use crate::game::geometry::{serpentine_x, FieldSpec, Hitbox};
use glam::Vec2;
use log::debug;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HazardError {
    #[error("telegraph duration must be positive, got {0}")]
    NonPositiveTelegraph(f32),
    #[error("active duration must be positive, got {0}")]
    NonPositiveActive(f32),
    #[error("fade duration must be positive, got {0}")]
    NonPositiveFade(f32),
    #[error("trail capacity and stride must be positive, got {0}/{1}")]
    InvalidTrail(usize, usize),
}

/// Stable hazard identity. Ids are never reused within a stage run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HazardId(u64);

impl std::fmt::Display for HazardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "hazard#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HazardState {
    Telegraph,
    Active,
    Resolving,
    Removed,
}

impl HazardState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Telegraph => "telegraph",
            Self::Active => "active",
            Self::Resolving => "resolving",
            Self::Removed => "removed",
        }
    }
}

/// Phase durations in seconds, always derived from beat counts at spawn
/// time. Construction rejects non-positive phases; a hazard can never skip a
/// state by mis-configuration.
#[derive(Clone, Copy, Debug)]
pub struct HazardTiming {
    telegraph: f32,
    active: f32,
    fade: f32,
}

impl HazardTiming {
    pub fn from_beats(
        telegraph_beats: f32,
        active_beats: f32,
        fade_beats: f32,
        sec_per_beat: f32,
    ) -> Result<Self, HazardError> {
        Self::from_seconds(
            telegraph_beats * sec_per_beat,
            active_beats * sec_per_beat,
            fade_beats * sec_per_beat,
        )
    }

    pub fn from_seconds(telegraph: f32, active: f32, fade: f32) -> Result<Self, HazardError> {
        if !(telegraph.is_finite() && telegraph > 0.0) {
            return Err(HazardError::NonPositiveTelegraph(telegraph));
        }
        if !(active.is_finite() && active > 0.0) {
            return Err(HazardError::NonPositiveActive(active));
        }
        if !(fade.is_finite() && fade > 0.0) {
            return Err(HazardError::NonPositiveFade(fade));
        }
        Ok(Self { telegraph, active, fade })
    }

    #[inline(always)]
    pub fn telegraph(&self) -> f32 {
        self.telegraph
    }

    #[inline(always)]
    pub fn active(&self) -> f32 {
        self.active
    }

    #[inline(always)]
    pub fn fade(&self) -> f32 {
        self.fade
    }
}

/// Bounded FIFO of recent trail positions backing a fixed pool of collision
/// proxies. Every `stride`-th point counted from the newest end gets a proxy,
/// scaled by its normalized position in the trail so the tail thins out.
#[derive(Clone, Debug)]
pub struct Trail {
    points: VecDeque<Vec2>,
    capacity: usize,
    stride: usize,
    proxies: Vec<TrailProxy>,
}

#[derive(Clone, Copy, Debug)]
pub struct TrailProxy {
    pub position: Vec2,
    pub scale: f32,
    pub live: bool,
}

impl Trail {
    pub fn new(capacity: usize, stride: usize) -> Result<Self, HazardError> {
        if capacity == 0 || stride == 0 || capacity < stride {
            return Err(HazardError::InvalidTrail(capacity, stride));
        }
        let pool = capacity / stride;
        Ok(Self {
            points: VecDeque::with_capacity(capacity + 1),
            capacity,
            stride,
            proxies: vec![TrailProxy { position: Vec2::ZERO, scale: 0.0, live: false }; pool],
        })
    }

    pub fn push(&mut self, point: Vec2) {
        self.points.push_back(point);
        if self.points.len() > self.capacity {
            self.points.pop_front();
        }
        self.resample();
    }

    fn resample(&mut self) {
        let len = self.points.len();
        for (k, proxy) in self.proxies.iter_mut().enumerate() {
            let back_offset = k * self.stride;
            if back_offset < len {
                let idx = len - 1 - back_offset;
                proxy.position = self.points[idx];
                proxy.scale = idx as f32 / self.capacity as f32;
                proxy.live = true;
            } else {
                proxy.live = false;
            }
        }
    }

    /// Oldest retained point, i.e. the visual tail end.
    pub fn tail(&self) -> Option<Vec2> {
        self.points.front().copied()
    }

    #[inline(always)]
    pub fn proxies(&self) -> &[TrailProxy] {
        &self.proxies
    }

    #[inline(always)]
    pub fn proxy_pool_size(&self) -> usize {
        self.proxies.len()
    }
}

/// Motion and collision state of a serpentine trail hazard. The head weaves
/// upward from the bottom edge; collision runs over the trail proxies rather
/// than a single shape.
#[derive(Clone, Debug)]
pub struct SerpentForm {
    pub speed: f32,
    pub frequency: f32,
    pub amplitude: f32,
    pub radius: f32,
    anchor_x: f32,
    start_y: f32,
    age: f32,
    trail: Trail,
}

impl SerpentForm {
    pub fn new(
        origin: Vec2,
        speed: f32,
        frequency: f32,
        amplitude: f32,
        radius: f32,
        trail_length: usize,
        proxy_stride: usize,
    ) -> Result<Self, HazardError> {
        Ok(Self {
            speed,
            frequency,
            amplitude,
            radius,
            anchor_x: origin.x,
            start_y: origin.y,
            age: 0.0,
            trail: Trail::new(trail_length, proxy_stride)?,
        })
    }

    fn integrate(&mut self, dt: f32) -> Vec2 {
        self.age += dt;
        let head = Vec2::new(
            serpentine_x(self.anchor_x, self.amplitude, self.frequency, self.age),
            self.start_y - self.speed * self.age,
        );
        self.trail.push(head);
        head
    }

    #[inline(always)]
    pub fn trail(&self) -> &Trail {
        &self.trail
    }
}

/// Shape variant of a hazard plus the pure function producing its final
/// collidable geometry. The active hitbox may differ from the telegraph
/// preview (a beam warns at half extent and strikes at full extent); only
/// the active geometry is in-contract here.
#[derive(Clone, Debug)]
pub enum HazardForm {
    Circle { radius: f32 },
    Square { half_extent: f32 },
    /// Anchored at the bottom edge, grows upward to full field height.
    VerticalBeam { width: f32 },
    /// Anchored at one side edge, sweeps across the full field width.
    HorizontalBeam { height: f32, from_right: bool },
    /// Anchored at its emitter, extends along `angle`.
    ThinBeam { length: f32, thickness: f32, angle: f32 },
    Serpent(SerpentForm),
}

impl HazardForm {
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Circle { .. } => "circle",
            Self::Square { .. } => "square",
            Self::VerticalBeam { .. } => "vertical_beam",
            Self::HorizontalBeam { .. } => "horizontal_beam",
            Self::ThinBeam { .. } => "thin_beam",
            Self::Serpent(_) => "serpent",
        }
    }

    /// Facing used by renderers and volley math.
    pub fn orientation(&self) -> f32 {
        match self {
            Self::ThinBeam { angle, .. } => *angle,
            Self::HorizontalBeam { from_right, .. } => {
                if *from_right {
                    std::f32::consts::PI
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    /// Final collidable shape and placement relative to the anchor.
    /// Serpents collide through their trail proxies instead.
    pub fn active_hitbox(&self, field: &FieldSpec) -> Option<Hitbox> {
        match *self {
            Self::Circle { radius } => Some(Hitbox::circle(radius)),
            Self::Square { half_extent } => {
                Some(Hitbox::rect(Vec2::splat(half_extent), Vec2::ZERO, 0.0))
            }
            Self::VerticalBeam { width } => Some(Hitbox::rect(
                Vec2::new(width * 0.5, field.height * 0.5),
                Vec2::new(0.0, -field.height * 0.5),
                0.0,
            )),
            Self::HorizontalBeam { height, from_right } => {
                let dir = if from_right { -1.0 } else { 1.0 };
                Some(Hitbox::rect(
                    Vec2::new(field.width * 0.5, height * 0.5),
                    Vec2::new(dir * field.width * 0.5, 0.0),
                    0.0,
                ))
            }
            Self::ThinBeam { length, thickness, angle } => Some(Hitbox::rect(
                Vec2::new(length * 0.5, thickness * 0.5),
                Vec2::new(length * 0.5, 0.0),
                angle,
            )),
            Self::Serpent(_) => None,
        }
    }
}

/// One-shot projectile burst released at the Telegraph -> Active edge.
#[derive(Clone, Copy, Debug)]
pub struct VolleySpec {
    pub count: usize,
    pub total_spread: f32,
    pub direction: Vec2,
    pub speed: f32,
    pub muzzle_offset: f32,
    pub damage: i32,
    pub projectile_radius: f32,
}

/// A volley whose origin has been resolved; the stage turns this into
/// projectiles.
#[derive(Clone, Copy, Debug)]
pub struct VolleyDischarge {
    pub origin: Vec2,
    pub spec: VolleySpec,
}

#[derive(Clone, Debug)]
pub struct HazardSpec {
    pub form: HazardForm,
    pub anchor: Vec2,
    pub timing: HazardTiming,
    pub damage: i32,
    pub volley: Option<VolleySpec>,
}

#[derive(Clone, Debug)]
pub enum HazardEvent {
    Spawned {
        id: HazardId,
        kind: &'static str,
        anchor: Vec2,
        orientation: f32,
        form: HazardForm,
    },
    StateChanged {
        id: HazardId,
        state: HazardState,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transition {
    Activate,
    Resolve,
    Remove,
}

struct Hazard {
    form: HazardForm,
    anchor: Vec2,
    damage: i32,
    state: HazardState,
    collidable: bool,
    target_inside: bool,
    volley: Option<VolleySpec>,
    timers: [Option<TimerHandle>; 3],
}

/// Owns every live hazard and drives their lifecycles through one shared
/// scheduler. The tick is two-phase: due transitions are drained first, then
/// committed together, so collision flags only ever change at the commit
/// point and a collision pass never observes a half-applied tick.
pub struct HazardEngine {
    hazards: FxHashMap<HazardId, Hazard>,
    scheduler: Scheduler<(HazardId, Transition)>,
    events: Vec<HazardEvent>,
    next_id: u64,
    field: FieldSpec,
}

impl HazardEngine {
    pub fn new(field: FieldSpec) -> Self {
        Self {
            hazards: FxHashMap::default(),
            scheduler: Scheduler::new(),
            events: Vec::new(),
            next_id: 0,
            field,
        }
    }

    pub fn len(&self) -> usize {
        self.hazards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hazards.is_empty()
    }

    pub fn state_of(&self, id: HazardId) -> Option<HazardState> {
        self.hazards.get(&id).map(|h| h.state)
    }

    /// Spawns in Telegraph and lays out the whole timeline up front: one
    /// flat step list per hazard, all on absolute times so phases never
    /// drift, all individually cancellable.
    pub fn spawn(&mut self, spec: HazardSpec, now: f32) -> HazardId {
        let id = HazardId(self.next_id);
        self.next_id += 1;

        let activate_at = now + spec.timing.telegraph();
        let resolve_at = activate_at + spec.timing.active();
        let remove_at = resolve_at + spec.timing.fade();
        let timers = [
            Some(self.scheduler.schedule_at(activate_at, (id, Transition::Activate))),
            Some(self.scheduler.schedule_at(resolve_at, (id, Transition::Resolve))),
            Some(self.scheduler.schedule_at(remove_at, (id, Transition::Remove))),
        ];

        self.events.push(HazardEvent::Spawned {
            id,
            kind: spec.form.kind_name(),
            anchor: spec.anchor,
            orientation: spec.form.orientation(),
            form: spec.form.clone(),
        });
        self.hazards.insert(
            id,
            Hazard {
                form: spec.form,
                anchor: spec.anchor,
                damage: spec.damage,
                state: HazardState::Telegraph,
                collidable: false,
                target_inside: false,
                volley: spec.volley,
                timers,
            },
        );
        debug!("{id} spawned (telegraph {:.3}s)", spec.timing.telegraph());
        id
    }

    /// External removal (owner despawned the hazard mid-lifecycle). Cancels
    /// every pending transition atomically; queued callbacks for this hazard
    /// become no-ops rather than firing on freed state.
    pub fn despawn(&mut self, id: HazardId) -> bool {
        let Some(mut hazard) = self.hazards.remove(&id) else {
            return false;
        };
        for timer in hazard.timers.iter_mut() {
            if let Some(handle) = timer.take() {
                self.scheduler.cancel(handle);
            }
        }
        hazard.state = HazardState::Removed;
        self.events.push(HazardEvent::StateChanged { id, state: HazardState::Removed });
        debug!("{id} despawned externally");
        true
    }

    /// Advances hazard lifecycles to `now`. Returns the volleys released by
    /// hazards that activated during this tick.
    pub fn tick(&mut self, now: f32) -> Vec<VolleyDischarge> {
        let mut volleys = Vec::new();
        loop {
            // Phase 1: collect every due transition.
            let due = self.scheduler.drain_due(now);
            if due.is_empty() {
                break;
            }
            // Phase 2: commit them together.
            for (id, transition) in due {
                self.commit(id, transition, &mut volleys);
            }
        }
        volleys
    }

    fn commit(&mut self, id: HazardId, transition: Transition, volleys: &mut Vec<VolleyDischarge>) {
        let Some(hazard) = self.hazards.get_mut(&id) else {
            // Cancellation already removed the hazard; scheduler handles are
            // cancelled with it, so this should not happen.
            return;
        };
        match transition {
            Transition::Activate => {
                hazard.state = HazardState::Active;
                hazard.collidable = true;
                hazard.timers[0] = None;
                if let Some(volley) = hazard.volley.take() {
                    volleys.push(VolleyDischarge { origin: hazard.anchor, spec: volley });
                }
                self.events.push(HazardEvent::StateChanged { id, state: HazardState::Active });
            }
            Transition::Resolve => {
                hazard.state = HazardState::Resolving;
                hazard.collidable = false;
                hazard.timers[1] = None;
                self.events.push(HazardEvent::StateChanged { id, state: HazardState::Resolving });
            }
            Transition::Remove => {
                self.hazards.remove(&id);
                self.events.push(HazardEvent::StateChanged { id, state: HazardState::Removed });
            }
        }
    }

    /// Integrates continuous hazard motion (serpent heads and trails).
    pub fn integrate(&mut self, dt: f32) {
        for hazard in self.hazards.values_mut() {
            if let HazardForm::Serpent(serpent) = &mut hazard.form {
                hazard.anchor = serpent.integrate(dt);
            }
        }
    }

    /// Serpents whose tail has fully left the top of the field; the owner
    /// despawns these, which exercises the cancellation path.
    pub fn offscreen_serpents(&self, margin: f32) -> Vec<HazardId> {
        self.hazards
            .iter()
            .filter_map(|(id, hazard)| match &hazard.form {
                HazardForm::Serpent(serpent) => serpent
                    .trail()
                    .tail()
                    .is_some_and(|tail| tail.y < -margin)
                    .then_some(*id),
                _ => None,
            })
            .collect()
    }

    /// Collision phase. Damage fires on the overlap *edge*: entering an
    /// active hazard hits once; staying inside does not re-hit (re-entrant
    /// overlaps are the target's concern via its own invulnerability).
    pub fn collide_target(
        &mut self,
        center: Vec2,
        radius: f32,
        mut on_hit: impl FnMut(HazardId, i32),
    ) {
        for (id, hazard) in self.hazards.iter_mut() {
            let inside = hazard.collidable && Self::overlaps(&self.field, hazard, center, radius);
            if inside && !hazard.target_inside {
                on_hit(*id, hazard.damage);
            }
            hazard.target_inside = inside;
        }
    }

    fn overlaps(field: &FieldSpec, hazard: &Hazard, center: Vec2, radius: f32) -> bool {
        match &hazard.form {
            HazardForm::Serpent(serpent) => serpent.trail().proxies().iter().any(|proxy| {
                proxy.live
                    && proxy.position.distance_squared(center)
                        <= (serpent.radius * proxy.scale + radius).powi(2)
            }),
            form => form
                .active_hitbox(field)
                .is_some_and(|hitbox| hitbox.overlaps_circle(hazard.anchor, center, radius)),
        }
    }

    pub fn drain_events(&mut self) -> Vec<HazardEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing_beats(telegraph: f32, active: f32, fade: f32, bpm: f32) -> HazardTiming {
        HazardTiming::from_beats(telegraph, active, fade, 60.0 / bpm).expect("valid timing")
    }

    fn circle_spec(timing: HazardTiming) -> HazardSpec {
        HazardSpec {
            form: HazardForm::Circle { radius: 40.0 },
            anchor: Vec2::new(500.0, 500.0),
            timing,
            damage: 1,
            volley: None,
        }
    }

    fn activations(engine: &mut HazardEngine, id: HazardId) -> usize {
        engine
            .drain_events()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    HazardEvent::StateChanged { id: eid, state: HazardState::Active } if *eid == id
                )
            })
            .count()
    }

    #[test]
    fn timing_rejects_non_positive_durations() {
        let spb = 60.0 / 155.0;
        assert!(matches!(
            HazardTiming::from_beats(0.0, 4.0, 1.0, spb),
            Err(HazardError::NonPositiveTelegraph(_))
        ));
        assert!(matches!(
            HazardTiming::from_beats(2.0, -1.0, 1.0, spb),
            Err(HazardError::NonPositiveActive(_))
        ));
        assert!(matches!(
            HazardTiming::from_beats(2.0, 4.0, 0.0, spb),
            Err(HazardError::NonPositiveFade(_))
        ));
    }

    #[test]
    fn collision_enables_exactly_at_the_telegraph_boundary() {
        // 2 beats at 155 bpm: 0.774193548...s
        let timing = timing_beats(2.0, 4.0, 1.0, 155.0);
        assert!((timing.telegraph() - 0.7742).abs() < 5e-4);

        let mut engine = HazardEngine::new(FieldSpec::default());
        let id = engine.spawn(circle_spec(timing), 0.0);
        assert_eq!(engine.state_of(id), Some(HazardState::Telegraph));

        // Just before the boundary: still telegraphing, no collision.
        engine.tick(timing.telegraph() - 1e-3);
        assert_eq!(engine.state_of(id), Some(HazardState::Telegraph));
        let mut hits = 0;
        engine.collide_target(Vec2::new(500.0, 500.0), 10.0, |_, _| hits += 1);
        assert_eq!(hits, 0, "telegraphing hazards must not collide");

        // At the boundary: active, collidable, exactly one transition.
        engine.tick(timing.telegraph());
        assert_eq!(engine.state_of(id), Some(HazardState::Active));
        assert_eq!(activations(&mut engine, id), 1);
        engine.collide_target(Vec2::new(500.0, 500.0), 10.0, |_, _| hits += 1);
        assert_eq!(hits, 1);

        // Ticking again must not re-activate.
        engine.tick(timing.telegraph() + 1e-3);
        assert_eq!(activations(&mut engine, id), 0);
    }

    #[test]
    fn full_lifecycle_runs_telegraph_active_resolving_removed() {
        let timing = HazardTiming::from_seconds(1.0, 2.0, 0.5).expect("valid timing");
        let mut engine = HazardEngine::new(FieldSpec::default());
        let id = engine.spawn(circle_spec(timing), 10.0);

        engine.tick(10.5);
        assert_eq!(engine.state_of(id), Some(HazardState::Telegraph));
        engine.tick(11.0);
        assert_eq!(engine.state_of(id), Some(HazardState::Active));
        engine.tick(13.0);
        assert_eq!(engine.state_of(id), Some(HazardState::Resolving));
        engine.tick(13.5);
        assert_eq!(engine.state_of(id), None, "removed hazards are deallocated");
        assert!(engine.is_empty());
    }

    #[test]
    fn removal_during_telegraph_cancels_the_pending_activation() {
        let timing = HazardTiming::from_seconds(1.0, 2.0, 0.5).expect("valid timing");
        let mut engine = HazardEngine::new(FieldSpec::default());
        let id = engine.spawn(circle_spec(timing), 0.0);
        engine.drain_events();

        assert!(engine.despawn(id));
        // Run well past every scheduled boundary: nothing may fire.
        engine.tick(100.0);
        let events = engine.drain_events();
        let activated = events.iter().any(|e| {
            matches!(e, HazardEvent::StateChanged { state: HazardState::Active, .. })
        });
        assert!(!activated, "cancelled hazards must never activate");
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(
                    e,
                    HazardEvent::StateChanged { state: HazardState::Removed, .. }
                ))
                .count(),
            1,
            "external removal reports exactly one removal event"
        );
    }

    #[test]
    fn volley_fires_exactly_once_on_activation() {
        let timing = HazardTiming::from_seconds(1.0, 2.0, 0.5).expect("valid timing");
        let mut spec = circle_spec(timing);
        spec.volley = Some(VolleySpec {
            count: 5,
            total_spread: 45_f32.to_radians(),
            direction: Vec2::X,
            speed: 400.0,
            muzzle_offset: 60.0,
            damage: 1,
            projectile_radius: 8.0,
        });
        let mut engine = HazardEngine::new(FieldSpec::default());
        engine.spawn(spec, 0.0);

        assert!(engine.tick(0.5).is_empty(), "no volley during telegraph");
        let volleys = engine.tick(1.0);
        assert_eq!(volleys.len(), 1);
        assert_eq!(volleys[0].spec.count, 5);
        assert!(engine.tick(2.0).is_empty(), "volley is one-shot");
    }

    #[test]
    fn damage_fires_once_per_overlap_event() {
        let timing = HazardTiming::from_seconds(0.1, 10.0, 0.5).expect("valid timing");
        let mut engine = HazardEngine::new(FieldSpec::default());
        engine.spawn(circle_spec(timing), 0.0);
        engine.tick(0.2);

        let inside = Vec2::new(500.0, 500.0);
        let outside = Vec2::new(900.0, 900.0);
        let mut hits = 0;
        engine.collide_target(inside, 10.0, |_, _| hits += 1);
        engine.collide_target(inside, 10.0, |_, _| hits += 1);
        assert_eq!(hits, 1, "staying inside must not re-hit");
        engine.collide_target(outside, 10.0, |_, _| hits += 1);
        engine.collide_target(inside, 10.0, |_, _| hits += 1);
        assert_eq!(hits, 2, "leaving and re-entering hits again");
    }

    #[test]
    fn beam_active_geometry_extends_to_full_field() {
        let field = FieldSpec::default();
        let form = HazardForm::VerticalBeam { width: 150.0 };
        let hitbox = form.active_hitbox(&field).expect("beam hitbox");
        let anchor = Vec2::new(960.0, field.height);
        // Near the top of the screen, inside the beam column.
        assert!(hitbox.overlaps_circle(anchor, Vec2::new(960.0, 20.0), 10.0));
        // Outside the column.
        assert!(!hitbox.overlaps_circle(anchor, Vec2::new(1200.0, 20.0), 10.0));
    }

    #[test]
    fn trail_pool_is_fixed_and_scales_toward_the_tail() {
        let mut trail = Trail::new(150, 5).expect("valid trail");
        assert_eq!(trail.proxy_pool_size(), 30);
        for i in 0..200 {
            trail.push(Vec2::new(i as f32, 0.0));
        }
        assert_eq!(trail.proxy_pool_size(), 30, "pool never reallocates");
        let proxies = trail.proxies();
        assert!(proxies.iter().all(|p| p.live));
        // Newest proxy sits at the head with the largest scale.
        assert!((proxies[0].position.x - 199.0).abs() < 1e-4);
        assert!(proxies[0].scale > proxies[29].scale);
        // Stride of 5 from the newest end.
        assert!((proxies[1].position.x - 194.0).abs() < 1e-4);
        assert_eq!(trail.tail(), Some(Vec2::new(50.0, 0.0)));
    }

    #[test]
    fn trail_rejects_degenerate_configuration() {
        assert!(matches!(Trail::new(0, 5), Err(HazardError::InvalidTrail(0, 5))));
        assert!(matches!(Trail::new(150, 0), Err(HazardError::InvalidTrail(150, 0))));
    }

    #[test]
    fn serpent_collides_through_trail_proxies() {
        let timing = HazardTiming::from_seconds(0.1, 60.0, 0.5).expect("valid timing");
        let serpent = SerpentForm::new(Vec2::new(500.0, 1100.0), 250.0, 2.0, 50.0, 15.0, 150, 5)
            .expect("valid serpent");
        let mut engine = HazardEngine::new(FieldSpec::default());
        let id = engine.spawn(
            HazardSpec {
                form: HazardForm::Serpent(serpent),
                anchor: Vec2::new(500.0, 1100.0),
                timing,
                damage: 1,
                volley: None,
            },
            0.0,
        );
        engine.tick(0.2);
        // Walk the serpent upward for a second of simulation.
        for _ in 0..60 {
            engine.integrate(1.0 / 60.0);
        }
        let head_y = match engine.hazards.get(&id).map(|h| h.anchor) {
            Some(anchor) => anchor.y,
            None => panic!("serpent alive"),
        };
        let mut hits = 0;
        engine.collide_target(Vec2::new(500.0, head_y), 30.0, |_, _| hits += 1);
        assert!(hits > 0, "head proxy must collide near the serpent head");
    }

    #[test]
    fn offscreen_serpents_are_reported_for_despawn() {
        let timing = HazardTiming::from_seconds(0.1, 600.0, 0.5).expect("valid timing");
        let serpent = SerpentForm::new(Vec2::new(500.0, 0.0), 400.0, 2.0, 50.0, 15.0, 20, 5)
            .expect("valid serpent");
        let mut engine = HazardEngine::new(FieldSpec::default());
        let id = engine.spawn(
            HazardSpec {
                form: HazardForm::Serpent(serpent),
                anchor: Vec2::new(500.0, 0.0),
                timing,
                damage: 1,
                volley: None,
            },
            0.0,
        );
        assert!(engine.offscreen_serpents(100.0).is_empty());
        // Climb far above the top edge; the bounded trail follows the head.
        for _ in 0..240 {
            engine.integrate(1.0 / 60.0);
        }
        assert_eq!(engine.offscreen_serpents(100.0), vec![id]);
        assert!(engine.despawn(id));
    }
}
