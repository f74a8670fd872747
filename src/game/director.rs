use crate::core::clock::BeatTick;
use crate::game::geometry::{
    cone_directions, grid_cell_center, slot_anchor, FieldSpec, GeometryError, GridSpec, SlotSpec,
};
use crate::game::hazard::{
    HazardError, HazardForm, HazardSpec, HazardTiming, SerpentForm, Trail, VolleySpec,
};
use crate::game::projectile::ProjectileSpec;
use crate::game::script::{ChoreographyRule, Pattern};
use glam::Vec2;
use log::debug;
use rand::rngs::SmallRng;
use rand::{RngExt, SeedableRng};
use smallvec::SmallVec;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectorError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Hazard(#[from] HazardError),
}

/// Stationary square hazard, used by side slots and the grid.
#[derive(Clone, Copy, Debug)]
pub struct SquareTemplate {
    pub half_extent: f32,
    pub damage: i32,
    pub telegraph_beats: f32,
    pub active_beats: f32,
    pub fade_seconds: f32,
}

impl Default for SquareTemplate {
    fn default() -> Self {
        Self {
            half_extent: 60.0,
            damage: 1,
            telegraph_beats: 2.0,
            active_beats: 4.0,
            fade_seconds: 0.5,
        }
    }
}

/// Warning circle at a random interior position.
#[derive(Clone, Copy, Debug)]
pub struct CircleTemplate {
    pub radius: f32,
    pub damage: i32,
    pub telegraph_beats: f32,
    pub active_beats: f32,
    pub fade_seconds: f32,
    /// Interior margins keeping circles away from the field edges.
    pub margin: Vec2,
}

impl Default for CircleTemplate {
    fn default() -> Self {
        Self {
            radius: 60.0,
            damage: 1,
            telegraph_beats: 2.0,
            active_beats: 4.0,
            fade_seconds: 0.5,
            margin: Vec2::new(400.0, 250.0),
        }
    }
}

/// Shared bullet parameters for volleys, aimed shots and rain.
#[derive(Clone, Copy, Debug)]
pub struct BulletTemplate {
    pub radius: f32,
    pub damage: i32,
    pub volley_speed: f32,
    pub volley_count: usize,
    pub volley_spread: f32,
    pub muzzle_offset: f32,
    pub aimed_speed: f32,
    pub aimed_count: usize,
    pub aimed_spread: f32,
    pub rain_speed: f32,
    pub rain_gravity: f32,
    pub rain_drops: usize,
}

impl Default for BulletTemplate {
    fn default() -> Self {
        Self {
            radius: 8.0,
            damage: 1,
            volley_speed: 400.0,
            volley_count: 5,
            volley_spread: 45_f32.to_radians(),
            muzzle_offset: 60.0,
            aimed_speed: 500.0,
            aimed_count: 5,
            // 5 bullets at 5 degree steps.
            aimed_spread: 20_f32.to_radians(),
            rain_speed: 100.0,
            rain_gravity: 1200.0,
            rain_drops: 4,
        }
    }
}

/// Full-height beam columns.
#[derive(Clone, Copy, Debug)]
pub struct VerticalBeamTemplate {
    pub width: f32,
    pub damage: i32,
    pub telegraph_beats: f32,
    pub active_beats: f32,
    pub fade_seconds: f32,
}

impl Default for VerticalBeamTemplate {
    fn default() -> Self {
        Self { width: 150.0, damage: 1, telegraph_beats: 2.0, active_beats: 4.0, fade_seconds: 0.3 }
    }
}

/// Screen-wide beam at a random height.
#[derive(Clone, Copy, Debug)]
pub struct HorizontalBeamTemplate {
    pub height: f32,
    pub damage: i32,
    pub telegraph_beats: f32,
    pub active_beats: f32,
    pub fade_seconds: f32,
    /// Vertical margin the random height stays inside.
    pub margin_y: f32,
}

impl Default for HorizontalBeamTemplate {
    fn default() -> Self {
        Self {
            height: 150.0,
            damage: 1,
            telegraph_beats: 2.0,
            active_beats: 1.0,
            fade_seconds: 0.3,
            margin_y: 100.0,
        }
    }
}

/// Thin rotated beams fanned from a corner.
#[derive(Clone, Copy, Debug)]
pub struct ThinBeamTemplate {
    pub length: f32,
    pub thickness: f32,
    pub damage: i32,
    pub count: usize,
    pub total_spread: f32,
    /// Random rotation applied to the whole fan, +/- this many radians.
    pub drift: f32,
    pub telegraph_beats: f32,
    pub active_beats: f32,
    pub fade_seconds: f32,
}

impl Default for ThinBeamTemplate {
    fn default() -> Self {
        Self {
            length: 2000.0,
            thickness: 30.0,
            damage: 1,
            count: 4,
            total_spread: 60_f32.to_radians(),
            drift: 10_f32.to_radians(),
            telegraph_beats: 2.0,
            active_beats: 1.0,
            fade_seconds: 0.3,
        }
    }
}

/// Serpentine trail hazard.
#[derive(Clone, Copy, Debug)]
pub struct SerpentTemplate {
    pub speed: f32,
    pub frequency: f32,
    pub amplitude: f32,
    pub radius: f32,
    pub damage: i32,
    pub trail_length: usize,
    pub proxy_stride: usize,
    /// Horizontal margin the random spawn column stays inside.
    pub margin_x: f32,
    pub telegraph_beats: f32,
    pub active_beats: f32,
    pub fade_seconds: f32,
}

impl Default for SerpentTemplate {
    fn default() -> Self {
        Self {
            speed: 250.0,
            frequency: 2.0,
            amplitude: 50.0,
            radius: 15.0,
            damage: 1,
            trail_length: 150,
            proxy_stride: 5,
            margin_x: 100.0,
            telegraph_beats: 0.5,
            // Long enough to cross the field; the off-screen despawn path
            // usually retires the serpent first.
            active_beats: 32.0,
            fade_seconds: 0.5,
        }
    }
}

/// The hazard roster available to patterns. A `None` entry means that
/// template is not configured; patterns needing it skip their spawn and the
/// sequence continues.
#[derive(Clone, Debug)]
pub struct HazardTemplates {
    pub square: Option<SquareTemplate>,
    pub circle: Option<CircleTemplate>,
    pub bullet: Option<BulletTemplate>,
    pub vertical_beam: Option<VerticalBeamTemplate>,
    pub horizontal_beam: Option<HorizontalBeamTemplate>,
    pub thin_beam: Option<ThinBeamTemplate>,
    pub serpent: Option<SerpentTemplate>,
}

impl Default for HazardTemplates {
    fn default() -> Self {
        Self {
            square: Some(SquareTemplate::default()),
            circle: Some(CircleTemplate::default()),
            bullet: Some(BulletTemplate::default()),
            vertical_beam: Some(VerticalBeamTemplate::default()),
            horizontal_beam: Some(HorizontalBeamTemplate::default()),
            thin_beam: Some(ThinBeamTemplate::default()),
            serpent: Some(SerpentTemplate::default()),
        }
    }
}

/// Everything a beat dispatch can ask the world to do. Positions, directions
/// and durations are fully resolved here; the stage only executes.
#[derive(Clone, Debug)]
pub enum SpawnCommand {
    Hazard(HazardSpec),
    Projectile(ProjectileSpec),
    /// Launched `delay` seconds after the dispatching beat (rain spacing).
    DelayedProjectile { delay: f32, spec: ProjectileSpec },
}

/// `k` distinct indices from `0..n`, uniform, fresh pool per call. Partial
/// Fisher-Yates over the index pool, so a duplicate is impossible by
/// construction.
fn sample_distinct(rng: &mut SmallRng, n: u32, k: usize) -> SmallVec<[u32; 8]> {
    let mut pool: SmallVec<[u32; 16]> = (0..n).collect();
    let mut out = SmallVec::new();
    for _ in 0..k.min(pool.len()) {
        let idx = rng.random_range(0..pool.len());
        out.push(pool.swap_remove(idx));
    }
    out
}

/// Maps beat ticks to spawn commands through the choreography table. Owns
/// the run's seeded RNG, so two directors built with the same seed replay
/// the same choices.
pub struct Director {
    rules: Vec<ChoreographyRule>,
    templates: HazardTemplates,
    field: FieldSpec,
    grid: GridSpec,
    slots: SlotSpec,
    sec_per_beat: f32,
    rng: SmallRng,
}

impl Director {
    pub fn new(
        rules: Vec<ChoreographyRule>,
        templates: HazardTemplates,
        field: FieldSpec,
        grid: GridSpec,
        slots: SlotSpec,
        sec_per_beat: f32,
        seed: u64,
    ) -> Result<Self, DirectorError> {
        field.validate()?;
        grid.validate()?;
        slots.validate()?;
        // Trail parameters are structural; reject them up front rather than
        // skipping serpents one spawn at a time.
        if let Some(serpent) = &templates.serpent {
            Trail::new(serpent.trail_length, serpent.proxy_stride)?;
        }
        Ok(Self {
            rules,
            templates,
            field,
            grid,
            slots,
            sec_per_beat,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    /// Dispatches one beat: every matching rule fires, in table order, and
    /// the full command list is returned before the simulation moves on.
    /// `target` is the target actor's position captured at dispatch time, if
    /// one exists.
    pub fn on_beat(&mut self, tick: BeatTick, target: Option<Vec2>) -> Vec<SpawnCommand> {
        let matching: SmallVec<[Pattern; 4]> = self
            .rules
            .iter()
            .filter(|r| r.matches(tick.beat))
            .map(|r| r.pattern.clone())
            .collect();
        let mut out = Vec::new();
        for pattern in &matching {
            self.realize(pattern, target, &mut out);
        }
        out
    }

    /// Realizes one pattern into spawn commands. Also the entry point for
    /// off-table dispatches (the pre-song warm-up wave).
    pub fn realize(&mut self, pattern: &Pattern, target: Option<Vec2>, out: &mut Vec<SpawnCommand>) {
        match *pattern {
            Pattern::SideSquares { shoot } => {
                self.push_circle(out);
                let Some(square) = self.templates.square else {
                    debug!("no square template; skipping side squares");
                    return;
                };
                let per_side = self.slots.per_side;
                for side in 0..2u32 {
                    for local in sample_distinct(&mut self.rng, per_side, 2) {
                        self.push_slot_square(side * per_side + local, &square, shoot, out);
                    }
                }
            }
            Pattern::SlotSweep { left } => {
                self.push_circle(out);
                let Some(square) = self.templates.square else {
                    debug!("no square template; skipping slot sweep");
                    return;
                };
                let base = if left { 0 } else { self.slots.per_side };
                for local in 0..self.slots.per_side {
                    self.push_slot_square(base + local, &square, true, out);
                }
            }
            Pattern::RandomCircle => self.push_circle(out),
            Pattern::GridSquares { count } => {
                let Some(square) = self.templates.square else {
                    debug!("no square template; skipping grid squares");
                    return;
                };
                // Distinct linear cell indices, then divmod into (col, row).
                let cells = sample_distinct(&mut self.rng, self.grid.cell_count(), count as usize);
                for cell in cells {
                    let (col, row) = (cell % self.grid.cols, cell / self.grid.cols);
                    let anchor = grid_cell_center(col, row, &self.grid, &self.field);
                    // Fast paced: warn one beat, strike one beat, no volley.
                    let Some(timing) = self.timing(1.0, 1.0, square.fade_seconds) else {
                        return;
                    };
                    out.push(SpawnCommand::Hazard(HazardSpec {
                        form: HazardForm::Square { half_extent: square.half_extent },
                        anchor,
                        timing,
                        damage: square.damage,
                        volley: None,
                    }));
                }
            }
            Pattern::Rain => {
                let Some(bullet) = self.templates.bullet else {
                    debug!("no bullet template; skipping rain");
                    return;
                };
                // Jittered spacing between drops, scheduled rather than
                // awaited: the first drop lands on the beat, each later one
                // trails the previous by 0.05-0.1s.
                let mut delay = 0.0;
                for i in 0..bullet.rain_drops {
                    if i > 0 {
                        delay += self.rng.random_range(0.05..0.1);
                    }
                    let x = self.rng.random_range(0.0..self.field.width);
                    let spec = ProjectileSpec {
                        position: Vec2::new(x, -100.0),
                        direction: Vec2::Y,
                        speed: bullet.rain_speed,
                        gravity: bullet.rain_gravity,
                        damage: bullet.damage,
                        radius: bullet.radius,
                    };
                    out.push(if i == 0 {
                        SpawnCommand::Projectile(spec)
                    } else {
                        SpawnCommand::DelayedProjectile { delay, spec }
                    });
                }
            }
            Pattern::Serpent => {
                let Some(serpent) = self.templates.serpent else {
                    debug!("no serpent template; skipping serpent");
                    return;
                };
                let x = self
                    .rng
                    .random_range(serpent.margin_x..self.field.width - serpent.margin_x);
                let origin = Vec2::new(x, self.field.height + 20.0);
                let amplitude = if self.rng.random_bool(0.5) {
                    -serpent.amplitude
                } else {
                    serpent.amplitude
                };
                let form = match SerpentForm::new(
                    origin,
                    serpent.speed,
                    serpent.frequency,
                    amplitude,
                    serpent.radius,
                    serpent.trail_length,
                    serpent.proxy_stride,
                ) {
                    Ok(form) => form,
                    // Trail parameters were checked at construction.
                    Err(e) => {
                        debug!("serpent template rejected: {e}");
                        return;
                    }
                };
                let Some(timing) = self.timing(
                    serpent.telegraph_beats,
                    serpent.active_beats,
                    serpent.fade_seconds,
                ) else {
                    return;
                };
                out.push(SpawnCommand::Hazard(HazardSpec {
                    form: HazardForm::Serpent(form),
                    anchor: origin,
                    timing,
                    damage: serpent.damage,
                    volley: None,
                }));
            }
            Pattern::VerticalBeams { count } => {
                let Some(beam) = self.templates.vertical_beam else {
                    debug!("no vertical beam template; skipping beams");
                    return;
                };
                let Some(timing) =
                    self.timing(beam.telegraph_beats, beam.active_beats, beam.fade_seconds)
                else {
                    return;
                };
                // Evenly divided columns, each beam centered in its column,
                // anchored at the bottom edge.
                let column = self.field.width / count as f32;
                for i in 0..count {
                    out.push(SpawnCommand::Hazard(HazardSpec {
                        form: HazardForm::VerticalBeam { width: beam.width },
                        anchor: Vec2::new(i as f32 * column + column * 0.5, self.field.height),
                        timing,
                        damage: beam.damage,
                        volley: None,
                    }));
                }
            }
            Pattern::HorizontalBeam { from_right } => {
                let Some(beam) = self.templates.horizontal_beam else {
                    debug!("no horizontal beam template; skipping beam");
                    return;
                };
                let Some(timing) =
                    self.timing(beam.telegraph_beats, beam.active_beats, beam.fade_seconds)
                else {
                    return;
                };
                let y = self
                    .rng
                    .random_range(beam.margin_y..self.field.height - beam.margin_y);
                let x = if from_right { self.field.width } else { 0.0 };
                out.push(SpawnCommand::Hazard(HazardSpec {
                    form: HazardForm::HorizontalBeam { height: beam.height, from_right },
                    anchor: Vec2::new(x, y),
                    timing,
                    damage: beam.damage,
                    volley: None,
                }));
            }
            Pattern::CornerCone { top_right } => {
                let Some(beam) = self.templates.thin_beam else {
                    debug!("no thin beam template; skipping corner cone");
                    return;
                };
                let Some(timing) =
                    self.timing(beam.telegraph_beats, beam.active_beats, beam.fade_seconds)
                else {
                    return;
                };
                let corner =
                    if top_right { Vec2::new(self.field.width, 0.0) } else { Vec2::ZERO };
                let drift = self.rng.random_range(-beam.drift..beam.drift);
                let base = Vec2::from_angle(drift).rotate(self.field.center() - corner);
                for dir in cone_directions(base, beam.count, beam.total_spread) {
                    out.push(SpawnCommand::Hazard(HazardSpec {
                        form: HazardForm::ThinBeam {
                            length: beam.length,
                            thickness: beam.thickness,
                            angle: dir.to_angle(),
                        },
                        anchor: corner,
                        timing,
                        damage: beam.damage,
                        volley: None,
                    }));
                }
            }
            Pattern::AimedVolley => {
                let Some(bullet) = self.templates.bullet else {
                    debug!("no bullet template; skipping aimed volley");
                    return;
                };
                // The aim is captured once, here; bullets never re-aim.
                let Some(target) = target else {
                    debug!("no target to aim at; skipping aimed volley");
                    return;
                };
                for corner in [Vec2::ZERO, Vec2::new(self.field.width, 0.0)] {
                    let aim = target - corner;
                    for dir in cone_directions(aim, bullet.aimed_count, bullet.aimed_spread) {
                        out.push(SpawnCommand::Projectile(ProjectileSpec {
                            position: corner,
                            direction: dir,
                            speed: bullet.aimed_speed,
                            gravity: 0.0,
                            damage: bullet.damage,
                            radius: bullet.radius,
                        }));
                    }
                }
            }
        }
    }

    fn timing(&self, telegraph_beats: f32, active_beats: f32, fade_seconds: f32) -> Option<HazardTiming> {
        match HazardTiming::from_seconds(
            telegraph_beats * self.sec_per_beat,
            active_beats * self.sec_per_beat,
            fade_seconds,
        ) {
            Ok(timing) => Some(timing),
            Err(e) => {
                debug!("hazard timing rejected: {e}");
                None
            }
        }
    }

    fn push_circle(&mut self, out: &mut Vec<SpawnCommand>) {
        let Some(circle) = self.templates.circle else {
            debug!("no circle template; skipping circle");
            return;
        };
        let Some(timing) =
            self.timing(circle.telegraph_beats, circle.active_beats, circle.fade_seconds)
        else {
            return;
        };
        let x = self.rng.random_range(circle.margin.x..self.field.width - circle.margin.x);
        let y = self.rng.random_range(circle.margin.y..self.field.height - circle.margin.y);
        out.push(SpawnCommand::Hazard(HazardSpec {
            form: HazardForm::Circle { radius: circle.radius },
            anchor: Vec2::new(x, y),
            timing,
            damage: circle.damage,
            volley: None,
        }));
    }

    fn push_slot_square(
        &mut self,
        slot: u32,
        square: &SquareTemplate,
        shoot: bool,
        out: &mut Vec<SpawnCommand>,
    ) {
        let (anchor, facing) = slot_anchor(slot, &self.slots, &self.field);
        let Some(timing) =
            self.timing(square.telegraph_beats, square.active_beats, square.fade_seconds)
        else {
            return;
        };
        let volley = match (shoot, self.templates.bullet) {
            (true, Some(bullet)) => Some(VolleySpec {
                count: bullet.volley_count,
                total_spread: bullet.volley_spread,
                direction: facing,
                speed: bullet.volley_speed,
                muzzle_offset: bullet.muzzle_offset,
                damage: bullet.damage,
                projectile_radius: bullet.radius,
            }),
            (true, None) => {
                debug!("no bullet template; slot {slot} spawns without a volley");
                None
            }
            (false, _) => None,
        };
        out.push(SpawnCommand::Hazard(HazardSpec {
            form: HazardForm::Square { half_extent: square.half_extent },
            anchor,
            timing,
            damage: square.damage,
            volley,
        }));
    }
}
