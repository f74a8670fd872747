use crate::game::geometry::FieldSpec;
use glam::Vec2;

/// Hard lifetime cap; a projectile that never hits anything still despawns.
const MAX_LIFETIME: f32 = 10.0;
/// How far outside the field a projectile may travel before it is culled.
/// Rain drops spawn above the top edge and must survive until they enter.
const CULL_MARGIN: f32 = 200.0;

/// Everything needed to launch one projectile. Unlike hazards, projectiles
/// carry no telegraph: they are live from the moment they spawn, damage on
/// contact and then despawn.
#[derive(Clone, Copy, Debug)]
pub struct ProjectileSpec {
    pub position: Vec2,
    pub direction: Vec2,
    pub speed: f32,
    /// Downward acceleration; zero for straight-line bullets.
    pub gravity: f32,
    pub damage: i32,
    pub radius: f32,
}

#[derive(Clone, Copy, Debug)]
struct Projectile {
    position: Vec2,
    velocity: Vec2,
    gravity: f32,
    damage: i32,
    radius: f32,
    age: f32,
}

impl Projectile {
    fn from_spec(spec: &ProjectileSpec) -> Self {
        Self {
            position: spec.position,
            velocity: spec.direction.normalize_or_zero() * spec.speed,
            gravity: spec.gravity,
            damage: spec.damage,
            radius: spec.radius,
            age: 0.0,
        }
    }

    /// Gravity projectiles face their travel direction (rain tilts as it
    /// accelerates); straight bullets keep their launch heading.
    fn orientation(&self) -> f32 {
        self.velocity.to_angle()
    }
}

/// Owns every live projectile. Projectiles never interact with each other or
/// with hazards; they only integrate, expire and test against the target.
#[derive(Default)]
pub struct ProjectileEngine {
    projectiles: Vec<Projectile>,
}

impl ProjectileEngine {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.projectiles.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.projectiles.is_empty()
    }

    /// Launches a projectile and returns its initial orientation for the
    /// spawn event.
    pub fn spawn(&mut self, spec: &ProjectileSpec) -> f32 {
        let projectile = Projectile::from_spec(spec);
        let orientation = projectile.orientation();
        self.projectiles.push(projectile);
        orientation
    }

    /// Advances motion and drops projectiles that aged out or left the
    /// field (plus margin).
    pub fn integrate(&mut self, dt: f32, field: &FieldSpec) {
        for p in &mut self.projectiles {
            if p.gravity > 0.0 {
                p.velocity.y += p.gravity * dt;
            }
            p.position += p.velocity * dt;
            p.age += dt;
        }
        self.projectiles.retain(|p| {
            p.age <= MAX_LIFETIME
                && p.position.x > -CULL_MARGIN
                && p.position.x < field.width + CULL_MARGIN
                && p.position.y > -CULL_MARGIN
                && p.position.y < field.height + CULL_MARGIN
        });
    }

    /// Tests every projectile against the target circle. A hit reports its
    /// damage and removes the projectile, so one projectile can only ever
    /// deal damage once.
    pub fn collide_target(&mut self, center: Vec2, radius: f32, mut on_hit: impl FnMut(i32)) {
        self.projectiles.retain(|p| {
            let hit =
                p.position.distance_squared(center) <= (p.radius + radius) * (p.radius + radius);
            if hit {
                on_hit(p.damage);
            }
            !hit
        });
    }

    /// Current positions and orientations, newest last. Renderers poll this
    /// per frame instead of receiving per-projectile move events.
    pub fn snapshot(&self) -> impl Iterator<Item = (Vec2, f32)> + '_ {
        self.projectiles.iter().map(|p| (p.position, p.orientation()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight(position: Vec2, direction: Vec2, speed: f32) -> ProjectileSpec {
        ProjectileSpec { position, direction, speed, gravity: 0.0, damage: 1, radius: 8.0 }
    }

    #[test]
    fn straight_bullets_hold_their_launch_velocity() {
        let mut engine = ProjectileEngine::new();
        engine.spawn(&straight(Vec2::new(100.0, 500.0), Vec2::X, 400.0));
        let field = FieldSpec::default();
        for _ in 0..60 {
            engine.integrate(1.0 / 60.0, &field);
        }
        let (pos, orientation) = engine.snapshot().next().expect("bullet alive");
        assert!((pos.x - 500.0).abs() < 1e-2);
        assert!((pos.y - 500.0).abs() < 1e-4);
        assert!(orientation.abs() < 1e-6, "no gravity, heading unchanged");
    }

    #[test]
    fn gravity_accelerates_and_tilts_rain() {
        let mut engine = ProjectileEngine::new();
        engine.spawn(&ProjectileSpec {
            position: Vec2::new(960.0, -100.0),
            direction: Vec2::Y,
            speed: 100.0,
            gravity: 1200.0,
            damage: 1,
            radius: 8.0,
        });
        let field = FieldSpec::default();
        let dt = 1.0 / 60.0;
        engine.integrate(dt, &field);
        let (_, o1) = engine.snapshot().next().expect("drop alive");
        for _ in 0..30 {
            engine.integrate(dt, &field);
        }
        let (pos, o2) = engine.snapshot().next().expect("drop alive");
        // Slow start plus high gravity: it has fallen well past the constant-
        // speed distance but still faces straight down the whole way.
        assert!(pos.y > -100.0 + 100.0 * 31.0 * dt);
        assert!((o1 - std::f32::consts::FRAC_PI_2).abs() < 1e-4);
        assert!((o2 - std::f32::consts::FRAC_PI_2).abs() < 1e-4);
    }

    #[test]
    fn projectiles_expire_at_the_lifetime_cap() {
        let mut engine = ProjectileEngine::new();
        // Slow enough to stay in bounds for the whole cap.
        engine.spawn(&straight(Vec2::new(960.0, 540.0), Vec2::X, 10.0));
        let field = FieldSpec::default();
        engine.integrate(9.9, &field);
        assert_eq!(engine.len(), 1);
        engine.integrate(0.2, &field);
        assert!(engine.is_empty(), "10s cap must cull the projectile");
    }

    #[test]
    fn out_of_bounds_projectiles_are_culled() {
        let mut engine = ProjectileEngine::new();
        engine.spawn(&straight(Vec2::new(1900.0, 540.0), Vec2::X, 1000.0));
        let field = FieldSpec::default();
        engine.integrate(0.1, &field);
        assert_eq!(engine.len(), 1, "inside the cull margin");
        engine.integrate(0.2, &field);
        assert!(engine.is_empty());
    }

    #[test]
    fn contact_damage_fires_once_and_removes_the_projectile() {
        let mut engine = ProjectileEngine::new();
        engine.spawn(&straight(Vec2::new(500.0, 500.0), Vec2::X, 0.0));
        let mut total = 0;
        engine.collide_target(Vec2::new(505.0, 500.0), 10.0, |dmg| total += dmg);
        assert_eq!(total, 1);
        assert!(engine.is_empty(), "hit projectiles despawn");
        engine.collide_target(Vec2::new(505.0, 500.0), 10.0, |dmg| total += dmg);
        assert_eq!(total, 1, "nothing left to hit");
    }

    #[test]
    fn misses_leave_the_projectile_alive() {
        let mut engine = ProjectileEngine::new();
        engine.spawn(&straight(Vec2::new(500.0, 500.0), Vec2::X, 0.0));
        let mut hits = 0;
        engine.collide_target(Vec2::new(900.0, 500.0), 10.0, |_| hits += 1);
        assert_eq!(hits, 0);
        assert_eq!(engine.len(), 1);
    }
}
