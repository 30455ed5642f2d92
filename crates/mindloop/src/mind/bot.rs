//! # Bot Mind
//!
//! Idle / wander / watch state machine, plus walking to a commanded point.
//!
//! - **Idle**: stand still for a random 2-5 s, then pick a wander point.
//! - **Wander**: walk to a random point within 5 units of home.
//! - **Watch**: the observer came within 10 units; turn to face it.
//!   Entering this state barks an alert.
//! - **Commanded**: a command ticket set a destination; walk there and
//!   report arrival.

use mindloop_core::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{Intent, Mind, MindContext, MindError};
use crate::world::{EffectKind, Entity, EntityId};

/// Walking speed, units per second.
pub const BOT_MOVE_SPEED: f32 = 2.0;

/// Observer detection range.
pub const BOT_DETECTION_RANGE: f32 = 10.0;

/// Wander radius around home.
pub const BOT_WANDER_RADIUS: f32 = 5.0;

/// Shortest idle, seconds.
pub const BOT_IDLE_MIN: f32 = 2.0;

/// Longest idle, seconds.
pub const BOT_IDLE_MAX: f32 = 5.0;

/// Turn rate while watching, degrees per second.
pub const BOT_TURN_RATE: f32 = 180.0;

/// Distance at which a destination counts as reached.
const ARRIVE_DISTANCE: f32 = 0.5;

/// Behavior states.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BotState {
    /// Standing still.
    Idle {
        /// Seconds left.
        remaining: f32,
    },
    /// Walking to a random point.
    Wander {
        /// Destination.
        target: Vec3,
    },
    /// Facing the observer.
    Watch,
    /// Walking to a commanded point.
    Commanded {
        /// Destination.
        target: Vec3,
    },
}

/// Default mind for [`EntityKind::Bot`](crate::world::EntityKind::Bot).
#[derive(Debug, Clone)]
pub struct BotMind {
    state: BotState,
    home: Vec3,
    rng: ChaCha8Rng,
}

impl BotMind {
    /// Current state.
    #[must_use]
    pub const fn state(&self) -> BotState {
        self.state
    }

    /// Spawn point that wandering stays around.
    #[must_use]
    pub const fn home(&self) -> Vec3 {
        self.home
    }

    fn idle_time(&mut self) -> f32 {
        self.rng.gen_range(BOT_IDLE_MIN..BOT_IDLE_MAX)
    }

    fn wander_target(&mut self, y: f32) -> Vec3 {
        let angle = self.rng.gen::<f32>() * std::f32::consts::TAU;
        let radius = self.rng.gen::<f32>() * BOT_WANDER_RADIUS;
        Vec3::new(self.home.x + angle.cos() * radius, y, self.home.z + angle.sin() * radius)
    }
}

fn yaw_towards(from: Vec3, to: Vec3) -> f32 {
    (to.x - from.x).atan2(to.z - from.z).to_degrees()
}

fn turn_towards(current: f32, target: f32, max_step: f32) -> f32 {
    let mut diff = target - current;
    while diff > 180.0 {
        diff -= 360.0;
    }
    while diff < -180.0 {
        diff += 360.0;
    }
    if diff.abs() <= max_step {
        target
    } else {
        current + diff.signum() * max_step
    }
}

fn walk(body: &Entity, target: Vec3) -> Option<Intent> {
    let dist = body.position.planar_distance(target);
    if dist < ARRIVE_DISTANCE {
        return None;
    }
    let dir = Vec3::new(target.x - body.position.x, 0.0, target.z - body.position.z).normalize_or_zero();
    Some(Intent {
        velocity: dir * BOT_MOVE_SPEED,
        yaw: yaw_towards(body.position, target),
        ..Intent::default()
    })
}

impl Mind for BotMind {
    fn spawn(_entity: EntityId, body: &Entity, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let remaining = rng.gen_range(0.0..BOT_IDLE_MAX);
        Self { state: BotState::Idle { remaining }, home: body.position, rng }
    }

    fn update(&mut self, ctx: &MindContext<'_>, body: &Entity) -> Result<Intent, MindError> {
        let finite = body.position.to_array().iter().chain(body.velocity.to_array().iter()).all(|v| v.is_finite());
        if !finite || !body.yaw.is_finite() {
            return Err(MindError::NonFinite { entity: ctx.entity });
        }

        // Commands win over everything.
        if let Some(target) = body.move_target {
            self.state = BotState::Commanded { target };
        } else if let Some(observer) = ctx.observer {
            let dist = body.position.planar_distance(observer);
            if dist < BOT_DETECTION_RANGE && self.state != BotState::Watch {
                self.state = BotState::Watch;
                return Ok(Intent {
                    yaw: turn_towards(body.yaw, yaw_towards(body.position, observer), BOT_TURN_RATE * ctx.dt),
                    effect: Some(EffectKind::Alert),
                    ..Intent::default()
                });
            }
        }

        let intent = match self.state {
            BotState::Commanded { target } => match walk(body, target) {
                Some(intent) => intent,
                None => {
                    let remaining = self.idle_time();
                    self.state = BotState::Idle { remaining };
                    Intent { effect: Some(EffectKind::Arrive), clear_move_target: true, ..Intent::hold(body.yaw) }
                }
            },
            BotState::Watch => match ctx.observer {
                Some(observer) if body.position.planar_distance(observer) <= BOT_DETECTION_RANGE => {
                    let target_yaw = yaw_towards(body.position, observer);
                    Intent::hold(turn_towards(body.yaw, target_yaw, BOT_TURN_RATE * ctx.dt))
                }
                _ => {
                    let remaining = self.idle_time();
                    self.state = BotState::Idle { remaining };
                    Intent::hold(body.yaw)
                }
            },
            BotState::Idle { remaining } => {
                if remaining <= 0.0 {
                    let target = self.wander_target(body.position.y);
                    self.state = BotState::Wander { target };
                } else {
                    self.state = BotState::Idle { remaining: remaining - ctx.dt };
                }
                Intent::hold(body.yaw)
            }
            BotState::Wander { target } => match walk(body, target) {
                Some(intent) => intent,
                None => {
                    let remaining = self.idle_time();
                    self.state = BotState::Idle { remaining };
                    Intent::hold(body.yaw)
                }
            },
        };
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::world::{EntityKind, World};

    fn setup() -> (World, EntityId) {
        let mut world = World::new(&WorldConfig::default(), 0.1);
        let id = world.spawn(EntityKind::Bot, Vec3::ZERO).unwrap();
        (world, id)
    }

    fn ctx(world: &World, entity: EntityId, observer: Option<Vec3>) -> MindContext<'_> {
        MindContext { world, tick: 1, dt: 0.1, observer, entity }
    }

    #[test]
    fn test_same_seed_same_choices() {
        let (world, id) = setup();
        let body = world.get(id).unwrap().clone();
        let mut a = BotMind::spawn(id, &body, 42);
        let mut b = BotMind::spawn(id, &body, 42);
        for _ in 0..100 {
            let ia = a.update(&ctx(&world, id, None), &body).unwrap();
            let ib = b.update(&ctx(&world, id, None), &body).unwrap();
            assert_eq!(ia, ib);
        }
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn test_idle_turns_into_wander() {
        let (world, id) = setup();
        let body = world.get(id).unwrap().clone();
        let mut mind = BotMind::spawn(id, &body, 3);
        // Longest idle is 5 s = 50 ticks.
        let mut wandered = None;
        for _ in 0..60 {
            mind.update(&ctx(&world, id, None), &body).unwrap();
            if let BotState::Wander { target } = mind.state() {
                wandered = Some(target);
                break;
            }
        }
        let target = wandered.expect("bot never left idle");
        assert!(target.planar_distance(mind.home()) <= BOT_WANDER_RADIUS + 1e-3);
    }

    #[test]
    fn test_observer_triggers_single_alert() {
        let (world, id) = setup();
        let body = world.get(id).unwrap().clone();
        let mut mind = BotMind::spawn(id, &body, 1);
        let observer = Some(Vec3::new(3.0, 0.0, 0.0));

        let first = mind.update(&ctx(&world, id, observer), &body).unwrap();
        assert_eq!(first.effect, Some(EffectKind::Alert));
        assert_eq!(mind.state(), BotState::Watch);

        let second = mind.update(&ctx(&world, id, observer), &body).unwrap();
        assert_eq!(second.effect, None);
        assert_eq!(second.velocity, Vec3::ZERO);
        assert!(second.yaw > 0.0);

        mind.update(&ctx(&world, id, Some(Vec3::new(40.0, 0.0, 0.0))), &body).unwrap();
        assert!(matches!(mind.state(), BotState::Idle { .. }));
    }

    #[test]
    fn test_command_walks_then_arrives() {
        let (world, id) = setup();
        let mut body = world.get(id).unwrap().clone();
        let mut mind = BotMind::spawn(id, &body, 1);

        body.move_target = Some(Vec3::new(0.0, 0.0, 4.0));
        let walking = mind.update(&ctx(&world, id, None), &body).unwrap();
        assert!((walking.velocity.z - BOT_MOVE_SPEED).abs() < 1e-4);
        assert!(walking.yaw.abs() < 1e-4);

        body.position = Vec3::new(0.0, 0.0, 3.8);
        let arrived = mind.update(&ctx(&world, id, None), &body).unwrap();
        assert!(arrived.clear_move_target);
        assert_eq!(arrived.effect, Some(EffectKind::Arrive));
    }

    #[test]
    fn test_non_finite_body_fails() {
        let (world, id) = setup();
        let mut body = world.get(id).unwrap().clone();
        let mut mind = BotMind::spawn(id, &body, 1);
        body.position.x = f32::NAN;
        assert_eq!(mind.update(&ctx(&world, id, None), &body), Err(MindError::NonFinite { entity: id }));
    }

    #[test]
    fn test_turn_wraps_short_way() {
        assert_eq!(turn_towards(170.0, -170.0, 30.0), -170.0);
        assert_eq!(turn_towards(170.0, -170.0, 5.0), 175.0);
    }
}
