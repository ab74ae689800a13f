//! Contact trace replay.
//!
//! Loads a JSON trace describing objects, bodies, subscriptions and a list
//! of ticks, and plays it through a [`CollisionRouter`]. Every callback the
//! router fires becomes one output line. Used by the `contactrouter` binary
//! to inspect routing behavior without a physics engine attached.
//!
//! # Trace format
//!
//! ```json
//! {
//!   "objects": ["player", "coin", "enemy"],
//!   "bodies": [
//!     { "id": 1, "owner": "player" },
//!     { "id": 2, "parent": 1 },
//!     { "id": 3, "owner": "coin" },
//!     { "id": 9 }
//!   ],
//!   "subscriptions": [
//!     { "name": "pickup", "a": "player", "b": ["coin"], "phases": ["start"] },
//!     { "name": "ground", "a": "player", "b": "*" }
//!   ],
//!   "ticks": [
//!     { "started": [[3, 1], [1, 9]] },
//!     { "active": [[1, 9]], "destroyed": [3] },
//!     { "ended": [[9, 1]], "cancel": ["ground"] }
//!   ]
//! }
//! ```
//!
//! An interest is an object name, a list of names, or `"*"` for anything.
//! `b` defaults to `"*"`. `phases` defaults to all three.

use std::path::Path;
use std::sync::{Arc, Mutex};

use bevy_ecs::prelude::*;
use log::info;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::components::body::{BodyId, BodyPair};
use crate::components::collision::Subscription;
use crate::components::interest::Interest;
use crate::events::collision::{CallbackFailure, ContactEvent, ContactPhase, ContactSide};
use crate::events::contactreport::RawContactReport;
use crate::resources::collisionrouter::{CollisionRouter, ContactContext, TickStats};
use crate::resources::routerconfig::RouterConfig;
use crate::resources::subscriptions::SubscriptionId;

const WILDCARD: &str = "*";

/// Name tag for entities spawned from trace objects.
#[derive(Component, Debug, Clone)]
pub struct ObjectName(pub String);

#[derive(Debug, Clone, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default)]
    pub bodies: Vec<TraceBody>,
    #[serde(default)]
    pub subscriptions: Vec<TraceSubscription>,
    #[serde(default)]
    pub ticks: Vec<TraceTick>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceBody {
    pub id: BodyId,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub parent: Option<BodyId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TraceInterest {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracePhase {
    Start,
    Active,
    End,
}

fn all_phases() -> Vec<TracePhase> {
    vec![TracePhase::Start, TracePhase::Active, TracePhase::End]
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceSubscription {
    pub name: String,
    pub a: TraceInterest,
    #[serde(default)]
    pub b: Option<TraceInterest>,
    #[serde(default = "all_phases")]
    pub phases: Vec<TracePhase>,
    /// Phases whose callback reports an error instead of succeeding.
    #[serde(default)]
    pub fail_on: Vec<TracePhase>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraceTick {
    #[serde(flatten)]
    pub report: RawContactReport,
    /// Bodies created before this tick is dispatched.
    #[serde(default)]
    pub created: Vec<TraceBody>,
    /// Bodies destroyed before this tick is dispatched.
    #[serde(default)]
    pub destroyed: Vec<BodyId>,
    /// Subscriptions cancelled before this tick is dispatched.
    #[serde(default)]
    pub cancel: Vec<String>,
}

/// Everything a replay produced.
#[derive(Debug, Default)]
pub struct ReplayOutput {
    pub lines: Vec<String>,
    pub stats: Vec<TickStats>,
    pub failures: Vec<CallbackFailure>,
}

/// Read and parse a trace file.
pub fn load_trace(path: impl AsRef<Path>) -> Result<Trace, String> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read trace {:?}: {}", path, e))?;
    parse_trace(&text)
}

pub fn parse_trace(text: &str) -> Result<Trace, String> {
    serde_json::from_str(text).map_err(|e| format!("Failed to parse trace: {}", e))
}

type EventLog = Arc<Mutex<Vec<(String, ContactEvent)>>>;

/// Trace player. Owns the router and a world holding one entity per object.
pub struct Replay {
    world: World,
    router: CollisionRouter,
    objects: FxHashMap<String, Entity>,
    subscriptions: FxHashMap<String, SubscriptionId>,
    events: EventLog,
    rng: Option<fastrand::Rng>,
}

impl Replay {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            world: World::new(),
            router: CollisionRouter::with_config(config),
            objects: FxHashMap::default(),
            subscriptions: FxHashMap::default(),
            events: Arc::new(Mutex::new(Vec::new())),
            rng: None,
        }
    }

    /// Shuffle pair order and orientation inside every tick with a seeded RNG.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.rng = Some(fastrand::Rng::with_seed(seed));
        self
    }

    pub fn router(&self) -> &CollisionRouter {
        &self.router
    }

    /// Play the whole trace.
    pub fn run(&mut self, trace: &Trace) -> Result<ReplayOutput, String> {
        for name in &trace.objects {
            let entity = self.world.spawn(ObjectName(name.clone())).id();
            self.objects.insert(name.clone(), entity);
        }
        for body in &trace.bodies {
            self.create_body(body)?;
        }
        for sub in &trace.subscriptions {
            self.subscribe(sub)?;
        }
        info!(
            target: "contacts",
            "Replaying {} tick(s): {} object(s), {} bod(ies), {} subscription(s)",
            trace.ticks.len(),
            trace.objects.len(),
            trace.bodies.len(),
            trace.subscriptions.len()
        );

        let mut output = ReplayOutput::default();
        for tick in &trace.ticks {
            self.step(tick, &mut output)?;
        }
        output.failures = self.router.take_failures();
        Ok(output)
    }

    fn step(&mut self, tick: &TraceTick, output: &mut ReplayOutput) -> Result<(), String> {
        for body in &tick.created {
            self.create_body(body)?;
        }
        for name in &tick.cancel {
            let id = self
                .subscriptions
                .get(name)
                .ok_or_else(|| format!("Unknown subscription '{}'", name))?;
            self.router.cancel(*id);
        }
        for body in &tick.destroyed {
            self.router.destroy_body(*body);
        }

        let report = match self.rng.as_mut() {
            Some(rng) => shuffled(&tick.report, rng),
            None => tick.report.clone(),
        };
        let stats = self.router.dispatch(&report);

        // ends synthesized by destruction come first, stamped with the previous tick
        for (name, event) in self.drain_events() {
            output.lines.push(self.describe(&name, &event));
        }
        output.stats.push(stats);
        Ok(())
    }

    fn create_body(&mut self, body: &TraceBody) -> Result<(), String> {
        let owner = match &body.owner {
            Some(name) => Some(self.object(name)?),
            None => None,
        };
        self.router.register_body(body.id, owner, body.parent);
        Ok(())
    }

    fn subscribe(&mut self, sub: &TraceSubscription) -> Result<(), String> {
        let interest_a = self.interest(&sub.a)?;
        let interest_b = match &sub.b {
            Some(b) => self.interest(b)?,
            None => Interest::Wildcard,
        };

        let mut subscription = Subscription::new(interest_a).against(interest_b);
        for phase in &sub.phases {
            let events = self.events.clone();
            let name = sub.name.clone();
            let fails = sub.fail_on.contains(phase);
            let callback = move |event: &ContactEvent, _: &mut ContactContext| -> Result<(), String> {
                events
                    .lock()
                    .map_err(|e| e.to_string())?
                    .push((name.clone(), *event));
                if fails {
                    Err(format!("{} refused {}", name, event.phase))
                } else {
                    Ok(())
                }
            };
            subscription = match phase {
                TracePhase::Start => subscription.on_start(callback),
                TracePhase::Active => subscription.on_active(callback),
                TracePhase::End => subscription.on_end(callback),
            };
        }

        let id = self.router.subscribe(subscription);
        self.subscriptions.insert(sub.name.clone(), id);
        Ok(())
    }

    fn object(&self, name: &str) -> Result<Entity, String> {
        self.objects
            .get(name)
            .copied()
            .ok_or_else(|| format!("Unknown object '{}'", name))
    }

    fn interest(&self, spec: &TraceInterest) -> Result<Interest, String> {
        match spec {
            TraceInterest::One(name) if name == WILDCARD => Ok(Interest::Wildcard),
            TraceInterest::One(name) => Ok(Interest::Single(self.object(name)?)),
            TraceInterest::Many(names) => {
                let entities = names
                    .iter()
                    .map(|n| self.object(n))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Interest::set(entities))
            }
        }
    }

    fn drain_events(&mut self) -> Vec<(String, ContactEvent)> {
        match self.events.lock() {
            Ok(mut events) => events.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        }
    }

    fn describe(&self, name: &str, event: &ContactEvent) -> String {
        format!(
            "tick {}: {} {} {} <-> {}",
            event.tick,
            name,
            phase_label(event.phase),
            self.side_label(&event.a),
            self.side_label(&event.b)
        )
    }

    fn side_label(&self, side: &ContactSide) -> String {
        let owner = side
            .owner
            .and_then(|e| self.world.get::<ObjectName>(e))
            .map(|n| n.0.as_str());
        match (owner, side.is_child_part()) {
            (Some(name), false) => format!("{}[{}]", name, side.body),
            (Some(name), true) => format!("{}[{} of {}]", name, side.body, side.root),
            (None, _) => side.body.to_string(),
        }
    }
}

fn phase_label(phase: ContactPhase) -> &'static str {
    match phase {
        ContactPhase::Start => "start ",
        ContactPhase::Active => "active",
        ContactPhase::End => "end   ",
    }
}

fn shuffled(report: &RawContactReport, rng: &mut fastrand::Rng) -> RawContactReport {
    let mut shuffle = |pairs: &[BodyPair]| {
        let mut pairs: Vec<BodyPair> = pairs
            .iter()
            .map(|p| if rng.bool() { p.flipped() } else { *p })
            .collect();
        rng.shuffle(&mut pairs);
        pairs
    };
    RawContactReport {
        started: shuffle(&report.started),
        active: shuffle(&report.active),
        ended: shuffle(&report.ended),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = r#"{
        "objects": ["player", "coin", "enemy"],
        "bodies": [
            { "id": 1, "owner": "player" },
            { "id": 2, "parent": 1 },
            { "id": 3, "owner": "coin" },
            { "id": 4, "owner": "enemy" }
        ],
        "subscriptions": [
            { "name": "pickup", "a": "player", "b": ["coin"], "phases": ["start"] },
            { "name": "touch", "a": "player", "b": "*" }
        ],
        "ticks": [
            { "started": [[3, 2], [9, 1]] },
            { "active": [[1, 9]], "destroyed": [3] },
            { "ended": [[9, 1]], "cancel": ["touch"] }
        ]
    }"#;

    fn run(shuffle: Option<u64>) -> ReplayOutput {
        let trace = parse_trace(TRACE).unwrap();
        let mut replay = Replay::new(RouterConfig::new());
        if let Some(seed) = shuffle {
            replay = replay.with_shuffle(seed);
        }
        replay.run(&trace).unwrap()
    }

    #[test]
    fn test_replay_lines() {
        let output = run(None);
        assert_eq!(
            output.lines,
            vec![
                "tick 1: pickup start  player[body#2 of body#1] <-> coin[body#3]",
                "tick 1: touch start  player[body#2 of body#1] <-> coin[body#3]",
                "tick 1: touch start  player[body#1] <-> body#9",
                "tick 1: touch end    player[body#2 of body#1] <-> coin[body#3]",
                "tick 2: touch active player[body#1] <-> body#9",
            ]
        );
        assert_eq!(output.stats.len(), 3);
        assert!(output.failures.is_empty());
    }

    #[test]
    fn test_shuffle_does_not_change_canonical_sides() {
        let plain = run(None);
        for seed in 0..8 {
            let mut shuffled = run(Some(seed)).lines;
            let mut expected = plain.lines.clone();
            shuffled.sort();
            expected.sort();
            assert_eq!(shuffled, expected, "seed {}", seed);
        }
    }

    #[test]
    fn test_failing_phase_is_reported() {
        let trace = parse_trace(
            r#"{
                "objects": ["a"],
                "bodies": [{ "id": 1, "owner": "a" }],
                "subscriptions": [{ "name": "s", "a": "a", "fail_on": ["start"] }],
                "ticks": [{ "started": [[1, 2]] }]
            }"#,
        )
        .unwrap();
        let output = Replay::new(RouterConfig::new()).run(&trace).unwrap();
        assert_eq!(output.lines.len(), 1);
        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].message, "s refused start");
    }

    #[test]
    fn test_unknown_object_is_error() {
        let trace = parse_trace(
            r#"{ "objects": [], "bodies": [{ "id": 1, "owner": "ghost" }] }"#,
        )
        .unwrap();
        let err = Replay::new(RouterConfig::new()).run(&trace).unwrap_err();
        assert!(err.contains("ghost"));
    }

    #[test]
    fn test_unknown_subscription_is_error() {
        let trace = parse_trace(r#"{ "ticks": [{ "cancel": ["nope"] }] }"#).unwrap();
        assert!(Replay::new(RouterConfig::new()).run(&trace).is_err());
    }

    #[test]
    fn test_bad_json_is_error() {
        assert!(parse_trace("{ not json").is_err());
    }
}
