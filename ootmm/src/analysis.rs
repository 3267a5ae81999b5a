use std::collections::BTreeSet;

use anyhow::{bail, ensure, Result};
use hashbrown::{HashMap, HashSet};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use ootmm_game::{Area, World, WorldId};

use crate::settings::{BossSetting, Settings};
use crate::traverse::{
    events_goal, Goal, ItemPlacement, Location, Pathfinder, PathfinderOptions, PathfinderState,
};

/// Goal of a run: every world has obtained every goal event.
pub fn settings_goal(worlds: &[World], settings: &Settings) -> Result<Goal> {
    ensure!(!settings.goal_events.is_empty(), "No goal events configured");
    let mut events = vec![];
    for (world_id, world) in worlds.iter().enumerate() {
        for name in &settings.goal_events {
            match world.event_id(name) {
                Some(event_id) => events.push((world_id, event_id)),
                None => bail!("Unknown goal event {name} in world {world_id}"),
            }
        }
    }
    Ok(events_goal(events))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AnalysisPathKind {
    Woth,
    Boss { boss: String, world: WorldId },
    EndBoss { boss: String, world: WorldId },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisPath {
    pub key: String,
    pub kind: AnalysisPathKind,
    pub locations: BTreeSet<Location>,
}

#[derive(Clone, Debug)]
pub struct Analysis {
    pub spheres: Vec<Vec<Location>>,
    pub required: BTreeSet<Location>,
    pub unreachable: BTreeSet<Location>,
    pub paths: Vec<AnalysisPath>,
}

type Predicate = Box<dyn Fn(&PathfinderState) -> bool + Send + Sync>;

struct PathState {
    key: String,
    kind: AnalysisPathKind,
    blocked: Option<PathfinderState>, // Run with this path's target removed
    pred: Predicate,
    locks: Vec<String>,
    locations: BTreeSet<Location>,
}

struct AnalysisContext<'a> {
    pathfinder: &'a Pathfinder,
    items: &'a ItemPlacement,
}

impl<'a> AnalysisContext<'a> {
    fn options(&self, forbidden: Option<Location>, stop_at_goal: bool) -> PathfinderOptions<'a> {
        PathfinderOptions {
            items: Some(self.items),
            recursive: true,
            forbidden_locations: forbidden.into_iter().collect::<HashSet<Location>>(),
            stop_at_goal,
            ..Default::default()
        }
    }

    fn playthrough(&self) -> Result<PathfinderState> {
        let state = self.pathfinder.run(None, &self.options(None, true))?;
        if !state.goal {
            bail!("Seed is not beatable");
        }
        Ok(state)
    }

    // Re-solve with each candidate location forbidden in turn. Locations whose
    // run fails are logged and left out.
    fn sweep(&self, candidates: &[Location]) -> Vec<(Location, PathfinderState)> {
        candidates
            .par_iter()
            .filter_map(|&loc| {
                match self.pathfinder.run(None, &self.options(Some(loc), true)) {
                    Ok(state) => Some((loc, state)),
                    Err(e) => {
                        warn!("Unable to analyze location {loc:?}: {e}");
                        None
                    }
                }
            })
            .collect()
    }

    fn unreachable(&self) -> Result<BTreeSet<Location>> {
        let state = self.pathfinder.run(None, &self.options(None, false))?;
        let mut unreachable = BTreeSet::new();
        for (world_id, world) in self.pathfinder.worlds().iter().enumerate() {
            for check_id in 0..world.checks().len() {
                let loc = Location::new(world_id, check_id);
                if !state.is_reached(loc) {
                    unreachable.insert(loc);
                }
            }
        }
        Ok(unreachable)
    }

    // Solve again with one area of one world modified. None if the world has
    // no such area.
    fn blocked_state<F: FnOnce(&mut Area)>(
        &self,
        world_id: WorldId,
        area_name: &str,
        f: F,
    ) -> Result<Option<PathfinderState>> {
        let world = &self.pathfinder.worlds()[world_id];
        let area_id = match world.area_id(area_name) {
            Some(area_id) => area_id,
            None => return Ok(None),
        };
        let pathfinder = self
            .pathfinder
            .with_world(world_id, world.with_area(area_id, f));
        let state = pathfinder.run(None, &self.options(None, true))?;
        Ok(Some(state))
    }

    fn boss_states(&self, bosses: &[BossSetting], end_boss: bool) -> Result<Vec<PathState>> {
        let mut states = vec![];
        for boss in bosses {
            for world_id in 0..self.pathfinder.worlds().len() {
                let event_id = match self.pathfinder.worlds()[world_id].event_id(&boss.event) {
                    Some(event_id) => event_id,
                    None => {
                        debug!("Boss event {} not found in world {world_id}", boss.event);
                        continue;
                    }
                };
                let blocked = if end_boss {
                    self.blocked_state(world_id, &boss.area, |area| area.events.clear())?
                } else {
                    self.blocked_state(world_id, &boss.area, |area| area.exits.clear())?
                };
                let blocked = match blocked {
                    Some(state) if !state.goal => state,
                    _ => continue,
                };
                // The boss is required for this player:
                let (key, kind) = if end_boss {
                    (
                        format!("end-boss.{}.{}", boss.name, world_id),
                        AnalysisPathKind::EndBoss {
                            boss: boss.name.clone(),
                            world: world_id,
                        },
                    )
                } else {
                    (
                        format!("boss.{}.{}", boss.name, world_id),
                        AnalysisPathKind::Boss {
                            boss: boss.name.clone(),
                            world: world_id,
                        },
                    )
                };
                states.push(PathState {
                    key,
                    kind,
                    blocked: Some(blocked),
                    pred: Box::new(move |s: &PathfinderState| s.has_event(world_id, event_id)),
                    locks: vec![],
                    locations: BTreeSet::new(),
                });
            }
        }
        Ok(states)
    }
}

// For each path, find the other paths whose predicate fails in its blocked
// state; those locked paths lose the locations of the path locking them.
fn resolve_locks(states: &mut [PathState]) {
    for i in 0..states.len() {
        let blocked = match &states[i].blocked {
            Some(blocked) => blocked,
            None => continue,
        };
        let mut locks = vec![];
        for (j, other) in states.iter().enumerate() {
            if i != j && !(other.pred)(blocked) {
                locks.push(other.key.clone());
            }
        }
        states[i].locks = locks;
    }

    let raw_locations: Vec<BTreeSet<Location>> =
        states.iter().map(|s| s.locations.clone()).collect();
    let index_by_key: HashMap<String, usize> = states
        .iter()
        .enumerate()
        .map(|(i, s)| (s.key.clone(), i))
        .collect();
    for i in 0..states.len() {
        for lock in states[i].locks.clone() {
            let j = index_by_key[&lock];
            for loc in &raw_locations[i] {
                states[j].locations.remove(loc);
            }
        }
    }
}

impl Analysis {
    pub fn run(pathfinder: &Pathfinder, items: &ItemPlacement, settings: &Settings) -> Result<Analysis> {
        let cx = AnalysisContext { pathfinder, items };

        let playthrough = cx.playthrough()?;
        info!("Playthrough: {} spheres", playthrough.spheres.len());

        let candidates: Vec<Location> = playthrough.spheres.iter().flatten().copied().collect();
        let sweep = cx.sweep(&candidates);
        let required_states: Vec<(Location, PathfinderState)> =
            sweep.into_iter().filter(|(_, state)| !state.goal).collect();
        let required: BTreeSet<Location> = required_states.iter().map(|(loc, _)| *loc).collect();
        info!("Required locations: {}", required.len());

        let unreachable = cx.unreachable()?;

        let mut states: Vec<PathState> = vec![PathState {
            key: "woth".to_string(),
            kind: AnalysisPathKind::Woth,
            blocked: None,
            pred: Box::new(|s: &PathfinderState| s.goal),
            locks: vec![],
            locations: required.clone(),
        }];
        if settings.hint_path_boss {
            states.extend(cx.boss_states(&settings.bosses, false)?);
        }
        if settings.hint_path_end_boss {
            states.extend(cx.boss_states(&settings.end_bosses, true)?);
        }
        for state in states.iter_mut().skip(1) {
            state.locations = required_states
                .iter()
                .filter(|(_, s)| !(state.pred)(s))
                .map(|(loc, _)| *loc)
                .collect();
        }
        resolve_locks(&mut states);

        let paths: Vec<AnalysisPath> = states
            .into_iter()
            .filter(|s| !s.locations.is_empty())
            .map(|s| AnalysisPath {
                key: s.key,
                kind: s.kind,
                locations: s.locations,
            })
            .collect();
        info!("Paths: {}", paths.len());

        Ok(Analysis {
            spheres: playthrough.spheres,
            required,
            unreachable,
            paths,
        })
    }
}
