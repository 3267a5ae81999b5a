use std::collections::BTreeMap;

use hashbrown::HashSet;
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use ootmm_game::{GossipId, LogicError, PointOfInterest, PointOfInterestKind, WorldId};

use crate::traverse::{ItemPlacement, Location, Pathfinder, PathfinderOptions};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Hint {
    Hero { location: Location },
    ItemExact { locations: Vec<Location> },
    Foolish { region: String },
}

/// Hint placement bookkeeping shared across calls.
#[derive(Clone, Debug, Default)]
pub struct HintContext {
    pub hinted_locations: HashSet<Location>,
    pub gossips: Vec<BTreeMap<GossipId, Hint>>, // Indexed by world
}

impl HintContext {
    pub fn new(players: usize) -> Self {
        HintContext {
            hinted_locations: HashSet::new(),
            gossips: vec![BTreeMap::new(); players],
        }
    }

    pub fn is_assigned(&self, world: WorldId, gossip: GossipId) -> bool {
        self.gossips
            .get(world)
            .map(|g| g.contains_key(&gossip))
            .unwrap_or(false)
    }

    pub fn assign(&mut self, world: WorldId, gossip: GossipId, hint: Hint) {
        if world >= self.gossips.len() {
            self.gossips.resize(world + 1, BTreeMap::new());
        }
        self.gossips[world].insert(gossip, hint);
    }
}

/// Stones placed in the overworld or in grottos; moon stones are chosen separately.
pub fn is_regular_gossip(poi: &PointOfInterest) -> bool {
    matches!(
        poi.kind,
        PointOfInterestKind::Gossip | PointOfInterestKind::GossipGrotto
    )
}

/// Pick a random unassigned gossip of `world` that stays reachable when the
/// `hidden` locations are never collected.
pub fn find_valid_gossip<R: Rng, F: Fn(&PointOfInterest) -> bool>(
    pathfinder: &Pathfinder,
    items: &ItemPlacement,
    ctx: &HintContext,
    world: WorldId,
    hidden: &[Location],
    filter: F,
    rng: &mut R,
) -> Result<Option<GossipId>, LogicError> {
    let options = PathfinderOptions {
        items: Some(items),
        recursive: true,
        gossips: true,
        forbidden_locations: hidden.iter().copied().collect(),
        ..Default::default()
    };
    let state = pathfinder.run(None, &options)?;
    let w = pathfinder.worlds().get(world).ok_or_else(|| {
        LogicError::InvalidOptions(format!("world {world} does not exist"))
    })?;
    let candidates: Vec<GossipId> = state.worlds[world]
        .reached_gossips()
        .filter(|&g| filter(w.gossip(g)))
        .filter(|&g| !ctx.is_assigned(world, g))
        .collect();
    Ok(candidates.choose(rng).copied())
}

/// Place up to `count` hero hints for the required locations of `world`.
/// Returns the number of hints placed.
pub fn place_hero_hints<R: Rng>(
    pathfinder: &Pathfinder,
    items: &ItemPlacement,
    required: &[Location],
    ctx: &mut HintContext,
    world: WorldId,
    count: usize,
    rng: &mut R,
) -> Result<usize, LogicError> {
    let mut locs: Vec<Location> = required
        .iter()
        .copied()
        .filter(|loc| loc.world == world && !ctx.hinted_locations.contains(loc))
        .collect();
    locs.shuffle(rng);

    let mut placed = 0;
    while placed < count {
        let loc = match locs.pop() {
            Some(loc) => loc,
            None => break,
        };
        let gossip = find_valid_gossip(
            pathfinder,
            items,
            ctx,
            world,
            &[loc],
            is_regular_gossip,
            rng,
        )?;
        if let Some(gossip) = gossip {
            debug!("Hero hint for {loc:?} at gossip {gossip}");
            ctx.hinted_locations.insert(loc);
            ctx.assign(world, gossip, Hint::Hero { location: loc });
            placed += 1;
        }
    }
    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traverse::StartingItems;
    use hashbrown::HashMap;
    use ootmm_game::{build_world, Constraint, GameTable, SettingValue, SettingsView, World};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn anywhere(_: &str, _: &dyn SettingsView) -> Constraint {
        Constraint::Anywhere
    }

    fn world() -> World {
        let table: GameTable = serde_json::from_value(json!({
            "game": "mm",
            "start": ["Start"],
            "areas": {
                "Start": {
                    "locations": { "Chest1": "true" },
                    "exits": { "Room": "has(KEY)" },
                    "gossip": { "Start Stone": "true", "Moon Stone": "true" }
                },
                "Room": {
                    "locations": { "Chest2": "true" },
                    "gossip": { "Room Stone": "true" }
                }
            },
            "pool": [
                { "location": "Chest1", "type": "chest", "scene": "S", "id": 0, "item": "KEY" },
                { "location": "Chest2", "type": "chest", "scene": "S", "id": 1, "item": "MASK" }
            ],
            "gossip": {
                "Start Stone": { "type": "gossip" },
                "Room Stone": { "type": "gossip-grotto" },
                "Moon Stone": { "type": "gossip-moon" }
            }
        }))
        .unwrap();
        build_world(&[table], &HashMap::<String, SettingValue>::new(), &anywhere).unwrap()
    }

    fn pathfinder(world: &World) -> Pathfinder {
        Pathfinder::new(
            vec![world.clone()],
            &HashMap::<String, SettingValue>::new(),
            StartingItems::new(1),
        )
        .unwrap()
    }

    #[test]
    fn test_find_valid_gossip() {
        let world = world();
        let pathfinder = pathfinder(&world);
        let items = ItemPlacement::vanilla(std::slice::from_ref(&world));
        let mut rng = StdRng::from_seed([0u8; 32]);
        let mut ctx = HintContext::new(1);
        let chest1 = Location::new(0, world.check_id("MM Chest1").unwrap());
        let start_stone = world.gossip_id("MM Start Stone").unwrap();

        // Without the key, only the start area stones are reachable, and the
        // moon stone is filtered out.
        let gossip = find_valid_gossip(
            &pathfinder,
            &items,
            &ctx,
            0,
            &[chest1],
            is_regular_gossip,
            &mut rng,
        )
        .unwrap();
        assert_eq!(gossip, Some(start_stone));

        ctx.assign(0, start_stone, Hint::Foolish { region: "Start".to_string() });
        let gossip = find_valid_gossip(
            &pathfinder,
            &items,
            &ctx,
            0,
            &[chest1],
            is_regular_gossip,
            &mut rng,
        )
        .unwrap();
        assert_eq!(gossip, None);
    }

    #[test]
    fn test_place_hero_hints() {
        let world = world();
        let pathfinder = pathfinder(&world);
        let items = ItemPlacement::vanilla(std::slice::from_ref(&world));
        let mut rng = StdRng::from_seed([1u8; 32]);
        let mut ctx = HintContext::new(1);
        let required = vec![
            Location::new(0, world.check_id("MM Chest1").unwrap()),
            Location::new(0, world.check_id("MM Chest2").unwrap()),
        ];
        let placed =
            place_hero_hints(&pathfinder, &items, &required, &mut ctx, 0, 1, &mut rng).unwrap();
        assert_eq!(placed, 1);
        assert_eq!(ctx.hinted_locations.len(), 1);
        assert_eq!(ctx.gossips[0].len(), 1);
        let (&gossip, hint) = ctx.gossips[0].iter().next().unwrap();
        assert!(is_regular_gossip(world.gossip(gossip)));
        match hint {
            Hint::Hero { location } => assert!(ctx.hinted_locations.contains(location)),
            h => panic!("unexpected hint: {h:?}"),
        }

        // Hinted locations are not hinted again:
        let placed =
            place_hero_hints(&pathfinder, &items, &required, &mut ctx, 0, 5, &mut rng).unwrap();
        assert!(placed <= 1);
        assert_eq!(ctx.hinted_locations.len(), 1 + placed);
    }
}
