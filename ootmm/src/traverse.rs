use std::collections::BTreeMap;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use log::debug;
use serde::{Deserialize, Serialize};

use ootmm_game::{
    AreaId, CheckId, EventId, GossipId, ItemId, LogicError, SettingsView, World, WorldId,
};
use ootmm_logic::{resolve_settings, EvalContext, Evaluate, GlobalState};

/// One slot of one player's World.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Location {
    pub world: WorldId,
    pub check: CheckId,
}

impl Location {
    pub fn new(world: WorldId, check: CheckId) -> Self {
        Location { world, check }
    }
}

/// An item received by `player`; `item` is interned in that player's World.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerItem {
    pub player: WorldId,
    pub item: ItemId,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemPlacement {
    pub items: HashMap<Location, PlayerItem>,
}

impl ItemPlacement {
    pub fn get(&self, loc: &Location) -> Option<&PlayerItem> {
        self.items.get(loc)
    }

    pub fn insert(&mut self, loc: Location, item: PlayerItem) {
        self.items.insert(loc, item);
    }

    /// Every check holds its own vanilla item.
    pub fn vanilla(worlds: &[World]) -> Self {
        let mut placement = ItemPlacement::default();
        for (world_id, world) in worlds.iter().enumerate() {
            for (check_id, check) in world.checks().iter().enumerate() {
                if let Some(item) = world.item_id(&check.item) {
                    placement.insert(
                        Location::new(world_id, check_id),
                        PlayerItem {
                            player: world_id,
                            item,
                        },
                    );
                }
            }
        }
        placement
    }

    /// Build a placement from per-player `slot name -> item name` maps, each
    /// item being received by the player owning the slot.
    pub fn from_names(
        worlds: &[World],
        names: &[BTreeMap<String, String>],
    ) -> Result<Self, LogicError> {
        if names.len() > worlds.len() {
            return Err(LogicError::InvalidOptions(format!(
                "placement for {} players, but only {} worlds",
                names.len(),
                worlds.len()
            )));
        }
        let mut placement = ItemPlacement::default();
        for (world_id, slots) in names.iter().enumerate() {
            let world = &worlds[world_id];
            for (slot, item) in slots {
                let check = world.check_id(slot).ok_or_else(|| {
                    LogicError::InvalidOptions(format!("unknown location '{slot}'"))
                })?;
                let item = world
                    .item_id(item)
                    .ok_or_else(|| LogicError::UnknownSymbol {
                        kind: ootmm_game::SymbolKind::Item,
                        name: item.clone(),
                    })?;
                placement.insert(
                    Location::new(world_id, check),
                    PlayerItem {
                        player: world_id,
                        item,
                    },
                );
            }
        }
        Ok(placement)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StartingItems {
    pub items: Vec<Vec<(ItemId, u32)>>, // Indexed by player
    pub events: Vec<Vec<EventId>>,      // Indexed by player
}

impl StartingItems {
    pub fn new(players: usize) -> Self {
        StartingItems {
            items: vec![vec![]; players],
            events: vec![vec![]; players],
        }
    }

    pub fn add_item(&mut self, player: WorldId, item: ItemId, count: u32) {
        if player >= self.items.len() {
            self.items.resize(player + 1, vec![]);
        }
        self.items[player].push((item, count));
    }

    pub fn add_event(&mut self, player: WorldId, event: EventId) {
        if player >= self.events.len() {
            self.events.resize(player + 1, vec![]);
        }
        self.events[player].push(event);
    }

    fn players(&self) -> usize {
        std::cmp::max(self.items.len(), self.events.len())
    }

    fn validate(&self, worlds: &[World]) -> Result<(), LogicError> {
        if self.players() > worlds.len() {
            return Err(LogicError::InvalidOptions(format!(
                "starting items for player {}, but only {} worlds",
                self.players() - 1,
                worlds.len()
            )));
        }
        for (player, items) in self.items.iter().enumerate() {
            let item_count = worlds[player].symbols().item_isv.len();
            if let Some((item, _)) = items.iter().find(|(item, _)| *item >= item_count) {
                return Err(LogicError::InvalidOptions(format!(
                    "starting item {item} does not exist in world {player}"
                )));
            }
        }
        for (player, events) in self.events.iter().enumerate() {
            let event_count = worlds[player].symbols().event_isv.len();
            if let Some(event) = events.iter().find(|&&e| e >= event_count) {
                return Err(LogicError::InvalidOptions(format!(
                    "starting event {event} does not exist in world {player}"
                )));
            }
        }
        Ok(())
    }
}

/// Reachability of one player's World.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldState {
    pub areas: Vec<bool>,     // Indexed by AreaId
    pub locations: Vec<bool>, // Indexed by CheckId
    pub gossips: Vec<bool>,   // Indexed by GossipId
    pub global: GlobalState,  // Inventory and obtained events
}

impl WorldState {
    fn new(world: &World) -> Self {
        WorldState {
            areas: vec![false; world.areas().len()],
            locations: vec![false; world.checks().len()],
            gossips: vec![false; world.gossips().len()],
            global: GlobalState::new(world),
        }
    }

    pub fn has_event(&self, event_id: EventId) -> bool {
        self.global.events[event_id]
    }

    pub fn reached_gossips(&self) -> impl Iterator<Item = GossipId> + '_ {
        self.gossips
            .iter()
            .enumerate()
            .filter(|(_, x)| **x)
            .map(|(i, _)| i)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathfinderState {
    pub worlds: Vec<WorldState>,
    pub spheres: Vec<Vec<Location>>,
    pub goal: bool,
}

impl PathfinderState {
    pub fn is_reached(&self, loc: Location) -> bool {
        self.worlds[loc.world].locations[loc.check]
    }

    pub fn has_event(&self, world: WorldId, event_id: EventId) -> bool {
        self.worlds[world].has_event(event_id)
    }

    pub fn area_reached(&self, world: WorldId, area_id: AreaId) -> bool {
        self.worlds[world].areas[area_id]
    }

    pub fn reached_locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.worlds.iter().enumerate().flat_map(|(world_id, ws)| {
            ws.locations
                .iter()
                .enumerate()
                .filter(|(_, x)| **x)
                .map(move |(check, _)| Location::new(world_id, check))
        })
    }
}

pub type Goal = Arc<dyn Fn(&PathfinderState) -> bool + Send + Sync>;

/// Goal met once every listed `(world, event)` pair is obtained.
pub fn events_goal(events: Vec<(WorldId, EventId)>) -> Goal {
    Arc::new(move |state: &PathfinderState| {
        events.iter().all(|&(world, event)| state.has_event(world, event))
    })
}

#[derive(Clone, Default)]
pub struct PathfinderOptions<'a> {
    pub items: Option<&'a ItemPlacement>,
    pub starting_items: Option<&'a StartingItems>, // Replaces the Pathfinder's own when set
    pub recursive: bool,
    pub forbidden_locations: HashSet<Location>,
    pub stop_at_goal: bool,
    pub gossips: bool,
}

/// Fixpoint reachability solver over a set of player Worlds. A Pathfinder holds
/// no mutable state, so one instance can serve any number of concurrent runs.
#[derive(Clone)]
pub struct Pathfinder {
    worlds: Vec<World>,
    settings: Vec<Vec<bool>>, // Resolved setting keys, per world
    starting_items: StartingItems,
    goal: Option<Goal>,
}

impl Pathfinder {
    pub fn new(
        worlds: Vec<World>,
        settings: &dyn SettingsView,
        starting_items: StartingItems,
    ) -> Result<Self, LogicError> {
        starting_items.validate(&worlds)?;
        let settings = worlds
            .iter()
            .map(|w| resolve_settings(w, settings))
            .collect();
        Ok(Pathfinder {
            worlds,
            settings,
            starting_items,
            goal: None,
        })
    }

    pub fn with_goal(mut self, goal: Goal) -> Self {
        self.goal = Some(goal);
        self
    }

    pub fn worlds(&self) -> &[World] {
        &self.worlds
    }

    pub fn starting_items(&self) -> &StartingItems {
        &self.starting_items
    }

    /// Same Pathfinder with one World replaced. Setting tables are shared by
    /// every copy of a World, so the resolved settings carry over.
    pub fn with_world(&self, world_id: WorldId, world: World) -> Pathfinder {
        let mut pathfinder = self.clone();
        pathfinder.worlds[world_id] = world;
        pathfinder
    }

    fn validate_options(&self, options: &PathfinderOptions) -> Result<(), LogicError> {
        let valid_location = |loc: &Location| {
            loc.world < self.worlds.len() && loc.check < self.worlds[loc.world].checks().len()
        };
        if let Some(items) = options.items {
            for (loc, player_item) in &items.items {
                if !valid_location(loc) {
                    return Err(LogicError::InvalidOptions(format!(
                        "placement location {loc:?} does not exist"
                    )));
                }
                if player_item.player >= self.worlds.len()
                    || player_item.item
                        >= self.worlds[player_item.player].symbols().item_isv.len()
                {
                    return Err(LogicError::InvalidOptions(format!(
                        "placed item {player_item:?} does not exist"
                    )));
                }
            }
        }
        if let Some(loc) = options.forbidden_locations.iter().find(|l| !valid_location(l)) {
            return Err(LogicError::InvalidOptions(format!(
                "forbidden location {loc:?} does not exist"
            )));
        }
        if let Some(starting_items) = options.starting_items {
            starting_items.validate(&self.worlds)?;
        }
        Ok(())
    }

    fn initial_state(&self, starting_items: &StartingItems) -> PathfinderState {
        let mut worlds: Vec<WorldState> = self.worlds.iter().map(WorldState::new).collect();
        for (player, items) in starting_items.items.iter().enumerate() {
            for &(item, count) in items {
                worlds[player].global.inventory.add(item, count);
            }
        }
        for (player, events) in starting_items.events.iter().enumerate() {
            for &event in events {
                worlds[player].global.set_event(event);
            }
        }
        PathfinderState {
            worlds,
            spheres: vec![],
            goal: false,
        }
    }

    // Expand reached areas and obtained events of one World until nothing
    // changes. Areas are swept in AreaId order to keep runs deterministic.
    fn close_areas(&self, world_id: WorldId, ws: &mut WorldState, gossips: bool) -> bool {
        let world = &self.worlds[world_id];
        let settings = &self.settings[world_id];
        let mut any_change = false;
        loop {
            let mut changed = false;
            for area_id in 0..ws.areas.len() {
                if !ws.areas[area_id] {
                    continue;
                }
                let area = world.area(area_id);
                for &(event_id, ref expr) in &area.events {
                    if ws.global.events[event_id] {
                        continue;
                    }
                    if expr.evaluate(&EvalContext::new(&ws.global, settings)) {
                        ws.global.events[event_id] = true;
                        changed = true;
                    }
                }
                for &(dst_id, ref expr) in &area.exits {
                    if ws.areas[dst_id] {
                        continue;
                    }
                    if expr.evaluate(&EvalContext::new(&ws.global, settings)) {
                        ws.areas[dst_id] = true;
                        changed = true;
                    }
                }
                if gossips {
                    for &(gossip_id, ref expr) in &area.gossips {
                        if !ws.gossips[gossip_id]
                            && expr.evaluate(&EvalContext::new(&ws.global, settings))
                        {
                            ws.gossips[gossip_id] = true;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
            any_change = true;
        }
        any_change
    }

    // Locations of one World that became reachable, in AreaId order.
    fn new_locations(
        &self,
        world_id: WorldId,
        ws: &mut WorldState,
        forbidden: &HashSet<Location>,
        sphere: &mut Vec<Location>,
    ) {
        let world = &self.worlds[world_id];
        let settings = &self.settings[world_id];
        for area_id in 0..ws.areas.len() {
            if !ws.areas[area_id] {
                continue;
            }
            for &(check_id, ref expr) in &world.area(area_id).locations {
                let loc = Location::new(world_id, check_id);
                if ws.locations[check_id] || forbidden.contains(&loc) {
                    continue;
                }
                if expr.evaluate(&EvalContext::new(&ws.global, settings)) {
                    ws.locations[check_id] = true;
                    sphere.push(loc);
                }
            }
        }
    }

    /// Solve from the named start areas, or from each World's own start
    /// areas when `start_areas` is None.
    pub fn run(
        &self,
        start_areas: Option<&[&str]>,
        options: &PathfinderOptions,
    ) -> Result<PathfinderState, LogicError> {
        self.validate_options(options)?;
        let starting_items = options.starting_items.unwrap_or(&self.starting_items);
        let mut state = self.initial_state(starting_items);
        for (world_id, world) in self.worlds.iter().enumerate() {
            let area_ids: Vec<AreaId> = match start_areas {
                Some(names) => names
                    .iter()
                    .map(|&name| {
                        world.area_id(name).ok_or_else(|| LogicError::MissingArea {
                            name: name.to_string(),
                            referenced_by: "pathfinder start".to_string(),
                        })
                    })
                    .collect::<Result<_, _>>()?,
                None => world.start_areas().to_vec(),
            };
            if area_ids.is_empty() {
                return Err(LogicError::InvalidOptions(format!(
                    "empty set of start areas for world {world_id}"
                )));
            }
            for area_id in area_ids {
                state.worlds[world_id].areas[area_id] = true;
            }
        }

        let mut iteration = 0;
        loop {
            iteration += 1;
            let mut changed = false;
            for (world_id, ws) in state.worlds.iter_mut().enumerate() {
                changed |= self.close_areas(world_id, ws, options.gossips);
            }

            let mut sphere: Vec<Location> = vec![];
            for (world_id, ws) in state.worlds.iter_mut().enumerate() {
                self.new_locations(world_id, ws, &options.forbidden_locations, &mut sphere);
            }
            if !sphere.is_empty() {
                changed = true;
                if options.recursive {
                    if let Some(items) = options.items {
                        for loc in &sphere {
                            if let Some(player_item) = items.get(loc) {
                                state.worlds[player_item.player]
                                    .global
                                    .collect(player_item.item);
                            }
                        }
                    }
                }
                state.spheres.push(sphere);
            }

            if !state.goal {
                if let Some(goal) = &self.goal {
                    state.goal = goal(&state);
                }
            }
            if state.goal && options.stop_at_goal {
                break;
            }
            if !changed {
                break;
            }
        }
        debug!(
            "Pathfinder finished after {} iterations: {} spheres, goal={}",
            iteration,
            state.spheres.len(),
            state.goal
        );
        Ok(state)
    }
}
