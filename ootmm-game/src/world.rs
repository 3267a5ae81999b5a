use anyhow::{Context, Result};
use hashbrown::HashSet;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use strum_macros::{Display, EnumString, VariantNames};

use crate::error::{LogicError, SymbolKind};
use crate::expr_parser::ExprParser;
use crate::{
    AreaId, CheckId, EventId, Expr, Game, GossipId, IndexedVec, ItemId, SettingsView, Symbols,
};

// Raw tables, as shipped per game.

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameTable {
    pub game: Game,
    #[serde(default)]
    pub start: Vec<String>,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub macros: BTreeMap<String, String>,
    #[serde(default)]
    pub areas: BTreeMap<String, RawArea>,
    #[serde(default)]
    pub pool: Vec<RawCheck>,
    #[serde(default)]
    pub gossip: BTreeMap<String, RawGossip>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawArea {
    #[serde(default)]
    pub dungeon: Option<String>,
    #[serde(default)]
    pub locations: BTreeMap<String, String>,
    #[serde(default)]
    pub exits: BTreeMap<String, String>,
    #[serde(default)]
    pub events: BTreeMap<String, String>,
    #[serde(default)]
    pub gossip: BTreeMap<String, String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawCheckType {
    Chest,
    Collectible,
    Gs,
    Sf,
    Npc,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCheckId {
    Number(u32),
    Name(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawCheck {
    pub location: String,
    #[serde(rename = "type")]
    pub check_type: RawCheckType,
    pub scene: String,
    pub id: RawCheckId,
    pub item: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawGossip {
    #[serde(rename = "type")]
    pub kind: PointOfInterestKind,
}

impl GameTable {
    pub fn load(path: &Path) -> Result<GameTable> {
        let table_str = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to load game table at {}", path.display()))?;
        let table: GameTable = serde_json::from_str(&table_str)
            .with_context(|| format!("Unable to parse game table at {}", path.display()))?;
        Ok(table)
    }
}

// Built World.

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NumericCheckKind {
    Chest,
    Collectible,
    Gs,
    Sf,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SymbolicCheckKind {
    Npc,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckKind {
    Numeric { kind: NumericCheckKind, id: u32 },
    Symbolic { kind: SymbolicCheckKind, id: String },
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString, VariantNames, Serialize, Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum Constraint {
    Anywhere,
    OwnDungeon,
    OwnGame,
    Vanilla,
}

#[derive(Clone, Debug)]
pub struct Check {
    pub name: String,
    pub game: Game,
    pub scene: String,
    pub item: String, // Vanilla item, namespaced
    pub kind: CheckKind,
    pub constraint: Constraint,
    pub dungeon: Option<String>,
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString, VariantNames, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PointOfInterestKind {
    Gossip,
    GossipGrotto,
    GossipMoon,
}

#[derive(Clone, Debug)]
pub struct PointOfInterest {
    pub name: String,
    pub game: Game,
    pub kind: PointOfInterestKind,
}

#[derive(Clone, Debug)]
pub struct Area {
    pub name: String,
    pub game: Game,
    pub dungeon: Option<String>,
    pub locations: Vec<(CheckId, Expr)>,
    pub exits: Vec<(AreaId, Expr)>,
    pub events: Vec<(EventId, Expr)>,
    pub gossips: Vec<(GossipId, Expr)>,
}

/// Decides where the item originally found at a check may be placed.
pub trait PlacementConstraint {
    fn constraint(&self, item: &str, settings: &dyn SettingsView) -> Constraint;
}

impl<F> PlacementConstraint for F
where
    F: Fn(&str, &dyn SettingsView) -> Constraint,
{
    fn constraint(&self, item: &str, settings: &dyn SettingsView) -> Constraint {
        self(item, settings)
    }
}

#[derive(Debug)]
struct WorldTables {
    area_isv: IndexedVec<String>,
    check_isv: IndexedVec<String>,
    checks: Vec<Check>,
    gossip_isv: IndexedVec<String>,
    gossips: Vec<PointOfInterest>,
    dungeons: BTreeMap<String, BTreeSet<CheckId>>,
    start_areas: Vec<AreaId>,
    symbols: Symbols,
}

/// Immutable area graph of one player. Clones share everything; a World
/// modified through `with_area` only owns a fresh copy of that one Area.
#[derive(Clone, Debug)]
pub struct World {
    tables: Arc<WorldTables>,
    areas: Vec<Arc<Area>>,
}

impl World {
    pub fn areas(&self) -> &[Arc<Area>] {
        &self.areas
    }

    pub fn area(&self, area_id: AreaId) -> &Area {
        &self.areas[area_id]
    }

    pub fn area_id(&self, name: &str) -> Option<AreaId> {
        self.tables.area_isv.get(name)
    }

    pub fn area_name(&self, area_id: AreaId) -> &str {
        &self.tables.area_isv.keys[area_id]
    }

    pub fn checks(&self) -> &[Check] {
        &self.tables.checks
    }

    pub fn check(&self, check_id: CheckId) -> &Check {
        &self.tables.checks[check_id]
    }

    pub fn check_id(&self, name: &str) -> Option<CheckId> {
        self.tables.check_isv.get(name)
    }

    pub fn gossips(&self) -> &[PointOfInterest] {
        &self.tables.gossips
    }

    pub fn gossip(&self, gossip_id: GossipId) -> &PointOfInterest {
        &self.tables.gossips[gossip_id]
    }

    pub fn gossip_id(&self, name: &str) -> Option<GossipId> {
        self.tables.gossip_isv.get(name)
    }

    pub fn dungeons(&self) -> &BTreeMap<String, BTreeSet<CheckId>> {
        &self.tables.dungeons
    }

    pub fn start_areas(&self) -> &[AreaId] {
        &self.tables.start_areas
    }

    pub fn symbols(&self) -> &Symbols {
        &self.tables.symbols
    }

    pub fn item_id(&self, name: &str) -> Option<ItemId> {
        self.tables.symbols.item_isv.get(name)
    }

    pub fn item_name(&self, item_id: ItemId) -> &str {
        &self.tables.symbols.item_isv.keys[item_id]
    }

    pub fn event_id(&self, name: &str) -> Option<EventId> {
        self.tables.symbols.event_isv.get(name)
    }

    pub fn event_name(&self, event_id: EventId) -> &str {
        &self.tables.symbols.event_isv.keys[event_id]
    }

    /// Copy of this World with one Area modified by `f`.
    pub fn with_area<F: FnOnce(&mut Area)>(&self, area_id: AreaId, f: F) -> World {
        let mut world = self.clone();
        f(Arc::make_mut(&mut world.areas[area_id]));
        world
    }
}

// An area whose cross-references are still names.
struct PendingArea {
    name: String,
    game: Game,
    dungeon: Option<String>,
    locations: Vec<(String, Expr)>,
    exits: Vec<(String, Expr)>,
    events: Vec<(EventId, Expr)>,
    gossips: Vec<(String, Expr)>,
}

#[derive(Default)]
struct WorldBuilder {
    symbols: Symbols,
    area_isv: IndexedVec<String>,
    pending_areas: Vec<PendingArea>,
    check_isv: IndexedVec<String>,
    checks: Vec<Check>,
    gossip_isv: IndexedVec<String>,
    gossips: Vec<PointOfInterest>,
    start_names: Vec<String>,
    declared_items: HashSet<ItemId>,
    defined_events: HashSet<EventId>,
}

impl WorldBuilder {
    fn load_game(
        &mut self,
        table: &GameTable,
        settings: &dyn SettingsView,
        constraints: &dyn PlacementConstraint,
    ) -> Result<(), LogicError> {
        let game = table.game;
        let mut parser = ExprParser::new(game, &mut self.symbols);
        for (header, body) in &table.macros {
            parser.add_macro_decl(header, body)?;
        }

        for (raw_name, raw_area) in &table.areas {
            let name = game.namespaced(raw_name, ' ');
            if self.area_isv.get(&name).is_some() {
                return Err(LogicError::DuplicateArea(name));
            }
            self.area_isv.add(&name);
            let mut area = PendingArea {
                name,
                game,
                dungeon: raw_area.dungeon.as_ref().map(|d| game.namespaced(d, ' ')),
                locations: vec![],
                exits: vec![],
                events: vec![],
                gossips: vec![],
            };
            for (loc, text) in &raw_area.locations {
                area.locations
                    .push((game.namespaced(loc, ' '), parser.parse(text)?));
            }
            for (target, text) in &raw_area.exits {
                area.exits
                    .push((game.namespaced(target, ' '), parser.parse(text)?));
            }
            for (event, text) in &raw_area.events {
                let expr = parser.parse(text)?;
                let event_name = game.namespaced(event, '_');
                let event_id = parser.symbols_mut().event_isv.add(&event_name);
                self.defined_events.insert(event_id);
                area.events.push((event_id, expr));
            }
            for (gossip, text) in &raw_area.gossip {
                area.gossips
                    .push((game.namespaced(gossip, ' '), parser.parse(text)?));
            }
            self.pending_areas.push(area);
        }

        for item in &table.items {
            let item_name = game.namespaced(item, '_');
            let item_id = parser.symbols_mut().item_isv.add(&item_name);
            self.declared_items.insert(item_id);
        }

        for raw in &table.pool {
            let name = game.namespaced(&raw.location, ' ');
            if self.check_isv.get(&name).is_some() {
                return Err(LogicError::DuplicateCheck(name));
            }
            let kind = check_kind(&name, raw)?;
            let item = game.namespaced(&raw.item, '_');
            let item_id = parser.symbols_mut().item_isv.add(&item);
            self.declared_items.insert(item_id);
            let constraint = constraints.constraint(&item, settings);
            self.check_isv.add(&name);
            self.checks.push(Check {
                name,
                game,
                scene: game.namespaced(&raw.scene, '_'),
                item,
                kind,
                constraint,
                dungeon: None,
            });
        }

        for (raw_name, raw_gossip) in &table.gossip {
            let name = game.namespaced(raw_name, ' ');
            if self.gossip_isv.get(&name).is_some() {
                return Err(LogicError::DuplicateGossip(name));
            }
            self.gossip_isv.add(&name);
            self.gossips.push(PointOfInterest {
                name,
                game,
                kind: raw_gossip.kind,
            });
        }

        self.start_names
            .extend(table.start.iter().map(|s| game.namespaced(s, ' ')));
        debug!(
            "Loaded {} tables: {} areas, {} checks",
            game,
            table.areas.len(),
            table.pool.len()
        );
        Ok(())
    }

    fn link(self, settings: &dyn SettingsView) -> Result<World, LogicError> {
        let mut checks = self.checks;
        let mut dungeons: BTreeMap<String, BTreeSet<CheckId>> = BTreeMap::new();
        let mut areas: Vec<Arc<Area>> = Vec::with_capacity(self.pending_areas.len());
        for pending in self.pending_areas {
            let mut locations = vec![];
            for (loc, expr) in pending.locations {
                let check_id =
                    self.check_isv
                        .get(&loc)
                        .ok_or_else(|| LogicError::MissingLocation {
                            name: loc.clone(),
                            area: pending.name.clone(),
                        })?;
                if let Some(dungeon) = &pending.dungeon {
                    dungeons.entry(dungeon.clone()).or_default().insert(check_id);
                    checks[check_id].dungeon = Some(dungeon.clone());
                }
                locations.push((check_id, expr));
            }
            let mut exits = vec![];
            for (target, expr) in pending.exits {
                let area_id = self
                    .area_isv
                    .get(&target)
                    .ok_or_else(|| LogicError::MissingArea {
                        name: target.clone(),
                        referenced_by: pending.name.clone(),
                    })?;
                exits.push((area_id, expr));
            }
            let mut gossips = vec![];
            for (gossip, expr) in pending.gossips {
                let gossip_id =
                    self.gossip_isv
                        .get(&gossip)
                        .ok_or_else(|| LogicError::UnknownSymbol {
                            kind: SymbolKind::PointOfInterest,
                            name: gossip.clone(),
                        })?;
                gossips.push((gossip_id, expr));
            }
            areas.push(Arc::new(Area {
                name: pending.name,
                game: pending.game,
                dungeon: pending.dungeon,
                locations,
                exits,
                events: pending.events,
                gossips,
            }));
        }

        let mut start_areas = vec![];
        for name in &self.start_names {
            let area_id = self
                .area_isv
                .get(name)
                .ok_or_else(|| LogicError::MissingArea {
                    name: name.clone(),
                    referenced_by: "start".to_string(),
                })?;
            start_areas.push(area_id);
        }

        let symbols = self.symbols;
        for (item_id, name) in symbols.item_isv.keys.iter().enumerate() {
            if !self.declared_items.contains(&item_id) {
                return Err(LogicError::UnknownSymbol {
                    kind: SymbolKind::Item,
                    name: name.clone(),
                });
            }
        }
        for (event_id, name) in symbols.event_isv.keys.iter().enumerate() {
            if !self.defined_events.contains(&event_id) {
                return Err(LogicError::UnknownSymbol {
                    kind: SymbolKind::Event,
                    name: name.clone(),
                });
            }
        }
        for key in &symbols.setting_isv.keys {
            if !settings.knows(&key.name) {
                return Err(LogicError::UnknownSymbol {
                    kind: SymbolKind::Setting,
                    name: key.name.clone(),
                });
            }
        }

        Ok(World {
            tables: Arc::new(WorldTables {
                area_isv: self.area_isv,
                check_isv: self.check_isv,
                checks,
                gossip_isv: self.gossip_isv,
                gossips: self.gossips,
                dungeons,
                start_areas,
                symbols,
            }),
            areas,
        })
    }
}

fn check_kind(name: &str, raw: &RawCheck) -> Result<CheckKind, LogicError> {
    let numeric = |kind: NumericCheckKind| match &raw.id {
        &RawCheckId::Number(id) => Ok(CheckKind::Numeric { kind, id }),
        RawCheckId::Name(id) => Err(LogicError::InvalidCheck {
            location: name.to_string(),
            message: format!("{kind} check requires a numeric id, got '{id}'"),
        }),
    };
    match raw.check_type {
        RawCheckType::Chest => numeric(NumericCheckKind::Chest),
        RawCheckType::Collectible => numeric(NumericCheckKind::Collectible),
        RawCheckType::Gs => numeric(NumericCheckKind::Gs),
        RawCheckType::Sf => numeric(NumericCheckKind::Sf),
        RawCheckType::Npc => match &raw.id {
            RawCheckId::Name(id) => Ok(CheckKind::Symbolic {
                kind: SymbolicCheckKind::Npc,
                id: id.clone(),
            }),
            RawCheckId::Number(id) => Err(LogicError::InvalidCheck {
                location: name.to_string(),
                message: format!("npc check requires a symbolic id, got {id}"),
            }),
        },
    }
}

/// Build one player's World from the raw tables of every game. Either the
/// whole World is built or the first error is returned.
pub fn build_world(
    tables: &[GameTable],
    settings: &dyn SettingsView,
    constraints: &dyn PlacementConstraint,
) -> Result<World, LogicError> {
    let mut builder = WorldBuilder::default();
    for table in tables {
        builder.load_game(table, settings, constraints)?;
    }
    let world = builder.link(settings)?;
    info!(
        "Built world: {} areas, {} checks, {} items, {} events",
        world.areas.len(),
        world.checks().len(),
        world.symbols().item_isv.len(),
        world.symbols().event_isv.len()
    );
    Ok(world)
}
