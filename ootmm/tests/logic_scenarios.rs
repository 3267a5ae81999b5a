use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ootmm::settings::{item_constraint, parse_settings, Settings};
use ootmm::traverse::{
    events_goal, ItemPlacement, Location, Pathfinder, PathfinderOptions, PathfinderState,
    StartingItems,
};
use ootmm_game::{build_world, GameTable, World};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ScenariosList {
    scenarios: Vec<Scenario>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Scenario {
    name: String,
    // Overrides on top of the directory's settings.json.
    #[serde(default)]
    settings: serde_json::Map<String, serde_json::Value>,
    start: Option<Vec<String>>,
    // Vanilla placement when absent.
    placement: Option<BTreeMap<String, String>>,
    #[serde(default)]
    starting_items: Vec<String>,
    #[serde(default)]
    starting_events: Vec<String>,
    #[serde(default)]
    forbidden: Vec<String>,
    #[serde(default = "default_recursive")]
    recursive: bool,
    #[serde(default)]
    stop_at_goal: bool,
    #[serde(default)]
    gossips: bool,
    #[serde(default)]
    goal_events: Vec<String>,
    expected: Expected,
}

fn default_recursive() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Expected {
    spheres: Option<Vec<Vec<String>>>,
    locations: Option<Vec<String>>,
    #[serde(default)]
    events: Vec<String>,
    #[serde(default)]
    missing_events: Vec<String>,
    goal: Option<bool>,
    gossips: Option<Vec<String>>,
    error: Option<String>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let json_str =
        std::fs::read_to_string(path).context(format!("loading {}", path.display()))?;
    serde_json::from_str(&json_str).context(format!("parsing {}", path.display()))
}

fn load_tables(dir: &Path) -> Result<Vec<GameTable>> {
    let mut paths: Vec<PathBuf> = vec![];
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
        if file_name.starts_with("world") && file_name.ends_with(".json") {
            paths.push(path);
        }
    }
    paths.sort();
    paths.iter().map(|p| GameTable::load(p)).collect()
}

fn get_settings(
    base: &serde_json::Map<String, serde_json::Value>,
    scenario: &Scenario,
) -> Result<Settings> {
    let mut merged = base.clone();
    for (k, v) in &scenario.settings {
        merged.insert(k.clone(), v.clone());
    }
    parse_settings(&serde_json::Value::Object(merged).to_string())
}

fn location_names(world: &World, locs: impl Iterator<Item = usize>) -> Vec<String> {
    locs.map(|check| world.check(check).name.clone()).collect()
}

fn run_scenario(
    tables: &[GameTable],
    settings: &Settings,
    scenario: &Scenario,
) -> Result<(World, PathfinderState)> {
    let world = build_world(tables, settings, &item_constraint)?;
    let worlds = vec![world.clone(); settings.players];

    let items = match &scenario.placement {
        Some(names) => ItemPlacement::from_names(&worlds, &vec![names.clone(); settings.players])?,
        None => ItemPlacement::vanilla(&worlds),
    };
    let mut starting_items = StartingItems::new(settings.players);
    for player in 0..settings.players {
        for name in &scenario.starting_items {
            let item = world
                .item_id(name)
                .with_context(|| format!("unknown starting item {name}"))?;
            starting_items.add_item(player, item, 1);
        }
        for name in &scenario.starting_events {
            let event = world
                .event_id(name)
                .with_context(|| format!("unknown starting event {name}"))?;
            starting_items.add_event(player, event);
        }
    }
    let mut goal_events = vec![];
    for name in &scenario.goal_events {
        let event = world
            .event_id(name)
            .with_context(|| format!("unknown goal event {name}"))?;
        goal_events.push((0, event));
    }
    let mut forbidden_locations = hashbrown::HashSet::new();
    for name in &scenario.forbidden {
        let check = world
            .check_id(name)
            .with_context(|| format!("unknown forbidden location {name}"))?;
        forbidden_locations.insert(Location::new(0, check));
    }

    let pathfinder = Pathfinder::new(worlds, settings, starting_items)?
        .with_goal(events_goal(goal_events));
    let start: Option<Vec<&str>> = scenario
        .start
        .as_ref()
        .map(|start| start.iter().map(|s| s.as_str()).collect());
    let options = PathfinderOptions {
        items: Some(&items),
        recursive: scenario.recursive,
        forbidden_locations,
        stop_at_goal: scenario.stop_at_goal,
        gossips: scenario.gossips,
        ..Default::default()
    };
    let state = pathfinder.run(start.as_deref(), &options)?;
    Ok((world, state))
}

fn test_scenario(tables: &[GameTable], settings: &Settings, scenario: &Scenario) -> Result<()> {
    let expected = &scenario.expected;
    let (world, state) = match run_scenario(tables, settings, scenario) {
        Ok(result) => result,
        Err(e) => match &expected.error {
            Some(msg) if e.to_string().contains(msg.as_str()) => return Ok(()),
            _ => return Err(e),
        },
    };
    if let Some(msg) = &expected.error {
        bail!("Error '{msg}' expected, but the pathfinder succeeds");
    }

    if let Some(spheres) = &expected.spheres {
        let actual: Vec<Vec<String>> = state
            .spheres
            .iter()
            .map(|sphere| location_names(&world, sphere.iter().map(|loc| loc.check)))
            .collect();
        if &actual != spheres {
            bail!("Spheres mismatch: expected {spheres:?}, got {actual:?}");
        }
    }
    if let Some(locations) = &expected.locations {
        let actual: BTreeSet<String> =
            location_names(&world, state.reached_locations().map(|loc| loc.check))
                .into_iter()
                .collect();
        let locations: BTreeSet<String> = locations.iter().cloned().collect();
        if actual != locations {
            bail!("Locations mismatch: expected {locations:?}, got {actual:?}");
        }
    }
    for name in &expected.events {
        let event = world.event_id(name).context(format!("unknown event {name}"))?;
        if !state.has_event(0, event) {
            bail!("Event {name} expected, but not obtained");
        }
    }
    for name in &expected.missing_events {
        let event = world.event_id(name).context(format!("unknown event {name}"))?;
        if state.has_event(0, event) {
            bail!("Event {name} obtained, but not expected");
        }
    }
    if let Some(goal) = expected.goal {
        if state.goal != goal {
            bail!("Goal expected to be {goal}, got {}", state.goal);
        }
    }
    if let Some(gossips) = &expected.gossips {
        let actual: BTreeSet<String> = state.worlds[0]
            .reached_gossips()
            .map(|g| world.gossip(g).name.clone())
            .collect();
        let gossips: BTreeSet<String> = gossips.iter().cloned().collect();
        if actual != gossips {
            bail!("Gossips mismatch: expected {gossips:?}, got {actual:?}");
        }
    }
    Ok(())
}

#[test]
fn test_logic_scenarios() -> Result<()> {
    let scenarios_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/scenarios");
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(&scenarios_dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    dirs.sort();
    for dir in dirs {
        println!("{}", dir.display());
        let tables = load_tables(&dir)?;
        let settings_path = dir.join("settings.json");
        let base_settings: serde_json::Map<String, serde_json::Value> = if settings_path.exists()
        {
            read_json(&settings_path)?
        } else {
            serde_json::Map::new()
        };
        let scenarios_list: ScenariosList = read_json(&dir.join("scenarios.json"))?;
        for scenario in &scenarios_list.scenarios {
            println!("Scenario: {}", scenario.name);
            let settings = get_settings(&base_settings, scenario)?;
            test_scenario(&tables, &settings, scenario)
                .with_context(|| format!("scenario '{}' in {}", scenario.name, dir.display()))?;
        }
    }
    Ok(())
}
