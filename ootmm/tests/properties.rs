// Properties of the pathfinder checked over randomly generated worlds.

use std::collections::BTreeSet;

use hashbrown::{HashMap, HashSet};
use ootmm::traverse::{
    ItemPlacement, Location, Pathfinder, PathfinderOptions, PathfinderState, PlayerItem,
    StartingItems,
};
use ootmm_game::{build_world, Constraint, GameTable, SettingValue, SettingsView, World};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde_json::{json, Map, Value};

const AREAS: usize = 10;
const ITEMS: usize = 6;
const SEEDS: u64 = 64;

fn anywhere(_: &str, _: &dyn SettingsView) -> Constraint {
    Constraint::Anywhere
}

fn random_requirement(rng: &mut StdRng, events: &[usize]) -> String {
    match rng.gen_range(0..5) {
        0 | 1 => "true".to_string(),
        2 => format!("has(I{})", rng.gen_range(0..ITEMS)),
        3 => format!(
            "has(I{}) & has(I{})",
            rng.gen_range(0..ITEMS),
            rng.gen_range(0..ITEMS)
        ),
        _ => match events.choose(rng) {
            Some(e) => format!("event(E{e}) | has(I{})", rng.gen_range(0..ITEMS)),
            None => "false".to_string(),
        },
    }
}

fn random_world(seed: u64) -> World {
    let mut rng = StdRng::seed_from_u64(seed);
    let events: Vec<usize> = (0..AREAS).filter(|_| rng.gen_bool(0.3)).collect();
    let mut areas = Map::new();
    let mut pool = vec![];
    for i in 0..AREAS {
        let mut exits = Map::new();
        for _ in 0..rng.gen_range(1..=2) {
            let target = rng.gen_range(0..AREAS);
            exits.insert(
                format!("A{target}"),
                Value::from(random_requirement(&mut rng, &events)),
            );
        }
        let mut area_events = Map::new();
        if events.contains(&i) {
            area_events.insert(
                format!("E{i}"),
                Value::from(random_requirement(&mut rng, &events)),
            );
        }
        let mut locations = Map::new();
        locations.insert(
            format!("L{i}"),
            Value::from(random_requirement(&mut rng, &events)),
        );
        let mut area = Map::new();
        area.insert("locations".to_string(), locations.into());
        area.insert("exits".to_string(), exits.into());
        area.insert("events".to_string(), area_events.into());
        areas.insert(format!("A{i}"), area.into());
        pool.push(json!({
            "location": format!("L{i}"),
            "type": "chest",
            "scene": "RANDOM",
            "id": i,
            "item": format!("I{}", rng.gen_range(0..ITEMS)),
        }));
    }
    let items: Vec<String> = (0..ITEMS).map(|i| format!("I{i}")).collect();
    let table: GameTable = serde_json::from_value(json!({
        "game": "oot",
        "start": ["A0"],
        "items": items,
        "areas": areas,
        "pool": pool,
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

fn random_placement(world: &World, rng: &mut StdRng) -> ItemPlacement {
    let mut items: Vec<usize> = world
        .checks()
        .iter()
        .map(|c| world.item_id(&c.item).unwrap())
        .collect();
    items.shuffle(rng);
    let mut placement = ItemPlacement::default();
    for (check, item) in items.into_iter().enumerate() {
        placement.insert(Location::new(0, check), PlayerItem { player: 0, item });
    }
    placement
}

fn run(pathfinder: &Pathfinder, options: &PathfinderOptions) -> PathfinderState {
    pathfinder.run(Some(&["OOT A0"]), options).unwrap()
}

fn reached(state: &PathfinderState) -> BTreeSet<Location> {
    state.reached_locations().collect()
}

fn events_within(before: &PathfinderState, after: &PathfinderState) -> bool {
    before.worlds[0]
        .global
        .events
        .iter()
        .zip(&after.worlds[0].global.events)
        .all(|(&b, &a)| !b || a)
}

#[test]
fn test_starting_items_monotonic() {
    for seed in 0..SEEDS {
        let world = random_world(seed);
        let pathfinder = pathfinder(&world);
        let mut rng = StdRng::seed_from_u64(seed + 1000);
        let items = random_placement(&world, &mut rng);
        let base = PathfinderOptions {
            items: Some(&items),
            recursive: true,
            ..Default::default()
        };
        let mut starting = StartingItems::new(1);
        for _ in 0..rng.gen_range(1..=3) {
            let name = format!("OOT_I{}", rng.gen_range(0..ITEMS));
            starting.add_item(0, world.item_id(&name).unwrap(), 1);
        }
        let more = PathfinderOptions {
            starting_items: Some(&starting),
            ..base.clone()
        };
        let before = run(&pathfinder, &base);
        let after = run(&pathfinder, &more);
        assert!(
            reached(&before).is_subset(&reached(&after)),
            "seed {seed}: starting items lost locations"
        );
        assert!(events_within(&before, &after), "seed {seed}: starting items lost events");

        // A single pass never reaches more than the full fixpoint.
        let single = run(
            &pathfinder,
            &PathfinderOptions {
                recursive: false,
                ..base.clone()
            },
        );
        assert!(reached(&single).is_subset(&reached(&before)), "seed {seed}");
        assert!(single.spheres.len() <= 1, "seed {seed}");
    }
}

#[test]
fn test_forbidden_monotonic() {
    for seed in 0..SEEDS {
        let world = random_world(seed);
        let pathfinder = pathfinder(&world);
        let mut rng = StdRng::seed_from_u64(seed + 2000);
        let items = random_placement(&world, &mut rng);
        let base = PathfinderOptions {
            items: Some(&items),
            recursive: true,
            ..Default::default()
        };
        let full = reached(&run(&pathfinder, &base));
        for &loc in &full {
            let options = PathfinderOptions {
                forbidden_locations: [loc].into_iter().collect::<HashSet<_>>(),
                ..base.clone()
            };
            let without = reached(&run(&pathfinder, &options));
            assert!(!without.contains(&loc), "seed {seed}: forbidden {loc:?} reached");
            assert!(without.is_subset(&full), "seed {seed}: forbidding {loc:?} gained locations");
        }
    }
}

#[test]
fn test_deterministic_spheres() {
    for seed in 0..SEEDS {
        let world = random_world(seed);
        let mut rng = StdRng::seed_from_u64(seed + 3000);
        let items = random_placement(&world, &mut rng);
        let options = PathfinderOptions {
            items: Some(&items),
            recursive: true,
            gossips: true,
            ..Default::default()
        };
        let first = run(&pathfinder(&world), &options);
        let second = run(&pathfinder(&world), &options);
        assert_eq!(first, second, "seed {seed}");

        // Rebuilding the world from the same tables interns the same ids.
        let rebuilt = run(&pathfinder(&random_world(seed)), &options);
        assert_eq!(first, rebuilt, "seed {seed}");

        // Spheres partition the reached locations.
        let mut seen = BTreeSet::new();
        for sphere in &first.spheres {
            assert!(!sphere.is_empty(), "seed {seed}: empty sphere");
            for &loc in sphere {
                assert!(seen.insert(loc), "seed {seed}: {loc:?} in two spheres");
            }
        }
        assert_eq!(seen, reached(&first), "seed {seed}");
    }
}

#[test]
fn test_concurrent_runs() {
    let world = random_world(7);
    let pathfinder = pathfinder(&world);
    let placements: Vec<ItemPlacement> = (0..32)
        .map(|i| random_placement(&world, &mut StdRng::seed_from_u64(i)))
        .collect();
    let run_placement = |items: &ItemPlacement| {
        run(
            &pathfinder,
            &PathfinderOptions {
                items: Some(items),
                recursive: true,
                ..Default::default()
            },
        )
    };
    let sequential: Vec<PathfinderState> = placements.iter().map(run_placement).collect();
    let parallel: Vec<PathfinderState> = placements.par_iter().map(run_placement).collect();
    assert_eq!(sequential, parallel);
}
