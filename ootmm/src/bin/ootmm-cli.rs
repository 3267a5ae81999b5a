use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use ootmm::analysis::{settings_goal, Analysis};
use ootmm::hints::{place_hero_hints, HintContext};
use ootmm::settings::{item_constraint, load_settings};
use ootmm::spoiler_log::get_spoiler_log;
use ootmm::traverse::{ItemPlacement, Location, Pathfinder, StartingItems};
use ootmm_game::{build_world, GameTable};
use rand::{RngCore, SeedableRng};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
struct Args {
    #[arg(long, required = true, num_args = 1..)]
    world: Vec<PathBuf>,

    #[arg(long)]
    settings: PathBuf,

    #[arg(long)]
    placement: Option<PathBuf>,

    #[arg(long)]
    random_seed: Option<usize>,

    #[arg(long)]
    output_spoiler_log: Option<PathBuf>,
}

fn load_placement(path: &Path) -> Result<BTreeMap<String, String>> {
    let placement_str = std::fs::read_to_string(path)
        .with_context(|| format!("Unable to read placement at {}", path.display()))?;
    let placement = serde_json::from_str(&placement_str)
        .with_context(|| format!("Unable to parse placement at {}", path.display()))?;
    Ok(placement)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let settings = load_settings(&args.settings)?;
    let tables = args
        .world
        .iter()
        .map(|p| GameTable::load(p))
        .collect::<Result<Vec<GameTable>>>()?;
    let world = build_world(&tables, &settings, &item_constraint).context("Unable to build world")?;
    let worlds = vec![world; settings.players];

    let items = match &args.placement {
        Some(path) => {
            let names = load_placement(path)?;
            let per_player = vec![names; settings.players];
            ItemPlacement::from_names(&worlds, &per_player)?
        }
        None => ItemPlacement::vanilla(&worlds),
    };
    info!("Placement: {} items", items.items.len());

    let goal = settings_goal(&worlds, &settings)?;
    let pathfinder = Pathfinder::new(
        worlds.clone(),
        &settings,
        StartingItems::new(settings.players),
    )?
    .with_goal(goal);
    let analysis = Analysis::run(&pathfinder, &items, &settings)?;
    info!(
        "Spheres: {}, required: {}, unreachable: {}",
        analysis.spheres.len(),
        analysis.required.len(),
        analysis.unreachable.len()
    );

    let mut hint_context = HintContext::new(settings.players);
    if settings.hero_hints > 0 {
        let root_seed = match args.random_seed {
            Some(s) => s,
            None => (rand::rngs::StdRng::from_entropy().next_u64() & 0xFFFFFFFF) as usize,
        };
        let mut rng_seed = [0u8; 32];
        rng_seed[..8].copy_from_slice(&root_seed.to_le_bytes());
        let mut rng = rand::rngs::StdRng::from_seed(rng_seed);
        let required: Vec<Location> = analysis.required.iter().copied().collect();
        for world_id in 0..settings.players {
            let placed = place_hero_hints(
                &pathfinder,
                &items,
                &required,
                &mut hint_context,
                world_id,
                settings.hero_hints,
                &mut rng,
            )?;
            info!("World {world_id}: placed {placed} hero hints (seed={root_seed})");
        }
    }

    if let Some(output_spoiler_log_path) = &args.output_spoiler_log {
        println!(
            "Writing spoiler log to {}",
            output_spoiler_log_path.display()
        );
        let spoiler_log = get_spoiler_log(&worlds, &items, &analysis, Some(&hint_context));
        let spoiler_str = serde_json::to_string_pretty(&spoiler_log)?;
        std::fs::write(output_spoiler_log_path, spoiler_str)?;
    }

    Ok(())
}
