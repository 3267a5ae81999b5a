use std::collections::BTreeSet;

use ootmm_game::World;
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{Analysis, AnalysisPathKind},
    hints::{Hint, HintContext},
    traverse::{ItemPlacement, Location},
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SpoilerLocation {
    pub world: usize,
    pub location: String,
    pub scene: String,
    pub item: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SpoilerPath {
    #[serde(flatten)]
    pub kind: AnalysisPathKind,
    pub locations: Vec<SpoilerLocation>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SpoilerHint {
    pub world: usize,
    pub gossip: String,
    #[serde(flatten)]
    pub hint: Hint,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SpoilerLog {
    pub spheres: Vec<Vec<SpoilerLocation>>,
    pub required: Vec<SpoilerLocation>,
    pub unreachable: Vec<SpoilerLocation>,
    pub paths: Vec<SpoilerPath>,
    pub hints: Vec<SpoilerHint>,
}

fn get_spoiler_location(worlds: &[World], items: &ItemPlacement, loc: Location) -> SpoilerLocation {
    let check = worlds[loc.world].check(loc.check);
    let item = items
        .get(&loc)
        .map(|pi| worlds[pi.player].item_name(pi.item).to_string());
    SpoilerLocation {
        world: loc.world,
        location: check.name.clone(),
        scene: check.scene.clone(),
        item,
    }
}

fn get_spoiler_locations<'a>(
    worlds: &[World],
    items: &ItemPlacement,
    locs: impl IntoIterator<Item = &'a Location>,
) -> Vec<SpoilerLocation> {
    locs.into_iter()
        .map(|&loc| get_spoiler_location(worlds, items, loc))
        .collect()
}

pub fn get_spoiler_log(
    worlds: &[World],
    items: &ItemPlacement,
    analysis: &Analysis,
    hints: Option<&HintContext>,
) -> SpoilerLog {
    let spheres = analysis
        .spheres
        .iter()
        .map(|sphere| get_spoiler_locations(worlds, items, sphere))
        .collect();
    let paths = analysis
        .paths
        .iter()
        .map(|p| SpoilerPath {
            kind: p.kind.clone(),
            locations: get_spoiler_locations(worlds, items, &p.locations),
        })
        .collect();
    let mut spoiler_hints: Vec<SpoilerHint> = vec![];
    if let Some(ctx) = hints {
        for (world_id, gossips) in ctx.gossips.iter().enumerate() {
            for (&gossip_id, hint) in gossips {
                spoiler_hints.push(SpoilerHint {
                    world: world_id,
                    gossip: worlds[world_id].gossip(gossip_id).name.clone(),
                    hint: hint.clone(),
                });
            }
        }
    }
    SpoilerLog {
        spheres,
        required: get_spoiler_locations(worlds, items, &analysis.required),
        unreachable: get_spoiler_locations(worlds, items, &analysis.unreachable),
        paths,
        hints: spoiler_hints,
    }
}

/// Names of the locations of a spoiler entry list, for quick comparisons.
pub fn location_names(locs: &[SpoilerLocation]) -> BTreeSet<String> {
    locs.iter().map(|l| l.location.clone()).collect()
}
