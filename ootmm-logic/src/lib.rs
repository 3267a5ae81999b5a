use ootmm_game::{EventId, Expr, ItemId, SettingsView, World};
use serde::{Deserialize, Serialize};

/// Item counts of one player, indexed by `ItemId` of that player's World.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub items: Vec<u32>,
}

impl Inventory {
    pub fn new(world: &World) -> Self {
        Inventory {
            items: vec![0; world.symbols().item_isv.len()],
        }
    }

    pub fn count(&self, item_id: ItemId) -> u32 {
        self.items.get(item_id).copied().unwrap_or(0)
    }

    pub fn add(&mut self, item_id: ItemId, count: u32) {
        if item_id >= self.items.len() {
            self.items.resize(item_id + 1, 0);
        }
        self.items[item_id] += count;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalState {
    pub inventory: Inventory,
    pub events: Vec<bool>,
}

impl GlobalState {
    pub fn new(world: &World) -> Self {
        GlobalState {
            inventory: Inventory::new(world),
            events: vec![false; world.symbols().event_isv.len()],
        }
    }

    pub fn collect(&mut self, item_id: ItemId) {
        self.inventory.add(item_id, 1);
    }

    pub fn set_event(&mut self, event_id: EventId) -> bool {
        let was_set = self.events[event_id];
        self.events[event_id] = true;
        !was_set
    }
}

#[derive(Copy, Clone, Debug)]
pub struct EvalContext<'a> {
    pub inventory: &'a Inventory,
    pub events: &'a [bool],
    pub settings: &'a [bool], // Indexed by SettingId
}

impl<'a> EvalContext<'a> {
    pub fn new(state: &'a GlobalState, settings: &'a [bool]) -> Self {
        EvalContext {
            inventory: &state.inventory,
            events: &state.events,
            settings,
        }
    }
}

/// Resolve every setting key interned by `world` against `settings`, so that
/// evaluation never looks up options by name.
pub fn resolve_settings(world: &World, settings: &dyn SettingsView) -> Vec<bool> {
    world
        .symbols()
        .setting_isv
        .keys
        .iter()
        .map(|key| settings.is_enabled(key))
        .collect()
}

pub fn evaluate(expr: &Expr, ctx: &EvalContext) -> bool {
    match expr {
        &Expr::Const(b) => b,
        &Expr::HasItem(item_id, count) => ctx.inventory.count(item_id) >= count,
        &Expr::HasEvent(event_id) => ctx.events.get(event_id).copied().unwrap_or(false),
        Expr::Not(e) => !evaluate(e, ctx),
        Expr::And(exprs) => exprs.iter().all(|e| evaluate(e, ctx)),
        Expr::Or(exprs) => exprs.iter().any(|e| evaluate(e, ctx)),
        &Expr::AtLeast(count, ref exprs) => {
            if count == 0 {
                return true;
            }
            let mut found = 0;
            for e in exprs {
                if evaluate(e, ctx) {
                    found += 1;
                    if found >= count {
                        return true;
                    }
                }
            }
            false
        }
        &Expr::Setting(setting_id) => ctx.settings.get(setting_id).copied().unwrap_or(false),
    }
}

pub trait Evaluate {
    fn evaluate(&self, ctx: &EvalContext) -> bool;
}

impl Evaluate for Expr {
    fn evaluate(&self, ctx: &EvalContext) -> bool {
        evaluate(self, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory(counts: &[u32]) -> Inventory {
        Inventory {
            items: counts.to_vec(),
        }
    }

    #[test]
    fn test_evaluate() {
        let inv = inventory(&[1, 0, 3]);
        let events = [false, true];
        let settings = [true, false];
        let ctx = EvalContext {
            inventory: &inv,
            events: &events,
            settings: &settings,
        };
        assert!(Expr::HasItem(0, 1).evaluate(&ctx));
        assert!(!Expr::HasItem(1, 1).evaluate(&ctx));
        assert!(Expr::HasItem(2, 3).evaluate(&ctx));
        assert!(!Expr::HasItem(2, 4).evaluate(&ctx));
        // Items the inventory has never seen count as zero:
        assert!(!Expr::HasItem(10, 1).evaluate(&ctx));
        assert!(Expr::HasEvent(1).evaluate(&ctx));
        assert!(!Expr::HasEvent(0).evaluate(&ctx));
        assert!(Expr::Setting(0).evaluate(&ctx));
        assert!(!Expr::Setting(1).evaluate(&ctx));
        assert!(Expr::Not(Box::new(Expr::Setting(1))).evaluate(&ctx));
        assert!(Expr::And(vec![]).evaluate(&ctx));
        assert!(!Expr::Or(vec![]).evaluate(&ctx));
        assert!(Expr::Or(vec![Expr::HasItem(1, 1), Expr::HasEvent(1)]).evaluate(&ctx));
        assert!(!Expr::And(vec![Expr::HasItem(0, 1), Expr::HasEvent(0)]).evaluate(&ctx));
    }

    #[test]
    fn test_at_least() {
        let inv = inventory(&[1, 0, 1, 1]);
        let ctx = EvalContext {
            inventory: &inv,
            events: &[],
            settings: &[],
        };
        let items: Vec<Expr> = (0..4).map(|i| Expr::HasItem(i, 1)).collect();
        assert!(Expr::AtLeast(0, vec![]).evaluate(&ctx));
        assert!(Expr::AtLeast(3, items.clone()).evaluate(&ctx));
        assert!(!Expr::AtLeast(4, items.clone()).evaluate(&ctx));
        assert!(Expr::AtLeast(2, items[..3].to_vec()).evaluate(&ctx));
        assert!(!Expr::AtLeast(2, items[..2].to_vec()).evaluate(&ctx));
    }

    #[test]
    fn test_inventory_add() {
        let mut inv = Inventory::default();
        inv.add(2, 1);
        inv.add(2, 2);
        assert_eq!(inv.count(2), 3);
        assert_eq!(inv.count(0), 0);
        assert_eq!(inv.items.len(), 3);
    }
}
