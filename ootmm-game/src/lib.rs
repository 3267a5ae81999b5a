pub mod error;
pub mod expr_parser;
pub mod lexer;
pub mod world;

pub use crate::error::{LogicError, SymbolKind};
pub use crate::expr_parser::{ExprParser, Macro, MAX_MACRO_DEPTH};
pub use crate::world::{
    build_world, Area, Check, CheckKind, Constraint, GameTable, NumericCheckKind,
    PlacementConstraint, PointOfInterest, PointOfInterestKind, SymbolicCheckKind, World,
};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::borrow::ToOwned;
use std::hash::Hash;
use strum_macros::{Display, EnumString, VariantNames};

pub type AreaId = usize; // Index into World area table: namespaced area names
pub type CheckId = usize; // Index into World check table: namespaced location (slot) names
pub type GossipId = usize; // Index into World point-of-interest table
pub type ItemId = usize; // Index into Symbols.item_isv: namespaced item names
pub type EventId = usize; // Index into Symbols.event_isv: namespaced event names
pub type SettingId = usize; // Index into Symbols.setting_isv: (setting name, optional value) pairs
pub type WorldId = usize; // Player number; index into the list of Worlds being solved together

/// Tag carried by items that belong to both games.
pub const SHARED_TAG: &str = "SHARED";

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Game {
    Oot,
    Mm,
}

impl Game {
    pub const ALL: [Game; 2] = [Game::Oot, Game::Mm];

    pub fn tag(self) -> &'static str {
        match self {
            Game::Oot => "OOT",
            Game::Mm => "MM",
        }
    }

    /// Prefix `name` with this game's tag, unless it already carries a tag
    /// (of either game, or the shared tag) followed by `sep`.
    pub fn namespaced(self, name: &str, sep: char) -> String {
        if is_namespaced(name, sep) {
            name.to_string()
        } else {
            format!("{}{}{}", self.tag(), sep, name)
        }
    }
}

pub fn is_namespaced(name: &str, sep: char) -> bool {
    Game::ALL
        .iter()
        .map(|g| g.tag())
        .chain(std::iter::once(SHARED_TAG))
        .any(|tag| {
            name.strip_prefix(tag)
                .and_then(|rest| rest.strip_prefix(sep))
                .is_some()
        })
}

#[derive(Default, Clone, Debug)]
pub struct IndexedVec<T: Hash + Eq> {
    pub keys: Vec<T>,
    pub index_by_key: HashMap<T, usize>,
}

impl<T: Hash + Eq> IndexedVec<T> {
    pub fn add<U: ToOwned<Owned = T> + ?Sized>(&mut self, name: &U) -> usize {
        if !self.index_by_key.contains_key(&name.to_owned()) {
            let idx = self.keys.len();
            self.index_by_key.insert(name.to_owned(), self.keys.len());
            self.keys.push(name.to_owned());
            idx
        } else {
            self.index_by_key[&name.to_owned()]
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<usize>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index_by_key.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Default, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SettingKey {
    pub name: String,
    pub value: Option<String>,
}

/// Interned identifiers referenced by requirement expressions.
#[derive(Default, Clone, Debug)]
pub struct Symbols {
    pub item_isv: IndexedVec<String>,
    pub event_isv: IndexedVec<String>,
    pub setting_isv: IndexedVec<SettingKey>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Str(String),
}

/// Read-only view of the options a World is built and solved under.
pub trait SettingsView {
    fn value(&self, name: &str) -> Option<&SettingValue>;

    fn knows(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    /// `setting(x)` reads a boolean option; `setting(x, v)` compares an enum option to `v`.
    fn is_enabled(&self, key: &SettingKey) -> bool {
        match (self.value(&key.name), &key.value) {
            (Some(SettingValue::Bool(b)), None) => *b,
            (Some(SettingValue::Bool(b)), Some(v)) => b.to_string() == *v,
            (Some(SettingValue::Str(s)), Some(v)) => s == v,
            (Some(SettingValue::Str(_)), None) => false,
            (None, _) => false,
        }
    }
}

impl SettingsView for HashMap<String, SettingValue> {
    fn value(&self, name: &str) -> Option<&SettingValue> {
        self.get(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Const(bool),
    HasItem(ItemId, u32),
    HasEvent(EventId),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    AtLeast(u32, Vec<Expr>),
    Setting(SettingId),
}

impl Expr {
    pub fn make_and(exprs: Vec<Expr>) -> Expr {
        let mut out_exprs: Vec<Expr> = vec![];
        for expr in exprs {
            if let Expr::Const(false) = expr {
                return Expr::Const(false);
            } else if let Expr::Const(true) = expr {
                continue;
            } else if let Expr::And(and_exprs) = expr {
                out_exprs.extend(and_exprs);
            } else {
                out_exprs.push(expr);
            }
        }
        match out_exprs.len() {
            0 => Expr::Const(true),
            1 => out_exprs.swap_remove(0),
            _ => Expr::And(out_exprs),
        }
    }

    pub fn make_or(exprs: Vec<Expr>) -> Expr {
        let mut out_exprs: Vec<Expr> = vec![];
        for expr in exprs {
            if let Expr::Const(false) = expr {
                continue;
            } else if let Expr::Const(true) = expr {
                return Expr::Const(true);
            } else if let Expr::Or(or_exprs) = expr {
                out_exprs.extend(or_exprs);
            } else {
                out_exprs.push(expr);
            }
        }
        match out_exprs.len() {
            0 => Expr::Const(false),
            1 => out_exprs.swap_remove(0),
            _ => Expr::Or(out_exprs),
        }
    }

    pub fn make_not(expr: Expr) -> Expr {
        match expr {
            Expr::Const(b) => Expr::Const(!b),
            other => Expr::Not(Box::new(other)),
        }
    }

    pub fn make_at_least(count: u32, exprs: Vec<Expr>) -> Expr {
        if count == 0 {
            Expr::Const(true)
        } else if count as usize > exprs.len() {
            Expr::Const(false)
        } else if count == 1 {
            Expr::make_or(exprs)
        } else if count as usize == exprs.len() {
            Expr::make_and(exprs)
        } else {
            Expr::AtLeast(count, exprs)
        }
    }

    /// Render the expression with interned ids replaced by their names.
    pub fn describe(&self, symbols: &Symbols) -> String {
        let join = |exprs: &[Expr], sep: &str| {
            exprs
                .iter()
                .map(|e| e.describe(symbols))
                .collect::<Vec<String>>()
                .join(sep)
        };
        match self {
            Expr::Const(b) => b.to_string(),
            &Expr::HasItem(item_id, 1) => symbols.item_isv.keys[item_id].clone(),
            &Expr::HasItem(item_id, count) => {
                format!("has({}, {})", symbols.item_isv.keys[item_id], count)
            }
            &Expr::HasEvent(event_id) => format!("event({})", symbols.event_isv.keys[event_id]),
            Expr::Not(e) => format!("!{}", e.describe(symbols)),
            Expr::And(exprs) => format!("({})", join(exprs, " & ")),
            Expr::Or(exprs) => format!("({})", join(exprs, " | ")),
            Expr::AtLeast(count, exprs) => format!("at_least({}, {})", count, join(exprs, ", ")),
            &Expr::Setting(setting_id) => {
                let key = &symbols.setting_isv.keys[setting_id];
                match &key.value {
                    Some(v) => format!("setting({}, {})", key.name, v),
                    None => format!("setting({})", key.name),
                }
            }
        }
    }
}
