//! Shared deterministic types for the belief-state core.
//!
//! These types define stable contracts between the store, the operator engine,
//! and the extractor. They perform no I/O and serialize deterministically.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The two operator kinds a decision can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// σ: raise the target item's weight.
    #[serde(rename = "sigma")]
    Strengthen,
    /// δ: lower the target item's weight.
    #[serde(rename = "delta")]
    Dampen,
}

impl Operator {
    /// Keyword used in prompts, responses and result artifacts.
    pub fn keyword(self) -> &'static str {
        match self {
            Operator::Strengthen => "sigma",
            Operator::Dampen => "delta",
        }
    }

    /// Greek letters that name the operator in lower-case text. The first is
    /// the canonical symbol; sigma also has its word-final form.
    pub fn symbols(self) -> &'static [char] {
        match self {
            Operator::Strengthen => &['σ', 'ς'],
            Operator::Dampen => &['δ'],
        }
    }

    /// Both kinds, in detection precedence order.
    pub const ALL: [Operator; 2] = [Operator::Strengthen, Operator::Dampen];
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Identifier of a belief-state snapshot, unique within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(u64);

impl StateId {
    pub(crate) fn new(seq: u64) -> Self {
        Self(seq)
    }

    pub fn seq(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{:04}", self.0)
    }
}

impl Serialize for StateId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StateId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.strip_prefix('S')
            .and_then(|digits| digits.parse::<u64>().ok())
            .map(StateId)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid state id '{raw}'")))
    }
}

/// Ordered mapping from item name to weight.
///
/// Iteration order is insertion order and is part of the contract: the
/// extractor resolves ambiguous targets by this order. Serializes as a JSON
/// object with keys in the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Weights {
    items: Vec<(String, f64)>,
}

impl Weights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item. Returns `false` (and leaves the map untouched) when the
    /// name is already present.
    pub fn insert(&mut self, name: impl Into<String>, weight: f64) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.items.push((name, weight));
        true
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.items
            .iter()
            .find(|(item, _)| item == name)
            .map(|(_, weight)| *weight)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|(item, _)| item == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.items.iter().map(|(name, weight)| (name.as_str(), *weight))
    }

    pub fn sum(&self) -> f64 {
        self.items.iter().map(|(_, weight)| weight).sum()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Same names, same order, each weight replaced by `f(name, weight)`.
    pub(crate) fn map(&self, mut f: impl FnMut(&str, f64) -> f64) -> Self {
        Self {
            items: self
                .items
                .iter()
                .map(|(name, weight)| (name.clone(), f(name, *weight)))
                .collect(),
        }
    }
}

impl<N: Into<String>> FromIterator<(N, f64)> for Weights {
    /// Later duplicates are dropped; the first occurrence wins.
    fn from_iter<I: IntoIterator<Item = (N, f64)>>(iter: I) -> Self {
        let mut weights = Weights::new();
        for (name, weight) in iter {
            weights.insert(name, weight);
        }
        weights
    }
}

impl Serialize for Weights {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.items.len()))?;
        for (name, weight) in &self.items {
            map.serialize_entry(name, weight)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Weights {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WeightsVisitor;

        impl<'de> Visitor<'de> for WeightsVisitor {
            type Value = Weights;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping item names to numbers")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Weights, A::Error> {
                let mut weights = Weights::new();
                while let Some((name, weight)) = access.next_entry::<String, f64>()? {
                    if weights.contains(&name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate item '{name}'"
                        )));
                    }
                    weights.insert(name, weight);
                }
                Ok(weights)
            }
        }

        deserializer.deserialize_map(WeightsVisitor)
    }
}

/// An immutable, normalized belief-state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub id: StateId,
    pub items: Weights,
}

impl State {
    /// Item names in stored iteration order.
    pub fn item_names(&self) -> Vec<String> {
        self.items.names()
    }
}

/// A complete decision extracted from a response: operator plus target item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decision {
    pub operator: Operator,
    pub target: String,
}
