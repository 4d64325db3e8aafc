//! Immutable, hashable snapshots of document values
//!
//! Queries compare document fields against [`Frozen`] operands and use
//! them inside their lookup keys, which is what makes a query usable as a
//! cache key. Freezing is structural: objects become [`FrozenMap`]s,
//! arrays become sequences and scalars are copied. JSON values are owned
//! trees, so a value can never contain itself and freezing always
//! terminates.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Number, Value};

/// Frozen number; integral values are always stored as `Int` so that
/// `1` and `1.0` freeze to the same thing
#[derive(Debug, Clone, Copy)]
pub enum FrozenNumber {
    /// Integral value
    Int(i64),
    /// Non-integral (or out of `i64` range) value
    Float(f64),
}

impl FrozenNumber {
    fn from_f64(f: f64) -> Self {
        // i64::MAX as f64 rounds up to 2^63, which is out of range
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
            FrozenNumber::Int(f as i64)
        } else {
            FrozenNumber::Float(f)
        }
    }

    fn from_json(n: &Number) -> Self {
        if let Some(i) = n.as_i64() {
            FrozenNumber::Int(i)
        } else if let Some(u) = n.as_u64() {
            FrozenNumber::Float(u as f64)
        } else {
            FrozenNumber::from_f64(n.as_f64().unwrap_or(f64::NAN))
        }
    }

    /// Value as `f64`
    pub fn as_f64(self) -> f64 {
        match self {
            FrozenNumber::Int(i) => i as f64,
            FrozenNumber::Float(f) => f,
        }
    }

    fn to_json(self) -> Value {
        match self {
            FrozenNumber::Int(i) => Value::from(i),
            FrozenNumber::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        }
    }
}

impl PartialEq for FrozenNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrozenNumber {}

impl PartialOrd for FrozenNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrozenNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        use FrozenNumber::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            // Normalisation keeps Int and Float disjoint, so ties break by kind
            (Int(a), Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)).then(Ordering::Greater),
        }
    }
}

impl Hash for FrozenNumber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            FrozenNumber::Int(i) => {
                0u8.hash(state);
                i.hash(state);
            }
            FrozenNumber::Float(f) => {
                1u8.hash(state);
                f.to_bits().hash(state);
            }
        }
    }
}

/// Immutable object: keeps insertion order for iteration, but equality,
/// ordering and hashing only look at the set of key/value pairs
///
/// There is no `&mut` API.
#[derive(Debug, Clone, Default)]
pub struct FrozenMap {
    entries: Vec<(String, Frozen)>,
}

impl FrozenMap {
    /// Build from key/value pairs; a repeated key keeps its last value
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Frozen)>,
    {
        let mut out: Vec<(String, Frozen)> = Vec::new();
        for (key, value) in entries {
            match out.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => out.push((key, value)),
            }
        }
        Self { entries: out }
    }

    /// Look up a key
    pub fn get(&self, key: &str) -> Option<&Frozen> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Frozen)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    fn sorted(&self) -> Vec<&(String, Frozen)> {
        let mut sorted: Vec<_> = self.entries.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        sorted
    }
}

impl PartialEq for FrozenMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).map_or(false, |ov| ov == v))
    }
}

impl Eq for FrozenMap {}

impl PartialOrd for FrozenMap {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrozenMap {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sorted().cmp(&other.sorted())
    }
}

impl Hash for FrozenMap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entries.len().hash(state);
        for (k, v) in self.sorted() {
            k.hash(state);
            v.hash(state);
        }
    }
}

/// Immutable, hashable mirror of a JSON value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Frozen {
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Number
    Number(FrozenNumber),
    /// String
    Str(String),
    /// Ordered sequence (from an array)
    Seq(Vec<Frozen>),
    /// Unordered set of distinct values
    Set(BTreeSet<Frozen>),
    /// Object
    Map(FrozenMap),
}

impl Frozen {
    /// Build a set from already frozen members
    pub fn set<I: IntoIterator<Item = Frozen>>(items: I) -> Self {
        Frozen::Set(items.into_iter().collect())
    }

    /// Borrow the string, if this is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Frozen::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Ordering used by `<`, `<=`, `>` and `>=` queries
    ///
    /// Only numbers, strings, booleans and sequences of those compare;
    /// anything else is unordered.
    pub fn query_cmp(&self, other: &Frozen) -> Option<Ordering> {
        match (self, other) {
            (Frozen::Number(FrozenNumber::Int(a)), Frozen::Number(FrozenNumber::Int(b))) => Some(a.cmp(b)),
            (Frozen::Number(a), Frozen::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
            (Frozen::Str(a), Frozen::Str(b)) => Some(a.cmp(b)),
            (Frozen::Bool(a), Frozen::Bool(b)) => Some(a.cmp(b)),
            (Frozen::Seq(a), Frozen::Seq(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.query_cmp(y)? {
                        Ordering::Equal => continue,
                        ord => return Some(ord),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Convert back to a mutable JSON value; sets become arrays
    pub fn thaw(&self) -> Value {
        match self {
            Frozen::Null => Value::Null,
            Frozen::Bool(b) => Value::Bool(*b),
            Frozen::Number(n) => n.to_json(),
            Frozen::Str(s) => Value::String(s.clone()),
            Frozen::Seq(items) => Value::Array(items.iter().map(Frozen::thaw).collect()),
            Frozen::Set(items) => Value::Array(items.iter().map(Frozen::thaw).collect()),
            Frozen::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), v.thaw()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

impl fmt::Display for Frozen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frozen::Set(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
            other => write!(f, "{}", other.thaw()),
        }
    }
}

/// Produce the frozen mirror of a value
pub trait Freeze {
    /// Freeze recursively
    fn freeze(&self) -> Frozen;
}

impl Freeze for Value {
    fn freeze(&self) -> Frozen {
        match self {
            Value::Null => Frozen::Null,
            Value::Bool(b) => Frozen::Bool(*b),
            Value::Number(n) => Frozen::Number(FrozenNumber::from_json(n)),
            Value::String(s) => Frozen::Str(s.clone()),
            Value::Array(items) => Frozen::Seq(items.iter().map(Freeze::freeze).collect()),
            Value::Object(map) => Frozen::Map(map.freeze_map()),
        }
    }
}

impl Freeze for Map<String, Value> {
    fn freeze(&self) -> Frozen {
        Frozen::Map(self.freeze_map())
    }
}

impl Freeze for Frozen {
    fn freeze(&self) -> Frozen {
        self.clone()
    }
}

trait FreezeMap {
    fn freeze_map(&self) -> FrozenMap;
}

impl FreezeMap for Map<String, Value> {
    fn freeze_map(&self) -> FrozenMap {
        FrozenMap::from_entries(self.iter().map(|(k, v)| (k.clone(), v.freeze())))
    }
}

/// Freeze any value
pub fn freeze<T: Freeze + ?Sized>(value: &T) -> Frozen {
    value.freeze()
}
