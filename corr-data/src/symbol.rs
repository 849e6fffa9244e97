use derive_more::Display;
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize};
use smol_str::{SmolStr, StrExt};
use std::borrow::Borrow;

/// Uppercase market symbol identifier (eg/ "BTCUSDT").
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Display)]
#[serde(transparent)]
pub struct Symbol(SmolStr);

impl Symbol {
    pub fn new<S: AsRef<str>>(symbol: S) -> Self {
        Self(symbol.as_ref().trim().to_uppercase_smolstr())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Lowercase form used when constructing upstream stream names.
    pub fn to_lowercase(&self) -> SmolStr {
        self.0.to_lowercase_smolstr()
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        SmolStr::deserialize(deserializer).map(Symbol::new)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

/// Canonical (sorted & deduplicated) set of [`Symbol`]s.
///
/// Used as the cache and deduplication key for subscriber views: two subscribers requesting
/// the same symbols in any order, with any repetition, map to an equal `SymbolSet`.
#[derive(Debug, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(transparent)]
pub struct SymbolSet(Vec<Symbol>);

impl SymbolSet {
    pub fn new<Iter, S>(symbols: Iter) -> Self
    where
        Iter: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        Self(
            symbols
                .into_iter()
                .map(Into::<Symbol>::into)
                .filter(|symbol| !symbol.as_str().is_empty())
                .sorted()
                .dedup()
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.0.binary_search(symbol).is_ok()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Symbol> {
        self.0.iter()
    }

    /// Comma joined representation, eg/ "BTCUSDT,ETHUSDT".
    pub fn joined(&self) -> String {
        self.0.iter().join(",")
    }
}

impl<'a> IntoIterator for &'a SymbolSet {
    type Item = &'a Symbol;
    type IntoIter = std::slice::Iter<'a, Symbol>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Symbol> for SymbolSet {
    fn from(value: Symbol) -> Self {
        Self(vec![value])
    }
}

/// Unordered pair of distinct [`Symbol`]s, stored in canonical (`a < b`) order.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display)]
#[display("{a}/{b}")]
pub struct SymbolPair {
    pub a: Symbol,
    pub b: Symbol,
}

impl SymbolPair {
    /// Construct a canonical pair, returning `None` if both symbols are equal.
    pub fn new(first: Symbol, second: Symbol) -> Option<Self> {
        match first.cmp(&second) {
            std::cmp::Ordering::Less => Some(Self { a: first, b: second }),
            std::cmp::Ordering::Greater => Some(Self { a: second, b: first }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        &self.a == symbol || &self.b == symbol
    }
}
