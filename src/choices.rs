//! Choice maps
//!
//! A [`ChoiceMap`] records the values of random choices keyed by address. It
//! is the common currency of the whole library: traces expose one, constraint
//! sets are one, and `update` reports its discarded values as one. Entries at
//! hierarchical addresses are stored as nested sub-maps.

use std::collections::BTreeMap;

use crate::address::Address;
use crate::error::ChoiceError;

/// A recorded value of a single random choice
#[derive(Clone, Debug, PartialEq)]
pub enum ChoiceValue {
    F64(f64),
    Bool(bool),
    I64(i64),
    Usize(usize),
}

impl ChoiceValue {
    /// Name of the contained type, used in mismatch errors
    pub fn type_name(&self) -> &'static str {
        match self {
            ChoiceValue::F64(_) => "f64",
            ChoiceValue::Bool(_) => "bool",
            ChoiceValue::I64(_) => "i64",
            ChoiceValue::Usize(_) => "usize",
        }
    }
}

/// Conversion between native Rust values and [`ChoiceValue`]
pub trait ChoiceCompat: Sized + Clone {
    fn into_choice(self) -> ChoiceValue;
    fn from_choice(value: &ChoiceValue) -> Option<Self>;
    fn type_name() -> &'static str;
}

impl ChoiceCompat for f64 {
    fn into_choice(self) -> ChoiceValue {
        ChoiceValue::F64(self)
    }
    fn from_choice(value: &ChoiceValue) -> Option<Self> {
        match value {
            ChoiceValue::F64(v) => Some(*v),
            _ => None,
        }
    }
    fn type_name() -> &'static str {
        "f64"
    }
}

impl ChoiceCompat for bool {
    fn into_choice(self) -> ChoiceValue {
        ChoiceValue::Bool(self)
    }
    fn from_choice(value: &ChoiceValue) -> Option<Self> {
        match value {
            ChoiceValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
    fn type_name() -> &'static str {
        "bool"
    }
}

impl ChoiceCompat for i64 {
    fn into_choice(self) -> ChoiceValue {
        ChoiceValue::I64(self)
    }
    fn from_choice(value: &ChoiceValue) -> Option<Self> {
        match value {
            ChoiceValue::I64(v) => Some(*v),
            _ => None,
        }
    }
    fn type_name() -> &'static str {
        "i64"
    }
}

impl ChoiceCompat for usize {
    fn into_choice(self) -> ChoiceValue {
        ChoiceValue::Usize(self)
    }
    fn from_choice(value: &ChoiceValue) -> Option<Self> {
        match value {
            ChoiceValue::Usize(v) => Some(*v),
            _ => None,
        }
    }
    fn type_name() -> &'static str {
        "usize"
    }
}

/// One entry of a choice map: a leaf value or a nested sub-map
#[derive(Clone, Debug, PartialEq)]
pub enum ChoiceEntry {
    Value(ChoiceValue),
    Sub(ChoiceMap),
}

/// An address-keyed mapping of recorded random choices.
///
/// Keys at each level are single address components; hierarchical addresses
/// descend through nested sub-maps. Iteration order is the address order
/// (`BTreeMap` underneath).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChoiceMap {
    entries: BTreeMap<Address, ChoiceEntry>,
}

impl ChoiceMap {
    /// Create an empty choice map
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from `(address, value)` pairs, rejecting conflicts
    pub fn from_pairs<I>(pairs: I) -> Result<Self, ChoiceError>
    where
        I: IntoIterator<Item = (Address, ChoiceValue)>,
    {
        let mut map = ChoiceMap::new();
        for (addr, value) in pairs {
            map.insert(addr, value)?;
        }
        Ok(map)
    }

    /// Whether the map holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of leaf values, counted through nested sub-maps
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .map(|e| match e {
                ChoiceEntry::Value(_) => 1,
                ChoiceEntry::Sub(sub) => sub.len(),
            })
            .sum()
    }

    /// Insert a leaf value, creating intermediate sub-maps as needed.
    ///
    /// Fails with [`ChoiceError::AddressConflict`] if the address (or one of
    /// its prefixes) is already bound.
    pub fn insert(&mut self, addr: Address, value: ChoiceValue) -> Result<(), ChoiceError> {
        match addr {
            Address::Pair(head, rest) => {
                let entry = self
                    .entries
                    .entry((*head).clone())
                    .or_insert_with(|| ChoiceEntry::Sub(ChoiceMap::new()));
                match entry {
                    ChoiceEntry::Sub(sub) => sub
                        .insert(*rest, value)
                        .map_err(|e| e.prefixed(&head)),
                    ChoiceEntry::Value(_) => Err(ChoiceError::AddressConflict(*head)),
                }
            }
            leaf => {
                if self.entries.contains_key(&leaf) {
                    return Err(ChoiceError::AddressConflict(leaf));
                }
                self.entries.insert(leaf, ChoiceEntry::Value(value));
                Ok(())
            }
        }
    }

    /// Insert a whole sub-map under an address, rejecting conflicts
    pub fn insert_sub(&mut self, addr: Address, sub: ChoiceMap) -> Result<(), ChoiceError> {
        match addr {
            Address::Pair(head, rest) => {
                let entry = self
                    .entries
                    .entry((*head).clone())
                    .or_insert_with(|| ChoiceEntry::Sub(ChoiceMap::new()));
                match entry {
                    ChoiceEntry::Sub(inner) => inner
                        .insert_sub(*rest, sub)
                        .map_err(|e| e.prefixed(&head)),
                    ChoiceEntry::Value(_) => Err(ChoiceError::AddressConflict(*head)),
                }
            }
            leaf => {
                if self.entries.contains_key(&leaf) {
                    return Err(ChoiceError::AddressConflict(leaf));
                }
                self.entries.insert(leaf, ChoiceEntry::Sub(sub));
                Ok(())
            }
        }
    }

    /// Replace the sub-map under a single component, no questions asked.
    /// Only used where the caller controls key uniqueness.
    pub(crate) fn set_sub(&mut self, component: Address, sub: ChoiceMap) {
        self.entries.insert(component, ChoiceEntry::Sub(sub));
    }

    /// Look up a leaf value, failing with [`ChoiceError::AddressNotFound`]
    pub fn value_at(&self, addr: &Address) -> Result<&ChoiceValue, ChoiceError> {
        match addr {
            Address::Pair(head, rest) => match self.entries.get(head.as_ref()) {
                Some(ChoiceEntry::Sub(sub)) => {
                    sub.value_at(rest).map_err(|e| e.prefixed(head))
                }
                _ => Err(ChoiceError::AddressNotFound(addr.clone())),
            },
            leaf => match self.entries.get(leaf) {
                Some(ChoiceEntry::Value(v)) => Ok(v),
                _ => Err(ChoiceError::AddressNotFound(leaf.clone())),
            },
        }
    }

    /// Look up a leaf value, `None` if absent
    pub fn get(&self, addr: &Address) -> Option<&ChoiceValue> {
        self.value_at(addr).ok()
    }

    /// Whether a leaf value is recorded at the address
    pub fn has(&self, addr: &Address) -> bool {
        self.get(addr).is_some()
    }

    /// Look up a leaf value and convert it to a native type
    pub fn typed<V: ChoiceCompat>(&self, addr: &Address) -> Result<V, ChoiceError> {
        let raw = self.value_at(addr)?;
        V::from_choice(raw).ok_or_else(|| ChoiceError::TypeMismatch {
            address: addr.clone(),
            expected: V::type_name(),
            actual: raw.type_name(),
        })
    }

    /// The sub-map rooted at an address, `None` if absent or a leaf
    pub fn sub_at(&self, addr: &Address) -> Option<&ChoiceMap> {
        match addr {
            Address::Pair(head, rest) => match self.entries.get(head.as_ref())? {
                ChoiceEntry::Sub(sub) => sub.sub_at(rest),
                ChoiceEntry::Value(_) => None,
            },
            leaf => match self.entries.get(leaf)? {
                ChoiceEntry::Sub(sub) => Some(sub),
                ChoiceEntry::Value(_) => None,
            },
        }
    }

    /// Iterate the immediate entries of this map without descending
    pub fn top_level(&self) -> impl Iterator<Item = (&Address, &ChoiceEntry)> {
        self.entries.iter()
    }

    /// Merge with another map, failing on any overlapping address
    pub fn merge(&self, other: &ChoiceMap) -> Result<ChoiceMap, ChoiceError> {
        let mut out = self.clone();
        out.merge_from(other)?;
        Ok(out)
    }

    fn merge_from(&mut self, other: &ChoiceMap) -> Result<(), ChoiceError> {
        for (key, entry) in &other.entries {
            match self.entries.get_mut(key) {
                None => {
                    self.entries.insert(key.clone(), entry.clone());
                }
                Some(ChoiceEntry::Sub(mine)) => match entry {
                    ChoiceEntry::Sub(theirs) => {
                        mine.merge_from(theirs).map_err(|e| e.prefixed(key))?
                    }
                    ChoiceEntry::Value(_) => {
                        return Err(ChoiceError::AddressConflict(key.clone()))
                    }
                },
                Some(ChoiceEntry::Value(_)) => {
                    return Err(ChoiceError::AddressConflict(key.clone()))
                }
            }
        }
        Ok(())
    }

    /// Flattened `(address, value)` pairs in address order
    pub fn iter(&self) -> impl Iterator<Item = (Address, &ChoiceValue)> {
        self.flatten().into_iter()
    }

    /// All leaf addresses in address order
    pub fn addresses(&self) -> Vec<Address> {
        self.flatten().into_iter().map(|(a, _)| a).collect()
    }

    fn flatten(&self) -> Vec<(Address, &ChoiceValue)> {
        let mut out = Vec::new();
        for (key, entry) in &self.entries {
            match entry {
                ChoiceEntry::Value(v) => out.push((key.clone(), v)),
                ChoiceEntry::Sub(sub) => {
                    for (rest, v) in sub.flatten() {
                        out.push((Address::pair(key.clone(), rest), v));
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr;

    #[test]
    fn test_insert_and_lookup() {
        let mut map = ChoiceMap::new();
        map.insert(addr!("x"), ChoiceValue::F64(1.5)).unwrap();
        map.insert(addr!(2usize, "y"), ChoiceValue::Bool(true)).unwrap();

        assert_eq!(map.value_at(&addr!("x")).unwrap(), &ChoiceValue::F64(1.5));
        assert_eq!(
            map.value_at(&addr!(2usize, "y")).unwrap(),
            &ChoiceValue::Bool(true)
        );
        assert!(map.has(&addr!("x")));
        assert!(!map.has(&addr!("z")));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_lookup_missing_is_error() {
        let map = ChoiceMap::new();
        assert_eq!(
            map.value_at(&addr!("x")),
            Err(ChoiceError::AddressNotFound(addr!("x")))
        );
    }

    #[test]
    fn test_insert_conflict() {
        let mut map = ChoiceMap::new();
        map.insert(addr!("x"), ChoiceValue::F64(1.0)).unwrap();
        assert_eq!(
            map.insert(addr!("x"), ChoiceValue::F64(2.0)),
            Err(ChoiceError::AddressConflict(addr!("x")))
        );
        // a leaf also blocks sub-addresses beneath it
        assert_eq!(
            map.insert(addr!("x", "y"), ChoiceValue::F64(2.0)),
            Err(ChoiceError::AddressConflict(addr!("x")))
        );
    }

    #[test]
    fn test_typed_lookup() {
        let mut map = ChoiceMap::new();
        map.insert(addr!("x"), ChoiceValue::F64(2.5)).unwrap();

        let v: f64 = map.typed(&addr!("x")).unwrap();
        assert_eq!(v, 2.5);

        let err = map.typed::<bool>(&addr!("x")).unwrap_err();
        assert!(matches!(err, ChoiceError::TypeMismatch { .. }));
    }

    #[test]
    fn test_merge_disjoint() {
        let a = ChoiceMap::from_pairs(vec![
            (addr!("x"), ChoiceValue::F64(1.0)),
            (addr!(1usize, "y"), ChoiceValue::F64(2.0)),
        ])
        .unwrap();
        let b = ChoiceMap::from_pairs(vec![
            (addr!("z"), ChoiceValue::F64(3.0)),
            (addr!(1usize, "w"), ChoiceValue::F64(4.0)),
        ])
        .unwrap();

        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.len(), 4);
        assert!(merged.has(&addr!(1usize, "y")));
        assert!(merged.has(&addr!(1usize, "w")));
    }

    #[test]
    fn test_merge_conflict() {
        let a = ChoiceMap::from_pairs(vec![(addr!(1usize, "y"), ChoiceValue::F64(2.0))]).unwrap();
        let b = ChoiceMap::from_pairs(vec![(addr!(1usize, "y"), ChoiceValue::F64(9.0))]).unwrap();
        assert_eq!(
            a.merge(&b),
            Err(ChoiceError::AddressConflict(addr!(1usize, "y")))
        );
    }

    #[test]
    fn test_iter_flattens_in_order() {
        let map = ChoiceMap::from_pairs(vec![
            (addr!("b"), ChoiceValue::F64(2.0)),
            (addr!("a"), ChoiceValue::F64(1.0)),
            (addr!(1usize, "y"), ChoiceValue::F64(3.0)),
        ])
        .unwrap();

        let addrs: Vec<String> = map.iter().map(|(a, _)| a.to_string()).collect();
        assert_eq!(addrs, vec!["a", "b", "1/y"]);
    }

    #[test]
    fn test_sub_at() {
        let map = ChoiceMap::from_pairs(vec![
            (addr!(1usize, "y"), ChoiceValue::F64(3.0)),
            (addr!(1usize, "x"), ChoiceValue::F64(4.0)),
        ])
        .unwrap();

        let sub = map.sub_at(&addr!(1usize)).unwrap();
        assert_eq!(sub.len(), 2);
        assert!(map.sub_at(&addr!(2usize)).is_none());
    }

    #[test]
    fn test_insert_sub() {
        let inner =
            ChoiceMap::from_pairs(vec![(addr!("y"), ChoiceValue::F64(3.0))]).unwrap();
        let mut map = ChoiceMap::new();
        map.insert_sub(addr!(1usize), inner.clone()).unwrap();
        assert_eq!(map.value_at(&addr!(1usize, "y")).unwrap(), &ChoiceValue::F64(3.0));

        assert_eq!(
            map.insert_sub(addr!(1usize), inner),
            Err(ChoiceError::AddressConflict(addr!(1usize)))
        );
    }
}
