//! Value types shared across the engine: node state labels, agent labels and
//! node-to-value assignments (observation contexts and interventions).

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A numeric state label of a discrete node.
///
/// States are compared with `f64::total_cmp`, so a state list can be sorted,
/// deduplicated and used as a hash key. Negative zero is folded into positive
/// zero on construction so `-0.0` and `0.0` label the same state.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateValue(f64);

impl StateValue {
    pub fn new(value: f64) -> Self {
        if value == 0.0 {
            StateValue(0.0)
        } else {
            StateValue(value)
        }
    }

    /// The numeric value used by expected-value computations.
    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for StateValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for StateValue {}

impl PartialOrd for StateValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StateValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for StateValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_finite() && self.0.fract() == 0.0 && self.0.abs() < 1e15 {
            write!(f, "{:.0}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        StateValue::new(value)
    }
}

impl From<i32> for StateValue {
    fn from(value: i32) -> Self {
        StateValue::new(f64::from(value))
    }
}

impl From<u32> for StateValue {
    fn from(value: u32) -> Self {
        StateValue::new(f64::from(value))
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        StateValue::new(value as f64)
    }
}

impl From<usize> for StateValue {
    fn from(value: usize) -> Self {
        StateValue::new(value as f64)
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        StateValue::new(if value { 1.0 } else { 0.0 })
    }
}

/// Builds a state list from anything convertible to [`StateValue`].
pub fn states<I, V>(values: I) -> Vec<StateValue>
where
    I: IntoIterator<Item = V>,
    V: Into<StateValue>,
{
    values.into_iter().map(Into::into).collect()
}

/// An opaque agent label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentId(String);

impl AgentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        AgentId(value.to_string())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        AgentId(value)
    }
}

impl From<&AgentId> for AgentId {
    fn from(value: &AgentId) -> Self {
        value.clone()
    }
}

impl From<u32> for AgentId {
    fn from(value: u32) -> Self {
        AgentId(value.to_string())
    }
}

impl From<i32> for AgentId {
    fn from(value: i32) -> Self {
        AgentId(value.to_string())
    }
}

/// A mapping from node names to state values.
///
/// Used both as an observation context and as an intervention. Ordered by node
/// name so error messages and memo keys are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment(BTreeMap<String, StateValue>);

/// Observed node values a query conditions on.
pub type Context = Assignment;

/// Node values forced by a `do` intervention.
pub type Intervention = Assignment;

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, node: impl Into<String>, value: impl Into<StateValue>) -> Self {
        self.insert(node, value);
        self
    }

    pub fn insert(&mut self, node: impl Into<String>, value: impl Into<StateValue>) {
        self.0.insert(node.into(), value.into());
    }

    pub fn get(&self, node: &str) -> Option<StateValue> {
        self.0.get(node).copied()
    }

    pub fn contains(&self, node: &str) -> bool {
        self.0.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, StateValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K, V> FromIterator<(K, V)> for Assignment
where
    K: Into<String>,
    V: Into<StateValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut out = Assignment::new();
        for (k, v) in iter {
            out.insert(k, v);
        }
        out
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Assignment
where
    K: Into<String>,
    V: Into<StateValue>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        f.write_str("}")
    }
}
