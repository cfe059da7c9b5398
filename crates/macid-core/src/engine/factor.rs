//! Discrete factors.
//!
//! A factor is a non-negative table over an ordered list of discrete
//! variables, stored row-major with the last variable varying fastest. This is
//! the same layout a conditional probability table uses (child state first,
//! then evidence in order), so a resolved table converts into a factor without
//! copying indices around.

use smallvec::{smallvec, SmallVec};

use crate::engine::errors::ExecError;
use crate::engine::value::StateValue;

type IndexBuf = SmallVec<[usize; 8]>;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscreteFactor {
    variables: Vec<String>,
    cardinality: Vec<usize>,
    values: Vec<f64>,
    state_names: Vec<Vec<StateValue>>,
}

impl DiscreteFactor {
    /// Creates a factor, checking that `values` matches the product of the
    /// state-list lengths.
    pub fn new(
        variables: Vec<String>,
        state_names: Vec<Vec<StateValue>>,
        values: Vec<f64>,
    ) -> Result<Self, ExecError> {
        if variables.len() != state_names.len() {
            return Err(ExecError::structure(format!(
                "factor over {:?} has {} state lists",
                variables,
                state_names.len()
            )));
        }
        for (i, var) in variables.iter().enumerate() {
            if variables[..i].contains(var) {
                return Err(ExecError::structure(format!(
                    "factor repeats variable '{}'",
                    var
                )));
            }
        }
        let cardinality: Vec<usize> = state_names.iter().map(Vec::len).collect();
        let size: usize = cardinality.iter().product();
        if values.len() != size {
            return Err(ExecError::structure(format!(
                "factor over {:?} expects {} values, got {}",
                variables,
                size,
                values.len()
            )));
        }
        Ok(Self {
            variables,
            cardinality,
            values,
            state_names,
        })
    }

    /// The multiplicative identity: no variables, a single entry of 1.
    pub fn unit() -> Self {
        Self {
            variables: Vec::new(),
            cardinality: Vec::new(),
            values: vec![1.0],
            state_names: Vec::new(),
        }
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn cardinality(&self) -> &[usize] {
        &self.cardinality
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.position(variable).is_some()
    }

    fn position(&self, variable: &str) -> Option<usize> {
        self.variables.iter().position(|v| v == variable)
    }

    /// State names of `variable`, if it is in scope.
    pub fn state_names(&self, variable: &str) -> Option<&[StateValue]> {
        self.position(variable).map(|i| self.state_names[i].as_slice())
    }

    /// Replaces the state names of `variable`. The new list must keep the
    /// variable's cardinality.
    pub fn set_state_names(
        &mut self,
        variable: &str,
        states: Vec<StateValue>,
    ) -> Result<(), ExecError> {
        let pos = self.position(variable).ok_or_else(|| {
            ExecError::Internal(format!("variable '{}' not in factor scope", variable))
        })?;
        if states.len() != self.cardinality[pos] {
            return Err(ExecError::Internal(format!(
                "state names for '{}' have {} entries, cardinality is {}",
                variable,
                states.len(),
                self.cardinality[pos]
            )));
        }
        self.state_names[pos] = states;
        Ok(())
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Divides every entry by the total. A zero total yields NaN entries; the
    /// caller decides whether that is an error.
    pub fn normalize(&mut self) {
        let total = self.total();
        for v in &mut self.values {
            *v /= total;
        }
    }

    /// Converts a flat index into per-variable state indices.
    pub fn unravel(&self, mut flat: usize) -> Vec<usize> {
        let mut idx = vec![0; self.cardinality.len()];
        for pos in (0..self.cardinality.len()).rev() {
            idx[pos] = flat % self.cardinality[pos];
            flat /= self.cardinality[pos];
        }
        idx
    }

    /// The state value of each variable at a flat index.
    pub fn assignment_at(&self, flat: usize) -> Vec<StateValue> {
        self.unravel(flat)
            .into_iter()
            .enumerate()
            .map(|(pos, i)| self.state_names[pos][i])
            .collect()
    }

    fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.cardinality.len()];
        for pos in (0..self.cardinality.len().saturating_sub(1)).rev() {
            strides[pos] = strides[pos + 1] * self.cardinality[pos + 1];
        }
        strides
    }

    /// Pointwise product over the union of both scopes. Variables of `self`
    /// come first, followed by variables only `other` has.
    pub fn product(&self, other: &DiscreteFactor) -> Result<DiscreteFactor, ExecError> {
        let mut variables = self.variables.clone();
        let mut state_names = self.state_names.clone();
        for (pos, var) in other.variables.iter().enumerate() {
            match self.position(var) {
                Some(mine) => {
                    if self.cardinality[mine] != other.cardinality[pos] {
                        return Err(ExecError::structure(format!(
                            "cardinality mismatch for '{}': {} vs {}",
                            var, self.cardinality[mine], other.cardinality[pos]
                        )));
                    }
                }
                None => {
                    variables.push(var.clone());
                    state_names.push(other.state_names[pos].clone());
                }
            }
        }
        let cardinality: Vec<usize> = state_names.iter().map(Vec::len).collect();

        let left = self.strides();
        let right = other.strides();
        let left_strides: IndexBuf = variables
            .iter()
            .map(|v| self.position(v).map_or(0, |p| left[p]))
            .collect();
        let right_strides: IndexBuf = variables
            .iter()
            .map(|v| other.position(v).map_or(0, |p| right[p]))
            .collect();

        let size: usize = cardinality.iter().product();
        let mut values = Vec::with_capacity(size);
        let mut assignment: IndexBuf = smallvec![0; variables.len()];
        let (mut li, mut ri) = (0usize, 0usize);
        for _ in 0..size {
            values.push(self.values[li] * other.values[ri]);
            // Odometer increment, keeping both source offsets in step.
            for pos in (0..assignment.len()).rev() {
                assignment[pos] += 1;
                li += left_strides[pos];
                ri += right_strides[pos];
                if assignment[pos] < cardinality[pos] {
                    break;
                }
                li -= left_strides[pos] * cardinality[pos];
                ri -= right_strides[pos] * cardinality[pos];
                assignment[pos] = 0;
            }
        }

        Ok(DiscreteFactor {
            variables,
            cardinality,
            values,
            state_names,
        })
    }

    /// Sums `variable` out of the factor.
    pub fn marginalize(&self, variable: &str) -> Result<DiscreteFactor, ExecError> {
        let pos = self.position(variable).ok_or_else(|| {
            ExecError::Internal(format!("cannot marginalize '{}': not in scope", variable))
        })?;
        let inner: usize = self.cardinality[pos + 1..].iter().product();
        let card = self.cardinality[pos];
        let outer = self.values.len() / (inner * card).max(1);

        let mut values = vec![0.0; outer * inner];
        for o in 0..outer {
            for k in 0..card {
                let base = (o * card + k) * inner;
                for i in 0..inner {
                    values[o * inner + i] += self.values[base + i];
                }
            }
        }
        Ok(self.without(pos, values))
    }

    /// Fixes `variable` to the state at `state_index` and drops it from scope.
    pub fn reduce(&self, variable: &str, state_index: usize) -> Result<DiscreteFactor, ExecError> {
        let pos = self.position(variable).ok_or_else(|| {
            ExecError::Internal(format!("cannot reduce '{}': not in scope", variable))
        })?;
        let card = self.cardinality[pos];
        if state_index >= card {
            return Err(ExecError::Internal(format!(
                "state index {} out of range for '{}' (cardinality {})",
                state_index, variable, card
            )));
        }
        let inner: usize = self.cardinality[pos + 1..].iter().product();
        let outer = self.values.len() / (inner * card).max(1);

        let mut values = Vec::with_capacity(outer * inner);
        for o in 0..outer {
            let base = (o * card + state_index) * inner;
            values.extend_from_slice(&self.values[base..base + inner]);
        }
        Ok(self.without(pos, values))
    }

    /// Zeroes every entry where `variable` is not at `state_index`, keeping the
    /// variable in scope.
    pub fn restrict(&mut self, variable: &str, state_index: usize) -> Result<(), ExecError> {
        let pos = self.position(variable).ok_or_else(|| {
            ExecError::Internal(format!("cannot restrict '{}': not in scope", variable))
        })?;
        let inner: usize = self.cardinality[pos + 1..].iter().product();
        let card = self.cardinality[pos];
        for (flat, v) in self.values.iter_mut().enumerate() {
            if (flat / inner) % card != state_index {
                *v = 0.0;
            }
        }
        Ok(())
    }

    /// Returns the same factor with variables permuted into `order`, which
    /// must be exactly the current scope.
    pub fn reorder(&self, order: &[String]) -> Result<DiscreteFactor, ExecError> {
        if order.len() != self.variables.len() || order.iter().any(|v| !self.contains(v)) {
            return Err(ExecError::Internal(format!(
                "cannot reorder factor over {:?} into {:?}",
                self.variables, order
            )));
        }
        if order == self.variables.as_slice() {
            return Ok(self.clone());
        }
        let strides = self.strides();
        let src_strides: IndexBuf = order
            .iter()
            .filter_map(|v| self.position(v).map(|p| strides[p]))
            .collect();
        let state_names: Vec<Vec<StateValue>> = order
            .iter()
            .filter_map(|v| self.position(v).map(|p| self.state_names[p].clone()))
            .collect();
        let cardinality: Vec<usize> = state_names.iter().map(Vec::len).collect();

        let mut values = Vec::with_capacity(self.values.len());
        let mut assignment: IndexBuf = smallvec![0; order.len()];
        for _ in 0..self.values.len() {
            let src: usize = assignment
                .iter()
                .zip(src_strides.iter())
                .map(|(a, s)| a * s)
                .sum();
            values.push(self.values[src]);
            for pos in (0..assignment.len()).rev() {
                assignment[pos] += 1;
                if assignment[pos] < cardinality[pos] {
                    break;
                }
                assignment[pos] = 0;
            }
        }
        Ok(DiscreteFactor {
            variables: order.to_vec(),
            cardinality,
            values,
            state_names,
        })
    }

    fn without(&self, pos: usize, values: Vec<f64>) -> DiscreteFactor {
        let mut variables = self.variables.clone();
        let mut cardinality = self.cardinality.clone();
        let mut state_names = self.state_names.clone();
        variables.remove(pos);
        cardinality.remove(pos);
        state_names.remove(pos);
        DiscreteFactor {
            variables,
            cardinality,
            values,
            state_names,
        }
    }
}
