//! Exact inference by variable elimination.
//!
//! The engine receives the factors of an ancestrally closed set of nodes,
//! conditions on the evidence and sums out every non-target variable. The
//! result is the unnormalized joint `P(targets, evidence)` with variables in
//! the requested order.

use rustc_hash::FxHashSet;

use crate::engine::errors::ExecError;
use crate::engine::factor::DiscreteFactor;

/// How the next variable to eliminate is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EliminationOrder {
    /// Greedy: the variable whose elimination creates the smallest factor.
    #[default]
    MinWeight,
    /// The order variables first appear in the factor list.
    Sequential,
}

/// Configuration for exact inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceConfig {
    /// Heuristic used to order eliminations.
    pub elimination_order: EliminationOrder,
    /// Largest intermediate factor (in entries) the engine will build.
    pub max_factor_entries: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            elimination_order: EliminationOrder::MinWeight,
            max_factor_entries: 1 << 24,
        }
    }
}

impl InferenceConfig {
    pub fn validate(self) -> Result<Self, ExecError> {
        if self.max_factor_entries == 0 {
            return Err(ExecError::validation(
                "inference: max_factor_entries must be > 0",
            ));
        }
        Ok(self)
    }
}

/// Variable-elimination engine.
#[derive(Debug, Clone, Copy)]
pub struct VariableElimination {
    config: InferenceConfig,
}

impl VariableElimination {
    pub fn new(config: InferenceConfig) -> Result<Self, ExecError> {
        Ok(Self {
            config: config.validate()?,
        })
    }

    /// Computes the joint over `targets` with `evidence` (variable, state
    /// index) applied.
    ///
    /// Observed variables that are not targets are reduced away; observed
    /// targets stay in scope with their unobserved states zeroed.
    pub fn query(
        &self,
        factors: Vec<DiscreteFactor>,
        targets: &[String],
        evidence: &[(String, usize)],
    ) -> Result<DiscreteFactor, ExecError> {
        let mut factors = factors;
        for (variable, state) in evidence {
            let keep = targets.contains(variable);
            let mut next = Vec::with_capacity(factors.len());
            for mut factor in factors {
                if !factor.contains(variable) {
                    next.push(factor);
                } else if keep {
                    factor.restrict(variable, *state)?;
                    next.push(factor);
                } else {
                    next.push(factor.reduce(variable, *state)?);
                }
            }
            factors = next;
        }

        let target_set: FxHashSet<&str> = targets.iter().map(String::as_str).collect();
        let mut to_eliminate: Vec<String> = Vec::new();
        for factor in &factors {
            for var in factor.variables() {
                if !target_set.contains(var.as_str()) && !to_eliminate.contains(var) {
                    to_eliminate.push(var.clone());
                }
            }
        }
        for target in targets {
            if !factors.iter().any(|f| f.contains(target)) {
                return Err(ExecError::Internal(format!(
                    "inference: no factor mentions target '{}'",
                    target
                )));
            }
        }

        while !to_eliminate.is_empty() {
            let pick = self.next_variable(&factors, &to_eliminate);
            let variable = to_eliminate.remove(pick);

            let (touching, rest): (Vec<_>, Vec<_>) =
                factors.into_iter().partition(|f| f.contains(&variable));
            factors = rest;
            let product = self.multiply_all(touching)?;
            factors.push(product.marginalize(&variable)?);
        }

        let joint = self.multiply_all(factors)?;
        joint.reorder(targets)
    }

    fn multiply_all(&self, factors: Vec<DiscreteFactor>) -> Result<DiscreteFactor, ExecError> {
        let mut acc = DiscreteFactor::unit();
        for factor in factors {
            let projected = projected_size(&[&acc, &factor], None);
            if projected > self.config.max_factor_entries {
                return Err(ExecError::Execution(format!(
                    "inference: intermediate factor of {} entries exceeds the limit of {}",
                    projected, self.config.max_factor_entries
                )));
            }
            acc = acc.product(&factor)?;
        }
        Ok(acc)
    }

    fn next_variable(&self, factors: &[DiscreteFactor], candidates: &[String]) -> usize {
        match self.config.elimination_order {
            EliminationOrder::Sequential => 0,
            EliminationOrder::MinWeight => {
                let mut best = (0, usize::MAX);
                for (idx, var) in candidates.iter().enumerate() {
                    let touching: Vec<&DiscreteFactor> =
                        factors.iter().filter(|f| f.contains(var)).collect();
                    let weight = projected_size(&touching, Some(var));
                    if weight < best.1 {
                        best = (idx, weight);
                    }
                }
                best.0
            }
        }
    }
}

/// Number of entries in the product of `factors`, optionally without one
/// variable. Saturates instead of overflowing.
fn projected_size(factors: &[&DiscreteFactor], without: Option<&str>) -> usize {
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    let mut size = 1usize;
    for factor in factors {
        for (var, &card) in factor.variables().iter().zip(factor.cardinality()) {
            if Some(var.as_str()) == without || !seen.insert(var.as_str()) {
                continue;
            }
            size = size.saturating_mul(card);
        }
    }
    size
}
