//! Policy imputation.
//!
//! Each imputation builds a function-defined distribution for one decision
//! and installs it. Expectation-based and optimal policies evaluate queries
//! against a clone of the model taken once, before the new policy exists, and
//! memoize their answer per tuple of parent values in a [`PolicyCache`] owned
//! by that one policy.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::engine::cpd::{Cpd, TabularCpd};
use crate::engine::errors::ExecError;
use crate::engine::install::InstallReport;
use crate::engine::model::MacidModel;
use crate::engine::value::{Context, StateValue};

/// Memo table from a tuple of parent values to the policy's output.
///
/// Clones share the same table, so every copy of a policy (including the
/// ones inside model clones) reuses earlier answers.
#[derive(Debug, Clone, Default)]
pub struct PolicyCache {
    entries: Arc<Mutex<FxHashMap<Vec<StateValue>, StateValue>>>,
}

impl PolicyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns the cached value for `key`, computing it with `compute` on a
    /// miss. The lock is not held while `compute` runs, since it usually
    /// issues queries that evaluate other cached policies.
    pub fn get_or_try_insert_with<F>(&self, key: &[StateValue], compute: F) -> Result<StateValue, ExecError>
    where
        F: FnOnce() -> Result<StateValue, ExecError>,
    {
        if let Some(hit) = self.entries.lock().get(key) {
            return Ok(*hit);
        }
        let value = compute()?;
        self.entries.lock().insert(key.to_vec(), value);
        Ok(value)
    }
}

impl MacidModel {
    /// Installs a uniform policy over the decision's existing domain.
    pub fn impute_random_decision(&mut self, decision: &str) -> Result<InstallReport, ExecError> {
        self.require_decision(decision)?;
        let domain = self.decision_domain(decision)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(%decision, domain = domain.len(), "imputing random decision");

        self.add_cpds([Cpd::uniform(decision, domain)])
    }

    /// Installs the policy `decision = E[target | parents(decision)]`,
    /// evaluated on a snapshot of the model taken before the call.
    pub fn impute_conditional_expectation_decision(
        &mut self,
        decision: &str,
        target: &str,
    ) -> Result<InstallReport, ExecError> {
        self.require_decision(decision)?;
        if !self.contains(target) {
            return Err(ExecError::validation(format!("unknown node '{}'", target)));
        }
        let parents = self.parents(decision)?;
        let snapshot = self.clone();
        let cache = PolicyCache::new();
        let y = target.to_string();
        let evidence = parents.clone();

        let policy = move |pv: &[StateValue]| {
            cache.get_or_try_insert_with(pv, || {
                let context = parent_context(&parents, pv);
                let ev = snapshot.expected_value(&[y.as_str()], &context, None)?;
                ev.first().copied().map(StateValue::from).ok_or_else(|| {
                    ExecError::Internal("expected value returned no entries".to_string())
                })
            })
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(%decision, %target, "imputing conditional expectation decision");

        let cpd = Cpd::try_function(decision, evidence, policy)
            .with_label(format!("cond_exp({})", target));
        self.add_cpds([cpd])
    }

    /// Installs the owning agent's best response at `decision`, holding every
    /// other policy fixed. Ties go to the first maximizing domain value.
    pub fn impute_optimal_decision(&mut self, decision: &str) -> Result<InstallReport, ExecError> {
        self.impute_random_decision(decision)?;
        let domain = self.decision_domain(decision)?;
        let agent = self.whose_node(decision).cloned().ok_or_else(|| {
            ExecError::Internal(format!("decision '{}' has no owner", decision))
        })?;
        let parents = self.parents(decision)?;
        let snapshot = self.clone();
        let cache = PolicyCache::new();
        let d = decision.to_string();
        let candidates = domain.clone();
        let evidence = parents.clone();

        let policy = move |pv: &[StateValue]| {
            cache.get_or_try_insert_with(pv, || {
                let mut context = parent_context(&parents, pv);
                let mut best: Option<(StateValue, f64)> = None;
                for &candidate in &candidates {
                    context.insert(d.as_str(), candidate);
                    let eu = snapshot.expected_utility(&context, None, &agent)?;
                    if best.map_or(true, |(_, top)| eu > top) {
                        best = Some((candidate, eu));
                    }
                }
                best.map(|(value, _)| value)
                    .ok_or_else(|| ExecError::MissingDomain { decision: d.clone() })
            })
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(%decision, "imputing optimal decision");

        let cpd = Cpd::try_function(decision, evidence, policy)
            .with_state_names(domain)
            .with_label("opt");
        self.add_cpds_with([cpd], false)
    }

    /// Random policy at every decision.
    pub fn impute_random_policy(&mut self) -> Result<(), ExecError> {
        for decision in self.all_decision_nodes().to_vec() {
            self.impute_random_decision(&decision)?;
        }
        Ok(())
    }

    /// Optimal policy at every decision by backward induction: decisions are
    /// solved in reverse topological order, each against the policies already
    /// imputed downstream.
    pub fn impute_optimal_policy(&mut self) -> Result<(), ExecError> {
        let decisions = self.valid_order(self.all_decision_nodes().iter().map(String::as_str))?;
        for decision in decisions.iter().rev() {
            self.impute_optimal_decision(decision)?;
        }
        Ok(())
    }

    /// Solves a copy of the model and returns the optimal table of every
    /// decision, leaving `self` unchanged.
    pub fn solve(&self) -> Result<BTreeMap<String, TabularCpd>, ExecError> {
        let mut solved = self.clone();
        solved.impute_optimal_policy()?;
        Ok(solved.decision_tables())
    }

    fn require_decision(&self, node: &str) -> Result<(), ExecError> {
        if !self.contains(node) {
            return Err(ExecError::validation(format!("unknown node '{}'", node)));
        }
        if !self.is_decision(node) {
            return Err(ExecError::validation(format!(
                "'{}' is not a decision node",
                node
            )));
        }
        Ok(())
    }

    /// Legal values of a decision: a queued object's declared states, else
    /// the installed table's states.
    fn decision_domain(&self, decision: &str) -> Result<Vec<StateValue>, ExecError> {
        if let Some(states) = self
            .cpds_to_add
            .get(decision)
            .and_then(Cpd::declared_states)
        {
            return Ok(states.to_vec());
        }
        self.get_cpd(decision)
            .map(|t| t.states().to_vec())
            .ok_or_else(|| ExecError::MissingDomain {
                decision: decision.to_string(),
            })
    }
}

fn parent_context(parents: &[String], values: &[StateValue]) -> Context {
    parents
        .iter()
        .cloned()
        .zip(values.iter().copied())
        .collect()
}
