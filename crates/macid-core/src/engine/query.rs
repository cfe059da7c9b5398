//! Queries, `do` interventions and expected values.
//!
//! A query first checks that every decision strategically relevant to a
//! target carries a real policy, then runs variable elimination over the
//! ancestral closure of the targets and the observed nodes. Interventions
//! passed to a query are applied to a clone so the caller's model is never
//! touched.

use rustc_hash::FxHashSet;

use crate::engine::cpd::Cpd;
use crate::engine::errors::ExecError;
use crate::engine::factor::DiscreteFactor;
use crate::engine::inference::VariableElimination;
use crate::engine::install::InstallReport;
use crate::engine::mechanism::mechanism_node;
use crate::engine::model::MacidModel;
use crate::engine::value::{AgentId, Context, Intervention, StateValue};

impl MacidModel {
    /// `P(targets, context)` after `do(intervention)`, as an unnormalized
    /// joint factor over `targets` in request order.
    pub fn query(
        &self,
        targets: &[&str],
        context: &Context,
        intervention: Option<&Intervention>,
    ) -> Result<DiscreteFactor, ExecError> {
        let targets = self.validate_query(targets, context)?;
        self.check_decisions_policied(&targets, context)?;

        match intervention {
            Some(intervention) if !intervention.is_empty() => {
                let mut intervened = self.clone();
                intervened.intervene(intervention)?;
                intervened.run_inference(&targets, context)
            }
            _ => self.run_inference(&targets, context),
        }
    }

    /// Applies `do(node = value)` for every pair: each node gets a constant
    /// function-defined distribution over its current parents, and every
    /// installed distribution is recomputed so children see the new states.
    pub fn intervene(&mut self, intervention: &Intervention) -> Result<InstallReport, ExecError> {
        let mut cpds = Vec::with_capacity(intervention.len());
        for (node, value) in intervention.iter() {
            let parents = self.parents(node)?;
            cpds.push(Cpd::constant(node, parents, value));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(intervention = %intervention, "applying intervention");

        self.add_cpds_with(cpds, true)
    }

    /// Expected value of each of `variables` given `context`, optionally
    /// under a one-shot intervention.
    pub fn expected_value(
        &self,
        variables: &[&str],
        context: &Context,
        intervention: Option<&Intervention>,
    ) -> Result<Vec<f64>, ExecError> {
        if variables.is_empty() {
            return Ok(Vec::new());
        }
        let mut factor = self.query(variables, context, intervention)?;
        factor.normalize();

        let mut ev = vec![0.0; variables.len()];
        for (idx, &prob) in factor.values().iter().enumerate() {
            let assignment = factor.assignment_at(idx);
            for (acc, state) in ev.iter_mut().zip(&assignment) {
                *acc += prob * state.get();
            }
            if ev.iter().any(|v| v.is_nan()) {
                return Err(ExecError::Numerical(format!(
                    "query {:?} | {} produced NaN at index {:?} with probability {}; \
                     consider imputing a random decision",
                    variables,
                    context,
                    factor.unravel(idx),
                    prob
                )));
            }
        }
        Ok(ev)
    }

    /// Sum of the expected values of `agent`'s utility nodes.
    pub fn expected_utility(
        &self,
        context: &Context,
        intervention: Option<&Intervention>,
        agent: impl Into<AgentId>,
    ) -> Result<f64, ExecError> {
        let agent = agent.into();
        if !self.has_agent(&agent) {
            return Err(ExecError::validation(format!("unknown agent '{}'", agent)));
        }
        let utilities: Vec<&str> = self.utility_nodes(&agent).iter().map(String::as_str).collect();
        Ok(self
            .expected_value(&utilities, context, intervention)?
            .into_iter()
            .sum())
    }

    fn validate_query(&self, targets: &[&str], context: &Context) -> Result<Vec<String>, ExecError> {
        if targets.is_empty() {
            return Err(ExecError::validation("query needs at least one target"));
        }
        let mut seen = FxHashSet::default();
        for target in targets {
            if !self.contains(target) {
                return Err(ExecError::validation(format!(
                    "unknown query target '{}'",
                    target
                )));
            }
            if !seen.insert(*target) {
                return Err(ExecError::validation(format!(
                    "query target '{}' listed twice",
                    target
                )));
            }
        }
        if let Some(node) = context.nodes().find(|n| !self.contains(n)) {
            return Err(ExecError::validation(format!(
                "context mentions unknown node '{}'",
                node
            )));
        }
        Ok(targets.iter().map(|t| t.to_string()).collect())
    }

    /// Every decision that is strategically relevant to a target must carry
    /// a policy rather than only a domain.
    fn check_decisions_policied(&self, targets: &[String], context: &Context) -> Result<(), ExecError> {
        let mech = self.mechanism_graph()?;
        let observed: Vec<&str> = context.nodes().collect();

        for decision in self.all_decision_nodes() {
            let mechanism = mechanism_node(decision);
            for target in targets {
                if !mech.is_active_trail(&mechanism, target, &observed)? {
                    continue;
                }
                let cpd = self
                    .installed(decision)
                    .map(|i| i.source())
                    .or_else(|| self.cpds_to_add.get(decision.as_str()));
                match cpd {
                    None => {
                        return Err(ExecError::MissingDomain {
                            decision: decision.clone(),
                        })
                    }
                    Some(cpd) if cpd.is_placeholder() => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(%decision, %target, "query depends on an un-policied decision");

                        return Err(ExecError::UnpoliciedDecision {
                            decision: decision.clone(),
                            query: format!("{:?} | {}", targets, context),
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    fn run_inference(&self, targets: &[String], context: &Context) -> Result<DiscreteFactor, ExecError> {
        let roots = targets.iter().map(String::as_str).chain(context.nodes());
        let closure = self.dag.ancestors(roots)?;

        let mut factors = Vec::with_capacity(closure.len());
        for node in self.valid_order(closure.iter().map(String::as_str))? {
            if self.cpds_to_add.contains_key(&node) {
                return Err(ExecError::Unresolved { node });
            }
            let table = self
                .get_cpd(&node)
                .ok_or_else(|| ExecError::Unresolved { node: node.clone() })?;
            self.check_table_matches_graph(&node, table)?;
            let evidence_states = table
                .evidence()
                .iter()
                .map(|p| self.states_of(p))
                .collect::<Result<Vec<_>, _>>()?;
            factors.push(table.to_factor(evidence_states)?);
        }

        let mut evidence = Vec::with_capacity(context.len());
        for (node, value) in context.iter() {
            evidence.push((node.to_string(), self.state_index(node, value)?));
        }

        let engine = VariableElimination::new(self.inference)?;
        let mut joint = engine.query(factors, targets, &evidence)?;
        for target in targets {
            joint.set_state_names(target, self.states_of(target)?)?;
        }
        Ok(joint)
    }

    fn states_of(&self, node: &str) -> Result<Vec<StateValue>, ExecError> {
        self.get_cpd(node)
            .map(|t| t.states().to_vec())
            .ok_or_else(|| ExecError::Unresolved {
                node: node.to_string(),
            })
    }

    fn state_index(&self, node: &str, value: StateValue) -> Result<usize, ExecError> {
        let table = self.get_cpd(node).ok_or_else(|| ExecError::Unresolved {
            node: node.to_string(),
        })?;
        table.state_index(value).ok_or_else(|| {
            ExecError::validation(format!(
                "value {} is not a state of '{}' (states: {:?})",
                value,
                node,
                table.states()
            ))
        })
    }
}
