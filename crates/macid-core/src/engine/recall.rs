//! Sufficient recall.
//!
//! An agent has sufficient recall when, at each of its later decisions, what
//! it observes screens off its earlier policies from the utilities the later
//! decision can still affect.

use crate::engine::errors::ExecError;
use crate::engine::mechanism::mechanism_node;
use crate::engine::model::MacidModel;

impl MacidModel {
    /// Whether every agent has sufficient recall.
    pub fn check_sufficient_recall(&self) -> Result<bool, ExecError> {
        let mech = self.mechanism_graph()?;

        for agent in self.agents() {
            let decisions = self.valid_order(self.decision_nodes(agent).iter().map(String::as_str))?;
            for (i, earlier) in decisions.iter().enumerate() {
                let earlier_mech = mechanism_node(earlier);
                for later in &decisions[i + 1..] {
                    let mut observed = self.parents(later)?;
                    observed.push(later.clone());
                    let observed: Vec<&str> = observed.iter().map(String::as_str).collect();

                    for utility in self.utility_nodes(agent) {
                        if !self.dag.is_ancestor(later, utility)? {
                            continue;
                        }
                        if mech.is_active_trail(&earlier_mech, utility, &observed)? {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(
                                %agent,
                                %earlier,
                                %later,
                                %utility,
                                "insufficient recall: earlier policy is not screened off"
                            );
                            return Ok(false);
                        }
                    }
                }
            }
        }
        Ok(true)
    }
}
