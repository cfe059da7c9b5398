//! Mechanism graph and strategic relevance.

use crate::engine::dag::Dag;
use crate::engine::errors::ExecError;
use crate::engine::model::MacidModel;

const MECHANISM_SUFFIX: &str = "_mechanism";

/// Name of the synthetic mechanism parent of `node`.
pub fn mechanism_node(node: &str) -> String {
    format!("{}{}", node, MECHANISM_SUFFIX)
}

/// Fails if `name` and the mechanism node of some graph node would coincide,
/// either because `name` is `X_mechanism` for an existing `X` or because
/// `name_mechanism` already exists.
pub(crate) fn check_mechanism_name(dag: &Dag, name: &str) -> Result<(), ExecError> {
    let clash = match name.strip_suffix(MECHANISM_SUFFIX) {
        Some(base) if dag.contains(base) => Some(base.to_string()),
        _ => {
            let mech = mechanism_node(name);
            dag.contains(&mech).then_some(mech)
        }
    };
    match clash {
        Some(other) => Err(ExecError::structure(format!(
            "node names '{}' and '{}' collide with the reserved mechanism suffix '{}'",
            name, other, MECHANISM_SUFFIX
        ))),
        None => Ok(()),
    }
}

impl MacidModel {
    /// The model's DAG plus a root `n_mechanism -> n` for every node `n`.
    pub fn mechanism_graph(&self) -> Result<Dag, ExecError> {
        let mut mech = Dag::from_edges(self.dag.edges())?;
        for node in self.dag.nodes() {
            if !mech.contains(node) {
                mech.add_node(node)?;
            }
        }
        for node in self.dag.nodes() {
            let parent = mechanism_node(node);
            mech.add_node(&parent)?;
            mech.add_edge(&parent, node)?;
        }
        Ok(mech)
    }

    /// Whether `decision`'s policy can influence `query` given `observed`:
    /// an active trail from the decision's mechanism node to `query` in the
    /// mechanism graph.
    pub fn is_strategically_relevant(
        &self,
        decision: &str,
        query: &str,
        observed: &[&str],
    ) -> Result<bool, ExecError> {
        let mech = self.mechanism_graph()?;
        mech.is_active_trail(&mechanism_node(decision), query, observed)
    }
}
