//! Staged installation of distribution objects.
//!
//! Distribution objects wait in a pending queue until every node they read
//! from carries a known state space. The scheduler scans the graph in
//! topological order, installs whatever has become resolvable and repeats
//! until a pass makes no progress. Anything still pending is left queued; it
//! only becomes an error when a query depends on it.

use rustc_hash::FxHashMap;

use crate::engine::cpd::{Cpd, InstalledCpd};
use crate::engine::dag::Dag;
use crate::engine::errors::ExecError;
use crate::engine::value::StateValue;

/// Read-only view of the model handed to distribution objects while they
/// resolve.
pub struct ResolveScope<'a> {
    pub(crate) dag: &'a Dag,
    pub(crate) installed: &'a FxHashMap<String, InstalledCpd>,
    pub(crate) pending: &'a FxHashMap<String, Cpd>,
}

impl<'a> ResolveScope<'a> {
    pub fn parents(&self, node: &str) -> Result<Vec<String>, ExecError> {
        self.dag
            .parents(node)
            .ok_or_else(|| ExecError::structure(format!("unknown node '{}'", node)))
    }

    /// Whether `node`'s state list can be determined right now.
    ///
    /// A pending function-defined object counts when its own evidence does
    /// (it can be evaluated on the fly); any other pending object does not,
    /// since the installed table it would replace may be stale.
    pub fn has_known_states(&self, node: &str) -> bool {
        match self.pending.get(node) {
            Some(Cpd::Function(f)) => f.evidence().iter().all(|p| self.has_known_states(p)),
            Some(_) => false,
            None => self.installed.contains_key(node),
        }
    }

    /// The state list of `node`, evaluating pending function-defined parents
    /// recursively.
    pub fn known_states(&self, node: &str) -> Result<Vec<StateValue>, ExecError> {
        match self.pending.get(node) {
            Some(Cpd::Function(f)) => f.possible_values(self),
            Some(_) => Err(ExecError::Unresolved {
                node: node.to_string(),
            }),
            None => self
                .installed
                .get(node)
                .map(|i| i.table.states().to_vec())
                .ok_or_else(|| ExecError::Unresolved {
                    node: node.to_string(),
                }),
        }
    }
}

/// Outcome of one installation call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Nodes installed by this call, in installation order.
    pub installed: Vec<String>,
    /// Nodes still queued after this call.
    pub pending: Vec<String>,
    /// Number of topological passes executed.
    pub passes: usize,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }
}

/// A resolution failure, with the node whose entry failed.
#[derive(Debug)]
pub(crate) struct InstallFailure {
    pub node: Option<String>,
    pub error: ExecError,
}

impl From<ExecError> for InstallFailure {
    fn from(error: ExecError) -> Self {
        Self { node: None, error }
    }
}

/// Installs every resolvable entry of `pending` into `installed`.
///
/// A resolution failure (as opposed to a missing dependency) aborts the call
/// and names the failing node. Both maps are then partially updated, so
/// callers that need atomicity run this on scratch copies.
pub(crate) fn run_installation(
    dag: &Dag,
    installed: &mut FxHashMap<String, InstalledCpd>,
    pending: &mut FxHashMap<String, Cpd>,
) -> Result<InstallReport, InstallFailure> {
    let order = dag.topological_order()?;
    let mut report = InstallReport::default();

    while !pending.is_empty() {
        report.passes += 1;
        let mut progressed = false;

        for node in &order {
            let Some(cpd) = pending.get(node) else {
                continue;
            };
            let scope = ResolveScope {
                dag,
                installed: &*installed,
                pending: &*pending,
            };
            if !cpd.is_resolvable(&scope) {
                continue;
            }
            let resolved = cpd.resolve(&scope);
            let Some(source) = pending.remove(node) else {
                continue;
            };
            let table = resolved.map_err(|error| InstallFailure {
                node: Some(node.clone()),
                error,
            })?;
            installed.insert(node.clone(), InstalledCpd { source, table });
            report.installed.push(node.clone());
            progressed = true;
        }

        if !progressed {
            break;
        }
    }

    report.pending = order
        .iter()
        .filter(|n| pending.contains_key(n.as_str()))
        .cloned()
        .collect();

    #[cfg(feature = "tracing")]
    tracing::debug!(
        installed = report.installed.len(),
        pending = report.pending.len(),
        passes = report.passes,
        "installed distributions"
    );

    Ok(report)
}
