//! The MACID aggregate: graph, agent ownership and distributions.

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::engine::cpd::{Cpd, InstalledCpd, TabularCpd};
use crate::engine::dag::Dag;
use crate::engine::errors::ExecError;
use crate::engine::inference::InferenceConfig;
use crate::engine::install::{run_installation, InstallReport};
use crate::engine::mechanism::check_mechanism_name;
use crate::engine::value::AgentId;

/// Decision and utility nodes claimed by one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentNodes {
    pub agent: AgentId,
    pub decisions: Vec<String>,
    pub utilities: Vec<String>,
}

impl AgentNodes {
    pub fn new<S: Into<String>, T: Into<String>>(
        agent: impl Into<AgentId>,
        decisions: Vec<S>,
        utilities: Vec<T>,
    ) -> Self {
        Self {
            agent: agent.into(),
            decisions: decisions.into_iter().map(Into::into).collect(),
            utilities: utilities.into_iter().map(Into::into).collect(),
        }
    }
}

/// Role of a node in the diagram.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeCategory {
    Chance,
    Decision(AgentId),
    Utility(AgentId),
}

/// A multi-agent causal influence diagram.
///
/// Holds the DAG, which agent owns each decision and utility node, the
/// installed distributions and the queue of distributions waiting for their
/// parents. Cloning deep-copies everything except the immutable functions
/// (and their memo caches) inside function-defined distributions.
#[derive(Debug, Clone)]
pub struct MacidModel {
    pub(crate) dag: Dag,
    agents: Vec<AgentId>,
    decision_nodes_agent: FxHashMap<AgentId, Vec<String>>,
    utility_nodes_agent: FxHashMap<AgentId, Vec<String>>,
    all_decision_nodes: Vec<String>,
    all_utility_nodes: Vec<String>,
    whose_node: FxHashMap<String, AgentId>,
    pub(crate) cpds: FxHashMap<String, InstalledCpd>,
    pub(crate) cpds_to_add: FxHashMap<String, Cpd>,
    pub(crate) inference: InferenceConfig,
}

impl MacidModel {
    /// Builds a model from an edge list and the nodes each agent owns.
    ///
    /// Every owned node must appear in the edge list, and no node may be
    /// claimed twice.
    pub fn new<I, A, B>(edges: I, agents: Vec<AgentNodes>) -> Result<Self, ExecError>
    where
        I: IntoIterator<Item = (A, B)>,
        A: AsRef<str>,
        B: AsRef<str>,
    {
        let dag = Dag::from_edges(edges)?;
        for node in dag.nodes() {
            check_mechanism_name(&dag, node)?;
        }

        let mut ids = Vec::with_capacity(agents.len());
        let mut decision_nodes_agent = FxHashMap::default();
        let mut utility_nodes_agent = FxHashMap::default();
        let mut all_decision_nodes = Vec::new();
        let mut all_utility_nodes = Vec::new();
        let mut whose_node: FxHashMap<String, AgentId> = FxHashMap::default();

        for AgentNodes {
            agent,
            decisions,
            utilities,
        } in agents
        {
            if ids.contains(&agent) {
                return Err(ExecError::structure(format!(
                    "agent '{}' listed twice",
                    agent
                )));
            }
            for node in decisions.iter().chain(&utilities) {
                if !dag.contains(node) {
                    return Err(ExecError::structure(format!(
                        "node '{}' owned by agent '{}' is not in the graph",
                        node, agent
                    )));
                }
                if let Some(owner) = whose_node.insert(node.clone(), agent.clone()) {
                    return Err(ExecError::structure(format!(
                        "node '{}' claimed by agent '{}' is already claimed by agent '{}'",
                        node, agent, owner
                    )));
                }
            }
            all_decision_nodes.extend(decisions.iter().cloned());
            all_utility_nodes.extend(utilities.iter().cloned());
            decision_nodes_agent.insert(agent.clone(), decisions);
            utility_nodes_agent.insert(agent.clone(), utilities);
            ids.push(agent);
        }

        Ok(Self {
            dag,
            agents: ids,
            decision_nodes_agent,
            utility_nodes_agent,
            all_decision_nodes,
            all_utility_nodes,
            whose_node,
            cpds: FxHashMap::default(),
            cpds_to_add: FxHashMap::default(),
            inference: InferenceConfig::default(),
        })
    }

    /// A single-agent diagram owned by agent `0`.
    pub fn cid<I, A, B, S, T>(edges: I, decisions: Vec<S>, utilities: Vec<T>) -> Result<Self, ExecError>
    where
        I: IntoIterator<Item = (A, B)>,
        A: AsRef<str>,
        B: AsRef<str>,
        S: Into<String>,
        T: Into<String>,
    {
        Self::new(edges, vec![AgentNodes::new(0, decisions, utilities)])
    }

    /// Replaces the inference configuration after validating it.
    pub fn with_inference_config(mut self, config: InferenceConfig) -> Result<Self, ExecError> {
        self.inference = config.validate()?;
        Ok(self)
    }

    pub fn inference_config(&self) -> InferenceConfig {
        self.inference
    }

    // ---- graph edits ----

    /// Adds an isolated chance node.
    pub fn add_node(&mut self, name: &str) -> Result<(), ExecError> {
        check_mechanism_name(&self.dag, name)?;
        self.dag.add_node(name)
    }

    /// Adds an edge. Installed tables are not updated; reinstall the child's
    /// distribution before querying it.
    pub fn add_edge(&mut self, src: &str, dst: &str) -> Result<(), ExecError> {
        self.dag.add_edge(src, dst)
    }

    pub fn remove_edge(&mut self, src: &str, dst: &str) -> bool {
        self.dag.remove_edge(src, dst)
    }

    // ---- read-only accessors ----

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.dag.nodes()
    }

    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.dag.edges()
    }

    pub fn contains(&self, node: &str) -> bool {
        self.dag.contains(node)
    }

    pub fn parents(&self, node: &str) -> Result<Vec<String>, ExecError> {
        self.dag
            .parents(node)
            .ok_or_else(|| ExecError::structure(format!("unknown node '{}'", node)))
    }

    pub fn node_category(&self, node: &str) -> Option<NodeCategory> {
        if !self.dag.contains(node) {
            return None;
        }
        let category = match self.whose_node.get(node) {
            None => NodeCategory::Chance,
            Some(agent) if self.all_decision_nodes.iter().any(|d| d == node) => {
                NodeCategory::Decision(agent.clone())
            }
            Some(agent) => NodeCategory::Utility(agent.clone()),
        };
        Some(category)
    }

    pub fn is_decision(&self, node: &str) -> bool {
        self.all_decision_nodes.iter().any(|d| d == node)
    }

    /// Label of the distribution installed on `node`, if any.
    pub fn cpd_label(&self, node: &str) -> Option<&str> {
        self.cpds.get(node).and_then(|i| i.source.label())
    }

    /// Resolved table installed on `node`.
    pub fn get_cpd(&self, node: &str) -> Option<&TabularCpd> {
        self.cpds.get(node).map(|i| &i.table)
    }

    pub fn installed(&self, node: &str) -> Option<&InstalledCpd> {
        self.cpds.get(node)
    }

    pub fn cardinality(&self, node: &str) -> Option<usize> {
        self.get_cpd(node).map(TabularCpd::cardinality)
    }

    /// Nodes whose distribution is still queued, in topological order.
    pub fn pending_nodes(&self) -> Result<Vec<String>, ExecError> {
        let queued = self.cpds_to_add.keys().map(String::as_str);
        self.valid_order(queued)
    }

    pub fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    /// Decisions owned by `agent`; empty for an unknown agent.
    pub fn decision_nodes(&self, agent: &AgentId) -> &[String] {
        self.decision_nodes_agent
            .get(agent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Utility nodes owned by `agent`; empty for an unknown agent.
    pub fn utility_nodes(&self, agent: &AgentId) -> &[String] {
        self.utility_nodes_agent
            .get(agent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all_decision_nodes(&self) -> &[String] {
        &self.all_decision_nodes
    }

    pub fn all_utility_nodes(&self) -> &[String] {
        &self.all_utility_nodes
    }

    /// Owner of a decision or utility node.
    pub fn whose_node(&self, node: &str) -> Option<&AgentId> {
        self.whose_node.get(node)
    }

    pub fn has_agent(&self, agent: &AgentId) -> bool {
        self.agents.contains(agent)
    }

    pub fn topological_order(&self) -> Result<Vec<String>, ExecError> {
        self.dag.topological_order()
    }

    /// The given nodes sorted into a topological order of the whole graph.
    pub fn valid_order<'a, I>(&self, nodes: I) -> Result<Vec<String>, ExecError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut wanted: FxHashSet<&str> = FxHashSet::default();
        for node in nodes {
            if !self.dag.contains(node) {
                return Err(ExecError::structure(format!("unknown node '{}'", node)));
            }
            wanted.insert(node);
        }
        Ok(self
            .dag
            .topological_order()?
            .into_iter()
            .filter(|n| wanted.contains(n.as_str()))
            .collect())
    }

    // ---- installation ----

    /// Queues `cpds` and installs everything resolvable, recomputing every
    /// installed distribution as well.
    pub fn add_cpds<I>(&mut self, cpds: I) -> Result<InstallReport, ExecError>
    where
        I: IntoIterator<Item = Cpd>,
    {
        self.add_cpds_with(cpds, true)
    }

    /// Queues `cpds` and installs everything resolvable.
    ///
    /// With `update_all`, copies of all installed distributions are queued
    /// too so state spaces are recomputed against the current graph. A node
    /// with an incoming or already pending entry keeps that entry. An unknown
    /// node aborts the call before anything is queued.
    ///
    /// Installation is all or nothing: if any entry fails to resolve, the
    /// installed tables and the queue are left as they were before the call,
    /// except that a previously queued entry for the failing node is dropped.
    pub fn add_cpds_with<I>(&mut self, cpds: I, update_all: bool) -> Result<InstallReport, ExecError>
    where
        I: IntoIterator<Item = Cpd>,
    {
        let incoming: Vec<Cpd> = cpds.into_iter().collect();
        if let Some(bad) = incoming.iter().find(|c| !self.dag.contains(c.variable())) {
            return Err(ExecError::structure(format!(
                "distribution for unknown node '{}'",
                bad.variable()
            )));
        }

        let mut installed = self.cpds.clone();
        let mut pending = self.cpds_to_add.clone();
        for cpd in incoming {
            pending.insert(cpd.variable().to_string(), cpd);
        }
        if update_all {
            for (node, cpd) in &self.cpds {
                pending
                    .entry(node.clone())
                    .or_insert_with(|| cpd.source.clone());
            }
        }

        match run_installation(&self.dag, &mut installed, &mut pending) {
            Ok(report) => {
                self.cpds = installed;
                self.cpds_to_add = pending;
                Ok(report)
            }
            Err(failure) => {
                if let Some(node) = &failure.node {
                    self.cpds_to_add.remove(node);
                }
                Err(failure.error)
            }
        }
    }

    /// Checks that every node has an installed, up-to-date table whose
    /// evidence matches its graph parents and whose columns are normalized.
    pub fn check_model(&self) -> Result<(), ExecError> {
        for node in self.dag.nodes() {
            if self.cpds_to_add.contains_key(node) {
                return Err(ExecError::Unresolved {
                    node: node.to_string(),
                });
            }
            let table = self.get_cpd(node).ok_or_else(|| ExecError::Unresolved {
                node: node.to_string(),
            })?;
            self.check_table_matches_graph(node, table)?;
            table.check_normalized()?;
        }
        Ok(())
    }

    /// Evidence of `table` must be exactly the graph parents of `node`, with
    /// cardinalities equal to the parents' installed cardinalities.
    pub(crate) fn check_table_matches_graph(
        &self,
        node: &str,
        table: &TabularCpd,
    ) -> Result<(), ExecError> {
        let parents = self.parents(node)?;
        let declared: FxHashSet<&str> = table.evidence().iter().map(String::as_str).collect();
        let actual: FxHashSet<&str> = parents.iter().map(String::as_str).collect();
        if declared != actual {
            return Err(ExecError::structure(format!(
                "table for '{}' uses evidence {:?} but the graph parents are {:?}; reinstall it",
                node,
                table.evidence(),
                parents
            )));
        }
        for (parent, &card) in table.evidence().iter().zip(table.evidence_card()) {
            let actual = self.cardinality(parent).ok_or_else(|| ExecError::Unresolved {
                node: parent.clone(),
            })?;
            if actual != card {
                return Err(ExecError::structure(format!(
                    "table for '{}' expects {} states for '{}', which now has {}; reinstall it",
                    node, card, parent, actual
                )));
            }
        }
        Ok(())
    }

    /// Installed tables of every decision node, ordered by node name.
    pub(crate) fn decision_tables(&self) -> BTreeMap<String, TabularCpd> {
        self.all_decision_nodes
            .iter()
            .filter_map(|d| self.get_cpd(d).map(|t| (d.clone(), t.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::inference::EliminationOrder;
    use crate::engine::value::{states, Context, StateValue};

    fn three_node() -> MacidModel {
        MacidModel::cid([("S", "D"), ("S", "U"), ("D", "U")], vec!["D"], vec!["U"]).unwrap()
    }

    #[test]
    fn categories_follow_ownership() {
        let model = three_node();
        let zero = AgentId::from(0);
        assert_eq!(model.node_category("S"), Some(NodeCategory::Chance));
        assert_eq!(model.node_category("D"), Some(NodeCategory::Decision(zero.clone())));
        assert_eq!(model.node_category("U"), Some(NodeCategory::Utility(zero.clone())));
        assert_eq!(model.node_category("X"), None);
        assert_eq!(model.whose_node("D"), Some(&zero));
        assert_eq!(model.decision_nodes(&zero), &["D".to_string()]);
    }

    #[test]
    fn owned_node_must_exist() {
        let err = MacidModel::cid([("A", "B")], vec!["D"], Vec::<String>::new());
        assert!(matches!(err, Err(ExecError::Structure(_))));
    }

    #[test]
    fn node_cannot_be_claimed_twice() {
        let err = MacidModel::new(
            [("D", "U")],
            vec![
                AgentNodes::new("a", vec!["D"], vec!["U"]),
                AgentNodes::new("b", vec!["D"], Vec::<String>::new()),
            ],
        );
        assert!(matches!(err, Err(ExecError::Structure(_))));

        let err = MacidModel::cid([("D", "U")], vec!["D"], vec!["D"]);
        assert!(err.is_err());
    }

    #[test]
    fn unknown_node_queues_nothing() {
        let mut model = three_node();
        let err = model.add_cpds([
            Cpd::uniform("S", states([0, 1])),
            Cpd::uniform("Q", states([0, 1])),
        ]);
        assert!(err.is_err());
        assert!(model.pending_nodes().unwrap().is_empty());
        assert!(model.get_cpd("S").is_none());
    }

    #[test]
    fn pending_nodes_are_reported_in_topological_order() {
        let mut model = three_node();
        let report = model
            .add_cpds([
                Cpd::function("U", vec!["S", "D"], |v| StateValue::from(v[0] == v[1])),
                Cpd::decision_domain("D", states([0, 1])),
            ])
            .unwrap();
        assert_eq!(report.pending, vec!["D", "U"]);
        assert_eq!(model.pending_nodes().unwrap(), vec!["D", "U"]);

        let report = model.add_cpds([Cpd::uniform("S", states([0, 1]))]).unwrap();
        assert!(report.is_complete());
        assert_eq!(model.cardinality("U"), Some(2));
        assert!(model.check_model().is_ok());
    }

    #[test]
    fn update_all_recomputes_children() {
        let mut model = MacidModel::cid([("A", "B")], vec!["A"], vec!["B"]).unwrap();
        model
            .add_cpds([
                Cpd::decision_domain("A", states([0, 1])),
                Cpd::function("B", vec!["A"], |v| v[0]),
            ])
            .unwrap();
        assert_eq!(model.get_cpd("B").unwrap().states(), states([0, 1]).as_slice());

        model.add_cpds([Cpd::uniform("A", states([0, 1, 2]))]).unwrap();
        assert_eq!(model.cardinality("B"), Some(3));
        assert_eq!(model.cpd_label("A"), Some("unif"));
    }

    #[test]
    fn failed_install_leaves_installed_tables_current() {
        let mut model = three_node();
        model
            .add_cpds([
                Cpd::uniform("S", states([0, 1])),
                Cpd::uniform("D", states([0, 1])),
                Cpd::function("U", vec!["S", "D"], |v| StateValue::from(v[0] == v[1])),
            ])
            .unwrap();
        assert_eq!(model.expected_value(&["U"], &Context::new(), None).unwrap(), vec![0.5]);

        // D's graph parent is S, so a parentless function cannot resolve.
        let err = model.add_cpds([Cpd::function("D", Vec::<String>::new(), |_| StateValue::from(0))]);
        assert!(matches!(err, Err(ExecError::Structure(_))));
        assert!(model.pending_nodes().unwrap().is_empty());
        assert_eq!(model.cpd_label("D"), Some("unif"));
        assert!(model.check_model().is_ok());
        assert_eq!(model.expected_value(&["U"], &Context::new(), None).unwrap(), vec![0.5]);
    }

    #[test]
    fn failed_install_drops_the_queued_entry() {
        let mut model = three_node();
        let wide = TabularCpd::new(
            "D",
            2,
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 1.0]],
            vec!["S"],
            vec![3],
        )
        .unwrap();
        model.add_cpds([Cpd::from(wide)]).unwrap();
        assert_eq!(model.pending_nodes().unwrap(), vec!["D"]);

        // S has two states, the queued table for D expects three.
        let err = model.add_cpds([Cpd::uniform("S", states([0, 1]))]);
        assert!(matches!(err, Err(ExecError::Structure(_))));
        assert!(model.pending_nodes().unwrap().is_empty());
        assert!(model.get_cpd("S").is_none());
    }

    #[test]
    fn empty_declared_states_are_rejected() {
        let mut model = MacidModel::cid([("A", "B")], vec!["A"], vec!["B"]).unwrap();
        let err = model.add_cpds([
            Cpd::function("A", Vec::<String>::new(), |_| StateValue::from(0))
                .with_state_names(Vec::new()),
            Cpd::function("B", vec!["A"], |v| v[0]),
        ]);
        assert!(matches!(err, Err(ExecError::Structure(_))));
        assert!(model.get_cpd("B").is_none());
        assert!(model.expected_value(&["B"], &Context::new(), None).is_err());
    }

    #[test]
    fn check_model_flags_stale_tables() {
        let mut model = three_node();
        model
            .add_cpds([
                Cpd::uniform("S", states([0, 1])),
                Cpd::decision_domain("D", states([0, 1])),
                Cpd::function("U", vec!["S", "D"], |v| StateValue::from(v[0] == v[1])),
            ])
            .unwrap();
        assert!(model.check_model().is_ok());
        assert!(model.remove_edge("S", "D"));
        assert!(matches!(model.check_model(), Err(ExecError::Structure(_))));
    }

    #[test]
    fn valid_order_filters_topological_order() {
        let model = three_node();
        assert_eq!(model.valid_order(["U", "S"]).unwrap(), vec!["S", "U"]);
        assert!(model.valid_order(["nope"]).is_err());
    }

    #[test]
    fn inference_config_is_validated() {
        let bad = InferenceConfig {
            max_factor_entries: 0,
            ..InferenceConfig::default()
        };
        assert!(three_node().with_inference_config(bad).is_err());

        let sequential = InferenceConfig {
            elimination_order: EliminationOrder::Sequential,
            ..InferenceConfig::default()
        };
        let model = three_node().with_inference_config(sequential).unwrap();
        assert_eq!(model.inference_config(), sequential);
        assert_eq!(three_node().inference_config(), InferenceConfig::default());
    }
}
