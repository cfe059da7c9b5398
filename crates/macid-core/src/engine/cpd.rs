//! # Conditional distributions
//!
//! A node's conditional distribution is described in two phases:
//!
//! - **[`Cpd`]**: the unresolved descriptor a caller attaches to a node. It
//!   holds only the generating rule: an explicit table, an explicit state list
//!   (uniform random, decision domain), or a function of parent values.
//!
//! - **[`TabularCpd`]**: the immutable resolved table, produced once the
//!   graph's parent structure and the parents' state spaces are known.
//!
//! ## Function-defined distributions
//!
//! A function-defined [`Cpd`] does not know its own state space up front.
//! Resolution enumerates the Cartesian product of the evidence nodes' state
//! lists (last evidence node varying fastest), evaluates the function on every
//! combination and, unless states were declared, takes the **sorted set of
//! distinct outputs** as the node's states. The table then puts probability 1
//! on the output row of each column.
//!
//! ## Decision domains
//!
//! [`Cpd::decision_domain`] marks a decision that has legal values but no
//! policy. It resolves to a uniform table so inference bookkeeping stays
//! complete, while the query engine refuses queries the placeholder is
//! strategically relevant to.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::engine::errors::ExecError;
use crate::engine::factor::DiscreteFactor;
use crate::engine::install::ResolveScope;
use crate::engine::value::StateValue;

/// Tolerance used when checking that table columns sum to one.
const COLUMN_SUM_TOLERANCE: f64 = 1e-6;

/// Function from parent values (in evidence order) to the node's value.
pub type CpdFn = Arc<dyn Fn(&[StateValue]) -> Result<StateValue, ExecError> + Send + Sync>;

/// A resolved conditional probability table.
///
/// `values` has one row per state of `variable` and one column per joint
/// assignment of `evidence` (last evidence variable fastest), stored
/// row-major.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TabularCpd {
    variable: String,
    states: Vec<StateValue>,
    evidence: Vec<String>,
    evidence_card: Vec<usize>,
    values: Vec<f64>,
}

impl TabularCpd {
    /// Creates a table with default state names `0..card`.
    ///
    /// `rows` must contain `card` rows of `prod(evidence_card)` entries each.
    pub fn new<S: Into<String>>(
        variable: impl Into<String>,
        card: usize,
        rows: Vec<Vec<f64>>,
        evidence: Vec<S>,
        evidence_card: Vec<usize>,
    ) -> Result<Self, ExecError> {
        let variable = variable.into();
        let evidence: Vec<String> = evidence.into_iter().map(Into::into).collect();
        if card == 0 {
            return Err(ExecError::structure(format!("cpd for '{}' has no states", variable)));
        }
        if evidence.len() != evidence_card.len() {
            return Err(ExecError::structure(format!(
                "cpd for '{}': {} evidence nodes but {} evidence cardinalities",
                variable,
                evidence.len(),
                evidence_card.len()
            )));
        }
        if rows.len() != card {
            return Err(ExecError::structure(format!(
                "cpd for '{}': expected {} rows, got {}",
                variable,
                card,
                rows.len()
            )));
        }
        let columns: usize = evidence_card.iter().product();
        if let Some(bad) = rows.iter().find(|r| r.len() != columns) {
            return Err(ExecError::structure(format!(
                "cpd for '{}': expected {} columns, got a row of {}",
                variable,
                columns,
                bad.len()
            )));
        }
        let states = (0..card).map(StateValue::from).collect();
        Self::from_parts(
            variable,
            states,
            evidence,
            evidence_card,
            rows.into_iter().flatten().collect(),
        )
    }

    /// Replaces the default state names.
    pub fn with_state_names(mut self, states: Vec<StateValue>) -> Result<Self, ExecError> {
        if states.len() != self.states.len() {
            return Err(ExecError::structure(format!(
                "cpd for '{}': {} state names for cardinality {}",
                self.variable,
                states.len(),
                self.states.len()
            )));
        }
        check_unique(&self.variable, &states)?;
        self.states = states;
        Ok(self)
    }

    pub(crate) fn from_parts(
        variable: String,
        states: Vec<StateValue>,
        evidence: Vec<String>,
        evidence_card: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self, ExecError> {
        if states.is_empty() {
            return Err(ExecError::structure(format!("cpd for '{}' has no states", variable)));
        }
        check_unique(&variable, &states)?;
        let columns: usize = evidence_card.iter().product();
        if values.len() != states.len() * columns {
            return Err(ExecError::structure(format!(
                "cpd for '{}': expected {} values, got {}",
                variable,
                states.len() * columns,
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ExecError::structure(format!(
                "cpd for '{}' contains a negative or non-finite probability",
                variable
            )));
        }
        Ok(Self {
            variable,
            states,
            evidence,
            evidence_card,
            values,
        })
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn states(&self) -> &[StateValue] {
        &self.states
    }

    pub fn cardinality(&self) -> usize {
        self.states.len()
    }

    pub fn evidence(&self) -> &[String] {
        &self.evidence
    }

    pub fn evidence_card(&self) -> &[usize] {
        &self.evidence_card
    }

    /// Flat row-major values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn columns(&self) -> usize {
        self.evidence_card.iter().product()
    }

    /// Probability of state row `row` under evidence column `column`.
    pub fn value(&self, row: usize, column: usize) -> Option<f64> {
        let columns = self.columns();
        if row >= self.states.len() || column >= columns {
            return None;
        }
        self.values.get(row * columns + column).copied()
    }

    /// The table as nested rows, mainly for assertions and display.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        let columns = self.columns().max(1);
        self.values.chunks(columns).map(<[f64]>::to_vec).collect()
    }

    pub fn state_index(&self, value: StateValue) -> Option<usize> {
        self.states.iter().position(|s| *s == value)
    }

    /// Checks that every column is a probability distribution.
    pub fn check_normalized(&self) -> Result<(), ExecError> {
        let columns = self.columns();
        for column in 0..columns {
            let sum: f64 = (0..self.states.len())
                .map(|row| self.values[row * columns + column])
                .sum();
            if (sum - 1.0).abs() > COLUMN_SUM_TOLERANCE {
                return Err(ExecError::Numerical(format!(
                    "cpd for '{}': column {} sums to {}",
                    self.variable, column, sum
                )));
            }
        }
        Ok(())
    }

    /// Converts the table into a factor over `[variable, evidence...]`, given
    /// the evidence nodes' state lists.
    pub fn to_factor(&self, evidence_states: Vec<Vec<StateValue>>) -> Result<DiscreteFactor, ExecError> {
        let mut variables = Vec::with_capacity(self.evidence.len() + 1);
        variables.push(self.variable.clone());
        variables.extend(self.evidence.iter().cloned());
        let mut state_names = Vec::with_capacity(variables.len());
        state_names.push(self.states.clone());
        state_names.extend(evidence_states);
        DiscreteFactor::new(variables, state_names, self.values.clone())
    }
}

/// A function-defined distribution.
#[derive(Clone)]
pub struct FunctionCpd {
    variable: String,
    evidence: Vec<String>,
    f: CpdFn,
    states: Option<Vec<StateValue>>,
    label: Option<String>,
}

impl fmt::Debug for FunctionCpd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCpd")
            .field("variable", &self.variable)
            .field("evidence", &self.evidence)
            .field("states", &self.states)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl FunctionCpd {
    pub fn evidence(&self) -> &[String] {
        &self.evidence
    }

    /// Evaluates the function on one assignment of the evidence nodes.
    pub fn call(&self, parent_values: &[StateValue]) -> Result<StateValue, ExecError> {
        (self.f)(parent_values)
    }

    /// The values this node can take given the values its evidence can take:
    /// the declared states if any, otherwise the sorted distinct outputs.
    pub(crate) fn possible_values(&self, scope: &ResolveScope<'_>) -> Result<Vec<StateValue>, ExecError> {
        if let Some(states) = &self.states {
            return Ok(states.clone());
        }
        let parent_states = self.parent_states(scope)?;
        let mut outputs = self.evaluate_all(&parent_states)?;
        outputs.sort();
        outputs.dedup();
        Ok(outputs)
    }

    fn parent_states(&self, scope: &ResolveScope<'_>) -> Result<Vec<Vec<StateValue>>, ExecError> {
        self.evidence.iter().map(|p| scope.known_states(p)).collect()
    }

    fn evaluate_all(&self, parent_states: &[Vec<StateValue>]) -> Result<Vec<StateValue>, ExecError> {
        cartesian(parent_states)
            .iter()
            .map(|combo| self.call(combo))
            .collect()
    }

    fn resolve(&self, scope: &ResolveScope<'_>) -> Result<TabularCpd, ExecError> {
        check_evidence_matches_parents(&self.variable, &self.evidence, scope)?;
        let parent_states = self.parent_states(scope)?;
        let outputs = self.evaluate_all(&parent_states)?;

        let states = match &self.states {
            Some(declared) if declared.is_empty() => {
                return Err(ExecError::structure(format!(
                    "function for '{}' declares no states",
                    self.variable
                )));
            }
            Some(declared) => {
                if let Some(bad) = outputs.iter().find(|o| !declared.contains(o)) {
                    return Err(ExecError::structure(format!(
                        "function for '{}' produced {} outside its declared states",
                        self.variable, bad
                    )));
                }
                declared.clone()
            }
            None => {
                let mut distinct = outputs.clone();
                distinct.sort();
                distinct.dedup();
                distinct
            }
        };

        let mut values = Vec::with_capacity(states.len() * outputs.len());
        for state in &states {
            values.extend(outputs.iter().map(|o| if o == state { 1.0 } else { 0.0 }));
        }
        TabularCpd::from_parts(
            self.variable.clone(),
            states,
            self.evidence.clone(),
            parent_states.iter().map(Vec::len).collect(),
            values,
        )
    }
}

/// An unresolved distribution object bound to one node.
#[derive(Debug, Clone)]
pub enum Cpd {
    /// An explicit probability table.
    Tabular {
        table: TabularCpd,
        label: Option<String>,
    },
    /// Uniform over `states` for every assignment of the node's parents.
    UniformRandom {
        variable: String,
        states: Vec<StateValue>,
        label: Option<String>,
    },
    /// Deterministic output of a function of the evidence values.
    Function(FunctionCpd),
    /// Legal values of a decision awaiting a policy.
    DecisionDomain {
        variable: String,
        states: Vec<StateValue>,
    },
}

impl From<TabularCpd> for Cpd {
    fn from(table: TabularCpd) -> Self {
        Cpd::Tabular { table, label: None }
    }
}

impl Cpd {
    pub fn tabular(table: TabularCpd) -> Self {
        Cpd::from(table)
    }

    pub fn uniform(variable: impl Into<String>, states: Vec<StateValue>) -> Self {
        Cpd::UniformRandom {
            variable: variable.into(),
            states,
            label: None,
        }
    }

    pub fn decision_domain(variable: impl Into<String>, states: Vec<StateValue>) -> Self {
        Cpd::DecisionDomain {
            variable: variable.into(),
            states,
        }
    }

    /// A function-defined distribution from an infallible function.
    pub fn function<S, F>(variable: impl Into<String>, evidence: Vec<S>, f: F) -> Self
    where
        S: Into<String>,
        F: Fn(&[StateValue]) -> StateValue + Send + Sync + 'static,
    {
        Self::try_function(variable, evidence, move |pv: &[StateValue]| Ok(f(pv)))
    }

    /// A function-defined distribution whose function may fail. Failures
    /// surface from the install call that resolves it.
    pub fn try_function<S, F>(variable: impl Into<String>, evidence: Vec<S>, f: F) -> Self
    where
        S: Into<String>,
        F: Fn(&[StateValue]) -> Result<StateValue, ExecError> + Send + Sync + 'static,
    {
        Cpd::Function(FunctionCpd {
            variable: variable.into(),
            evidence: evidence.into_iter().map(Into::into).collect(),
            f: Arc::new(f),
            states: None,
            label: None,
        })
    }

    /// A function-defined distribution that ignores its evidence and always
    /// returns `value`. This is the `do` operator's replacement distribution.
    pub fn constant<S: Into<String>>(
        variable: impl Into<String>,
        evidence: Vec<S>,
        value: StateValue,
    ) -> Self {
        Self::function(variable, evidence, move |_| value)
    }

    pub fn with_label(mut self, new_label: impl Into<String>) -> Self {
        match &mut self {
            Cpd::Tabular { label, .. } | Cpd::UniformRandom { label, .. } => {
                *label = Some(new_label.into())
            }
            Cpd::Function(f) => f.label = Some(new_label.into()),
            Cpd::DecisionDomain { .. } => {}
        }
        self
    }

    /// Declares the state list of a function-defined distribution instead of
    /// inferring it from the function's outputs. Other kinds are unchanged.
    pub fn with_state_names(mut self, states: Vec<StateValue>) -> Self {
        if let Cpd::Function(f) = &mut self {
            f.states = Some(states);
        }
        self
    }

    pub fn variable(&self) -> &str {
        match self {
            Cpd::Tabular { table, .. } => table.variable(),
            Cpd::UniformRandom { variable, .. } | Cpd::DecisionDomain { variable, .. } => variable,
            Cpd::Function(f) => &f.variable,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Cpd::Tabular { label, .. } => label.as_deref(),
            Cpd::UniformRandom { label, .. } => Some(label.as_deref().unwrap_or("unif")),
            Cpd::Function(f) => f.label.as_deref(),
            Cpd::DecisionDomain { .. } => None,
        }
    }

    /// Whether this is a decision-domain placeholder rather than a policy.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Cpd::DecisionDomain { .. })
    }

    /// States known without resolving against a graph.
    pub fn declared_states(&self) -> Option<&[StateValue]> {
        match self {
            Cpd::Tabular { table, .. } => Some(table.states()),
            Cpd::UniformRandom { states, .. } | Cpd::DecisionDomain { states, .. } => Some(states),
            Cpd::Function(f) => f.states.as_deref(),
        }
    }

    /// Whether every node this object reads from already carries known states.
    pub(crate) fn is_resolvable(&self, scope: &ResolveScope<'_>) -> bool {
        match self {
            Cpd::Function(f) => f.evidence.iter().all(|p| scope.has_known_states(p)),
            _ => match scope.parents(self.variable()) {
                Ok(parents) => parents.iter().all(|p| scope.has_known_states(p)),
                Err(_) => false,
            },
        }
    }

    /// Produces the concrete table for the current graph.
    pub(crate) fn resolve(&self, scope: &ResolveScope<'_>) -> Result<TabularCpd, ExecError> {
        match self {
            Cpd::Tabular { table, .. } => {
                check_evidence_matches_parents(table.variable(), table.evidence(), scope)?;
                for (parent, &card) in table.evidence().iter().zip(table.evidence_card()) {
                    let actual = scope.known_states(parent)?.len();
                    if actual != card {
                        return Err(ExecError::structure(format!(
                            "cpd for '{}' expects {} states for parent '{}', found {}",
                            table.variable(),
                            card,
                            parent,
                            actual
                        )));
                    }
                }
                Ok(table.clone())
            }
            Cpd::UniformRandom {
                variable, states, ..
            }
            | Cpd::DecisionDomain { variable, states } => uniform_table(variable, states, scope),
            Cpd::Function(f) => f.resolve(scope),
        }
    }
}

fn uniform_table(
    variable: &str,
    states: &[StateValue],
    scope: &ResolveScope<'_>,
) -> Result<TabularCpd, ExecError> {
    if states.is_empty() {
        return Err(ExecError::structure(format!(
            "uniform distribution for '{}' has no states",
            variable
        )));
    }
    let parents = scope.parents(variable)?;
    let mut evidence_card = Vec::with_capacity(parents.len());
    for parent in &parents {
        evidence_card.push(scope.known_states(parent)?.len());
    }
    let columns: usize = evidence_card.iter().product();
    let p = 1.0 / states.len() as f64;
    TabularCpd::from_parts(
        variable.to_string(),
        states.to_vec(),
        parents,
        evidence_card,
        vec![p; states.len() * columns],
    )
}

fn check_evidence_matches_parents(
    variable: &str,
    evidence: &[String],
    scope: &ResolveScope<'_>,
) -> Result<(), ExecError> {
    let parents = scope.parents(variable)?;
    let declared: FxHashSet<&str> = evidence.iter().map(String::as_str).collect();
    let actual: FxHashSet<&str> = parents.iter().map(String::as_str).collect();
    if declared != actual || declared.len() != evidence.len() {
        return Err(ExecError::structure(format!(
            "cpd for '{}' uses evidence {:?} but the graph parents are {:?}",
            variable, evidence, parents
        )));
    }
    Ok(())
}

fn check_unique(variable: &str, states: &[StateValue]) -> Result<(), ExecError> {
    let mut seen = FxHashSet::default();
    if let Some(dup) = states.iter().find(|s| !seen.insert(**s)) {
        return Err(ExecError::structure(format!(
            "state {} listed twice for '{}'",
            dup, variable
        )));
    }
    Ok(())
}

/// All joint assignments of the given state lists, last list varying fastest.
pub(crate) fn cartesian(lists: &[Vec<StateValue>]) -> Vec<Vec<StateValue>> {
    let mut combos: Vec<Vec<StateValue>> = vec![Vec::with_capacity(lists.len())];
    for list in lists {
        let mut next = Vec::with_capacity(combos.len() * list.len());
        for prefix in &combos {
            for value in list {
                let mut combo = prefix.clone();
                combo.push(*value);
                next.push(combo);
            }
        }
        combos = next;
    }
    combos
}

/// A distribution installed on a node: the source object, kept so the node
/// can be re-resolved when parent state spaces change, and its resolved table.
#[derive(Debug, Clone)]
pub struct InstalledCpd {
    pub(crate) source: Cpd,
    pub(crate) table: TabularCpd,
}

impl InstalledCpd {
    pub fn source(&self) -> &Cpd {
        &self.source
    }

    pub fn table(&self) -> &TabularCpd {
        &self.table
    }
}
