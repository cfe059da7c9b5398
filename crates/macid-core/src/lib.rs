//! # MACID Core
//!
//! Multi-agent causal influence diagrams: conditional distributions (including
//! function-defined ones whose state space is inferred from the function),
//! policy imputation by backward induction, and causal queries under `do`
//! interventions.
//!
//! ```
//! use macid_core::{states, Context, Cpd, MacidModel, StateValue};
//!
//! let mut model = MacidModel::cid([("S", "D"), ("S", "U"), ("D", "U")], vec!["D"], vec!["U"])?;
//! model.add_cpds([
//!     Cpd::uniform("S", states([0, 1])),
//!     Cpd::decision_domain("D", states([0, 1])),
//!     Cpd::function("U", vec!["S", "D"], |v| StateValue::from(v[0] == v[1])),
//! ])?;
//! model.impute_optimal_policy()?;
//! assert_eq!(model.expected_utility(&Context::new(), None, 0)?, 1.0);
//! # Ok::<(), macid_core::ExecError>(())
//! ```

pub mod engine;

// Re-export commonly used types
pub use engine::cpd::{Cpd, CpdFn, InstalledCpd, TabularCpd};
pub use engine::dag::Dag;
pub use engine::errors::ExecError;
pub use engine::factor::DiscreteFactor;
pub use engine::inference::{EliminationOrder, InferenceConfig};
pub use engine::install::InstallReport;
pub use engine::mechanism::mechanism_node;
pub use engine::model::{AgentNodes, MacidModel, NodeCategory};
pub use engine::policy::PolicyCache;
pub use engine::value::{states, AgentId, Assignment, Context, Intervention, StateValue};
