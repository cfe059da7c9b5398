//! Multi-agent diagrams: ownership, per-agent utilities and backward induction.

mod common;

use common::two_agents;
use macid_core::{AgentId, Context, ExecError, NodeCategory};

#[test]
fn ownership_is_recorded_per_agent() {
    let model = two_agents();
    let (a0, a1) = (AgentId::from(0), AgentId::from(1));
    assert_eq!(model.agents(), &[a0.clone(), a1.clone()]);
    assert_eq!(model.decision_nodes(&a1), &["D2".to_string()]);
    assert_eq!(model.utility_nodes(&a0), &["U1".to_string()]);
    assert_eq!(model.whose_node("U2"), Some(&a1));
    assert_eq!(model.node_category("D1"), Some(NodeCategory::Decision(a0)));
    assert_eq!(model.node_category("U2"), Some(NodeCategory::Utility(a1)));
}

#[test]
fn utilities_read_from_tables() {
    let model = two_agents();
    let ctx = Context::from([("D1", 0), ("D2", 0)]);
    assert_eq!(model.expected_utility(&ctx, None, 0).unwrap(), 3.0);
    let ctx = Context::from([("D1", 0), ("D2", 1)]);
    assert_eq!(model.expected_utility(&ctx, None, 1).unwrap(), 5.0);
}

#[test]
fn backward_induction_finds_subgame_perfect_play() {
    let mut model = two_agents();
    model.impute_optimal_policy().unwrap();
    assert_eq!(model.expected_utility(&Context::new(), None, 0).unwrap(), 3.0);
    assert_eq!(model.expected_utility(&Context::new(), None, 1).unwrap(), 2.0);

    // Agent 1 answers 0 with 1 and 1 with 0.
    let d2 = model.get_cpd("D2").unwrap();
    assert_eq!(d2.rows(), vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
    assert_eq!(model.cpd_label("D1"), Some("opt"));
}

#[test]
fn second_mover_policy_is_needed_for_first_mover_utility() {
    let mut model = two_agents();
    model.impute_random_decision("D1").unwrap();
    let err = model
        .expected_utility(&Context::from([("D1", 1)]), None, 0)
        .unwrap_err();
    assert!(matches!(err, ExecError::UnpoliciedDecision { ref decision, .. } if decision == "D2"));
}

#[test]
fn unknown_agent_is_rejected() {
    let model = two_agents();
    let err = model.expected_utility(&Context::new(), None, "C").unwrap_err();
    assert!(matches!(err, ExecError::ValidationError(_)));
}
