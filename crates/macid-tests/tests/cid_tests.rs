//! Single-agent diagrams: installation, queries, policies and recall.

mod common;

use common::{
    assert_close, five_node, five_node_scaled, introduced_bias, three_node, two_decisions,
};
use macid_core::{states, Context, Cpd, ExecError, NodeCategory, TabularCpd};

#[test]
fn identity_table_installs_and_checks() {
    let mut model = three_node();
    let identity =
        TabularCpd::new("D", 2, vec![vec![1.0, 0.0], vec![0.0, 1.0]], vec!["S"], vec![2]).unwrap();
    model.add_cpds([identity.clone().into()]).unwrap();

    assert_eq!(model.get_cpd("D"), Some(&identity));
    model.check_model().unwrap();
}

#[test]
fn placeholder_decision_blocks_utility_query() {
    let model = three_node();
    for ctx in [Context::new(), Context::from([("D", 0)])] {
        let err = model.query(&["U"], &ctx, None).unwrap_err();
        match err {
            ExecError::UnpoliciedDecision { decision, query } => {
                assert_eq!(decision, "D");
                assert!(query.contains("U"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn fully_observed_context_needs_no_policy() {
    let model = three_node();
    let eu = |d: i32, s: i32| {
        model
            .expected_utility(&Context::from([("D", d), ("S", s)]), None, 0)
            .unwrap()
    };
    assert_eq!(eu(0, 0), 1.0);
    assert_eq!(eu(1, 0), 0.0);
}

#[test]
fn five_node_expected_utility() {
    let model = five_node();
    let ctx = Context::from([("D", 0), ("S1", 0), ("S2", 0)]);
    assert_eq!(model.expected_utility(&ctx, None, 0).unwrap(), 2.0);
    let ctx = Context::from([("D", 0), ("S1", 0), ("S2", 1)]);
    assert_eq!(model.expected_utility(&ctx, None, 0).unwrap(), 1.0);
}

#[test]
fn scaled_utilities_under_random_policy() {
    let mut model = five_node_scaled(10.0, 2.0);
    model.impute_random_policy().unwrap();
    assert_eq!(model.expected_utility(&Context::new(), None, 0).unwrap(), 6.0);
}

#[test]
fn solve_three_node_repeatedly() {
    let mut model = three_node();
    model.solve().unwrap();
    let solution = model.solve().unwrap();
    let d = &solution["D"];
    assert_eq!(d.rows(), vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

    model.add_cpds([d.clone().into()]).unwrap();
    assert_eq!(model.expected_utility(&Context::new(), None, 0).unwrap(), 1.0);
}

#[test]
fn solve_two_decisions() {
    let mut model = two_decisions();
    let solution = model.solve().unwrap();
    assert_eq!(solution["D2"].rows(), vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

    model
        .add_cpds(solution.into_values().map(Cpd::from))
        .unwrap();
    assert_eq!(model.expected_utility(&Context::new(), None, 0).unwrap(), 1.0);
}

#[test]
fn sufficient_recall_flips_when_observation_removed() {
    let mut model = two_decisions();
    assert!(model.check_sufficient_recall().unwrap());
    assert!(model.remove_edge("S2", "D2"));
    assert!(!model.check_sufficient_recall().unwrap());
}

#[test]
fn conditional_expectation_then_optimal_keep_utility() {
    let mut model = introduced_bias();
    model.impute_conditional_expectation_decision("D", "Y").unwrap();
    assert_eq!(model.cpd_label("D"), Some("cond_exp(Y)"));
    let eu_cond = model.expected_utility(&Context::new(), None, 0).unwrap();
    assert_close(eu_cond, -1.0 / 6.0, 1e-9, "conditional expectation utility");

    model.impute_optimal_decision("D").unwrap();
    let eu_opt = model.expected_utility(&Context::new(), None, 0).unwrap();
    assert_close(eu_opt, eu_cond, 1e-9, "optimal utility");
}

#[test]
fn conditional_expectation_infers_states_from_outputs() {
    let mut model = introduced_bias();
    model.impute_conditional_expectation_decision("D", "Y").unwrap();
    let d = model.get_cpd("D").unwrap();
    assert_eq!(d.cardinality(), 2);
    assert_close(d.states()[0].get(), 1.0 / 3.0, 1e-12, "E[Y | X = 0]");
    assert_close(d.states()[1].get(), 2.0, 1e-12, "E[Y | X = 1]");
}

#[test]
fn optimal_policy_is_idempotent_in_effect() {
    let mut model = two_decisions();
    model.impute_optimal_policy().unwrap();
    let first = model.expected_utility(&Context::new(), None, 0).unwrap();
    model.impute_optimal_policy().unwrap();
    let second = model.expected_utility(&Context::new(), None, 0).unwrap();
    assert_eq!(first, 1.0);
    assert_eq!(first, second);
}

#[test]
fn zero_probability_context_is_a_numerical_error() {
    let mut model = three_node();
    model.impute_optimal_policy().unwrap();
    let err = model
        .expected_utility(&Context::from([("S", 0), ("D", 1)]), None, 0)
        .unwrap_err();
    match err {
        ExecError::Numerical(msg) => assert!(msg.contains("random decision")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn accessors_describe_the_diagram() {
    let model = three_node();
    assert_eq!(model.nodes().collect::<Vec<_>>(), vec!["S", "D", "U"]);
    assert_eq!(model.edges(), vec![("S", "D"), ("S", "U"), ("D", "U")]);
    assert_eq!(model.node_category("S"), Some(NodeCategory::Chance));
    assert!(matches!(model.node_category("D"), Some(NodeCategory::Decision(_))));
    assert_eq!(model.cpd_label("D"), None);
    assert_eq!(model.cardinality("U"), Some(2));
    assert_eq!(model.get_cpd("U").unwrap().states(), states([0, 1]).as_slice());
}

#[test]
fn reinstall_rejects_function_missing_a_new_parent() {
    let mut model = three_node();
    model.impute_random_policy().unwrap();
    model.add_node("W").unwrap();
    model.add_edge("W", "U").unwrap();
    assert!(matches!(model.check_model(), Err(ExecError::Structure(_))));

    let err = model
        .add_cpds([Cpd::uniform("W", states([0, 1]))])
        .unwrap_err();
    assert!(matches!(err, ExecError::Structure(_)));
}
