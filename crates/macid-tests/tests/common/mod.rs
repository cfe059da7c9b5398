//! Example diagrams shared by the integration tests.

#![allow(dead_code)]

use macid_core::{states, AgentNodes, Cpd, MacidModel, StateValue, TabularCpd};

pub fn assert_close(actual: f64, expected: f64, tol: f64, label: &str) {
    assert!(
        (actual - expected).abs() <= tol,
        "{} mismatch: expected {:.15}, got {:.15}, diff={:.3e}",
        label,
        expected,
        actual,
        (actual - expected).abs()
    );
}

fn fair_coin(node: &str) -> Cpd {
    TabularCpd::new::<&str>(node, 2, vec![vec![0.5], vec![0.5]], vec![], vec![])
        .expect("coin table")
        .into()
}

fn eq(a: StateValue, b: StateValue) -> StateValue {
    StateValue::from(a == b)
}

/// `A -> B` with `B` copying the decision `A`.
pub fn minimal() -> MacidModel {
    let mut model = MacidModel::cid([("A", "B")], vec!["A"], vec!["B"]).expect("minimal");
    model
        .add_cpds([
            Cpd::decision_domain("A", states([0, 1])),
            Cpd::function("B", vec!["A"], |v| v[0]),
        ])
        .expect("minimal cpds");
    model
}

/// The decision `D` observes a fair coin `S` and is rewarded for matching it.
pub fn three_node() -> MacidModel {
    let mut model = MacidModel::cid([("S", "D"), ("S", "U"), ("D", "U")], vec!["D"], vec!["U"])
        .expect("3node");
    model
        .add_cpds([
            fair_coin("S"),
            Cpd::decision_domain("D", states([0, 1])),
            Cpd::function("U", vec!["S", "D"], |v| eq(v[0], v[1])),
        ])
        .expect("3node cpds");
    model
}

/// One decision observing two coins; each utility rewards matching one coin.
pub fn five_node() -> MacidModel {
    five_node_scaled(1.0, 1.0)
}

pub fn five_node_scaled(w1: f64, w2: f64) -> MacidModel {
    let mut model = MacidModel::cid(
        [
            ("S1", "D"),
            ("S1", "U1"),
            ("S2", "D"),
            ("S2", "U2"),
            ("D", "U1"),
            ("D", "U2"),
        ],
        vec!["D"],
        vec!["U1", "U2"],
    )
    .expect("5node");
    model
        .add_cpds([
            fair_coin("S1"),
            fair_coin("S2"),
            Cpd::decision_domain("D", states([0, 1])),
            Cpd::function("U1", vec!["S1", "D"], move |v| {
                StateValue::from(w1 * eq(v[0], v[1]).get())
            }),
            Cpd::function("U2", vec!["S2", "D"], move |v| {
                StateValue::from(w2 * eq(v[0], v[1]).get())
            }),
        ])
        .expect("5node cpds");
    model
}

/// Two sequential decisions: `D1` sets `S2`, which `D2` observes.
pub fn two_decisions() -> MacidModel {
    let mut model = MacidModel::cid(
        [
            ("S1", "S2"),
            ("S1", "D1"),
            ("D1", "S2"),
            ("S2", "U"),
            ("S2", "D2"),
            ("D2", "U"),
        ],
        vec!["D1", "D2"],
        vec!["U"],
    )
    .expect("2dec");
    model
        .add_cpds([
            Cpd::uniform("S1", states([0, 1])),
            Cpd::decision_domain("D1", states([0, 1])),
            Cpd::decision_domain("D2", states([0, 1])),
            Cpd::function("S2", vec!["S1", "D1"], |v| eq(v[0], v[1])),
            Cpd::function("U", vec!["S2", "D2"], |v| eq(v[0], v[1])),
        ])
        .expect("2dec cpds");
    model
}

/// A decision that should estimate `Y` from a proxy `X = A * Z`.
pub fn introduced_bias() -> MacidModel {
    let mut model = MacidModel::cid(
        [
            ("A", "X"),
            ("Z", "X"),
            ("Z", "Y"),
            ("X", "D"),
            ("X", "Y"),
            ("D", "U"),
            ("Y", "U"),
        ],
        vec!["D"],
        vec!["U"],
    )
    .expect("introduced bias");
    model
        .add_cpds([
            Cpd::uniform("A", states([0, 1])),
            Cpd::uniform("Z", states([0, 1])),
            Cpd::function("X", vec!["A", "Z"], |v| StateValue::from(v[0].get() * v[1].get())),
            Cpd::function("Y", vec!["X", "Z"], |v| StateValue::from(v[0].get() + v[1].get())),
            Cpd::decision_domain("D", states([0, 1])),
            Cpd::function("U", vec!["D", "Y"], |v| {
                let diff = v[0].get() - v[1].get();
                StateValue::from(-diff * diff)
            }),
        ])
        .expect("introduced bias cpds");
    model
}

/// Two agents; agent 1 moves second and observes agent 0's move.
///
/// Utilities by `(D1, D2)`: agent 0 gets 3, 0, 3, 1 and agent 1 gets
/// 1, 5, 2, 0.
pub fn two_agents() -> MacidModel {
    let mut model = MacidModel::new(
        [
            ("D1", "D2"),
            ("D1", "U1"),
            ("D1", "U2"),
            ("D2", "U2"),
            ("D2", "U1"),
        ],
        vec![
            AgentNodes::new(0, vec!["D1"], vec!["U1"]),
            AgentNodes::new(1, vec!["D2"], vec!["U2"]),
        ],
    )
    .expect("2 agents");
    let u1 = TabularCpd::new(
        "U1",
        6,
        vec![
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 1.0],
            vec![0.0, 0.0, 0.0, 0.0],
            vec![1.0, 0.0, 1.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0],
        ],
        vec!["D1", "D2"],
        vec![2, 2],
    )
    .expect("u1");
    let u2 = TabularCpd::new(
        "U2",
        6,
        vec![
            vec![0.0, 0.0, 0.0, 1.0],
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
        ],
        vec!["D1", "D2"],
        vec![2, 2],
    )
    .expect("u2");
    model
        .add_cpds([
            Cpd::decision_domain("D1", states([0, 1])),
            Cpd::decision_domain("D2", states([0, 1])),
            u1.into(),
            u2.into(),
        ])
        .expect("2 agents cpds");
    model
}
