//! The MACID engine.
//!
//! This module provides:
//! - **errors**: Error type shared by every operation
//! - **value**: State values, agent labels and node assignments
//! - **dag**: Named-node DAG with the active-trail test
//! - **cpd**: Distribution objects and resolved tables
//! - **install**: Staged, topologically ordered installation
//! - **model**: The MACID aggregate and its accessors
//! - **mechanism**: Mechanism graph and strategic relevance
//! - **factor** / **inference**: Discrete factors and variable elimination
//! - **query**: Queries, interventions, expected value and utility
//! - **policy**: Random, expectation-based and optimal policies
//! - **recall**: Sufficient-recall check

pub mod cpd;
pub mod dag;
pub mod errors;
pub mod factor;
pub mod inference;
pub mod install;
pub mod mechanism;
pub mod model;
pub mod policy;
pub mod query;
pub mod recall;
pub mod value;
