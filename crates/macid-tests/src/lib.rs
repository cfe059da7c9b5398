//! Integration test crate for `macid-core`.
//!
//! All tests live under `tests/`; shared example diagrams are in
//! `tests/common/mod.rs`.
