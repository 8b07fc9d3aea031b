//! Integration tests for hashline switches over loopback UDP
//!
//! This test suite validates:
//! - Bootstrapping against a seed and self-seeding a new network
//! - Line establishment converging on the same line id on both sides
//! - Discovery of a third switch through the seed's answers
//! - Liveness sweeps and resilience to garbage datagrams

pub mod test_utils;

#[cfg(test)]
mod seeding_tests;

#[cfg(test)]
mod liveness_tests;
