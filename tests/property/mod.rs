//! Property-based tests for scheduling and scoring invariants

mod invariants;
