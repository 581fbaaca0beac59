//! Integration tests for the docpace analysis scheduler

mod alignment_strategies;
mod budget_lifecycle;
mod builtin_tools;
mod config_loading;
mod improvement_loop;
mod test_utils;
