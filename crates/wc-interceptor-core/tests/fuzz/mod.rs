//! Fuzz tests module
//!
//! Property-based tests for input parsing and the approval policy.
