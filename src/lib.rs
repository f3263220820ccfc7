//! `skirmish` - Round-based combat encounter coordinator
//!
//! Characters and garrisons meet in a sector, submit one action per round,
//! and the coordinator resolves each round when everyone has acted or the
//! deadline passes. Outcomes are pushed to the rest of the system through
//! injected callbacks.
//!
//! - [`model`]: encounter, combatant, action and outcome types
//! - [`engine`]: pure, seeded round resolution
//! - [`coordinator`]: lifecycle, locking, timers, toll protocol, callbacks
//! - [`sector`] and [`garrison`]: encounter building and garrison behavior
//! - [`simulation`]: headless driver for scenario files

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod garrison;
pub mod model;
pub mod observability;
pub mod sector;
pub mod simulation;
