//! Mood Dialogue - multi-turn mood conversation orchestrator
//!
//! This crate holds a short dialogue with a listener, accumulating mood and
//! situational context turn over turn until it is clear enough to ask a
//! recommender for music.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
