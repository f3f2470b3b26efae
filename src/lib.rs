//! Vergence Lab library: gaze-driven dwell selection and vergence
//! measurement for depth-perception experiments.
//!
//! This library crate exposes the experiment core for hosts and
//! integration testing. The headless binary entry point lives in `main.rs`.

pub mod clock;
pub mod config;
pub mod input_source;
pub mod session;
pub mod vr;
