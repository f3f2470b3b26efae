//! Gaze pipeline: geometry kernel, vergence estimation, dwell selection,
//! trial aggregation and trace recording.

pub mod dwell;
pub mod eye_tracking;
pub mod geometry;
pub mod scene;
pub mod trace;
pub mod trial;
