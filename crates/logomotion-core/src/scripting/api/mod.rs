//! # API Module
//!
//! Aggregates all Rhai API sub-modules and provides a single registration point.
//!
//! ## Sub-modules
//! - **anime**: The adapter root, `anime::` module, stagger and random helpers
//! - **timeline**: Timeline building and control
//! - **selection**: `scene::` queries and selection handles

pub mod anime;
pub mod selection;
pub mod timeline;

use rhai::Engine;

/// Register all API functions with the Rhai engine.
pub fn register_all(engine: &mut Engine) {
    anime::register(engine);
    timeline::register(engine);
    selection::register(engine);
}
