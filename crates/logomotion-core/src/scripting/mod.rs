//! # Scripting Module
//!
//! Rhai scripting API bindings for animation sources.
//!
//! ## Responsibilities
//! - **Engine Setup**: Registers all types and functions with Rhai.
//! - **Adapter Root**: `anime` value and `anime::` module (timeline, stagger, random).
//! - **Scene Access**: `container` value and `scene::` module (selector queries).
//! - **Limits**: Operation budget and call depth for untrusted sources.
//!
//! ## Pattern
//! All bindings follow: `engine.register_fn("name", |...| { ... })`
//!
//! ## Module Structure
//! - `types`: Handle types (Container, Selection, Stagger)
//! - `utils`: Map/value parsing into timeline parameters
//! - `api/`: Sub-modules for anime, timeline and selection

mod api;
pub mod types;
pub mod utils;

pub use api::anime::create_anime_module;
pub use api::selection::create_scene_module;
pub use types::{Container, Selection, Stagger};

use crate::timeline::AnimeRoot;
use rhai::{Dynamic, Engine};
use tracing::{debug, info};

/// Limits applied to every script run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScriptLimits {
    /// `0` disables the operation budget.
    pub max_operations: u64,
    pub max_call_levels: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 64,
        }
    }
}

/// Builds a fresh engine whose only handles are `root` and its scene.
///
/// `anime` and `container` resolve everywhere, including inside script functions, which
/// cannot see the caller's scope.
pub fn create_engine(root: &AnimeRoot, limits: ScriptLimits) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_expr_depths(0, 0);
    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);

    engine.on_print(|text| info!(target: "logomotion::script", "{}", text));
    engine.on_debug(|text, source, pos| {
        debug!(target: "logomotion::script", ?source, %pos, "{}", text)
    });

    engine.register_static_module("anime", create_anime_module(root).into());
    engine.register_static_module("scene", create_scene_module(root.scene()).into());
    api::register_all(&mut engine);

    let anime = root.clone();
    let container = Container {
        scene: root.scene().clone(),
    };
    engine.on_var(move |name, _index, _context| match name {
        "anime" => Ok(Some(Dynamic::from(anime.clone()))),
        "container" => Ok(Some(Dynamic::from(container.clone()))),
        _ => Ok(None),
    });

    engine
}
