//! # Selection API
//!
//! Scene queries for Rhai scripts.
//!
//! ## Responsibilities
//! - **Queries**: `scene::query(selector)` and `container.query(selector)`
//! - **Selections**: `len`, `ids`, `set_attr`; usable directly as `targets`

use crate::scene::SceneHandle;
use rhai::{Array, Dynamic, Engine, EvalAltResult, Module};

use super::super::types::{Container, Selection};

fn query(container: &Container, selector: &str) -> Result<Selection, Box<EvalAltResult>> {
    container.query(selector).map_err(|e| e.to_string().into())
}

/// Builds the `scene::` static module bound to one mounted scene.
pub fn create_scene_module(scene: &SceneHandle) -> Module {
    let mut module = Module::new();
    let container = Container {
        scene: scene.clone(),
    };
    module.set_native_fn("query", move |selector: &str| query(&container, selector));
    module
}

/// Register selection-related Rhai functions.
pub fn register(engine: &mut Engine) {
    engine.register_type_with_name::<Container>("Container");
    engine.register_type_with_name::<Selection>("Selection");

    engine.register_fn("query", |container: Container, selector: &str| {
        query(&container, selector)
    });

    engine.register_fn("len", |selection: &mut Selection| selection.nodes.len() as i64);
    engine.register_get("length", |selection: &mut Selection| {
        selection.nodes.len() as i64
    });
    engine.register_fn("ids", |selection: &mut Selection| {
        selection
            .ids()
            .into_iter()
            .map(Dynamic::from)
            .collect::<Array>()
    });
    engine.register_fn(
        "set_attr",
        |selection: &mut Selection, name: &str, value: Dynamic| {
            selection.set_attribute(name, &value.to_string());
        },
    );
}
