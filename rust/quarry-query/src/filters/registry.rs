//! Global registry of index filter factories.
//!
//! The built-in factories are registered on first access; applications may
//! [`add`] their own, replacing any factory with the same name.

use std::sync::{Arc, Once, RwLock};

use quarry_common::{Result, error::Error};

use super::{IndexFilterFactory, datatype, label, time_range};

/// Registers a filter factory under its [`IndexFilterFactory::name`].
///
/// # Arguments
///
/// * `factory` - Anything convertible into `Arc<dyn IndexFilterFactory>`.
pub fn add(factory: impl Into<Arc<dyn IndexFilterFactory>>) {
    register_builtins();
    insert(factory.into());
}

/// Retrieves a filter factory by name.
///
/// # Errors
///
/// Returns an `Error::invalid_arg` if no factory with the specified name is
/// registered.
pub fn get(name: impl AsRef<str>) -> Result<Arc<dyn IndexFilterFactory>> {
    register_builtins();
    let name = name.as_ref();
    let factory = REGISTRY.read().unwrap().get(name).cloned();
    factory.ok_or_else(|| {
        Error::invalid_arg("filter name", format!("Index filter '{name}' not found"))
    })
}

/// Names of all registered factories, sorted.
pub fn names() -> Vec<String> {
    register_builtins();
    let mut names: Vec<String> = REGISTRY.read().unwrap().keys().cloned().collect();
    names.sort();
    names
}

fn insert(factory: Arc<dyn IndexFilterFactory>) {
    let name = factory.name().to_string();
    REGISTRY.write().unwrap().insert(name, factory);
}

fn register_builtins() {
    static BUILTINS: Once = Once::new();
    BUILTINS.call_once(|| {
        insert(Arc::new(datatype::DatatypeFilterFactory));
        insert(Arc::new(time_range::TimeRangeFilterFactory));
        insert(Arc::new(label::LabelFilterFactory));
    });
}

/// Filter factories by name. `ahash::HashMap` with a fixed state allows
/// `const` construction of the static.
static REGISTRY: RwLock<ahash::HashMap<String, Arc<dyn IndexFilterFactory>>> =
    RwLock::new(ahash::HashMap::with_hasher(ahash::RandomState::with_seeds(
        65423554, 7123564654, 911002456, 3711888456,
    )));
