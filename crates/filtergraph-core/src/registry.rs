// crates/filtergraph-core/src/registry.rs
//
// Process-wide table of filter kinds. Insertion-ordered, fixed 256-entry cap.
// A `Registry` is a plain value — construct one directly for tests (the
// design-note-preferred path) or go through the `GLOBAL` instance for
// process-wide registration, the compatibility path.

use std::sync::{Arc, Mutex, OnceLock};

use crate::error::{GraphError, GraphResult};
use crate::kind::FilterKind;

pub const MAX_REGISTERED_KINDS: usize = 256;

#[derive(Default)]
pub struct Registry {
    kinds: Vec<Arc<FilterKind>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { kinds: Vec::new() }
    }

    pub fn register(&mut self, kind: FilterKind) -> GraphResult<Arc<FilterKind>> {
        if self.kinds.len() >= MAX_REGISTERED_KINDS {
            return Err(GraphError::OutOfCapacity);
        }
        kind.validate()?;
        let kind = Arc::new(kind);
        self.kinds.push(kind.clone());
        Ok(kind)
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<FilterKind>> {
        self.kinds.iter().find(|k| k.name == name).cloned()
    }

    /// Yields the next registered kind after `prev`, or the first if `prev`
    /// is absent — insertion-order iteration over the whole table.
    pub fn iter_next(&self, prev: Option<&str>) -> Option<Arc<FilterKind>> {
        match prev {
            None => self.kinds.first().cloned(),
            Some(name) => {
                let idx = self.kinds.iter().position(|k| k.name == name)?;
                self.kinds.get(idx + 1).cloned()
            }
        }
    }

    pub fn reset_all(&mut self) {
        self.kinds.clear();
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

static GLOBAL: OnceLock<Mutex<Registry>> = OnceLock::new();

fn global() -> &'static Mutex<Registry> {
    GLOBAL.get_or_init(|| Mutex::new(Registry::new()))
}

/// Process-wide registration, for embedders that want a single global
/// table. Prefer a constructor-injected `Registry` in tests so parallel
/// test runs don't contend on one process-wide table.
pub fn register(kind: FilterKind) -> GraphResult<Arc<FilterKind>> {
    global().lock().unwrap().register(kind)
}

pub fn get_by_name(name: &str) -> Option<Arc<FilterKind>> {
    global().lock().unwrap().get_by_name(name)
}

pub fn iter_next(prev: Option<&str>) -> Option<Arc<FilterKind>> {
    global().lock().unwrap().iter_next(prev)
}

pub fn uninit_all() {
    global().lock().unwrap().reset_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MediaType;
    use crate::pad::PadDescriptor;

    fn dummy_kind(name: &'static str) -> FilterKind {
        FilterKind {
            name,
            input_pads: vec![PadDescriptor::new("default", MediaType::Video)],
            output_pads: vec![PadDescriptor::new("default", MediaType::Video)],
            priv_new: || Box::new(()),
            priv_class: None,
            shorthand: None,
            init: None,
            init_dict: None,
            init_opaque: None,
            uninit: None,
            process_command: None,
            legacy_raw_init: false,
        }
    }

    #[test]
    fn register_and_lookup_round_trip() {
        let mut r = Registry::new();
        r.register(dummy_kind("scale")).unwrap();
        assert!(r.get_by_name("scale").is_some());
        assert!(r.get_by_name("missing").is_none());
    }

    #[test]
    fn iter_next_walks_insertion_order() {
        let mut r = Registry::new();
        r.register(dummy_kind("a")).unwrap();
        r.register(dummy_kind("b")).unwrap();
        r.register(dummy_kind("c")).unwrap();
        let first = r.iter_next(None).unwrap();
        assert_eq!(first.name, "a");
        let second = r.iter_next(Some("a")).unwrap();
        assert_eq!(second.name, "b");
        assert!(r.iter_next(Some("c")).is_none());
    }

    #[test]
    fn register_fails_past_capacity() {
        let mut r = Registry::new();
        for i in 0..MAX_REGISTERED_KINDS {
            let name: &'static str = Box::leak(format!("k{i}").into_boxed_str());
            r.register(dummy_kind(name)).unwrap();
        }
        let overflow: &'static str = "overflow";
        assert!(matches!(r.register(dummy_kind(overflow)), Err(GraphError::OutOfCapacity)));
    }
}
