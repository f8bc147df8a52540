//! Handler table: named read/write entry points on elements
//! (spec.md §3 "Handler", §4.I).

use std::collections::HashMap;

use router_core::{HandlerRegistrar, Router};

#[derive(Debug, Clone, Default)]
pub struct HandlerFlags {
    pub readable: bool,
    pub writable: bool,
    pub calm: bool,
}

pub struct HandlerInfo {
    pub element_index: usize,
    pub element_name: String,
    pub handler_name: String,
    pub flags: HandlerFlags,
}

/// Built once after a [`Router`] finishes bring-up; maps a qualified
/// `"element.handler"` name to the owning element and its flags.
pub struct HandlerTable {
    entries: HashMap<String, HandlerInfo>,
}

#[derive(Default)]
struct Collector {
    raw: HashMap<String, HandlerFlags>,
}

impl HandlerRegistrar for Collector {
    fn add_read_handler(&mut self, name: &str, calm: bool) {
        let e = self.raw.entry(name.to_string()).or_default();
        e.readable = true;
        e.calm = e.calm || calm;
    }

    fn add_write_handler(&mut self, name: &str) {
        self.raw.entry(name.to_string()).or_default().writable = true;
    }
}

impl HandlerTable {
    pub fn build(router: &Router) -> HandlerTable {
        let mut collector = Collector::default();
        router.add_handlers(&mut collector);

        let mut entries = HashMap::with_capacity(collector.raw.len());
        for (qualified, flags) in collector.raw {
            let Some(pos) = qualified.rfind('.') else { continue };
            let (element_name, handler_name) = qualified.split_at(pos);
            let handler_name = &handler_name[1..];
            let Some(element_index) = router.index_of(element_name) else { continue };
            entries.insert(
                qualified.clone(),
                HandlerInfo {
                    element_index,
                    element_name: element_name.to_string(),
                    handler_name: handler_name.to_string(),
                    flags,
                },
            );
        }
        HandlerTable { entries }
    }

    pub fn lookup(&self, qualified_name: &str) -> Option<&HandlerInfo> {
        self.entries.get(qualified_name)
    }

    /// The unqualified handler names registered on `element_name`, sorted
    /// (used to populate the HANDLERS region of an `IndexedNamespace`
    /// listing; spec.md §4.J).
    pub fn handler_names(&self, element_name: &str) -> Vec<String> {
        let mut names: Vec<String> =
            self.entries.values().filter(|info| info.element_name == element_name).map(|info| info.handler_name.clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
