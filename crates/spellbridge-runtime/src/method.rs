//! Method routing tables.
//!
//! A bridge maps each catalog method name to a handler. Handlers that only
//! read bridge state are registered as [`Route::Shared`]; handlers that
//! mutate it are registered as [`Route::Exclusive`]. The bridge then takes
//! the matching lock once and calls the handler with the state it needs.

use std::collections::HashMap;

use crate::error::{BridgeError, BridgeResult};
use crate::metadata::MethodInfo;

/// Handler reference resolved from a method name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<R, W> {
    /// Handler that reads state.
    Shared(R),
    /// Handler that mutates state.
    Exclusive(W),
}

/// Method name to handler table.
#[derive(Debug, Clone)]
pub struct MethodTable<R, W> {
    routes: HashMap<&'static str, Route<R, W>>,
}

impl<R: Copy, W: Copy> Default for MethodTable<R, W> {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }
}

impl<R: Copy, W: Copy> MethodTable<R, W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(mut self, name: &'static str, handler: R) -> Self {
        self.routes.insert(name, Route::Shared(handler));
        self
    }

    pub fn exclusive(mut self, name: &'static str, handler: W) -> Self {
        self.routes.insert(name, Route::Exclusive(handler));
        self
    }

    /// Resolve a method name, failing with [`BridgeError::MethodNotFound`].
    pub fn resolve(&self, bridge_id: &str, name: &str) -> BridgeResult<Route<R, W>> {
        self.routes
            .get(name)
            .copied()
            .ok_or_else(|| BridgeError::method_not_found(bridge_id, name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Catalog entries with no route.
    pub fn unrouted<'a>(&self, catalog: &'a [MethodInfo]) -> Vec<&'a str> {
        catalog
            .iter()
            .filter(|m| !self.contains(&m.name))
            .map(|m| m.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Read {
        List,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Write {
        Enable,
    }

    #[test]
    fn test_resolve() {
        let table = MethodTable::new()
            .shared("listEnabledComponents", Read::List)
            .exclusive("enableDebugComponent", Write::Enable);

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.resolve("debug", "listEnabledComponents").unwrap(),
            Route::Shared(Read::List)
        );
        assert_eq!(
            table.resolve("debug", "enableDebugComponent").unwrap(),
            Route::Exclusive(Write::Enable)
        );
        assert_eq!(
            table.resolve("debug", "missing").unwrap_err().kind(),
            ErrorKind::MethodNotFound
        );
    }

    #[test]
    fn test_unrouted() {
        let table = MethodTable::<Read, Write>::new().shared("listEnabledComponents", Read::List);
        let catalog = vec![
            MethodInfo::new("listEnabledComponents", ""),
            MethodInfo::new("getDebugEnvironment", ""),
        ];
        assert_eq!(table.unrouted(&catalog), vec!["getDebugEnvironment"]);
    }
}
