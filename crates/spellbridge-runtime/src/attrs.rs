//! Attribute maps attached to log records and bridge contexts.

use std::collections::HashMap;

use crate::value::DynamicValue;

/// String-keyed attribute map.
pub type Attributes = HashMap<String, DynamicValue>;

/// Overlay call-local attributes on a snapshot of global attributes.
///
/// Local values win on key collision. The result does not depend on
/// iteration order of either map.
pub fn merge_attributes(global: &Attributes, local: &Attributes) -> Attributes {
    let mut merged = global.clone();
    merged.extend(local.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
