//! Argument-shape resolution for methods with several call shapes.
//!
//! A [`CallShape`] lists a method's parameters in declared order, each
//! required or optional. Given `n` arguments, the resolver decides which
//! optional parameters were supplied:
//!
//! 1. `n` must lie between the number of required parameters and the total
//!    number of parameters.
//! 2. With `extra = n - required`, every choice of `extra` optional
//!    parameters is tried, earliest optional parameters first.
//! 3. The first choice whose arguments all match their declared types wins.
//!
//! Step 2 makes an extra trailing string bind to an optional named
//! parameter (such as a component) before a later optional object. For the
//! unified log signature `level, component?, message, attributes?` this
//! gives:
//!
//! | call                                  | component | attributes |
//! |---------------------------------------|-----------|------------|
//! | `(level, message)`                    | `""`      | `{}`       |
//! | `(level, message, {k: v})`            | `""`      | `{k: v}`   |
//! | `(level, component, message)`         | set       | `{}`       |
//! | `(level, component, message, {k: v})` | set       | `{k: v}`   |
//!
//! A `Nil` argument in an optional slot counts as absent.

use std::collections::HashMap;

use crate::error::{BridgeError, BridgeResult};
use crate::metadata::{DeclaredType, MethodInfo};
use crate::value::DynamicValue;

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub name: String,
    pub ty: DeclaredType,
    pub required: bool,
}

impl Slot {
    fn accepts(&self, value: &DynamicValue) -> bool {
        self.ty.matches(value) || (!self.required && value.is_nil())
    }
}

/// Ordered parameter list of a polymorphic method.
#[derive(Debug, Clone, PartialEq)]
pub struct CallShape {
    method: String,
    slots: Vec<Slot>,
}

/// A failed candidate, reported at its first mismatching argument.
#[derive(Debug)]
struct Mismatch {
    position: usize,
    slots: Vec<String>,
    expected: Vec<String>,
    actual: String,
}

impl Mismatch {
    fn absorb(&mut self, other: Mismatch) {
        for slot in other.slots {
            if !self.slots.contains(&slot) {
                self.slots.push(slot);
            }
        }
        for ty in other.expected {
            if !self.expected.contains(&ty) {
                self.expected.push(ty);
            }
        }
    }
}

impl CallShape {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            slots: Vec::new(),
        }
    }

    pub fn required(mut self, name: impl Into<String>, ty: DeclaredType) -> Self {
        self.slots.push(Slot {
            name: name.into(),
            ty,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, ty: DeclaredType) -> Self {
        self.slots.push(Slot {
            name: name.into(),
            ty,
            required: false,
        });
        self
    }

    /// Build the shape from a catalog entry.
    pub fn from_method(info: &MethodInfo) -> Self {
        Self {
            method: info.name.clone(),
            slots: info
                .parameters
                .iter()
                .map(|p| Slot {
                    name: p.name.clone(),
                    ty: p.param_type.clone(),
                    required: p.required,
                })
                .collect(),
        }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Bind `args` to the declared parameters.
    ///
    /// Fails with [`BridgeError::InvalidArguments`] when the count is out of
    /// range or no candidate assignment type-checks. The error names the
    /// furthest argument any candidate reached, together with every slot and
    /// type that was tried there.
    pub fn resolve(&self, args: &[DynamicValue]) -> BridgeResult<ResolvedArgs> {
        let required: Vec<usize> = (0..self.slots.len())
            .filter(|&i| self.slots[i].required)
            .collect();
        let optional: Vec<usize> = (0..self.slots.len())
            .filter(|&i| !self.slots[i].required)
            .collect();

        if args.len() < required.len() {
            return Err(BridgeError::invalid_arguments(
                &self.method,
                format!(
                    "requires at least {} argument(s), got {}",
                    required.len(),
                    args.len()
                ),
            ));
        }
        if args.len() > self.slots.len() {
            return Err(BridgeError::invalid_arguments(
                &self.method,
                format!(
                    "accepts at most {} argument(s), got {}",
                    self.slots.len(),
                    args.len()
                ),
            ));
        }

        let mut furthest: Option<Mismatch> = None;
        for chosen in combinations(&optional, args.len() - required.len()) {
            let mut present: Vec<usize> = required.iter().copied().chain(chosen).collect();
            present.sort_unstable();

            match self.bind(&present, args) {
                Ok(resolved) => return Ok(resolved),
                Err(mismatch) => match furthest.as_mut() {
                    Some(best) if mismatch.position == best.position => best.absorb(mismatch),
                    Some(best) if mismatch.position < best.position => {}
                    _ => furthest = Some(mismatch),
                },
            }
        }

        let reason = match furthest {
            Some(m) => format!(
                "argument {} ({}) must be {}, got {}",
                m.position + 1,
                m.slots
                    .iter()
                    .map(|s| format!("`{s}`"))
                    .collect::<Vec<_>>()
                    .join(" or "),
                m.expected.join(" or "),
                m.actual
            ),
            None => "arguments match no accepted call shape".to_string(),
        };
        Err(BridgeError::invalid_arguments(&self.method, reason))
    }

    fn bind(&self, present: &[usize], args: &[DynamicValue]) -> Result<ResolvedArgs, Mismatch> {
        let mut values: Vec<Option<DynamicValue>> = vec![None; self.slots.len()];
        for (position, (&slot_index, arg)) in present.iter().zip(args).enumerate() {
            let slot = &self.slots[slot_index];
            if !slot.accepts(arg) {
                return Err(Mismatch {
                    position,
                    slots: vec![slot.name.clone()],
                    expected: vec![slot.ty.as_str().to_string()],
                    actual: arg.type_label(),
                });
            }
            if !arg.is_nil() {
                values[slot_index] = Some(arg.clone());
            }
        }

        Ok(ResolvedArgs {
            entries: self
                .slots
                .iter()
                .zip(values)
                .map(|(slot, value)| (slot.name.clone(), value))
                .collect(),
        })
    }
}

/// Choices of `k` elements from `pool`, in lexicographic order.
fn combinations(pool: &[usize], k: usize) -> Vec<Vec<usize>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    for (i, &first) in pool.iter().enumerate() {
        for mut rest in combinations(&pool[i + 1..], k - 1) {
            rest.insert(0, first);
            out.push(rest);
        }
    }
    out
}

/// Arguments bound to parameter names.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedArgs {
    entries: Vec<(String, Option<DynamicValue>)>,
}

impl ResolvedArgs {
    /// The bound value, or `None` if the parameter was not supplied.
    pub fn get(&self, name: &str) -> Option<&DynamicValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn is_present(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names of supplied parameters in declared order.
    pub fn present(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, v)| v.is_some())
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// String parameter, or `""` when absent.
    pub fn string(&self, name: &str) -> &str {
        self.get(name).and_then(DynamicValue::as_str).unwrap_or("")
    }

    /// Object parameter, or an empty map when absent.
    pub fn object(&self, name: &str) -> HashMap<String, DynamicValue> {
        self.get(name)
            .and_then(DynamicValue::as_object)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    fn log_shape() -> CallShape {
        CallShape::new("log")
            .required("level", DeclaredType::String)
            .optional("component", DeclaredType::String)
            .required("message", DeclaredType::String)
            .optional("attributes", DeclaredType::Object)
    }

    fn attrs(k: &str, v: &str) -> DynamicValue {
        DynamicValue::object([(k, DynamicValue::from(v))])
    }

    #[test]
    fn test_level_message() {
        let args = log_shape()
            .resolve(&["info".into(), "hello".into()])
            .unwrap();
        assert_eq!(args.string("level"), "info");
        assert_eq!(args.string("component"), "");
        assert_eq!(args.string("message"), "hello");
        assert!(args.object("attributes").is_empty());
        assert_eq!(args.present(), vec!["level", "message"]);
    }

    #[test]
    fn test_level_message_attributes() {
        let args = log_shape()
            .resolve(&["info".into(), "hello".into(), attrs("k", "v")])
            .unwrap();
        assert_eq!(args.string("component"), "");
        assert_eq!(args.string("message"), "hello");
        assert_eq!(args.object("attributes")["k"], DynamicValue::from("v"));
    }

    #[test]
    fn test_level_component_message() {
        let args = log_shape()
            .resolve(&["info".into(), "agent".into(), "hello".into()])
            .unwrap();
        assert_eq!(args.string("component"), "agent");
        assert_eq!(args.string("message"), "hello");
        assert!(args.object("attributes").is_empty());
    }

    #[test]
    fn test_all_four() {
        let args = log_shape()
            .resolve(&[
                "info".into(),
                "agent".into(),
                "hello".into(),
                attrs("k", "v"),
            ])
            .unwrap();
        assert_eq!(args.present(), vec!["level", "component", "message", "attributes"]);
    }

    #[test]
    fn test_third_argument_of_wrong_kind() {
        let err = log_shape()
            .resolve(&["info".into(), "hello".into(), 42.into()])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        let message = err.to_string();
        assert!(message.contains("argument 3"), "{message}");
        assert!(message.contains("`message` or `attributes`"), "{message}");
        assert!(message.contains("string or object"), "{message}");
        assert!(message.contains("got number"), "{message}");
    }

    #[test]
    fn test_count_out_of_range() {
        let err = log_shape().resolve(&["info".into()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);

        let err = log_shape()
            .resolve(&[
                "info".into(),
                "a".into(),
                "b".into(),
                attrs("k", "v"),
                "extra".into(),
            ])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    }

    #[test]
    fn test_wrong_required_type() {
        let err = log_shape()
            .resolve(&[42.into(), "hello".into()])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        assert!(err.to_string().contains("`level`"));
    }

    #[test]
    fn test_nil_counts_as_absent() {
        let args = log_shape()
            .resolve(&["warn".into(), "hello".into(), DynamicValue::Nil])
            .unwrap();
        assert_eq!(args.string("message"), "hello");
        assert!(!args.is_present("attributes"));
        assert!(!args.is_present("component"));
    }

    #[test]
    fn test_from_method() {
        use crate::metadata::ParameterInfo;

        let info = MethodInfo::new("debug", "")
            .param(ParameterInfo::required("message", DeclaredType::String, ""))
            .param(ParameterInfo::optional("component", DeclaredType::String, ""))
            .param(ParameterInfo::optional("attributes", DeclaredType::Object, ""));
        let shape = CallShape::from_method(&info);

        let args = shape.resolve(&["hi".into(), attrs("a", "b")]).unwrap();
        assert_eq!(args.string("component"), "");
        assert!(args.is_present("attributes"));
    }

    fn arb_attrs() -> impl Strategy<Value = HashMap<String, DynamicValue>> {
        prop::collection::hash_map(
            "[a-z]{1,5}",
            "[a-z0-9]{0,5}".prop_map(DynamicValue::String),
            1..4,
        )
    }

    proptest! {
        #[test]
        fn every_log_shape_resolves(
            level in "(debug|info|warn|error)",
            component in proptest::option::of("[a-z]{1,8}"),
            message in "[a-zA-Z0-9 ]{0,16}",
            attributes in proptest::option::of(arb_attrs()),
        ) {
            let mut call = vec![DynamicValue::from(level.as_str())];
            if let Some(c) = &component {
                call.push(DynamicValue::from(c.as_str()));
            }
            call.push(DynamicValue::from(message.as_str()));
            if let Some(a) = &attributes {
                call.push(DynamicValue::Object(a.clone()));
            }

            let args = log_shape().resolve(&call).unwrap();
            prop_assert_eq!(args.string("level"), level.as_str());
            prop_assert_eq!(args.string("component"), component.as_deref().unwrap_or(""));
            prop_assert_eq!(args.string("message"), message.as_str());
            prop_assert_eq!(args.object("attributes"), attributes.unwrap_or_default());
        }

        #[test]
        fn third_argument_must_be_string_or_object(
            third in prop_oneof![
                any::<bool>().prop_map(DynamicValue::Bool),
                (-1.0e6f64..1.0e6f64).prop_map(DynamicValue::Number),
                prop::collection::vec(Just(DynamicValue::Nil), 0..3).prop_map(DynamicValue::Array),
            ]
        ) {
            let err = log_shape()
                .resolve(&["info".into(), "hello".into(), third])
                .unwrap_err();
            prop_assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        }
    }
}
