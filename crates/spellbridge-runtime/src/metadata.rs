//! Bridge metadata and method catalogs.
//!
//! Every bridge describes itself with [`BridgeMetadata`] and publishes a
//! catalog of [`MethodInfo`] entries. The catalog is what scripts and the
//! registry see; it is also used to validate argument counts and types.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::value::DynamicValue;

/// Descriptive information about a bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeMetadata {
    /// Human-readable name.
    pub name: String,

    /// Version string.
    pub version: String,

    /// Bridge description.
    #[serde(default)]
    pub description: String,

    /// Bridge author.
    #[serde(default)]
    pub author: String,

    /// License identifier.
    #[serde(default)]
    pub license: String,

    /// Ids of bridges that must be initialized first.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl BridgeMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn license(mut self, license: impl Into<String>) -> Self {
        self.license = license.into();
        self
    }

    pub fn depends_on(mut self, bridge_id: impl Into<String>) -> Self {
        self.dependencies.push(bridge_id.into());
        self
    }
}

/// Semantic type of a parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeclaredType {
    Void,
    Any,
    Bool,
    Number,
    String,
    Array,
    Object,
    /// Custom host handle carrying the given type tag.
    Custom(String),
}

impl DeclaredType {
    /// Parse a declared type from a string.
    pub fn parse(s: &str) -> Self {
        match s {
            "void" => DeclaredType::Void,
            "any" => DeclaredType::Any,
            "bool" => DeclaredType::Bool,
            "number" => DeclaredType::Number,
            "string" => DeclaredType::String,
            "array" => DeclaredType::Array,
            "object" => DeclaredType::Object,
            other => DeclaredType::Custom(other.to_string()),
        }
    }

    /// Convert the declared type to its string representation.
    pub fn as_str(&self) -> &str {
        match self {
            DeclaredType::Void => "void",
            DeclaredType::Any => "any",
            DeclaredType::Bool => "bool",
            DeclaredType::Number => "number",
            DeclaredType::String => "string",
            DeclaredType::Array => "array",
            DeclaredType::Object => "object",
            DeclaredType::Custom(s) => s,
        }
    }

    /// Check whether a value satisfies this type.
    pub fn matches(&self, value: &DynamicValue) -> bool {
        match (self, value) {
            (DeclaredType::Any, _) => true,
            (DeclaredType::Void, DynamicValue::Nil) => true,
            (DeclaredType::Bool, DynamicValue::Bool(_)) => true,
            (DeclaredType::Number, DynamicValue::Number(_)) => true,
            (DeclaredType::String, DynamicValue::String(_)) => true,
            (DeclaredType::Array, DynamicValue::Array(_)) => true,
            (DeclaredType::Object, DynamicValue::Object(_)) => true,
            (DeclaredType::Custom(tag), DynamicValue::Custom(handle)) => handle.type_name() == tag,
            _ => false,
        }
    }
}

impl From<String> for DeclaredType {
    fn from(s: String) -> Self {
        DeclaredType::parse(&s)
    }
}

impl From<DeclaredType> for String {
    fn from(ty: DeclaredType) -> Self {
        ty.as_str().to_string()
    }
}

impl std::fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single method parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: DeclaredType,

    pub required: bool,

    #[serde(default)]
    pub description: String,

    /// Value used when an optional parameter is omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl ParameterInfo {
    pub fn required(
        name: impl Into<String>,
        param_type: DeclaredType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            description: description.into(),
            default: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: DeclaredType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Catalog entry describing one callable method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub parameters: Vec<ParameterInfo>,

    pub return_type: DeclaredType,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

impl MethodInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            return_type: DeclaredType::Void,
            examples: Vec::new(),
        }
    }

    pub fn param(mut self, parameter: ParameterInfo) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn returns(mut self, return_type: DeclaredType) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    /// Number of required parameters.
    pub fn required_count(&self) -> usize {
        self.parameters.iter().filter(|p| p.required).count()
    }

    /// Render the entry as a script-visible object.
    pub fn to_value(&self) -> DynamicValue {
        let parameters = self
            .parameters
            .iter()
            .map(|p| {
                DynamicValue::object([
                    ("name", DynamicValue::from(p.name.as_str())),
                    ("type", DynamicValue::from(p.param_type.as_str())),
                    ("required", DynamicValue::from(p.required)),
                    ("description", DynamicValue::from(p.description.as_str())),
                ])
            })
            .collect::<Vec<_>>();
        DynamicValue::object([
            ("name", DynamicValue::from(self.name.as_str())),
            ("description", DynamicValue::from(self.description.as_str())),
            ("parameters", DynamicValue::Array(parameters)),
            ("returnType", DynamicValue::from(self.return_type.as_str())),
        ])
    }
}

/// Mapping between a host type and the name scripts see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMapping {
    pub native_type: String,
    pub script_type: String,
}

impl TypeMapping {
    pub fn new(native_type: impl Into<String>, script_type: impl Into<String>) -> Self {
        Self {
            native_type: native_type.into(),
            script_type: script_type.into(),
        }
    }
}

/// Check a call against a method catalog.
///
/// Verifies the method exists, that at least the required number of
/// arguments were supplied and no more than the declared number, and that
/// every non-nil argument matches the declared parameter type at its
/// position.
pub fn validate_against_catalog(
    bridge_id: &str,
    methods: &[MethodInfo],
    name: &str,
    args: &[DynamicValue],
) -> BridgeResult<()> {
    let method = methods
        .iter()
        .find(|m| m.name == name)
        .ok_or_else(|| BridgeError::method_not_found(bridge_id, name))?;

    let required = method.required_count();
    if args.len() < required {
        return Err(BridgeError::invalid_arguments(
            name,
            format!("requires at least {required} argument(s), got {}", args.len()),
        ));
    }
    if args.len() > method.parameters.len() {
        return Err(BridgeError::invalid_arguments(
            name,
            format!(
                "accepts at most {} argument(s), got {}",
                method.parameters.len(),
                args.len()
            ),
        ));
    }

    for (position, (param, arg)) in method.parameters.iter().zip(args).enumerate() {
        if arg.is_nil() && !param.required {
            continue;
        }
        if !param.param_type.matches(arg) {
            return Err(BridgeError::type_mismatch(
                format!("argument {} (`{}`) of {name}", position + 1, param.name),
                param.param_type.as_str(),
                arg.type_label(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn catalog() -> Vec<MethodInfo> {
        vec![MethodInfo::new("debugPrintln", "Print a debug line")
            .param(ParameterInfo::required(
                "component",
                DeclaredType::String,
                "Component name",
            ))
            .param(ParameterInfo::required(
                "message",
                DeclaredType::String,
                "Message",
            ))
            .param(ParameterInfo::optional(
                "attributes",
                DeclaredType::Object,
                "Extra attributes",
            ))]
    }

    #[test]
    fn test_validate_accepts_valid_call() {
        let args = vec![DynamicValue::from("agent"), DynamicValue::from("hello")];
        validate_against_catalog("debug", &catalog(), "debugPrintln", &args).unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_calls() {
        let err = validate_against_catalog("debug", &catalog(), "nope", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MethodNotFound);

        let err = validate_against_catalog(
            "debug",
            &catalog(),
            "debugPrintln",
            &[DynamicValue::from("agent")],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);

        let err = validate_against_catalog(
            "debug",
            &catalog(),
            "debugPrintln",
            &[DynamicValue::from("agent"), DynamicValue::from(5)],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_declared_type_parse() {
        assert_eq!(DeclaredType::parse("object"), DeclaredType::Object);
        assert_eq!(
            DeclaredType::parse("logger"),
            DeclaredType::Custom("logger".into())
        );
        assert!(DeclaredType::Custom("logger".into())
            .matches(&DynamicValue::custom("logger", ())));
        assert!(!DeclaredType::Custom("logger".into())
            .matches(&DynamicValue::custom("session", ())));
    }

    #[test]
    fn test_method_info_serializes_type_as_string() {
        let json = serde_json::to_value(&catalog()[0]).unwrap();
        assert_eq!(json["parameters"][0]["type"], "string");
        assert_eq!(json["return_type"], "void");
        assert_eq!(catalog()[0].required_count(), 2);
    }
}
