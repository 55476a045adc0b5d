//! Component-gated debug output.
//!
//! The debug bridge prints messages for named components ("agent", "tools",
//! ...) only while that component is enabled. Components enabled at startup
//! come from the `SPELLBRIDGE_DEBUG` environment variable: either a
//! comma-separated list or `all`.

use async_trait::async_trait;
use spellbridge_runtime::{
    Args, Bridge, BridgeError, BridgeMetadata, BridgeResult, DeclaredType, DynamicValue,
    ExecutionContext, LifecycleCell, MethodInfo, MethodTable, ParameterInfo, Permission,
    PermissionType, Route,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::format::sprintf;
use crate::sink::{LogLevel, LogRecord, LogSink, TracingSink};

pub const DEBUG_BRIDGE_ID: &str = "debug";

/// Environment variable listing components enabled at startup.
pub const DEBUG_ENV_VAR: &str = "SPELLBRIDGE_DEBUG";

/// Components enabled by `SPELLBRIDGE_DEBUG=all`.
pub const ALL_COMPONENTS: [&str; 7] = [
    "agent", "tools", "workflow", "llm", "state", "hooks", "events",
];

/// Parse a `SPELLBRIDGE_DEBUG` value into component names.
pub fn components_from_env_value(value: &str) -> Vec<String> {
    let value = value.trim();
    if value == "all" {
        return ALL_COMPONENTS.iter().map(|c| c.to_string()).collect();
    }
    value
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Read {
    Printf,
    Println,
    IsEnabled,
    ListEnabled,
    Environment,
}

#[derive(Debug, Clone, Copy)]
enum Write {
    Enable,
    Disable,
    SetLogger,
}

struct DebugState {
    components: BTreeSet<String>,
    prefix: String,
}

/// Bridge exposing component-gated debug printing.
pub struct DebugBridge {
    cell: LifecycleCell<DebugState>,
    routes: MethodTable<Read, Write>,
    sink: Arc<dyn LogSink>,
    seed: Vec<String>,
}

impl DebugBridge {
    /// Debug bridge writing to `tracing`, seeded from `SPELLBRIDGE_DEBUG`.
    pub fn new() -> Self {
        let seed = std::env::var(DEBUG_ENV_VAR)
            .map(|v| components_from_env_value(&v))
            .unwrap_or_default();
        Self::with_sink(Arc::new(TracingSink)).with_components(seed)
    }

    /// Debug bridge writing to `sink` with no components enabled.
    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self {
            cell: LifecycleCell::new(),
            routes: MethodTable::new()
                .shared("debugPrintf", Read::Printf)
                .shared("debugPrintln", Read::Println)
                .shared("isDebugEnabled", Read::IsEnabled)
                .shared("listEnabledComponents", Read::ListEnabled)
                .shared("getDebugEnvironment", Read::Environment)
                .exclusive("enableDebugComponent", Write::Enable)
                .exclusive("disableDebugComponent", Write::Disable)
                .exclusive("setCustomLogger", Write::SetLogger),
            sink,
            seed: Vec::new(),
        }
    }

    /// Replace the components enabled at initialization.
    pub fn with_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed = components.into_iter().map(Into::into).collect();
        self
    }

    fn print(&self, state: &DebugState, component: &str, message: &str) {
        if !state.components.contains(component) {
            return;
        }
        let record = LogRecord::new(
            DEBUG_BRIDGE_ID,
            LogLevel::Debug,
            format!("{}{}", state.prefix, message),
        )
        .with_component(component);
        self.sink.emit(&record);
    }
}

impl Default for DebugBridge {
    fn default() -> Self {
        Self::new()
    }
}

fn component_list(state: &DebugState) -> DynamicValue {
    DynamicValue::array(state.components.iter().map(|c| DynamicValue::from(c.as_str())))
}

#[async_trait]
impl Bridge for DebugBridge {
    fn id(&self) -> &str {
        DEBUG_BRIDGE_ID
    }

    fn metadata(&self) -> BridgeMetadata {
        BridgeMetadata::new("Debug Bridge", "v1.0.0")
            .description("Component-gated debug output for scripts")
            .author("raibid-labs")
            .license("MIT")
    }

    async fn initialize(&self, _ctx: &ExecutionContext) -> BridgeResult<()> {
        self.cell
            .initialize_with(|| async {
                let components: BTreeSet<String> = self.seed.iter().cloned().collect();
                debug!(
                    "Debug bridge enabled components: {:?}",
                    components.iter().collect::<Vec<_>>()
                );
                Ok(DebugState {
                    components,
                    prefix: String::new(),
                })
            })
            .await
    }

    async fn cleanup(&self, _ctx: &ExecutionContext) -> BridgeResult<()> {
        self.cell.cleanup_with(|_| async { Ok(()) }).await
    }

    async fn is_initialized(&self) -> bool {
        self.cell.is_initialized().await
    }

    fn methods(&self) -> Vec<MethodInfo> {
        let component =
            || ParameterInfo::required("component", DeclaredType::String, "Component name");
        vec![
            MethodInfo::new("debugPrintf", "Print a formatted message for a component")
                .param(component())
                .param(ParameterInfo::required(
                    "format",
                    DeclaredType::String,
                    "printf-style format",
                ))
                .param(ParameterInfo::optional("args", DeclaredType::Array, "Format arguments"))
                .example(r#"debug.debugPrintf("tools", "%s took %dms", {"grep", 12})"#),
            MethodInfo::new("debugPrintln", "Print a message for a component")
                .param(component())
                .param(ParameterInfo::required("message", DeclaredType::String, "Message"))
                .example(r#"debug.debugPrintln("agent", "planning")"#),
            MethodInfo::new("isDebugEnabled", "Check whether a component is enabled")
                .param(component())
                .returns(DeclaredType::Bool),
            MethodInfo::new("listEnabledComponents", "Enabled components in sorted order")
                .returns(DeclaredType::Array),
            MethodInfo::new("getDebugEnvironment", "Debug settings of the host")
                .returns(DeclaredType::Object),
            MethodInfo::new("enableDebugComponent", "Enable output for a component")
                .param(component()),
            MethodInfo::new("disableDebugComponent", "Disable output for a component")
                .param(component()),
            MethodInfo::new("setCustomLogger", "Configure the output prefix")
                .param(ParameterInfo::required(
                    "options",
                    DeclaredType::Object,
                    "{prefix = string}",
                ))
                .example(r#"debug.setCustomLogger({prefix = "[lab] "})"#),
        ]
    }

    fn handles(&self, method: &str) -> bool {
        self.routes.contains(method)
    }

    fn required_permissions(&self) -> Vec<Permission> {
        vec![
            Permission::new(
                PermissionType::Storage,
                "debug.logging",
                &["read", "write"],
                "Write debug output",
            ),
            Permission::new(
                PermissionType::Memory,
                "debug.components",
                &["read", "write"],
                "Track enabled debug components",
            ),
        ]
    }

    async fn execute_method(
        &self,
        _ctx: &ExecutionContext,
        name: &str,
        args: &[DynamicValue],
    ) -> BridgeResult<DynamicValue> {
        let route = self.routes.resolve(DEBUG_BRIDGE_ID, name)?;
        let args = Args::new(name, args);
        match route {
            Route::Shared(handler) => {
                let state = self.cell.read(DEBUG_BRIDGE_ID).await?;
                match handler {
                    Read::Printf => {
                        let component = args.string(0, "component")?;
                        let format = args.string(1, "format")?;
                        let values = args.optional_array(2, "args")?.unwrap_or_default();
                        self.print(&state, component, &sprintf(format, values));
                        Ok(DynamicValue::Nil)
                    }
                    Read::Println => {
                        let component = args.string(0, "component")?;
                        let message = args.string(1, "message")?;
                        self.print(&state, component, message);
                        Ok(DynamicValue::Nil)
                    }
                    Read::IsEnabled => {
                        let component = args.string(0, "component")?;
                        Ok(DynamicValue::from(state.components.contains(component)))
                    }
                    Read::ListEnabled => Ok(component_list(&state)),
                    Read::Environment => {
                        let env = std::env::var(DEBUG_ENV_VAR).unwrap_or_else(|_| "not_set".into());
                        let build = if cfg!(debug_assertions) { "debug" } else { "release" };
                        Ok(DynamicValue::object([
                            ("env_var", DynamicValue::from(DEBUG_ENV_VAR)),
                            ("value", DynamicValue::from(env)),
                            ("enabled_components", component_list(&state)),
                            ("prefix", DynamicValue::from(state.prefix.as_str())),
                            ("build", DynamicValue::from(build)),
                        ]))
                    }
                }
            }
            Route::Exclusive(handler) => {
                let mut state = self.cell.write(DEBUG_BRIDGE_ID).await?;
                match handler {
                    Write::Enable => {
                        let component = args.string(0, "component")?;
                        if component.trim().is_empty() {
                            return Err(BridgeError::invalid_arguments(
                                name,
                                "component name must not be empty",
                            ));
                        }
                        state.components.insert(component.to_string());
                    }
                    Write::Disable => {
                        let component = args.string(0, "component")?;
                        state.components.remove(component);
                    }
                    Write::SetLogger => {
                        let options = args.object(0, "options")?;
                        if let Some(prefix) = options.get("prefix").filter(|v| !v.is_nil()) {
                            let prefix = prefix.as_str().ok_or_else(|| {
                                BridgeError::type_mismatch(
                                    "options.prefix of setCustomLogger",
                                    "string",
                                    prefix.type_label(),
                                )
                            })?;
                            state.prefix = prefix.to_string();
                        }
                    }
                }
                Ok(DynamicValue::Nil)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use spellbridge_runtime::ErrorKind;

    async fn started(components: &[&str]) -> (DebugBridge, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let bridge =
            DebugBridge::with_sink(sink.clone()).with_components(components.iter().copied());
        bridge.initialize(&ExecutionContext::new()).await.unwrap();
        (bridge, sink)
    }

    #[test]
    fn test_components_from_env_value() {
        assert_eq!(components_from_env_value("all").len(), ALL_COMPONENTS.len());
        assert_eq!(
            components_from_env_value(" tools, llm ,,"),
            vec!["tools".to_string(), "llm".to_string()]
        );
        assert!(components_from_env_value("").is_empty());
    }

    #[tokio::test]
    async fn test_output_only_for_enabled_components() {
        let (bridge, sink) = started(&["tools"]).await;
        let ctx = ExecutionContext::new();

        bridge
            .execute_method(&ctx, "debugPrintln", &["tools".into(), "grep done".into()])
            .await
            .unwrap();
        bridge
            .execute_method(&ctx, "debugPrintln", &["agent".into(), "hidden".into()])
            .await
            .unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "grep done");
        assert_eq!(records[0].component.as_deref(), Some("tools"));
        assert_eq!(records[0].level, LogLevel::Debug);
    }

    #[tokio::test]
    async fn test_printf_with_prefix() {
        let (bridge, sink) = started(&["llm"]).await;
        let ctx = ExecutionContext::new();

        bridge
            .execute_method(
                &ctx,
                "setCustomLogger",
                &[DynamicValue::object([("prefix", DynamicValue::from("[lab] "))])],
            )
            .await
            .unwrap();
        bridge
            .execute_method(
                &ctx,
                "debugPrintf",
                &[
                    "llm".into(),
                    "%s used %d tokens".into(),
                    DynamicValue::array([DynamicValue::from("gpt"), DynamicValue::from(42)]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(sink.records()[0].message, "[lab] gpt used 42 tokens");
    }

    #[tokio::test]
    async fn test_enable_disable_and_list() {
        let (bridge, _sink) = started(&[]).await;
        let ctx = ExecutionContext::new();

        for component in ["workflow", "agent"] {
            bridge
                .execute_method(&ctx, "enableDebugComponent", &[component.into()])
                .await
                .unwrap();
        }
        let listed = bridge
            .execute_method(&ctx, "listEnabledComponents", &[])
            .await
            .unwrap();
        assert_eq!(
            listed,
            DynamicValue::array([DynamicValue::from("agent"), DynamicValue::from("workflow")])
        );

        bridge
            .execute_method(&ctx, "disableDebugComponent", &["agent".into()])
            .await
            .unwrap();
        let enabled = bridge
            .execute_method(&ctx, "isDebugEnabled", &["agent".into()])
            .await
            .unwrap();
        assert_eq!(enabled, DynamicValue::from(false));

        let err = bridge
            .execute_method(&ctx, "enableDebugComponent", &["  ".into()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    }

    #[tokio::test]
    async fn test_environment_report() {
        let (bridge, _sink) = started(&["hooks"]).await;
        let env = bridge
            .execute_method(&ExecutionContext::new(), "getDebugEnvironment", &[])
            .await
            .unwrap();
        let env = env.as_object().unwrap();
        assert_eq!(env["env_var"], DynamicValue::from(DEBUG_ENV_VAR));
        assert_eq!(env["enabled_components"], DynamicValue::array([DynamicValue::from("hooks")]));
    }

    #[tokio::test]
    async fn test_cleanup_resets_state() {
        let (bridge, _sink) = started(&[]).await;
        let ctx = ExecutionContext::new();
        bridge
            .execute_method(&ctx, "enableDebugComponent", &["state".into()])
            .await
            .unwrap();

        bridge.cleanup(&ctx).await.unwrap();
        let err = bridge
            .execute_method(&ctx, "isDebugEnabled", &["state".into()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInitialized);

        bridge.initialize(&ctx).await.unwrap();
        let enabled = bridge
            .execute_method(&ctx, "isDebugEnabled", &["state".into()])
            .await
            .unwrap();
        assert_eq!(enabled, DynamicValue::from(false));
    }
}
