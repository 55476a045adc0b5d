//! Leveled, structured logging bridge.
//!
//! Scripts call `debug`/`info`/`warn`/`error` with a message, an optional
//! emoji marker and an optional attribute table. The bridge also provides
//! hooks for LLM generation and tool calls whose verbosity follows the
//! configured detail level.

use async_trait::async_trait;
use spellbridge_runtime::{
    Args, Attributes, Bridge, BridgeError, BridgeMetadata, BridgeResult, CallShape,
    DeclaredType, DynamicValue, ExecutionContext, LifecycleCell, MethodInfo, MethodTable,
    ParameterInfo, Permission, PermissionType, Route, TypeMapping,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::sink::{LogFormat, LogLevel, LogRecord, LogSink, TracingSink};

pub const SLOG_BRIDGE_ID: &str = "slog";

/// Type name of logger handles returned by `withAttributes`.
pub const LOGGER_TYPE: &str = "logger";

/// How much of a generation or tool call is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DetailLevel {
    /// Counts and names only.
    Basic,
    /// Adds roles, parameters and results.
    Detailed,
    /// Adds full message and response contents.
    Debug,
}

impl DetailLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(DetailLevel::Basic),
            "detailed" => Some(DetailLevel::Detailed),
            "debug" => Some(DetailLevel::Debug),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetailLevel::Basic => "basic",
            DetailLevel::Detailed => "detailed",
            DetailLevel::Debug => "debug",
        }
    }
}

/// Logger handle carrying a fixed attribute set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextLogger {
    attributes: Attributes,
}

impl ContextLogger {
    pub fn new(attributes: Attributes) -> Self {
        Self { attributes }
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Wrap the logger as a script value.
    pub fn into_value(self) -> DynamicValue {
        DynamicValue::custom(LOGGER_TYPE, self)
    }
}

#[derive(Debug, Clone, Copy)]
enum Read {
    Log(LogLevel),
    BeforeGenerate,
    AfterGenerate,
    BeforeToolCall,
    AfterToolCall,
    GetLevel,
    WithAttributes,
}

#[derive(Debug, Clone, Copy)]
enum Write {
    SetLevel,
    Configure,
}

struct SlogState {
    min_level: LogLevel,
    detail: DetailLevel,
    format: LogFormat,
}

/// Structured logging bridge.
pub struct StructuredBridge {
    cell: LifecycleCell<SlogState>,
    routes: MethodTable<Read, Write>,
    sink: Arc<dyn LogSink>,
}

impl StructuredBridge {
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self {
            cell: LifecycleCell::new(),
            routes: MethodTable::new()
                .shared("debug", Read::Log(LogLevel::Debug))
                .shared("info", Read::Log(LogLevel::Info))
                .shared("warn", Read::Log(LogLevel::Warn))
                .shared("error", Read::Log(LogLevel::Error))
                .shared("logBeforeGenerate", Read::BeforeGenerate)
                .shared("logAfterGenerate", Read::AfterGenerate)
                .shared("logBeforeToolCall", Read::BeforeToolCall)
                .shared("logAfterToolCall", Read::AfterToolCall)
                .shared("getLogLevel", Read::GetLevel)
                .shared("withAttributes", Read::WithAttributes)
                .exclusive("setLogLevel", Write::SetLevel)
                .exclusive("configureLogger", Write::Configure),
            sink,
        }
    }

    fn emit(&self, state: &SlogState, level: LogLevel, message: String, attributes: Attributes) {
        if level < state.min_level {
            return;
        }
        let record = LogRecord::new(SLOG_BRIDGE_ID, level, message)
            .with_attributes(attributes)
            .with_format(state.format);
        self.sink.emit(&record);
    }
}

impl Default for StructuredBridge {
    fn default() -> Self {
        Self::new()
    }
}

fn message_shape(method: &str) -> CallShape {
    CallShape::new(method)
        .required("message", DeclaredType::String)
        .optional("emoji", DeclaredType::String)
        .optional("attributes", DeclaredType::Object)
}

/// Validate a chat message list, returning `(role, content)` pairs.
fn chat_messages(messages: &[DynamicValue]) -> BridgeResult<Vec<(String, String)>> {
    messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            let argument = format!("messages[{}] of logBeforeGenerate", i + 1);
            let fields = message.as_object().ok_or_else(|| {
                BridgeError::type_mismatch(&argument, "object", message.type_label())
            })?;
            let field = |key: &str| -> BridgeResult<String> {
                match fields.get(key) {
                    Some(DynamicValue::String(s)) => Ok(s.clone()),
                    Some(other) => Err(BridgeError::type_mismatch(
                        format!("{argument}.{key}"),
                        "string",
                        other.type_label(),
                    )),
                    None => Err(BridgeError::invalid_arguments(
                        "logBeforeGenerate",
                        format!("message {} is missing `{key}`", i + 1),
                    )),
                }
            };
            Ok((field("role")?, field("content")?))
        })
        .collect()
}

/// Optional string entry of an options table.
pub(crate) fn string_option<'a>(
    options: &'a HashMap<String, DynamicValue>,
    key: &str,
    method: &str,
) -> BridgeResult<Option<&'a str>> {
    match options.get(key) {
        None | Some(DynamicValue::Nil) => Ok(None),
        Some(DynamicValue::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(BridgeError::type_mismatch(
            format!("options.{key} of {method}"),
            "string",
            other.type_label(),
        )),
    }
}

#[async_trait]
impl Bridge for StructuredBridge {
    fn id(&self) -> &str {
        SLOG_BRIDGE_ID
    }

    fn metadata(&self) -> BridgeMetadata {
        BridgeMetadata::new("Structured Logging Bridge", "v1.0.0")
            .description("Leveled structured logging with LLM and tool call hooks")
            .author("raibid-labs")
            .license("MIT")
    }

    async fn initialize(&self, _ctx: &ExecutionContext) -> BridgeResult<()> {
        self.cell
            .initialize_with(|| async {
                Ok(SlogState {
                    min_level: LogLevel::Info,
                    detail: DetailLevel::Basic,
                    format: LogFormat::Text,
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
        let leveled = |name: &str, description: &str| {
            MethodInfo::new(name, description)
                .param(ParameterInfo::required(
                    "message",
                    DeclaredType::String,
                    "Log message",
                ))
                .param(ParameterInfo::optional(
                    "emoji",
                    DeclaredType::String,
                    "Marker prepended to the message",
                ))
                .param(ParameterInfo::optional(
                    "attributes",
                    DeclaredType::Object,
                    "Structured attributes",
                ))
        };
        vec![
            leveled("debug", "Log at debug level"),
            leveled("info", "Log at info level").example(r#"slog.info("ready", {port = 8080})"#),
            leveled("warn", "Log at warn level"),
            leveled("error", "Log at error level"),
            MethodInfo::new("logBeforeGenerate", "Log an LLM generation request")
                .param(ParameterInfo::required(
                    "messages",
                    DeclaredType::Array,
                    "Chat messages with role and content",
                )),
            MethodInfo::new("logAfterGenerate", "Log an LLM generation result")
                .param(ParameterInfo::required(
                    "response",
                    DeclaredType::Object,
                    "Response with optional content",
                ))
                .param(ParameterInfo::optional("error", DeclaredType::String, "Error message")),
            MethodInfo::new("logBeforeToolCall", "Log a tool invocation")
                .param(ParameterInfo::required("tool", DeclaredType::String, "Tool name"))
                .param(ParameterInfo::required("params", DeclaredType::Object, "Tool parameters")),
            MethodInfo::new("logAfterToolCall", "Log a tool result")
                .param(ParameterInfo::required("tool", DeclaredType::String, "Tool name"))
                .param(ParameterInfo::optional("result", DeclaredType::Object, "Tool result"))
                .param(ParameterInfo::optional("error", DeclaredType::String, "Error message")),
            MethodInfo::new("getLogLevel", "Current detail level").returns(DeclaredType::String),
            MethodInfo::new("withAttributes", "Logger handle carrying fixed attributes")
                .param(ParameterInfo::required("attributes", DeclaredType::Object, "Attributes"))
                .returns(DeclaredType::Object),
            MethodInfo::new("setLogLevel", "Set the detail level (basic, detailed, debug)")
                .param(ParameterInfo::required("level", DeclaredType::String, "Detail level")),
            MethodInfo::new("configureLogger", "Set output format and minimum level")
                .param(ParameterInfo::required(
                    "options",
                    DeclaredType::Object,
                    "{format = text|json, level = debug|info|warn|error}",
                ))
                .example(r#"slog.configureLogger({format = "json", level = "debug"})"#),
        ]
    }

    fn handles(&self, method: &str) -> bool {
        self.routes.contains(method)
    }

    fn type_mappings(&self) -> HashMap<String, TypeMapping> {
        HashMap::from([
            (
                LOGGER_TYPE.to_string(),
                TypeMapping::new("ContextLogger", LOGGER_TYPE),
            ),
            (
                "log_level".to_string(),
                TypeMapping::new("DetailLevel", "string"),
            ),
        ])
    }

    fn required_permissions(&self) -> Vec<Permission> {
        vec![
            Permission::new(
                PermissionType::Storage,
                "slog.logging",
                &["write"],
                "Write structured log records",
            ),
            Permission::new(
                PermissionType::Memory,
                "slog.context",
                &["read", "write"],
                "Keep logger context attributes",
            ),
        ]
    }

    async fn execute_method(
        &self,
        _ctx: &ExecutionContext,
        name: &str,
        args: &[DynamicValue],
    ) -> BridgeResult<DynamicValue> {
        let route = self.routes.resolve(SLOG_BRIDGE_ID, name)?;
        let positional = Args::new(name, args);
        match route {
            Route::Shared(handler) => {
                let state = self.cell.read(SLOG_BRIDGE_ID).await?;
                match handler {
                    Read::Log(level) => {
                        let call = message_shape(name).resolve(args)?;
                        let message = match call.string("emoji") {
                            "" => call.string("message").to_string(),
                            emoji => format!("{emoji} {}", call.string("message")),
                        };
                        self.emit(&state, level, message, call.object("attributes"));
                    }
                    Read::BeforeGenerate => {
                        let messages = chat_messages(positional.array(0, "messages")?)?;
                        let mut attributes = Attributes::new();
                        attributes.insert("message_count".into(), messages.len().into());
                        if state.detail >= DetailLevel::Detailed {
                            let roles = messages
                                .iter()
                                .map(|(role, _)| DynamicValue::from(role.as_str()));
                            attributes.insert("roles".into(), DynamicValue::array(roles));
                        }
                        if state.detail >= DetailLevel::Debug {
                            let full = messages.iter().map(|(role, content)| {
                                DynamicValue::object([
                                    ("role", DynamicValue::from(role.as_str())),
                                    ("content", DynamicValue::from(content.as_str())),
                                ])
                            });
                            attributes.insert("messages".into(), DynamicValue::array(full));
                        }
                        self.emit(
                            &state,
                            LogLevel::Info,
                            "LLM generate request".into(),
                            attributes,
                        );
                    }
                    Read::AfterGenerate => {
                        let response = positional.object(0, "response")?;
                        let error = positional.optional_string(1, "error")?.unwrap_or("");
                        let mut attributes = Attributes::new();
                        if !error.is_empty() {
                            attributes.insert("error".into(), error.into());
                            self.emit(
                                &state,
                                LogLevel::Error,
                                "LLM generate failed".into(),
                                attributes,
                            );
                        } else {
                            let content = response
                                .get("content")
                                .and_then(DynamicValue::as_str)
                                .unwrap_or("");
                            let length = content.chars().count();
                            attributes.insert("content_length".into(), length.into());
                            if state.detail >= DetailLevel::Debug {
                                attributes.insert("content".into(), content.into());
                            }
                            self.emit(
                                &state,
                                LogLevel::Info,
                                "LLM generate completed".into(),
                                attributes,
                            );
                        }
                    }
                    Read::BeforeToolCall => {
                        let tool = positional.string(0, "tool")?;
                        let params = positional.object(1, "params")?;
                        let mut attributes = Attributes::new();
                        attributes.insert("tool".into(), tool.into());
                        if state.detail >= DetailLevel::Detailed {
                            attributes.insert("params".into(), params.clone().into());
                        }
                        self.emit(&state, LogLevel::Info, "Tool call started".into(), attributes);
                    }
                    Read::AfterToolCall => {
                        let tool = positional.string(0, "tool")?;
                        let result = positional.optional_object(1, "result")?;
                        let error = positional.optional_string(2, "error")?.unwrap_or("");
                        let mut attributes = Attributes::new();
                        attributes.insert("tool".into(), tool.into());
                        if !error.is_empty() {
                            attributes.insert("error".into(), error.into());
                            self.emit(
                                &state,
                                LogLevel::Error,
                                "Tool call failed".into(),
                                attributes,
                            );
                        } else {
                            let detailed = state.detail >= DetailLevel::Detailed;
                            if let Some(result) = result.filter(|_| detailed) {
                                attributes.insert("result".into(), result.clone().into());
                            }
                            self.emit(
                                &state,
                                LogLevel::Info,
                                "Tool call completed".into(),
                                attributes,
                            );
                        }
                    }
                    Read::GetLevel => return Ok(DynamicValue::from(state.detail.as_str())),
                    Read::WithAttributes => {
                        let attributes = positional.object(0, "attributes")?.clone();
                        return Ok(DynamicValue::object([
                            ("logger", ContextLogger::new(attributes.clone()).into_value()),
                            ("attributes", DynamicValue::Object(attributes)),
                        ]));
                    }
                }
                Ok(DynamicValue::Nil)
            }
            Route::Exclusive(handler) => {
                let mut state = self.cell.write(SLOG_BRIDGE_ID).await?;
                match handler {
                    Write::SetLevel => {
                        let level = positional.string(0, "level")?;
                        state.detail = DetailLevel::parse(level).ok_or_else(|| {
                            BridgeError::invalid_arguments(
                                name,
                                format!(
                                    "unknown log level `{level}`, expected basic, detailed or debug"
                                ),
                            )
                        })?;
                    }
                    Write::Configure => {
                        let options = positional.object(0, "options")?;
                        // Validate both before applying either.
                        let format = string_option(options, "format", name)?
                            .map(|f| {
                                LogFormat::parse(f).ok_or_else(|| {
                                    BridgeError::invalid_arguments(
                                        name,
                                        format!("unknown format `{f}`"),
                                    )
                                })
                            })
                            .transpose()?;
                        let level = string_option(options, "level", name)?
                            .map(|l| {
                                LogLevel::parse(l).ok_or_else(|| {
                                    BridgeError::invalid_arguments(
                                        name,
                                        format!("unknown level `{l}`"),
                                    )
                                })
                            })
                            .transpose()?;
                        if let Some(format) = format {
                            state.format = format;
                        }
                        if let Some(level) = level {
                            state.min_level = level;
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

    async fn started() -> (StructuredBridge, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let bridge = StructuredBridge::with_sink(sink.clone());
        bridge.initialize(&ExecutionContext::new()).await.unwrap();
        (bridge, sink)
    }

    fn chat(role: &str, content: &str) -> DynamicValue {
        DynamicValue::object([
            ("role", DynamicValue::from(role)),
            ("content", DynamicValue::from(content)),
        ])
    }

    #[tokio::test]
    async fn test_leveled_logging_with_emoji_and_attributes() {
        let (bridge, sink) = started().await;
        let ctx = ExecutionContext::new();

        bridge
            .execute_method(
                &ctx,
                "warn",
                &[
                    "disk low".into(),
                    "⚠️".into(),
                    DynamicValue::object([("free_mb", DynamicValue::from(12))]),
                ],
            )
            .await
            .unwrap();

        let record = &sink.records()[0];
        assert_eq!(record.level, LogLevel::Warn);
        assert_eq!(record.message, "⚠️ disk low");
        assert_eq!(record.attributes["free_mb"], DynamicValue::from(12));
    }

    #[tokio::test]
    async fn test_min_level_filters_records() {
        let (bridge, sink) = started().await;
        let ctx = ExecutionContext::new();

        bridge.execute_method(&ctx, "debug", &["hidden".into()]).await.unwrap();
        assert!(sink.is_empty());

        bridge
            .execute_method(
                &ctx,
                "configureLogger",
                &[DynamicValue::object([
                    ("level", DynamicValue::from("debug")),
                    ("format", DynamicValue::from("json")),
                ])],
            )
            .await
            .unwrap();
        bridge.execute_method(&ctx, "debug", &["shown".into()]).await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].format, LogFormat::Json);
    }

    #[tokio::test]
    async fn test_configure_rejects_unknown_values() {
        let (bridge, sink) = started().await;
        let ctx = ExecutionContext::new();

        let err = bridge
            .execute_method(
                &ctx,
                "configureLogger",
                &[DynamicValue::object([
                    ("level", DynamicValue::from("debug")),
                    ("format", DynamicValue::from("xml")),
                ])],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);

        // The valid level in the rejected call was not applied.
        bridge.execute_method(&ctx, "debug", &["x".into()]).await.unwrap();
        assert!(sink.is_empty());

        let err = bridge
            .execute_method(
                &ctx,
                "configureLogger",
                &[DynamicValue::object([("level", DynamicValue::from(3))])],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[tokio::test]
    async fn test_generate_hooks_follow_detail_level() {
        let (bridge, sink) = started().await;
        let ctx = ExecutionContext::new();
        let messages = DynamicValue::array([chat("system", "be brief"), chat("user", "hi")]);

        bridge
            .execute_method(&ctx, "logBeforeGenerate", std::slice::from_ref(&messages))
            .await
            .unwrap();
        let basic = sink.records()[0].attributes.clone();
        assert_eq!(basic["message_count"], DynamicValue::from(2));
        assert!(!basic.contains_key("roles"));

        bridge.execute_method(&ctx, "setLogLevel", &["debug".into()]).await.unwrap();
        bridge
            .execute_method(&ctx, "logBeforeGenerate", std::slice::from_ref(&messages))
            .await
            .unwrap();
        let debug = sink.records()[1].attributes.clone();
        assert_eq!(
            debug["roles"],
            DynamicValue::array([DynamicValue::from("system"), DynamicValue::from("user")])
        );
        assert!(debug.contains_key("messages"));

        bridge
            .execute_method(
                &ctx,
                "logAfterGenerate",
                &[DynamicValue::object([("content", DynamicValue::from("hello"))])],
            )
            .await
            .unwrap();
        let after = &sink.records()[2];
        assert_eq!(after.attributes["content_length"], DynamicValue::from(5));
        assert_eq!(after.attributes["content"], DynamicValue::from("hello"));

        bridge
            .execute_method(
                &ctx,
                "logAfterGenerate",
                &[
                    DynamicValue::object(Vec::<(String, DynamicValue)>::new()),
                    "rate limited".into(),
                ],
            )
            .await
            .unwrap();
        assert_eq!(sink.records()[3].level, LogLevel::Error);
    }

    #[tokio::test]
    async fn test_generate_rejects_malformed_messages() {
        let (bridge, _sink) = started().await;
        let ctx = ExecutionContext::new();

        let err = bridge
            .execute_method(
                &ctx,
                "logBeforeGenerate",
                &[DynamicValue::array([DynamicValue::from("hi")])],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);

        let missing = DynamicValue::object([("role", DynamicValue::from("user"))]);
        let err = bridge
            .execute_method(&ctx, "logBeforeGenerate", &[DynamicValue::array([missing])])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    }

    #[tokio::test]
    async fn test_tool_call_hooks() {
        let (bridge, sink) = started().await;
        let ctx = ExecutionContext::new();
        bridge.execute_method(&ctx, "setLogLevel", &["detailed".into()]).await.unwrap();

        let params = DynamicValue::object([("pattern", DynamicValue::from("TODO"))]);
        bridge
            .execute_method(&ctx, "logBeforeToolCall", &["grep".into(), params.clone()])
            .await
            .unwrap();
        bridge
            .execute_method(
                &ctx,
                "logAfterToolCall",
                &["grep".into(), DynamicValue::Nil, "timeout".into()],
            )
            .await
            .unwrap();

        let records = sink.records();
        assert_eq!(records[0].attributes["params"], params);
        assert_eq!(records[1].level, LogLevel::Error);
        assert_eq!(records[1].attributes["error"], DynamicValue::from("timeout"));
    }

    #[tokio::test]
    async fn test_set_log_level_and_with_attributes() {
        let (bridge, _sink) = started().await;
        let ctx = ExecutionContext::new();

        let err = bridge
            .execute_method(&ctx, "setLogLevel", &["verbose".into()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        let level = bridge.execute_method(&ctx, "getLogLevel", &[]).await.unwrap();
        assert_eq!(level, DynamicValue::from("basic"));

        let attributes = DynamicValue::object([("request_id", DynamicValue::from("r-1"))]);
        let result = bridge
            .execute_method(&ctx, "withAttributes", std::slice::from_ref(&attributes))
            .await
            .unwrap();
        let result = result.as_object().unwrap();
        assert_eq!(result["attributes"], attributes);

        let logger = result["logger"].as_custom().unwrap();
        assert_eq!(logger.type_name(), LOGGER_TYPE);
        let logger = logger.downcast::<ContextLogger>().unwrap();
        assert_eq!(logger.attributes()["request_id"], DynamicValue::from("r-1"));
    }
}
