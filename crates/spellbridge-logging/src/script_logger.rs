//! Unified logging façade for scripts.
//!
//! [`ScriptLoggerBridge`] owns a debug bridge and a structured bridge and
//! fronts both with one API. It adds process-wide context attributes that
//! are merged under call-local attributes on every record.
//!
//! The `log` method accepts four call shapes:
//!
//! ```text
//! logger.log("info", "started")
//! logger.log("info", "started", {port = 8080})
//! logger.log("info", "agent", "started")
//! logger.log("info", "agent", "started", {port = 8080})
//! ```
//!
//! A string in the second position of a three-argument call is the
//! component name.
//!
//! `withContext` hands back a `logger` handle. Passing it as the context of
//! `logWithContext` logs with the attributes it captured.

use async_trait::async_trait;
use spellbridge_runtime::{
    expect_custom, merge_attributes, Args, Attributes, Bridge, BridgeError, BridgeMetadata,
    BridgeResult, CallShape, DeclaredType, DynamicValue, ExecutionContext, FromDynamic,
    LifecycleCell, LoggerSettings, MethodInfo, MethodTable, ParameterInfo, Permission,
    PermissionType, Route, TypeMapping,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::debug::{DebugBridge, DEBUG_BRIDGE_ID};
use crate::format::fill_template;
use crate::sink::{LogFormat, LogLevel, LogSink};
use crate::structured::{
    string_option, ContextLogger, StructuredBridge, LOGGER_TYPE, SLOG_BRIDGE_ID,
};

pub const SCRIPT_LOGGER_ID: &str = "script_logger";

/// Settings of the unified logger.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggerConfig {
    /// Minimum level of structured records, and the level used when a
    /// `log` call passes an empty level.
    pub default_level: LogLevel,
    pub format: LogFormat,
    /// Route component messages to the debug bridge.
    pub enable_debug: bool,
    /// Route records to the structured bridge.
    pub enable_structure: bool,
    /// Components enabled at initialization.
    pub components: Vec<String>,
    pub output_target: String,
    /// Global context attributes at initialization.
    pub attributes: Attributes,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            default_level: LogLevel::Info,
            format: LogFormat::Text,
            enable_debug: true,
            enable_structure: true,
            components: Vec::new(),
            output_target: "stderr".to_string(),
            attributes: Attributes::new(),
        }
    }
}

impl LoggerConfig {
    /// Build from the `[logger]` table of the runtime configuration.
    pub fn from_settings(settings: &LoggerSettings) -> BridgeResult<Self> {
        settings.validate()?;
        let default_level = LogLevel::parse(&settings.default_level).ok_or_else(|| {
            BridgeError::InvalidConfig(format!(
                "Invalid logger.default_level: {}",
                settings.default_level
            ))
        })?;
        let format = LogFormat::parse(&settings.format).ok_or_else(|| {
            BridgeError::InvalidConfig(format!("Invalid logger.format: {}", settings.format))
        })?;
        Ok(Self {
            default_level,
            format,
            enable_debug: settings.enable_debug,
            enable_structure: settings.enable_structure,
            components: settings.components.clone(),
            output_target: settings.output_target.clone(),
            attributes: settings
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), DynamicValue::from_json(v.clone())))
                .collect(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Read {
    Log,
    LogWithContext,
    WithContext,
    GetConfiguration,
    ListComponents,
    Debug,
    Leveled(LogLevel),
    LogBridgeError,
    FormatMessage,
}

#[derive(Debug, Clone, Copy)]
enum Write {
    SetGlobalContext,
    ClearGlobalContext,
    Configure,
    EnableComponent,
    DisableComponent,
}

struct LoggerState {
    config: LoggerConfig,
    context: Attributes,
    components: BTreeSet<String>,
}

impl LoggerState {
    /// `components` is what the debug part reports after starting, which
    /// includes anything it seeded itself.
    fn new(config: LoggerConfig, components: BTreeSet<String>) -> Self {
        Self {
            context: config.attributes.clone(),
            components,
            config,
        }
    }
}

/// Composite bridge fronting the debug and structured logging bridges.
pub struct ScriptLoggerBridge {
    cell: LifecycleCell<LoggerState>,
    routes: MethodTable<Read, Write>,
    debug: Box<dyn Bridge>,
    structured: Box<dyn Bridge>,
    config: LoggerConfig,
}

impl ScriptLoggerBridge {
    /// Logger writing to `tracing` with default settings.
    pub fn new() -> Self {
        Self::from_parts(
            Box::new(DebugBridge::new()),
            Box::new(StructuredBridge::new()),
            LoggerConfig::default(),
        )
    }

    /// Logger whose sub-bridges both write to `sink`.
    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self::from_parts(
            Box::new(DebugBridge::with_sink(Arc::clone(&sink))),
            Box::new(StructuredBridge::with_sink(sink)),
            LoggerConfig::default(),
        )
    }

    /// Logger configured from the `[logger]` table.
    pub fn from_settings(
        settings: &LoggerSettings,
        sink: Arc<dyn LogSink>,
    ) -> BridgeResult<Self> {
        let config = LoggerConfig::from_settings(settings)?;
        Ok(Self::with_sink(sink).with_config(config))
    }

    /// Assemble a logger from its debug and structured parts.
    ///
    /// `debug` must implement the debug bridge methods and `structured` the
    /// structured bridge methods.
    pub fn from_parts(
        debug: Box<dyn Bridge>,
        structured: Box<dyn Bridge>,
        config: LoggerConfig,
    ) -> Self {
        Self {
            cell: LifecycleCell::new(),
            routes: MethodTable::new()
                .shared("log", Read::Log)
                .shared("logWithContext", Read::LogWithContext)
                .shared("withContext", Read::WithContext)
                .shared("getConfiguration", Read::GetConfiguration)
                .shared("listEnabledComponents", Read::ListComponents)
                .shared("debug", Read::Debug)
                .shared("info", Read::Leveled(LogLevel::Info))
                .shared("warn", Read::Leveled(LogLevel::Warn))
                .shared("error", Read::Leveled(LogLevel::Error))
                .shared("logBridgeError", Read::LogBridgeError)
                .shared("formatMessage", Read::FormatMessage)
                .exclusive("setGlobalContext", Write::SetGlobalContext)
                .exclusive("clearGlobalContext", Write::ClearGlobalContext)
                .exclusive("configure", Write::Configure)
                .exclusive("enableComponent", Write::EnableComponent)
                .exclusive("disableComponent", Write::DisableComponent),
            debug,
            structured,
            config,
        }
    }

    /// Replace the settings applied at the next initialization.
    pub fn with_config(mut self, config: LoggerConfig) -> Self {
        self.config = config;
        self
    }

    async fn call_debug(
        &self,
        ctx: &ExecutionContext,
        method: &str,
        args: &[DynamicValue],
    ) -> BridgeResult<DynamicValue> {
        self.debug
            .execute_method(ctx, method, args)
            .await
            .map_err(|e| e.annotate(DEBUG_BRIDGE_ID, method))
    }

    async fn call_structured(
        &self,
        ctx: &ExecutionContext,
        method: &str,
        args: &[DynamicValue],
    ) -> BridgeResult<DynamicValue> {
        self.structured
            .execute_method(ctx, method, args)
            .await
            .map_err(|e| e.annotate(SLOG_BRIDGE_ID, method))
    }

    /// Initialize both parts, apply `config` to them and return the
    /// components the debug part has enabled.
    ///
    /// Parts that were started are cleaned up again if a later step fails.
    async fn start_parts(
        &self,
        ctx: &ExecutionContext,
        config: &LoggerConfig,
    ) -> BridgeResult<BTreeSet<String>> {
        self.debug.initialize(ctx).await?;

        let started: BridgeResult<BTreeSet<String>> = async {
            self.structured.initialize(ctx).await?;
            for component in &config.components {
                self.call_debug(ctx, "enableDebugComponent", &[component.as_str().into()])
                    .await?;
            }
            let options = DynamicValue::object([
                ("level", DynamicValue::from(config.default_level.as_str())),
                ("format", DynamicValue::from(config.format.as_str())),
            ]);
            self.call_structured(ctx, "configureLogger", &[options]).await?;

            let listed = self.call_debug(ctx, "listEnabledComponents", &[]).await?;
            let mut components: BTreeSet<String> = config.components.iter().cloned().collect();
            if let Some(enabled) = Option::<Vec<String>>::from_dynamic(&listed)? {
                components.extend(enabled);
            }
            Ok(components)
        }
        .await;

        match started {
            Ok(components) => Ok(components),
            Err(err) => {
                if let Err(rollback) = self.stop_parts(ctx).await {
                    warn!("Failed to roll back script logger parts: {}", rollback);
                }
                Err(err)
            }
        }
    }

    /// Clean up both parts, reporting every failure.
    async fn stop_parts(&self, ctx: &ExecutionContext) -> BridgeResult<()> {
        let mut failures = Vec::new();
        if let Err(err) = self.structured.cleanup(ctx).await {
            failures.push(err.annotate(SLOG_BRIDGE_ID, "cleanup"));
        }
        if let Err(err) = self.debug.cleanup(ctx).await {
            failures.push(err.annotate(DEBUG_BRIDGE_ID, "cleanup"));
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::Cleanup(failures))
        }
    }

    /// Write one record through the enabled parts.
    async fn emit(
        &self,
        ctx: &ExecutionContext,
        state: &LoggerState,
        level: LogLevel,
        component: &str,
        message: &str,
        local: &Attributes,
    ) -> BridgeResult<DynamicValue> {
        let attributes = merge_attributes(&state.context, local);

        if state.config.enable_debug
            && !component.is_empty()
            && state.components.contains(component)
        {
            let line = format!("[{}] {}", level.as_str().to_uppercase(), message);
            self.call_debug(ctx, "debugPrintln", &[component.into(), line.into()])
                .await?;
        }

        if state.config.enable_structure {
            let mut args = vec![DynamicValue::from(message)];
            if !attributes.is_empty() {
                args.push(level.emoji().into());
                args.push(DynamicValue::Object(attributes));
            }
            self.call_structured(ctx, level.as_str(), &args).await?;
        }
        Ok(DynamicValue::Nil)
    }
}

impl Default for ScriptLoggerBridge {
    fn default() -> Self {
        Self::new()
    }
}

fn log_shape() -> CallShape {
    CallShape::new("log")
        .required("level", DeclaredType::String)
        .optional("component", DeclaredType::String)
        .required("message", DeclaredType::String)
        .optional("attributes", DeclaredType::Object)
}

fn debug_shape() -> CallShape {
    CallShape::new("debug")
        .required("message", DeclaredType::String)
        .optional("component", DeclaredType::String)
        .optional("attributes", DeclaredType::Object)
}

fn leveled_shape(method: &str) -> CallShape {
    CallShape::new(method)
        .required("message", DeclaredType::String)
        .optional("attributes", DeclaredType::Object)
}

fn parse_level(method: &str, level: &str, default: LogLevel) -> BridgeResult<LogLevel> {
    if level.is_empty() {
        return Ok(default);
    }
    LogLevel::parse(level).ok_or_else(|| {
        BridgeError::invalid_arguments(
            method,
            format!("unknown level `{level}`, expected debug, info, warn or error"),
        )
    })
}

/// Attributes from a `logWithContext` context: a table, or a `logger`
/// handle returned by `withContext`.
fn context_attributes(args: &Args<'_>, position: usize) -> BridgeResult<Attributes> {
    match args.get(position) {
        None => Ok(Attributes::new()),
        Some(DynamicValue::Object(map)) => Ok(map.clone()),
        Some(value) => {
            let argument = format!("argument {} (`context`) of logWithContext", position + 1);
            let logger = expect_custom::<ContextLogger>(value, LOGGER_TYPE, &argument)?;
            Ok(logger.attributes().clone())
        }
    }
}

fn string_list(values: &BTreeSet<String>) -> DynamicValue {
    DynamicValue::array(values.iter().map(|v| DynamicValue::from(v.as_str())))
}

/// Options accepted by `configure`, validated before any is applied.
#[derive(Default)]
struct ConfigureOptions {
    level: Option<LogLevel>,
    format: Option<LogFormat>,
    enable_debug: Option<bool>,
    enable_structure: Option<bool>,
    components: Option<BTreeSet<String>>,
    output_target: Option<String>,
}

impl ConfigureOptions {
    fn parse(options: &HashMap<String, DynamicValue>) -> BridgeResult<Self> {
        let flag = |key: &str| -> BridgeResult<Option<bool>> {
            match options.get(key) {
                None | Some(DynamicValue::Nil) => Ok(None),
                Some(DynamicValue::Bool(b)) => Ok(Some(*b)),
                Some(other) => Err(BridgeError::type_mismatch(
                    format!("options.{key} of configure"),
                    "bool",
                    other.type_label(),
                )),
            }
        };

        let level = string_option(options, "level", "configure")?
            .map(|l| parse_level("configure", l, LogLevel::Info))
            .transpose()?;
        let format = string_option(options, "format", "configure")?
            .map(|f| {
                LogFormat::parse(f).ok_or_else(|| {
                    BridgeError::invalid_arguments("configure", format!("unknown format `{f}`"))
                })
            })
            .transpose()?;

        let components = match options.get("components") {
            None | Some(DynamicValue::Nil) => None,
            Some(DynamicValue::Array(items)) => Some(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| match item {
                        DynamicValue::String(s) if !s.trim().is_empty() => Ok(s.clone()),
                        DynamicValue::String(_) => Err(BridgeError::invalid_arguments(
                            "configure",
                            "component names must not be empty",
                        )),
                        other => Err(BridgeError::type_mismatch(
                            format!("options.components[{}] of configure", i + 1),
                            "string",
                            other.type_label(),
                        )),
                    })
                    .collect::<BridgeResult<BTreeSet<String>>>()?,
            ),
            Some(other) => {
                return Err(BridgeError::type_mismatch(
                    "options.components of configure",
                    "array",
                    other.type_label(),
                ))
            }
        };

        Ok(Self {
            level,
            format,
            enable_debug: flag("enable_debug")?,
            enable_structure: flag("enable_structure")?,
            components,
            output_target: string_option(options, "output_target", "configure")?
                .map(str::to_string),
        })
    }
}

#[async_trait]
impl Bridge for ScriptLoggerBridge {
    fn id(&self) -> &str {
        SCRIPT_LOGGER_ID
    }

    fn metadata(&self) -> BridgeMetadata {
        BridgeMetadata::new("Script Logger Bridge", "v1.0.0")
            .description(
                "Unified logging combining component debug output and structured records",
            )
            .author("raibid-labs")
            .license("MIT")
    }

    async fn initialize(&self, ctx: &ExecutionContext) -> BridgeResult<()> {
        let config = self.config.clone();
        self.cell
            .initialize_with(|| async move {
                let components = self.start_parts(ctx, &config).await?;
                info!(
                    "Script logger initialized (level: {}, components: {})",
                    config.default_level,
                    components.len()
                );
                Ok(LoggerState::new(config, components))
            })
            .await
    }

    async fn cleanup(&self, ctx: &ExecutionContext) -> BridgeResult<()> {
        self.cell
            .cleanup_with(|_state| async move {
                debug!("Cleaning up script logger");
                self.stop_parts(ctx).await
            })
            .await
    }

    async fn is_initialized(&self) -> bool {
        self.cell.is_initialized().await
    }

    fn methods(&self) -> Vec<MethodInfo> {
        let message = || ParameterInfo::required("message", DeclaredType::String, "Log message");
        let attributes = || {
            ParameterInfo::optional("attributes", DeclaredType::Object, "Call-local attributes")
        };
        let level = || {
            ParameterInfo::required("level", DeclaredType::String, "debug, info, warn or error")
        };
        let component =
            || ParameterInfo::optional("component", DeclaredType::String, "Debug component");
        let component_name =
            || ParameterInfo::required("component", DeclaredType::String, "Component name");
        let leveled = |name: &str, description: &str| {
            MethodInfo::new(name, description)
                .param(message())
                .param(attributes())
        };
        vec![
            MethodInfo::new("log", "Log at a given level, optionally for a component")
                .param(level())
                .param(component())
                .param(message())
                .param(attributes())
                .example(r#"logger.log("info", "started")"#)
                .example(r#"logger.log("info", "agent", "started", {run = 3})"#),
            MethodInfo::new("logWithContext", "Log with an explicit context")
                .param(level())
                .param(message())
                .param(ParameterInfo::optional(
                    "context",
                    DeclaredType::Any,
                    "Context table, or a logger handle from withContext",
                ))
                .example(r#"logger.logWithContext("info", "done", scoped.logger)"#),
            MethodInfo::new("withContext", "Logger handle carrying extra attributes")
                .param(ParameterInfo::required(
                    "attributes",
                    DeclaredType::Object,
                    "Attributes",
                ))
                .returns(DeclaredType::Object),
            MethodInfo::new("getConfiguration", "Current logger settings")
                .returns(DeclaredType::Object),
            MethodInfo::new("listEnabledComponents", "Enabled debug components")
                .returns(DeclaredType::Array),
            MethodInfo::new("debug", "Log at debug level, optionally for a component")
                .param(message())
                .param(component())
                .param(attributes()),
            leveled("info", "Log at info level"),
            leveled("warn", "Log at warn level"),
            leveled("error", "Log at error level"),
            MethodInfo::new("logBridgeError", "Log a failed bridge operation")
                .param(ParameterInfo::required(
                    "bridgeId",
                    DeclaredType::String,
                    "Bridge id",
                ))
                .param(ParameterInfo::required(
                    "operation",
                    DeclaredType::String,
                    "Method that failed",
                ))
                .param(ParameterInfo::required(
                    "error",
                    DeclaredType::String,
                    "Error message",
                ))
                .param(ParameterInfo::optional(
                    "context",
                    DeclaredType::Object,
                    "Extra attributes",
                )),
            MethodInfo::new("formatMessage", "Fill {key} placeholders from attributes")
                .param(ParameterInfo::required(
                    "template",
                    DeclaredType::String,
                    "Message template",
                ))
                .param(attributes())
                .returns(DeclaredType::String)
                .example(r#"logger.formatMessage("{user} logged in", {user = "ada"})"#),
            MethodInfo::new("setGlobalContext", "Replace the global context attributes").param(
                ParameterInfo::required("attributes", DeclaredType::Object, "Attributes"),
            ),
            MethodInfo::new("clearGlobalContext", "Remove all global context attributes"),
            MethodInfo::new("configure", "Change logger settings").param(ParameterInfo::required(
                "options",
                DeclaredType::Object,
                "{level, format, enable_debug, enable_structure, components, output_target}",
            )),
            MethodInfo::new("enableComponent", "Enable debug output for a component")
                .param(component_name()),
            MethodInfo::new("disableComponent", "Disable debug output for a component")
                .param(component_name()),
        ]
    }

    fn handles(&self, method: &str) -> bool {
        self.routes.contains(method)
    }

    fn type_mappings(&self) -> HashMap<String, TypeMapping> {
        HashMap::from([
            (
                "logger_config".to_string(),
                TypeMapping::new("LoggerConfig", "object"),
            ),
            (
                "log_context".to_string(),
                TypeMapping::new("Attributes", "object"),
            ),
            (
                "unified_logger".to_string(),
                TypeMapping::new("ContextLogger", LOGGER_TYPE),
            ),
        ])
    }

    fn required_permissions(&self) -> Vec<Permission> {
        let mut permissions = vec![
            Permission::new(
                PermissionType::Memory,
                "script_logger.context",
                &["read", "write"],
                "Keep global context attributes",
            ),
            Permission::new(
                PermissionType::Storage,
                "script_logger.output",
                &["write"],
                "Write log output",
            ),
        ];
        permissions.extend(self.debug.required_permissions());
        permissions.extend(self.structured.required_permissions());
        permissions
    }

    async fn execute_method(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        args: &[DynamicValue],
    ) -> BridgeResult<DynamicValue> {
        let route = self.routes.resolve(SCRIPT_LOGGER_ID, name)?;
        let positional = Args::new(name, args);
        match route {
            Route::Shared(handler) => {
                let state = self.cell.read(SCRIPT_LOGGER_ID).await?;
                let default_level = state.config.default_level;
                match handler {
                    Read::Log => {
                        let call = log_shape().resolve(args)?;
                        let level = parse_level(name, call.string("level"), default_level)?;
                        self.emit(
                            ctx,
                            &state,
                            level,
                            call.string("component"),
                            call.string("message"),
                            &call.object("attributes"),
                        )
                        .await
                    }
                    Read::LogWithContext => {
                        let level =
                            parse_level(name, positional.string(0, "level")?, default_level)?;
                        let message = positional.string(1, "message")?;
                        let context = context_attributes(&positional, 2)?;
                        self.emit(ctx, &state, level, "", message, &context).await
                    }
                    Read::Debug => {
                        let call = debug_shape().resolve(args)?;
                        self.emit(
                            ctx,
                            &state,
                            LogLevel::Debug,
                            call.string("component"),
                            call.string("message"),
                            &call.object("attributes"),
                        )
                        .await
                    }
                    Read::Leveled(level) => {
                        let call = leveled_shape(name).resolve(args)?;
                        self.emit(
                            ctx,
                            &state,
                            level,
                            "",
                            call.string("message"),
                            &call.object("attributes"),
                        )
                        .await
                    }
                    Read::LogBridgeError => {
                        let bridge_id = positional.string(0, "bridgeId")?;
                        let operation = positional.string(1, "operation")?;
                        let error = positional.string(2, "error")?;
                        let context = positional
                            .optional_object(3, "context")?
                            .cloned()
                            .unwrap_or_default();

                        let base = Attributes::from([
                            ("bridge_id".to_string(), DynamicValue::from(bridge_id)),
                            ("operation".to_string(), DynamicValue::from(operation)),
                            ("error".to_string(), DynamicValue::from(error)),
                        ]);
                        let message = format!("[Bridge Error] {bridge_id}.{operation}: {error}");
                        self.emit(
                            ctx,
                            &state,
                            LogLevel::Error,
                            "bridge",
                            &message,
                            &merge_attributes(&base, &context),
                        )
                        .await
                    }
                    Read::WithContext => {
                        let attributes = positional.object(0, "attributes")?;
                        let logger =
                            ContextLogger::new(merge_attributes(&state.context, attributes));
                        let mut result = HashMap::from([
                            (
                                "attributes".to_string(),
                                DynamicValue::Object(attributes.clone()),
                            ),
                            ("logger".to_string(), logger.into_value()),
                        ]);
                        if state.config.enable_structure {
                            let forwarded = [DynamicValue::Object(attributes.clone())];
                            let slog_context = self
                                .call_structured(ctx, "withAttributes", &forwarded)
                                .await?;
                            result.insert("slogContext".to_string(), slog_context);
                        }
                        Ok(DynamicValue::Object(result))
                    }
                    Read::GetConfiguration => {
                        let config = &state.config;
                        Ok(DynamicValue::object([
                            (
                                "default_level",
                                DynamicValue::from(config.default_level.as_str()),
                            ),
                            ("format", DynamicValue::from(config.format.as_str())),
                            ("enable_debug", DynamicValue::from(config.enable_debug)),
                            (
                                "enable_structure",
                                DynamicValue::from(config.enable_structure),
                            ),
                            ("components", string_list(&state.components)),
                            (
                                "output_target",
                                DynamicValue::from(config.output_target.as_str()),
                            ),
                            ("context", DynamicValue::Object(state.context.clone())),
                        ]))
                    }
                    Read::ListComponents => {
                        self.call_debug(ctx, "listEnabledComponents", &[]).await
                    }
                    Read::FormatMessage => {
                        let template = positional.string(0, "template")?;
                        let attributes = positional
                            .optional_object(1, "attributes")?
                            .cloned()
                            .unwrap_or_default();
                        Ok(DynamicValue::from(fill_template(template, &attributes)))
                    }
                }
            }
            Route::Exclusive(handler) => {
                let mut state = self.cell.write(SCRIPT_LOGGER_ID).await?;
                match handler {
                    Write::SetGlobalContext => {
                        state.context = positional.object(0, "attributes")?.clone();
                    }
                    Write::ClearGlobalContext => state.context.clear(),
                    Write::EnableComponent => {
                        let component = positional.string(0, "component")?;
                        self.call_debug(ctx, "enableDebugComponent", &[component.into()])
                            .await?;
                        state.components.insert(component.to_string());
                    }
                    Write::DisableComponent => {
                        let component = positional.string(0, "component")?;
                        self.call_debug(ctx, "disableDebugComponent", &[component.into()])
                            .await?;
                        state.components.remove(component);
                    }
                    Write::Configure => {
                        let options = ConfigureOptions::parse(positional.object(0, "options")?)?;

                        let mut forwarded = Vec::new();
                        if let Some(level) = options.level {
                            forwarded.push(("level", DynamicValue::from(level.as_str())));
                        }
                        if let Some(format) = options.format {
                            forwarded.push(("format", DynamicValue::from(format.as_str())));
                        }
                        if !forwarded.is_empty() {
                            let forwarded = [DynamicValue::object(forwarded)];
                            self.call_structured(ctx, "configureLogger", &forwarded)
                                .await?;
                        }

                        if let Some(components) = options.components {
                            for old in state.components.difference(&components) {
                                let old = [DynamicValue::from(old.as_str())];
                                self.call_debug(ctx, "disableDebugComponent", &old).await?;
                            }
                            for new in components.difference(&state.components) {
                                let new = [DynamicValue::from(new.as_str())];
                                self.call_debug(ctx, "enableDebugComponent", &new).await?;
                            }
                            state.components = components;
                        }

                        let config = &mut state.config;
                        if let Some(level) = options.level {
                            config.default_level = level;
                        }
                        if let Some(format) = options.format {
                            config.format = format;
                        }
                        if let Some(enabled) = options.enable_debug {
                            config.enable_debug = enabled;
                        }
                        if let Some(enabled) = options.enable_structure {
                            config.enable_structure = enabled;
                        }
                        if let Some(target) = options.output_target {
                            config.output_target = target;
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
    use crate::sink::{LogRecord, MemorySink};
    use spellbridge_runtime::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn started() -> (ScriptLoggerBridge, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let logger = ScriptLoggerBridge::with_sink(sink.clone());
        logger.initialize(&ExecutionContext::new()).await.unwrap();
        (logger, sink)
    }

    fn slog_records(sink: &MemorySink) -> Vec<LogRecord> {
        sink.records_from(SLOG_BRIDGE_ID)
    }

    /// Part that can be told to fail initialize or cleanup.
    struct FlakyPart {
        id: &'static str,
        fail_init: bool,
        fail_cleanup: bool,
        cleanups: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Bridge for FlakyPart {
        fn id(&self) -> &str {
            self.id
        }

        fn metadata(&self) -> BridgeMetadata {
            BridgeMetadata::new("Flaky", "v0.0.1")
        }

        async fn initialize(&self, _ctx: &ExecutionContext) -> BridgeResult<()> {
            if self.fail_init {
                return Err(BridgeError::InvalidConfig("part refused to start".into()));
            }
            Ok(())
        }

        async fn cleanup(&self, _ctx: &ExecutionContext) -> BridgeResult<()> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            if self.fail_cleanup {
                return Err(BridgeError::InvalidConfig(format!("{} refused to stop", self.id)));
            }
            Ok(())
        }

        async fn is_initialized(&self) -> bool {
            true
        }

        fn methods(&self) -> Vec<MethodInfo> {
            Vec::new()
        }

        fn handles(&self, _method: &str) -> bool {
            true
        }

        fn required_permissions(&self) -> Vec<Permission> {
            Vec::new()
        }

        async fn execute_method(
            &self,
            _ctx: &ExecutionContext,
            _name: &str,
            _args: &[DynamicValue],
        ) -> BridgeResult<DynamicValue> {
            Ok(DynamicValue::Nil)
        }
    }

    fn flaky(
        id: &'static str,
        fail_init: bool,
        fail_cleanup: bool,
        cleanups: &Arc<AtomicUsize>,
    ) -> Box<dyn Bridge> {
        Box::new(FlakyPart {
            id,
            fail_init,
            fail_cleanup,
            cleanups: Arc::clone(cleanups),
        })
    }

    /// Structured part whose cleanup takes a while.
    struct SlowStop(StructuredBridge);

    #[async_trait]
    impl Bridge for SlowStop {
        fn id(&self) -> &str {
            self.0.id()
        }

        fn metadata(&self) -> BridgeMetadata {
            self.0.metadata()
        }

        async fn initialize(&self, ctx: &ExecutionContext) -> BridgeResult<()> {
            self.0.initialize(ctx).await
        }

        async fn cleanup(&self, ctx: &ExecutionContext) -> BridgeResult<()> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.0.cleanup(ctx).await
        }

        async fn is_initialized(&self) -> bool {
            self.0.is_initialized().await
        }

        fn methods(&self) -> Vec<MethodInfo> {
            self.0.methods()
        }

        fn handles(&self, method: &str) -> bool {
            self.0.handles(method)
        }

        fn required_permissions(&self) -> Vec<Permission> {
            self.0.required_permissions()
        }

        async fn execute_method(
            &self,
            ctx: &ExecutionContext,
            name: &str,
            args: &[DynamicValue],
        ) -> BridgeResult<DynamicValue> {
            self.0.execute_method(ctx, name, args).await
        }
    }

    #[tokio::test]
    async fn test_log_shapes_reach_structured_bridge() {
        let (logger, sink) = started().await;
        let ctx = ExecutionContext::new();
        let attrs = DynamicValue::object([("k", DynamicValue::from("v"))]);

        logger.execute_method(&ctx, "log", &["info".into(), "one".into()]).await.unwrap();
        logger
            .execute_method(&ctx, "log", &["info".into(), "two".into(), attrs.clone()])
            .await
            .unwrap();
        logger
            .execute_method(&ctx, "log", &["warn".into(), "agent".into(), "three".into()])
            .await
            .unwrap();
        logger
            .execute_method(&ctx, "log", &["error".into(), "agent".into(), "four".into(), attrs])
            .await
            .unwrap();

        let records = slog_records(&sink);
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].message, "one");
        assert_eq!(records[1].message, "ℹ️ two");
        assert_eq!(records[1].attributes["k"], DynamicValue::from("v"));
        assert_eq!(records[2].message, "three");
        assert_eq!(records[2].level, LogLevel::Warn);
        assert_eq!(records[3].message, "❌ four");
    }

    #[tokio::test]
    async fn test_log_rejects_bad_arguments() {
        let (logger, _sink) = started().await;
        let ctx = ExecutionContext::new();

        let err = logger
            .execute_method(&ctx, "log", &["info".into(), "msg".into(), 42.into()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        assert!(err.to_string().contains("`message` or `attributes`"), "{err}");

        let err = logger
            .execute_method(&ctx, "log", &["loud".into(), "msg".into()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    }

    #[tokio::test]
    async fn test_component_messages_reach_debug_bridge() {
        let (logger, sink) = started().await;
        let ctx = ExecutionContext::new();

        logger
            .execute_method(&ctx, "log", &["info".into(), "tools".into(), "hidden".into()])
            .await
            .unwrap();
        assert!(sink.records_from(DEBUG_BRIDGE_ID).is_empty());

        logger.execute_method(&ctx, "enableComponent", &["tools".into()]).await.unwrap();
        logger
            .execute_method(&ctx, "log", &["info".into(), "tools".into(), "grep done".into()])
            .await
            .unwrap();

        let debug_records = sink.records_from(DEBUG_BRIDGE_ID);
        assert_eq!(debug_records.len(), 1);
        assert_eq!(debug_records[0].message, "[INFO] grep done");

        let listed = logger.execute_method(&ctx, "listEnabledComponents", &[]).await.unwrap();
        assert_eq!(listed, DynamicValue::array([DynamicValue::from("tools")]));
    }

    #[tokio::test]
    async fn test_global_context_merges_under_local() {
        let (logger, sink) = started().await;
        let ctx = ExecutionContext::new();

        let global =
            DynamicValue::object([("a", DynamicValue::from(1)), ("b", DynamicValue::from(2))]);
        let local =
            DynamicValue::object([("b", DynamicValue::from(3)), ("c", DynamicValue::from(4))]);
        logger.execute_method(&ctx, "setGlobalContext", &[global]).await.unwrap();
        logger.execute_method(&ctx, "info", &["merged".into(), local]).await.unwrap();

        let expected = Attributes::from([
            ("a".to_string(), DynamicValue::from(1)),
            ("b".to_string(), DynamicValue::from(3)),
            ("c".to_string(), DynamicValue::from(4)),
        ]);
        assert_eq!(slog_records(&sink)[0].attributes, expected);

        logger.execute_method(&ctx, "clearGlobalContext", &[]).await.unwrap();
        logger.execute_method(&ctx, "info", &["bare".into()]).await.unwrap();
        assert!(slog_records(&sink)[1].attributes.is_empty());
    }

    #[tokio::test]
    async fn test_configure_and_get_configuration() {
        let (logger, sink) = started().await;
        let ctx = ExecutionContext::new();

        let options = DynamicValue::object([
            ("level", DynamicValue::from("debug")),
            ("format", DynamicValue::from("json")),
            ("components", DynamicValue::array([DynamicValue::from("llm")])),
        ]);
        logger.execute_method(&ctx, "configure", &[options]).await.unwrap();

        logger
            .execute_method(&ctx, "debug", &["tokens counted".into(), "llm".into()])
            .await
            .unwrap();
        assert_eq!(sink.records_from(DEBUG_BRIDGE_ID).len(), 1);
        let structured = slog_records(&sink);
        assert_eq!(structured.len(), 1);
        assert_eq!(structured[0].format, LogFormat::Json);

        let config = logger.execute_method(&ctx, "getConfiguration", &[]).await.unwrap();
        let config = config.as_object().unwrap();
        assert_eq!(config["default_level"], DynamicValue::from("debug"));
        assert_eq!(config["format"], DynamicValue::from("json"));
        assert_eq!(config["components"], DynamicValue::array([DynamicValue::from("llm")]));

        let err = logger
            .execute_method(
                &ctx,
                "configure",
                &[DynamicValue::object([("enable_debug", DynamicValue::from("yes"))])],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[tokio::test]
    async fn test_disabling_structure_output() {
        let (logger, sink) = started().await;
        let ctx = ExecutionContext::new();

        logger
            .execute_method(
                &ctx,
                "configure",
                &[DynamicValue::object([("enable_structure", DynamicValue::from(false))])],
            )
            .await
            .unwrap();
        logger.execute_method(&ctx, "warn", &["quiet".into()]).await.unwrap();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_log_bridge_error() {
        let (logger, sink) = started().await;
        let ctx = ExecutionContext::new();

        logger
            .execute_method(
                &ctx,
                "logBridgeError",
                &[
                    "json".into(),
                    "parse".into(),
                    "unexpected token".into(),
                    DynamicValue::object([("line", DynamicValue::from(3))]),
                ],
            )
            .await
            .unwrap();

        let record = &slog_records(&sink)[0];
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.message, "❌ [Bridge Error] json.parse: unexpected token");
        assert_eq!(record.attributes["bridge_id"], DynamicValue::from("json"));
        assert_eq!(record.attributes["line"], DynamicValue::from(3));
    }

    #[tokio::test]
    async fn test_with_context_and_format_message() {
        let (logger, _sink) = started().await;
        let ctx = ExecutionContext::new();

        logger
            .execute_method(
                &ctx,
                "setGlobalContext",
                &[DynamicValue::object([("service", DynamicValue::from("api"))])],
            )
            .await
            .unwrap();
        let result = logger
            .execute_method(
                &ctx,
                "withContext",
                &[DynamicValue::object([("user", DynamicValue::from("ada"))])],
            )
            .await
            .unwrap();
        let result = result.as_object().unwrap();
        assert!(result.contains_key("slogContext"));

        let handle = result["logger"].as_custom().unwrap().downcast::<ContextLogger>().unwrap();
        assert_eq!(handle.attributes()["service"], DynamicValue::from("api"));
        assert_eq!(handle.attributes()["user"], DynamicValue::from("ada"));

        let text = logger
            .execute_method(
                &ctx,
                "formatMessage",
                &[
                    "{user} ran {count} jobs".into(),
                    DynamicValue::object([
                        ("user", DynamicValue::from("ada")),
                        ("count", DynamicValue::from(2)),
                    ]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(text, DynamicValue::from("ada ran 2 jobs"));
    }

    #[tokio::test]
    async fn test_initialize_rolls_back_debug_part() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let logger = ScriptLoggerBridge::from_parts(
            flaky("debug", false, false, &cleanups),
            flaky("slog", true, false, &cleanups),
            LoggerConfig::default(),
        );
        let ctx = ExecutionContext::new();

        let err = logger.initialize(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(!logger.is_initialized().await);
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cleanup_aggregates_part_failures() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let logger = ScriptLoggerBridge::from_parts(
            flaky("debug", false, true, &cleanups),
            flaky("slog", false, true, &cleanups),
            LoggerConfig::default(),
        );
        let ctx = ExecutionContext::new();
        logger.initialize(&ctx).await.unwrap();

        let err = logger.cleanup(&ctx).await.unwrap_err();
        match &err {
            BridgeError::Cleanup(causes) => assert_eq!(causes.len(), 2),
            other => panic!("expected aggregated cleanup error, got {other:?}"),
        }
        assert!(!logger.is_initialized().await);
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_from_settings_seeds_state() {
        let mut settings = LoggerSettings {
            default_level: "warn".to_string(),
            components: vec!["agent".to_string()],
            ..LoggerSettings::default()
        };
        settings
            .attributes
            .insert("service".to_string(), serde_json::json!("spellbridge"));

        let sink = Arc::new(MemorySink::new());
        let logger = ScriptLoggerBridge::from_settings(&settings, sink.clone()).unwrap();
        let ctx = ExecutionContext::new();
        logger.initialize(&ctx).await.unwrap();

        logger.execute_method(&ctx, "info", &["dropped".into()]).await.unwrap();
        logger.execute_method(&ctx, "warn", &["kept".into()]).await.unwrap();
        let records = slog_records(&sink);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attributes["service"], DynamicValue::from("spellbridge"));

        let enabled = logger.execute_method(&ctx, "listEnabledComponents", &[]).await.unwrap();
        assert_eq!(enabled, DynamicValue::array([DynamicValue::from("agent")]));

        settings.format = "xml".to_string();
        let err = ScriptLoggerBridge::from_settings(&settings, sink).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_initialize_during_cleanup_restarts_parts() {
        let sink = Arc::new(MemorySink::new());
        let logger = Arc::new(ScriptLoggerBridge::from_parts(
            Box::new(DebugBridge::with_sink(sink.clone())),
            Box::new(SlowStop(StructuredBridge::with_sink(sink.clone()))),
            LoggerConfig::default(),
        ));
        let ctx = ExecutionContext::new();
        logger.initialize(&ctx).await.unwrap();

        let cleanup = {
            let logger = Arc::clone(&logger);
            tokio::spawn(async move { logger.cleanup(&ExecutionContext::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        logger.initialize(&ctx).await.unwrap();
        cleanup.await.unwrap().unwrap();

        assert!(logger.is_initialized().await);
        logger
            .execute_method(&ctx, "info", &["after restart".into()])
            .await
            .unwrap();
        assert_eq!(slog_records(&sink).last().unwrap().message, "after restart");
    }

    #[tokio::test]
    async fn test_components_enabled_by_debug_part_are_tracked() {
        let sink = Arc::new(MemorySink::new());
        let logger = ScriptLoggerBridge::from_parts(
            Box::new(DebugBridge::with_sink(sink.clone()).with_components(["planner"])),
            Box::new(StructuredBridge::with_sink(sink.clone())),
            LoggerConfig {
                components: vec!["tools".to_string()],
                ..LoggerConfig::default()
            },
        );
        let ctx = ExecutionContext::new();
        logger.initialize(&ctx).await.unwrap();

        let config = logger
            .execute_method(&ctx, "getConfiguration", &[])
            .await
            .unwrap();
        assert_eq!(
            config.as_object().unwrap()["components"],
            DynamicValue::array([DynamicValue::from("planner"), DynamicValue::from("tools")])
        );

        logger
            .execute_method(&ctx, "log", &["info".into(), "planner".into(), "step".into()])
            .await
            .unwrap();
        let debug_records = sink.records_from(DEBUG_BRIDGE_ID);
        assert_eq!(debug_records.len(), 1);
        assert_eq!(debug_records[0].message, "[INFO] step");
    }

    #[tokio::test]
    async fn test_log_with_context_accepts_logger_handle() {
        let (logger, sink) = started().await;
        let ctx = ExecutionContext::new();

        let scoped = logger
            .execute_method(
                &ctx,
                "withContext",
                &[DynamicValue::object([("user", DynamicValue::from("ada"))])],
            )
            .await
            .unwrap();
        let handle = scoped.as_object().unwrap()["logger"].clone();
        logger
            .execute_method(&ctx, "logWithContext", &["warn".into(), "scoped".into(), handle])
            .await
            .unwrap();

        let record = &slog_records(&sink)[0];
        assert_eq!(record.level, LogLevel::Warn);
        assert_eq!(record.attributes["user"], DynamicValue::from("ada"));

        for bad in [
            DynamicValue::custom("stream", 1u8),
            DynamicValue::custom(LOGGER_TYPE, 1u8),
            DynamicValue::from(5),
        ] {
            let err = logger
                .execute_method(&ctx, "logWithContext", &["warn".into(), "x".into(), bad])
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        }
    }
}
