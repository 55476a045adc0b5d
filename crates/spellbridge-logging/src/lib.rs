//! # spellbridge-logging
//!
//! Logging bridges for the spellbridge runtime:
//!
//! - [`DebugBridge`] (`debug`): component-gated debug output
//! - [`StructuredBridge`] (`slog`): leveled structured records plus LLM and
//!   tool call hooks
//! - [`ScriptLoggerBridge`] (`script_logger`): a unified façade owning the
//!   two above, with global context attributes and a polymorphic `log`
//!
//! Records are written through a [`LogSink`]. The default sink forwards to
//! `tracing`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use spellbridge_logging::ScriptLoggerBridge;
//! use spellbridge_runtime::{BridgeRegistry, DynamicValue, ExecutionContext};
//!
//! # async fn example() -> spellbridge_runtime::BridgeResult<()> {
//! let registry = BridgeRegistry::new();
//! registry.register(ScriptLoggerBridge::new()).await?;
//!
//! let ctx = ExecutionContext::new();
//! registry.initialize_all(&ctx).await?;
//! registry
//!     .dispatch(&ctx, "script_logger", "log", &["info".into(), "started".into()])
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod debug;
pub mod format;
pub mod script_logger;
pub mod sink;
pub mod structured;

pub use debug::{DebugBridge, DEBUG_BRIDGE_ID, DEBUG_ENV_VAR};
pub use format::{fill_template, sprintf};
pub use script_logger::{LoggerConfig, ScriptLoggerBridge, SCRIPT_LOGGER_ID};
pub use sink::{LogFormat, LogLevel, LogRecord, LogSink, MemorySink, TracingSink};
pub use structured::{ContextLogger, DetailLevel, StructuredBridge, LOGGER_TYPE, SLOG_BRIDGE_ID};
