//! # spellbridge-runtime
//!
//! Capability-gated dispatch runtime that lets embedded scripts call
//! host-implemented operations ("bridges").
//!
//! This crate provides:
//! - [`DynamicValue`], the only value shape crossing the script/host boundary
//! - The [`Bridge`] contract and [`LifecycleCell`] lifecycle state
//! - Method catalogs ([`MethodInfo`]) and handler tables ([`MethodTable`])
//! - Permission declarations and registration policies
//! - [`CallShape`], the resolver for methods accepting several call shapes
//! - [`BridgeRegistry`], which registers bridges and dispatches calls
//!
//! ## Dispatch
//!
//! A call names a bridge, a method and an argument list. The registry
//! checks, in order, that the bridge is registered, initialized and handles
//! the method, then forwards the arguments to the handler and returns its
//! result or error unchanged.
//!
//! ## Security Model
//!
//! Bridges declare the permissions they need. The registry passes the
//! declarations to its [`PermissionPolicy`] at registration and keeps them
//! read-only afterwards.

pub mod attrs;
pub mod bridge;
pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod metadata;
pub mod method;
pub mod permission;
pub mod registry;
pub mod shape;
pub mod value;

pub use attrs::{merge_attributes, Attributes};
pub use bridge::{Bridge, LifecycleCell, LifecycleState};
pub use config::{LoggerSettings, RuntimeConfig};
pub use context::ExecutionContext;
pub use convert::{expect_custom, expect_type, Args, FromDynamic, IntoDynamic};
pub use error::{BridgeError, BridgeResult, ErrorKind};
pub use metadata::{
    validate_against_catalog, BridgeMetadata, DeclaredType, MethodInfo, ParameterInfo,
    TypeMapping,
};
pub use method::{MethodTable, Route};
pub use permission::{
    AllowAll, Permission, PermissionPolicy, PermissionSet, PermissionType, PolicyConfig,
    StaticPolicy,
};
pub use registry::{BridgeInfo, BridgeMetrics, BridgeRegistry};
pub use shape::{CallShape, ResolvedArgs};
pub use value::{CustomHandle, DynamicValue, ValueKind};
