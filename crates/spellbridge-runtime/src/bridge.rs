//! The bridge contract and its lifecycle state.
//!
//! A bridge is a named, versioned unit of host functionality exposed to
//! scripts. It starts out uninitialized, acquires its resources in
//! [`Bridge::initialize`], serves method calls while initialized, and
//! releases everything in [`Bridge::cleanup`].
//!
//! [`LifecycleCell`] holds the state a bridge owns while initialized. The
//! state exists only between a successful initialize and the next cleanup,
//! so a handler can never observe a half-built or already-released bridge.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::{RwLock, RwLockMappedWriteGuard, RwLockReadGuard, RwLockWriteGuard};

use crate::context::ExecutionContext;
use crate::error::{BridgeError, BridgeResult};
use crate::metadata::{validate_against_catalog, BridgeMetadata, MethodInfo, TypeMapping};
use crate::permission::Permission;
use crate::value::DynamicValue;

/// Host functionality exposed to scripts under a unique id.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Unique, stable identifier.
    fn id(&self) -> &str;

    /// Descriptive metadata, including dependencies on other bridges.
    fn metadata(&self) -> BridgeMetadata;

    /// Acquire resources. Idempotent: a second call on an initialized bridge
    /// succeeds without doing anything. On failure the bridge stays
    /// uninitialized.
    async fn initialize(&self, ctx: &ExecutionContext) -> BridgeResult<()>;

    /// Release resources. The bridge is uninitialized afterwards even when
    /// releasing fails.
    async fn cleanup(&self, ctx: &ExecutionContext) -> BridgeResult<()>;

    async fn is_initialized(&self) -> bool;

    /// The method catalog. Fixed for the lifetime of the bridge.
    fn methods(&self) -> Vec<MethodInfo>;

    /// Returns true if `method` has a handler.
    fn handles(&self, method: &str) -> bool;

    /// Host types this bridge hands to scripts, keyed by script type name.
    fn type_mappings(&self) -> HashMap<String, TypeMapping> {
        HashMap::new()
    }

    /// Check a call against the catalog without executing it.
    fn validate_method(&self, name: &str, args: &[DynamicValue]) -> BridgeResult<()> {
        validate_against_catalog(self.id(), &self.methods(), name, args)
    }

    /// Permissions the bridge needs. Fixed for the lifetime of the bridge.
    fn required_permissions(&self) -> Vec<Permission>;

    /// Execute a catalog method.
    async fn execute_method(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        args: &[DynamicValue],
    ) -> BridgeResult<DynamicValue>;
}

/// Lifecycle state of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
}

/// Holds the state a bridge owns while it is initialized.
///
/// Readers share the state; writers get exclusive access. Both fail with
/// [`BridgeError::NotInitialized`] when the bridge is uninitialized.
#[derive(Debug)]
pub struct LifecycleCell<S> {
    slot: RwLock<Option<S>>,
}

impl<S> Default for LifecycleCell<S> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }
}

impl<S: Send + Sync> LifecycleCell<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the state with `init` unless already initialized.
    ///
    /// The cell stays locked while `init` runs, so callers never observe a
    /// partially initialized bridge. If `init` fails nothing is stored.
    pub async fn initialize_with<F, Fut>(&self, init: F) -> BridgeResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BridgeResult<S>>,
    {
        let mut slot = self.slot.write().await;
        if slot.is_some() {
            return Ok(());
        }
        *slot = Some(init().await?);
        Ok(())
    }

    /// Take the state out and hand it to `release`.
    ///
    /// The cell stays locked until `release` finishes, so an initialize
    /// racing a cleanup runs after it. The cell is uninitialized afterwards
    /// whatever `release` returns. Cleaning up an uninitialized cell is a
    /// no-op.
    pub async fn cleanup_with<F, Fut>(&self, release: F) -> BridgeResult<()>
    where
        F: FnOnce(S) -> Fut,
        Fut: Future<Output = BridgeResult<()>>,
    {
        let mut slot = self.slot.write().await;
        match slot.take() {
            Some(state) => release(state).await,
            None => Ok(()),
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.slot.read().await.is_some()
    }

    pub async fn state(&self) -> LifecycleState {
        if self.is_initialized().await {
            LifecycleState::Initialized
        } else {
            LifecycleState::Uninitialized
        }
    }

    /// Shared access to the state.
    pub async fn read(&self, bridge_id: &str) -> BridgeResult<RwLockReadGuard<'_, S>> {
        let guard = self.slot.read().await;
        RwLockReadGuard::try_map(guard, Option::as_ref)
            .map_err(|_| BridgeError::NotInitialized(bridge_id.to_string()))
    }

    /// Exclusive access to the state.
    pub async fn write(&self, bridge_id: &str) -> BridgeResult<RwLockMappedWriteGuard<'_, S>> {
        let guard = self.slot.write().await;
        RwLockWriteGuard::try_map(guard, Option::as_mut)
            .map_err(|_| BridgeError::NotInitialized(bridge_id.to_string()))
    }
}
