//! Bridge registry and method dispatcher.
//!
//! The registry owns every registered bridge, records its permission
//! declarations and catalog at registration time, drives lifecycle
//! transitions in dependency order, and routes script calls to handlers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::context::ExecutionContext;
use crate::error::{BridgeError, BridgeResult};
use crate::metadata::{BridgeMetadata, MethodInfo};
use crate::permission::{AllowAll, Permission, PermissionPolicy};
use crate::value::DynamicValue;

/// Lifecycle and call statistics for one bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BridgeMetrics {
    pub initialization_count: u64,
    pub failure_count: u64,
    pub last_initialized: Option<DateTime<Utc>>,
    pub last_initialization_ms: Option<u64>,
    pub last_error: Option<String>,
    pub call_count: u64,
    pub call_failures: u64,
}

/// Summary of a registered bridge.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub initialized: bool,
    pub method_count: usize,
    pub permission_count: usize,
    pub dependencies: Vec<String>,
    pub metrics: BridgeMetrics,
}

struct RegisteredBridge {
    bridge: Arc<dyn Bridge>,
    metadata: BridgeMetadata,
    permissions: Arc<[Permission]>,
    methods: Arc<[MethodInfo]>,
    metrics: Mutex<BridgeMetrics>,
}

impl RegisteredBridge {
    fn record(&self, update: impl FnOnce(&mut BridgeMetrics)) {
        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut metrics);
    }

    fn metrics(&self) -> BridgeMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Registry of bridges keyed by id.
pub struct BridgeRegistry {
    bridges: RwLock<HashMap<String, Arc<RegisteredBridge>>>,
    policy: Arc<dyn PermissionPolicy>,
}

impl BridgeRegistry {
    /// Create an empty registry that admits every bridge.
    pub fn new() -> Self {
        Self::with_policy(AllowAll)
    }

    /// Create an empty registry gated by `policy`.
    pub fn with_policy(policy: impl PermissionPolicy + 'static) -> Self {
        Self {
            bridges: RwLock::new(HashMap::new()),
            policy: Arc::new(policy),
        }
    }

    /// Register a bridge.
    pub async fn register<B: Bridge + 'static>(&self, bridge: B) -> BridgeResult<()> {
        self.register_shared(Arc::new(bridge)).await
    }

    /// Register a bridge that is also held elsewhere.
    ///
    /// Fails if the id is empty or taken, if a catalog method has no
    /// handler, or if the permission policy refuses the bridge.
    pub async fn register_shared(&self, bridge: Arc<dyn Bridge>) -> BridgeResult<()> {
        let id = bridge.id().to_string();
        if id.is_empty() {
            return Err(BridgeError::InvalidConfig(
                "bridge id cannot be empty".to_string(),
            ));
        }

        let methods: Arc<[MethodInfo]> = bridge.methods().into();
        if let Some(unwired) = methods.iter().find(|m| !bridge.handles(&m.name)) {
            return Err(BridgeError::UnwiredMethod {
                bridge: id,
                method: unwired.name.clone(),
            });
        }

        let permissions: Arc<[Permission]> = bridge.required_permissions().into();
        self.policy
            .evaluate(&id, &permissions)
            .map_err(|reason| BridgeError::PermissionDenied {
                bridge: id.clone(),
                reason,
            })?;

        let metadata = bridge.metadata();
        let mut bridges = self.bridges.write().await;
        if bridges.contains_key(&id) {
            return Err(BridgeError::AlreadyRegistered(id));
        }

        info!(
            "Registered bridge: {} v{} ({} methods, {} permissions)",
            id,
            metadata.version,
            methods.len(),
            permissions.len()
        );

        bridges.insert(
            id,
            Arc::new(RegisteredBridge {
                bridge,
                metadata,
                permissions,
                methods,
                metrics: Mutex::new(BridgeMetrics::default()),
            }),
        );
        Ok(())
    }

    /// Remove a bridge and hand it back to the caller.
    ///
    /// The bridge is not cleaned up; the caller owns its resources.
    pub async fn unregister(&self, id: &str) -> BridgeResult<Arc<dyn Bridge>> {
        let entry = self
            .bridges
            .write()
            .await
            .remove(id)
            .ok_or_else(|| BridgeError::BridgeNotFound(id.to_string()))?;
        info!("Unregistered bridge: {}", id);
        Ok(Arc::clone(&entry.bridge))
    }

    async fn entry(&self, id: &str) -> BridgeResult<Arc<RegisteredBridge>> {
        self.bridges
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BridgeError::BridgeNotFound(id.to_string()))
    }

    pub async fn get(&self, id: &str) -> BridgeResult<Arc<dyn Bridge>> {
        Ok(Arc::clone(&self.entry(id).await?.bridge))
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.bridges.read().await.contains_key(id)
    }

    /// Registered bridge ids, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.bridges.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.bridges.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bridges.read().await.is_empty()
    }

    pub async fn metadata(&self, id: &str) -> BridgeResult<BridgeMetadata> {
        Ok(self.entry(id).await?.metadata.clone())
    }

    /// Permission declarations recorded at registration.
    pub async fn permissions(&self, id: &str) -> BridgeResult<Arc<[Permission]>> {
        Ok(Arc::clone(&self.entry(id).await?.permissions))
    }

    /// Method catalog recorded at registration.
    pub async fn methods(&self, id: &str) -> BridgeResult<Arc<[MethodInfo]>> {
        Ok(Arc::clone(&self.entry(id).await?.methods))
    }

    pub async fn metrics(&self, id: &str) -> BridgeResult<BridgeMetrics> {
        Ok(self.entry(id).await?.metrics())
    }

    /// Call `method` on bridge `bridge_id`.
    ///
    /// Contract checks run in order: the bridge must be registered, then
    /// initialized, then handle the method. Handler results and errors are
    /// returned unchanged.
    pub async fn dispatch(
        &self,
        ctx: &ExecutionContext,
        bridge_id: &str,
        method: &str,
        args: &[DynamicValue],
    ) -> BridgeResult<DynamicValue> {
        let entry = self.entry(bridge_id).await?;
        if !entry.bridge.is_initialized().await {
            return Err(BridgeError::NotInitialized(bridge_id.to_string()));
        }
        if !entry.bridge.handles(method) {
            return Err(BridgeError::method_not_found(bridge_id, method));
        }
        ctx.check_cancelled()?;

        debug!(bridge = %bridge_id, method = %method, args = args.len(), "Dispatching call");
        let result = entry.bridge.execute_method(ctx, method, args).await;
        entry.record(|m| {
            m.call_count += 1;
            if result.is_err() {
                m.call_failures += 1;
            }
        });
        result
    }

    /// Initialize one bridge, without touching its dependencies.
    pub async fn initialize_bridge(&self, ctx: &ExecutionContext, id: &str) -> BridgeResult<()> {
        let entry = self.entry(id).await?;
        if entry.bridge.is_initialized().await {
            return Ok(());
        }

        let started = Instant::now();
        match entry.bridge.initialize(ctx).await {
            Ok(()) => {
                let elapsed = started.elapsed().as_millis() as u64;
                entry.record(|m| {
                    m.initialization_count += 1;
                    m.last_initialized = Some(Utc::now());
                    m.last_initialization_ms = Some(elapsed);
                });
                info!("Initialized bridge: {} in {}ms", id, elapsed);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to initialize bridge {}: {}", id, e);
                entry.record(|m| {
                    m.failure_count += 1;
                    m.last_error = Some(e.to_string());
                });
                Err(BridgeError::InitializationFailed {
                    bridge: id.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Initialize a bridge after everything it depends on.
    pub async fn initialize_with_dependencies(
        &self,
        ctx: &ExecutionContext,
        id: &str,
    ) -> BridgeResult<()> {
        for bridge_id in self.dependency_order(&[id.to_string()]).await? {
            self.initialize_bridge(ctx, &bridge_id).await?;
        }
        Ok(())
    }

    /// Initialize every registered bridge in dependency order.
    ///
    /// Stops at the first failure.
    pub async fn initialize_all(&self, ctx: &ExecutionContext) -> BridgeResult<()> {
        let ids = self.list().await;
        for bridge_id in self.dependency_order(&ids).await? {
            self.initialize_bridge(ctx, &bridge_id).await?;
        }
        Ok(())
    }

    pub async fn cleanup_bridge(&self, ctx: &ExecutionContext, id: &str) -> BridgeResult<()> {
        let entry = self.entry(id).await?;
        entry.bridge.cleanup(ctx).await.map_err(|e| {
            warn!("Cleanup of bridge {} failed: {}", id, e);
            entry.record(|m| m.last_error = Some(e.to_string()));
            e
        })?;
        info!("Cleaned up bridge: {}", id);
        Ok(())
    }

    /// Clean up every bridge, dependents first.
    ///
    /// Every bridge is cleaned up even when some fail; failures are
    /// returned together as [`BridgeError::Cleanup`].
    pub async fn cleanup_all(&self, ctx: &ExecutionContext) -> BridgeResult<()> {
        let ids = self.list().await;
        let order = match self.dependency_order(&ids).await {
            Ok(order) => order,
            Err(e) => {
                warn!("Dependency order unavailable for cleanup: {}", e);
                ids
            }
        };

        let mut failures = Vec::new();
        for bridge_id in order.iter().rev() {
            if let Err(e) = self.cleanup_bridge(ctx, bridge_id).await {
                failures.push(e);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::Cleanup(failures))
        }
    }

    /// Clean up and re-initialize a bridge.
    pub async fn reload_bridge(&self, ctx: &ExecutionContext, id: &str) -> BridgeResult<()> {
        self.cleanup_bridge(ctx, id).await?;
        self.initialize_bridge(ctx, id).await?;
        info!("Reloaded bridge: {}", id);
        Ok(())
    }

    /// Summaries of every registered bridge, sorted by id.
    pub async fn report(&self) -> Vec<BridgeInfo> {
        let entries: Vec<(String, Arc<RegisteredBridge>)> = self
            .bridges
            .read()
            .await
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect();

        let mut report = Vec::with_capacity(entries.len());
        for (id, entry) in entries {
            report.push(BridgeInfo {
                id,
                name: entry.metadata.name.clone(),
                version: entry.metadata.version.clone(),
                initialized: entry.bridge.is_initialized().await,
                method_count: entry.methods.len(),
                permission_count: entry.permissions.len(),
                dependencies: entry.metadata.dependencies.clone(),
                metrics: entry.metrics(),
            });
        }
        report.sort_by(|a, b| a.id.cmp(&b.id));
        report
    }

    /// Topological order of `roots` and everything they depend on.
    async fn dependency_order(&self, roots: &[String]) -> BridgeResult<Vec<String>> {
        let graph: HashMap<String, Vec<String>> = self
            .bridges
            .read()
            .await
            .iter()
            .map(|(id, entry)| (id.clone(), entry.metadata.dependencies.clone()))
            .collect();

        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for root in roots {
            visit(root, &graph, &mut visiting, &mut visited, &mut order)?;
        }
        Ok(order)
    }
}

fn visit(
    id: &str,
    graph: &HashMap<String, Vec<String>>,
    visiting: &mut HashSet<String>,
    visited: &mut HashSet<String>,
    order: &mut Vec<String>,
) -> BridgeResult<()> {
    if visited.contains(id) {
        return Ok(());
    }
    if !visiting.insert(id.to_string()) {
        return Err(BridgeError::DependencyCycle(id.to_string()));
    }

    let dependencies = graph
        .get(id)
        .ok_or_else(|| BridgeError::BridgeNotFound(id.to_string()))?;
    for dependency in dependencies {
        if !graph.contains_key(dependency) {
            return Err(BridgeError::MissingDependency {
                bridge: id.to_string(),
                dependency: dependency.clone(),
            });
        }
        visit(dependency, graph, visiting, visited, order)?;
    }

    visiting.remove(id);
    visited.insert(id.to_string());
    order.push(id.to_string());
    Ok(())
}

impl Default for BridgeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
