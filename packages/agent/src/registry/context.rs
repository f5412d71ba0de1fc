// packages/agent/src/registry/context.rs
//! Diagnostic context
//!
//! Owns the redirection table, the capture stores, the interceptors and the
//! feature registry. The process-wide agent is one context built on the
//! global table; tests build isolated contexts on fresh tables.

use crate::capture::{CaptureStores, Coordinate, StreamTag, UiEvent};
use crate::inspection::{
    Inspector, MemoryNamespaceProvider, NamespaceProvider, NamespaceRegistry,
};
use crate::interception::console::{self, ConsoleInterceptor, ConsoleWriter};
use crate::interception::fault::{FaultInterceptor, FaultRecorder};
use crate::interception::fault_slot::FaultSlot;
use crate::interception::interaction::{InteractionInterceptor, DISPATCH_ENTRY_POINT};
use crate::interception::lifecycle::{
    LifecycleHooks, LifecycleInterceptor, ObjectId, TrackedRef, WatchHandle, CREATED_ENTRY_POINT,
    DISPOSED_ENTRY_POINT,
};
use crate::interception::location::{LocationInterceptor, LocationToolkit, CURRENT_LOCATION};
use crate::interception::network::{
    HyperTransport, NetworkClient, NetworkInterceptor, NetworkRequest, SEND_ENTRY_POINT,
};
use crate::interception::Interceptor;
use crate::redirect::RedirectionTable;
use crate::registry::features::{
    AgentOption, FeatureConfig, FeatureId, FeatureRegistry, InterceptorId, InterceptorStatus,
};
use crate::utils::config::AgentConfig;
use crate::utils::errors::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Process-scoped owner of every agent component
pub struct DiagnosticContext {
    config: AgentConfig,
    table: Arc<RedirectionTable>,
    stores: CaptureStores,
    namespaces: Arc<NamespaceRegistry>,
    registry: FeatureRegistry,
    network: NetworkInterceptor,
    lifecycle: LifecycleInterceptor,
    location: LocationInterceptor,
    fault: FaultInterceptor,
    console: ConsoleInterceptor,
    interaction: InteractionInterceptor,

    /// Periodic leak checks, stopped when the context drops
    leak_watch: Mutex<Option<WatchHandle>>,
}

impl DiagnosticContext {
    /// Isolated context on a fresh table with in-memory namespaces
    pub fn new(config: AgentConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(RedirectionTable::new()),
            Arc::new(MemoryNamespaceProvider::new()),
        )
    }

    /// Context on a given table and namespace provider.
    ///
    /// Built-in originals are registered for the console, network,
    /// lifecycle and UI entry points unless the host registered them first.
    pub fn with_parts(
        config: AgentConfig,
        table: Arc<RedirectionTable>,
        provider: Arc<dyn NamespaceProvider>,
    ) -> Self {
        register_builtin_entry_points(&table);

        let stores = CaptureStores::from_config(&config);
        let namespaces = Arc::new(NamespaceRegistry::new(Arc::clone(&provider)));

        let network =
            NetworkInterceptor::new(Arc::clone(&stores.network), config.network.max_body_snapshot);
        let lifecycle = LifecycleInterceptor::new(Arc::clone(&stores.lifecycle), config.leak.clone());
        let location = LocationInterceptor::new(
            LocationToolkit::new(provider.standard()),
            Arc::clone(&stores.location),
        );
        let fault = FaultInterceptor::new(
            Arc::new(
                FaultRecorder::new(
                    Arc::clone(&stores.fault),
                    FaultSlot::new(config.fault.slot_path.clone()),
                )
                .with_survival_grace(config.fault.survival_grace()),
            ),
            config.fault.capture_signals,
        );
        let console = ConsoleInterceptor::new(Arc::clone(&stores.console), config.console.capture_fds);
        let interaction = InteractionInterceptor::new(Arc::clone(&stores.interaction));

        Self {
            config,
            table,
            stores,
            namespaces,
            registry: FeatureRegistry::new(),
            network,
            lifecycle,
            location,
            fault,
            console,
            interaction,
            leak_watch: Mutex::new(None),
        }
    }

    fn interceptor(&self, id: InterceptorId) -> &dyn Interceptor {
        match id {
            InterceptorId::Network => &self.network,
            InterceptorId::Location => &self.location,
            InterceptorId::Views => &self.interaction,
            InterceptorId::Fault => &self.fault,
            InterceptorId::Leaks => &self.lifecycle,
            InterceptorId::Console => &self.console,
        }
    }

    /// Configure the registry and enable every interceptor not disabled.
    ///
    /// Only misuse is returned as an error. An interceptor that cannot be
    /// enabled is marked inactive and the others carry on.
    pub fn setup(
        &self,
        hide_features: impl IntoIterator<Item = FeatureId>,
        disable_interceptors: impl IntoIterator<Item = InterceptorId>,
        options: Vec<AgentOption>,
    ) -> Result<()> {
        let config = self.registry.configure(FeatureConfig::new(
            hide_features,
            disable_interceptors,
            options,
        ))?;

        self.namespaces.configure(config.namespace_names());

        for id in InterceptorId::ALL {
            if config.disabled_interceptors.contains(&id) {
                debug!("Interceptor {} disabled at setup", id);
                self.registry.set_status(id, InterceptorStatus::Disabled);
                continue;
            }

            let status = match self.interceptor(id).enable(&self.table) {
                Ok(_) => InterceptorStatus::Active,
                Err(e) => {
                    warn!("Interceptor {} inactive: {}", id, e);
                    InterceptorStatus::Inactive {
                        reason: e.to_string(),
                    }
                }
            };
            self.registry.set_status(id, status);
        }

        if self.registry.status(InterceptorId::Fault).is_active() {
            match self.fault.recover_pending() {
                Ok(Some(report)) => info!("Surfaced pending fault report #{}", report.id),
                Ok(None) => {}
                Err(e) => warn!("Could not recover pending fault report: {}", e),
            }
        }

        if self.registry.status(InterceptorId::Leaks).is_active() {
            match self
                .lifecycle
                .start_watch(self.config.leak.check_interval())
            {
                Ok(handle) => *self.leak_watch.lock() = Some(handle),
                Err(e) => warn!("Leak checks only run on demand: {}", e),
            }
        }

        info!(
            "Diagnostic agent ready in {:?}",
            self.registry.startup_duration().unwrap_or_default()
        );
        Ok(())
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn table(&self) -> &Arc<RedirectionTable> {
        &self.table
    }

    pub fn stores(&self) -> &CaptureStores {
        &self.stores
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn namespaces(&self) -> &Arc<NamespaceRegistry> {
        &self.namespaces
    }

    pub fn inspector(&self) -> Inspector {
        Inspector::new(self.stores.clone(), Arc::clone(&self.namespaces))
    }

    pub fn network(&self) -> &NetworkInterceptor {
        &self.network
    }

    pub fn lifecycle(&self) -> &LifecycleInterceptor {
        &self.lifecycle
    }

    pub fn fault(&self) -> &FaultInterceptor {
        &self.fault
    }

    pub fn console(&self) -> &ConsoleInterceptor {
        &self.console
    }

    pub fn location(&self) -> &LocationToolkit {
        self.location.toolkit()
    }

    // Host-side handles

    pub fn network_client(&self) -> NetworkClient {
        NetworkClient::new(Arc::clone(&self.table))
    }

    pub fn lifecycle_hooks(&self) -> LifecycleHooks {
        LifecycleHooks::new(Arc::clone(&self.table))
    }

    pub fn console_writer(&self, stream: StreamTag) -> ConsoleWriter {
        ConsoleWriter::new(Arc::clone(&self.table), stream)
    }

    /// Query the current location through the entry point
    pub fn current_location(&self) -> Result<Option<Coordinate>> {
        self.table
            .call::<(), Option<Coordinate>>(CURRENT_LOCATION, ())
    }

    /// Dispatch a UI event through the entry point
    pub fn dispatch_ui(&self, event: UiEvent) -> Result<()> {
        self.table.call::<UiEvent, ()>(DISPATCH_ENTRY_POINT, event)
    }
}

// Location has no portable original; hosts register their own provider
fn register_builtin_entry_points(table: &RedirectionTable) {
    let transport = HyperTransport::new();
    let results = [
        table
            .register(console::STDOUT_ENTRY_POINT, |bytes: Bytes| {
                let mut out = std::io::stdout().lock();
                let _ = out.write_all(&bytes);
                let _ = out.flush();
            })
            .map(|_| ()),
        table
            .register(console::STDERR_ENTRY_POINT, |bytes: Bytes| {
                let mut err = std::io::stderr().lock();
                let _ = err.write_all(&bytes);
            })
            .map(|_| ()),
        table
            .register(SEND_ENTRY_POINT, move |request: NetworkRequest| {
                transport.send(request)
            })
            .map(|_| ()),
        table
            .register(CREATED_ENTRY_POINT, |_: TrackedRef| ())
            .map(|_| ()),
        table
            .register(DISPOSED_ENTRY_POINT, |_: ObjectId| ())
            .map(|_| ()),
        table
            .register(DISPATCH_ENTRY_POINT, |_: UiEvent| ())
            .map(|_| ()),
    ];

    for result in results {
        if let Err(e) = result {
            warn!("Built-in entry point not registered: {}", e);
        }
    }
}
