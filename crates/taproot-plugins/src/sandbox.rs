//! WASM sandbox execution via wasmtime
//!
//! Community plugin modules run here: fuel-metered, memory-capped, and
//! wall-clock bounded. No host functions are exposed - a module gets no
//! ambient authority, and its only path to the database is the SDK the
//! shell holds on its behalf.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};
use wasmtime::{
    Config, Engine, Instance, Module, Store, StoreLimits, StoreLimitsBuilder, WasmBacktraceDetails,
};

use crate::{PluginError, PluginResult};

/// Export every plugin module must provide
pub const ACTIVATE_EXPORT: &str = "activate";

#[derive(Debug)]
pub struct Sandbox {
    engine: Engine,
    fuel_limit: u64,
    memory_limit_bytes: usize,
    table_elements_limit: usize,
    instance_limit: usize,
    execution_timeout: Duration,
}

impl Sandbox {
    pub fn new() -> PluginResult<Self> {
        let mut config = Config::new();
        config.consume_fuel(true);
        config.wasm_threads(false);
        config.wasm_simd(false);
        config.wasm_relaxed_simd(false);
        config.wasm_reference_types(false);
        config.async_support(false);
        config.epoch_interruption(true);
        config.wasm_backtrace_details(WasmBacktraceDetails::Disable);

        let engine = Engine::new(&config).map_err(|e| {
            PluginError::WasmError(format!("Failed to initialize wasmtime engine: {e}"))
        })?;

        Ok(Self {
            engine,
            fuel_limit: 10_000_000,
            memory_limit_bytes: 16 * 1024 * 1024,
            table_elements_limit: 1_024,
            instance_limit: 16,
            execution_timeout: Duration::from_secs(5),
        })
    }

    /// Override the per-invocation wall-clock limit
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Compile-check a module and return its export names.
    ///
    /// Modules may not declare imports; there are no permitted host
    /// functions to satisfy them.
    pub fn validate_module(&self, wasm: &[u8]) -> PluginResult<Vec<String>> {
        Module::validate(&self.engine, wasm)
            .map_err(|e| PluginError::WasmError(format!("Module validation failed: {e}")))?;

        let module = Module::new(&self.engine, wasm)
            .map_err(|e| PluginError::WasmError(format!("Invalid module: {e}")))?;

        if module.imports().next().is_some() {
            return Err(PluginError::ValidationFailed(
                "Imports are not allowed unless explicitly exposed via permitted host functions"
                    .to_string(),
            ));
        }

        Ok(module.exports().map(|e| e.name().to_string()).collect())
    }

    /// Instantiate a module and invoke a nullary export, bounded by
    /// fuel, store limits, and a wall-clock watchdog.
    pub fn execute_export(&self, wasm: &[u8], export: &str) -> PluginResult<()> {
        let module = Module::new(&self.engine, wasm)
            .map_err(|e| PluginError::WasmError(format!("Invalid module: {e}")))?;

        if module.imports().next().is_some() {
            return Err(PluginError::ValidationFailed(
                "Imports are not allowed unless explicitly exposed via permitted host functions"
                    .to_string(),
            ));
        }

        let mut store = Store::new(
            &self.engine,
            SandboxLimits {
                limits: StoreLimitsBuilder::new()
                    .memory_size(self.memory_limit_bytes)
                    .table_elements(self.table_elements_limit)
                    .instances(self.instance_limit)
                    .trap_on_grow_failure(true)
                    .build(),
            },
        );

        store.limiter(|state| &mut state.limits);

        // Enforce wall-clock timeout using epoch interruption
        store.set_epoch_deadline(1);

        store
            .set_fuel(self.fuel_limit)
            .map_err(|e| PluginError::WasmError(format!("Failed to add fuel: {e}")))?;

        let deadline_triggered = Arc::new(AtomicBool::new(false));
        let deadline_flag = deadline_triggered.clone();
        let engine = self.engine.clone();
        let timeout = self.execution_timeout;

        let watchdog = thread::spawn(move || {
            thread::sleep(timeout);
            if !deadline_flag.load(Ordering::Relaxed) {
                engine.increment_epoch();
            }
        });

        let call_result = Instance::new(&mut store, &module, &[])
            .map_err(|e| PluginError::WasmError(format!("Instantiation failed: {e}")))
            .and_then(|instance| {
                let func = instance
                    .get_typed_func::<(), ()>(&mut store, export)
                    .map_err(|e| {
                        PluginError::WasmError(format!("Missing export '{export}': {e}"))
                    })?;
                func.call(&mut store, ())
                    .map_err(|e| PluginError::WasmError(format!("Export '{export}' trapped: {e}")))
            });

        deadline_triggered.store(true, Ordering::Relaxed);
        let _ = watchdog.join();

        call_result
    }
}

struct SandboxLimits {
    limits: StoreLimits,
}
