//! Opcode optimization processor
//!
//! Owns the feature gate, the optimized code cache, the constant memo table
//! and the background worker pool, and exposes the API used by the
//! interpreter and the state layer:
//!
//! | Operation | Blocking | Behavior when disabled |
//! |-----------|----------|------------------------|
//! | [`load`](OpcodeProcessor::load) | no | `None` |
//! | [`request_optimize`](OpcodeProcessor::request_optimize) | only on a full queue | task becomes a no-op |
//! | [`invalidate`](OpcodeProcessor::invalidate) | only on a full queue | task becomes a no-op |
//! | [`rewrite_for_storage`](OpcodeProcessor::rewrite_for_storage) | only on a full queue | nothing queued |
//! | [`compile_sync`](OpcodeProcessor::compile_sync) | compiles inline | `Err(Disabled)` |
//! | [`get_or_compile`](OpcodeProcessor::get_or_compile) | compiles inline on miss | `Err(Disabled)` |
//! | [`shl_and_sub_value`](OpcodeProcessor::shl_and_sub_value) | no | `None` |
//!
//! The gate is read when an operation actually runs. A task queued while
//! enabled and dequeued after [`disable`](OpcodeProcessor::disable) does
//! nothing, so the optimizer can be toggled without draining the queue.
//!
//! Queued tasks are routed to a worker by their [`CodeIdentity`], so a
//! generate and a flush for the same identity are applied in the order they
//! were submitted. Background failures are logged, never returned: the
//! interpreter always falls back to raw bytecode.

mod task;

pub use task::OptimizeTask;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, OnceLock};
use std::time::Duration;

use alloy_primitives::{Bytes, U256};
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::bytecode::cache::{CodeCache, CodeCacheStats, CodeIdentity};
use crate::bytecode::memo_cache::{ConstantMemoTable, MemoStats};
use crate::bytecode::optimizer::{FusionEngine, FusionStats};
use crate::config::OptimizerConfig;
use crate::error::{OptimizerError, OptimizerResult};
use crate::thread_pool::WorkerPool;

/// Global processor instance, configured from the environment on first use
static GLOBAL_PROCESSOR: LazyLock<OpcodeProcessor> =
    LazyLock::new(|| OpcodeProcessor::new(OptimizerConfig::from_env()));

/// Get the global opcode processor
///
/// Constructed once, on first call, from [`OptimizerConfig::from_env`]. Its
/// workers live for the rest of the process.
pub fn global_processor() -> &'static OpcodeProcessor {
    &GLOBAL_PROCESSOR
}

/// Statistics for the opcode processor
#[derive(Debug, Clone, Default)]
pub struct ProcessorStats {
    /// Current state of the feature gate
    pub enabled: bool,
    /// Tasks accepted onto the queue
    pub tasks_submitted: u64,
    /// Tasks a worker has finished handling
    pub tasks_processed: u64,
    /// Tasks dropped because the optimizer was off when they ran
    pub tasks_skipped_disabled: u64,
    /// Tasks that could not be queued
    pub submit_failures: u64,
    /// Successful fusion runs that populated the cache
    pub compilations: u64,
    /// Fusion runs that failed
    pub compile_failures: u64,
    /// Tasks queued or running right now
    pub pending: usize,
    /// Code cache statistics, once the cache is bound
    pub cache: Option<CodeCacheStats>,
    /// Constant memo table statistics
    pub memo: MemoStats,
    /// Fusion counters summed over every compilation
    pub fusion: FusionStats,
}

#[derive(Default)]
struct Counters {
    tasks_submitted: AtomicU64,
    tasks_processed: AtomicU64,
    tasks_skipped_disabled: AtomicU64,
    submit_failures: AtomicU64,
    compilations: AtomicU64,
    compile_failures: AtomicU64,
}

/// State shared between the public handle and the workers
struct Shared {
    config: OptimizerConfig,
    enabled: AtomicBool,
    cache: OnceLock<Arc<CodeCache>>,
    memo: Arc<ConstantMemoTable>,
    counters: Counters,
    fusion_stats: Mutex<FusionStats>,
}

impl Shared {
    #[inline]
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// The bound cache, if the optimizer is on
    fn active_cache(&self) -> OptimizerResult<&Arc<CodeCache>> {
        if !self.is_enabled() {
            return Err(OptimizerError::Disabled);
        }
        self.cache.get().ok_or(OptimizerError::Disabled)
    }

    fn bind_cache(&self) -> &Arc<CodeCache> {
        self.cache
            .get_or_init(|| Arc::new(CodeCache::from_config(&self.config)))
    }

    fn compile_sync(&self, identity: CodeIdentity, code: &[u8]) -> OptimizerResult<Bytes> {
        let cache = self.active_cache()?;

        let mut engine = FusionEngine::new();
        let fused = match engine.fuse(code, &self.memo) {
            Ok(fused) => Bytes::from(fused),
            Err(e) => {
                self.counters.compile_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    target: "opfusion::processor",
                    %identity,
                    error = %e,
                    "can not generate optimized code"
                );
                return Err(e);
            }
        };

        cache.put(identity, fused.clone());
        self.counters.compilations.fetch_add(1, Ordering::Relaxed);
        self.fusion_stats.lock().merge(engine.stats());
        debug!(
            target: "opfusion::processor",
            %identity,
            len = fused.len(),
            fusions = engine.stats().total_fusions(),
            "optimized code cached"
        );
        Ok(fused)
    }

    fn get_or_compile(
        &self,
        identity: CodeIdentity,
        code: &[u8],
    ) -> OptimizerResult<(Bytes, bool)> {
        let cache = self.active_cache()?;
        if let Some(cached) = cache.get(&identity) {
            return Ok((cached, true));
        }
        let fused = self.compile_sync(identity, code)?;
        Ok((fused, false))
    }

    fn flush(&self, identity: &CodeIdentity) {
        if let Ok(cache) = self.active_cache() {
            if cache.remove(identity) {
                trace!(target: "opfusion::processor", %identity, "flushed cached code");
            }
        }
    }

    /// Worker entry point: the gate is checked here, at dequeue time
    fn handle_task(&self, task: OptimizeTask) {
        if !self.is_enabled() {
            self.counters
                .tasks_skipped_disabled
                .fetch_add(1, Ordering::Relaxed);
            trace!(
                target: "opfusion::processor",
                identity = %task.identity(),
                kind = task.kind(),
                "optimizer disabled, task skipped"
            );
        } else {
            match task {
                OptimizeTask::Generate { identity, code } => {
                    match self.get_or_compile(identity, &code) {
                        Ok((_, hit)) => {
                            trace!(target: "opfusion::processor", %identity, hit, "generate task done");
                        }
                        Err(OptimizerError::Disabled) => {
                            // Disabled between the gate check and the compile
                            self.counters
                                .tasks_skipped_disabled
                                .fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            warn!(
                                target: "opfusion::processor",
                                %identity,
                                error = %e,
                                "background optimization failed, raw code stays in use"
                            );
                        }
                    }
                }
                OptimizeTask::Flush { identity } => self.flush(&identity),
            }
        }
        self.counters.tasks_processed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Opcode optimization processor
///
/// Explicitly constructed and owned; share it behind an `Arc` or use
/// [`global_processor`]. Dropping a processor stops its workers after they
/// drain their queues.
pub struct OpcodeProcessor {
    shared: Arc<Shared>,
    pool: WorkerPool<OptimizeTask>,
}

impl std::fmt::Debug for OpcodeProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpcodeProcessor")
            .field("enabled", &self.is_enabled())
            .field("workers", &self.pool.num_threads())
            .field("pending", &self.pool.pending())
            .finish()
    }
}

impl Default for OpcodeProcessor {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl OpcodeProcessor {
    /// Create a processor and start its workers
    pub fn new(config: OptimizerConfig) -> Self {
        Self::with_memo(config, Arc::new(ConstantMemoTable::new()))
    }

    /// Create a processor sharing an existing memo table
    pub fn with_memo(config: OptimizerConfig, memo: Arc<ConstantMemoTable>) -> Self {
        let shared = Arc::new(Shared {
            enabled: AtomicBool::new(false),
            cache: OnceLock::new(),
            memo,
            counters: Counters::default(),
            fusion_stats: Mutex::new(FusionStats::new()),
            config,
        });

        let worker_shared = Arc::clone(&shared);
        let pool = WorkerPool::new(
            "opcode-optimizer",
            shared.config.worker_threads,
            shared.config.queue_capacity,
            move |task: OptimizeTask| worker_shared.handle_task(task),
        );

        let processor = Self { shared, pool };
        if processor.shared.config.enabled {
            processor.enable();
        }
        processor
    }

    /// Turn optimization on, binding the code cache on first use
    pub fn enable(&self) {
        let cache = self.shared.bind_cache();
        if !self.shared.enabled.swap(true, Ordering::AcqRel) {
            debug!(
                target: "opfusion::processor",
                policy = cache.policy_name(),
                workers = self.pool.num_threads(),
                "opcode optimization enabled"
            );
        }
    }

    /// Turn optimization off; queued tasks become no-ops
    pub fn disable(&self) {
        if self.shared.enabled.swap(false, Ordering::AcqRel) {
            debug!(target: "opfusion::processor", "opcode optimization disabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.is_enabled()
    }

    /// Cached optimized code for `identity`
    ///
    /// `None` means "run the raw bytecode": the optimizer is off or the code
    /// has not been optimized yet.
    pub fn load(&self, identity: &CodeIdentity) -> Option<Bytes> {
        self.shared.active_cache().ok()?.get(identity)
    }

    /// Queue optimization of `code` for `identity` (fire-and-forget)
    pub fn request_optimize(&self, identity: CodeIdentity, code: Bytes) {
        self.submit(OptimizeTask::Generate { identity, code });
    }

    /// Queue removal of the cached entry for `identity`
    pub fn invalidate(&self, identity: CodeIdentity) {
        self.submit(OptimizeTask::Flush { identity });
    }

    /// Queue optimization of freshly stored code, only if the optimizer is on
    pub fn rewrite_for_storage(&self, identity: CodeIdentity, code: Bytes) {
        if self.is_enabled() {
            self.request_optimize(identity, code);
        }
    }

    /// Fuse `code` now and cache the result under `identity`
    pub fn compile_sync(&self, identity: CodeIdentity, code: &[u8]) -> OptimizerResult<Bytes> {
        self.shared.compile_sync(identity, code)
    }

    /// Return cached code for `identity`, compiling it on a miss
    ///
    /// The flag is true on a cache hit.
    pub fn get_or_compile(
        &self,
        identity: CodeIdentity,
        code: &[u8],
    ) -> OptimizerResult<(Bytes, bool)> {
        self.shared.get_or_compile(identity, code)
    }

    /// Precomputed `(y << z) - x` for a fused `SHL_AND_SUB x y z`
    pub fn shl_and_sub_value(&self, x: u8, y: u8, z: u8) -> Option<U256> {
        if !self.is_enabled() {
            return None;
        }
        self.shared.memo.get(x, y, z)
    }

    /// The constant memo table read by the interpreter
    pub fn memo(&self) -> &Arc<ConstantMemoTable> {
        &self.shared.memo
    }

    /// The code cache, once bound by [`enable`](Self::enable)
    pub fn cache(&self) -> Option<&Arc<CodeCache>> {
        self.shared.cache.get()
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.shared.config
    }

    /// Block until the queue is drained or `timeout` elapses
    ///
    /// Returns true if every queued task has been handled.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pool.wait_idle(timeout)
    }

    pub fn stats(&self) -> ProcessorStats {
        let counters = &self.shared.counters;
        ProcessorStats {
            enabled: self.is_enabled(),
            tasks_submitted: counters.tasks_submitted.load(Ordering::Relaxed),
            tasks_processed: counters.tasks_processed.load(Ordering::Relaxed),
            tasks_skipped_disabled: counters.tasks_skipped_disabled.load(Ordering::Relaxed),
            submit_failures: counters.submit_failures.load(Ordering::Relaxed),
            compilations: counters.compilations.load(Ordering::Relaxed),
            compile_failures: counters.compile_failures.load(Ordering::Relaxed),
            pending: self.pool.pending(),
            cache: self.cache().map(|cache| cache.stats()),
            memo: self.shared.memo.stats(),
            fusion: self.shared.fusion_stats.lock().clone(),
        }
    }

    fn submit(&self, task: OptimizeTask) {
        let identity = *task.identity();
        let kind = task.kind();
        match self.pool.submit(&identity, task) {
            Ok(()) => {
                self.shared
                    .counters
                    .tasks_submitted
                    .fetch_add(1, Ordering::Relaxed);
                trace!(target: "opfusion::processor", %identity, kind, "task queued");
            }
            Err(e) => {
                self.shared
                    .counters
                    .submit_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(target: "opfusion::processor", %identity, kind, error = %e, "task dropped");
            }
        }
    }
}
