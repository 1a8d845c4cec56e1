//! Drives analysis over a list of modules.
//!
//! Every input module yields exactly one output module, in input order.
//! Per-module problems (no analyzer for the type, build check failures,
//! raw upload failures) are logged and the module is emitted anyway; an
//! analyzer failing to produce dependencies aborts the whole run.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::analyzer::AnalyzerRegistry;
use crate::api::TarballUploader;
use crate::error::AnalysisError;
use crate::models::{Module, ModuleStatus, ModuleType};
use crate::progress::{ProgressEvent, ProgressGuard, ProgressSink};
use crate::raw::analyze_raw;

pub struct Orchestrator {
    registry: Arc<AnalyzerRegistry>,
    uploader: Arc<dyn TarballUploader>,
    progress: Arc<dyn ProgressSink>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<AnalyzerRegistry>,
        uploader: Arc<dyn TarballUploader>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            registry,
            uploader,
            progress,
            concurrency: 1,
            cancel: CancellationToken::new(),
        }
    }

    /// Analyze up to `concurrency` modules at once. Output order is unaffected.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Analyze `modules`, returning them with results attached.
    ///
    /// Once the cancellation token fires no further module is started;
    /// modules already in flight finish and the run reports
    /// [`AnalysisError::Cancelled`].
    pub async fn run(&self, modules: Vec<Module>) -> Result<Vec<Module>, AnalysisError> {
        let _guard = ProgressGuard::new(self.progress.as_ref());
        let total = modules.len();

        let mut results: Vec<(usize, Option<Module>)> = stream::iter(modules.into_iter().enumerate())
            .map(|(index, module)| self.process(index, total, module))
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        let analyzed = results.iter().filter(|(_, m)| m.is_some()).count();
        if analyzed < total {
            return Err(AnalysisError::Cancelled { analyzed, total });
        }

        results.sort_by_key(|(index, _)| *index);
        Ok(results.into_iter().filter_map(|(_, m)| m).collect())
    }

    /// `Ok((index, None))` means the module was skipped due to cancellation.
    async fn process(
        &self,
        index: usize,
        total: usize,
        module: Module,
    ) -> Result<(usize, Option<Module>), AnalysisError> {
        if self.cancel.is_cancelled() {
            debug!(module = %module.name, "skipping module, run cancelled");
            return Ok((index, None));
        }

        let name = module.name.clone();
        self.progress.on_progress(&ProgressEvent::ModuleStarted {
            index,
            total,
            name: name.clone(),
        });

        let module = if module.ty == ModuleType::Raw {
            analyze_raw(module, self.uploader.as_ref()).await
        } else {
            self.analyze_module(module).await?
        };

        self.progress
            .on_progress(&ProgressEvent::ModuleFinished { index, total, name });
        Ok((index, Some(module)))
    }

    async fn analyze_module(&self, mut module: Module) -> Result<Module, AnalysisError> {
        let analyzer = match self.registry.resolve(&module) {
            Ok(analyzer) => analyzer,
            Err(err) => {
                warn!(module = %module.name, "Could not load analyzer: {:#}", err);
                module.status = ModuleStatus::Unanalyzed;
                return Ok(module);
            }
        };

        match analyzer.is_built().await {
            Ok(true) => {}
            Ok(false) => warn!(module = %module.name, "Module does not appear to be built"),
            Err(err) => warn!(
                module = %module.name,
                "Could not determine whether module is built: {:#}", err
            ),
        }

        let deps = analyzer
            .analyze()
            .await
            .map_err(|source| AnalysisError::Analyze {
                module: module.name.clone(),
                source,
            })?;
        debug!(
            module = %module.name,
            direct = deps.direct.len(),
            transitive = deps.transitive.len(),
            "analyzed module"
        );
        module.attach(deps);
        Ok(module)
    }
}
