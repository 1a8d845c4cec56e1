//! Raw modules: plain directories with no package manager. Their content is
//! uploaded as an archive and the module resolves to that single archive.

use std::path::Path;

use tracing::{info, warn};

use crate::api::TarballUploader;
use crate::models::{DependencyGraph, Import, Module, ModuleStatus, ModuleType, Package, PackageId};

/// Upload `module`'s build target and give it a one-node graph pointing at
/// the uploaded content. Upload failures are logged and the module keeps an
/// identity synthesized from its name, so it can still be normalized.
pub async fn analyze_raw(mut module: Module, uploader: &dyn TarballUploader) -> Module {
    let uploaded = match uploader.upload_tarball(Path::new(&module.build_target)).await {
        Ok(locator) => {
            info!(module = %module.name, locator = %locator, "uploaded raw module");
            Some(locator)
        }
        Err(err) => {
            warn!(module = %module.name, "Could not upload raw module: {}", err);
            None
        }
    };

    let (project, revision, status) = match &uploaded {
        Some(locator) => (
            locator.project().to_string(),
            locator.revision().to_string(),
            ModuleStatus::Analyzed,
        ),
        None => (module.name.clone(), String::new(), ModuleStatus::Unanalyzed),
    };

    let id = PackageId::new(ModuleType::Raw, project, revision);
    module.imports = vec![Import::new(module.build_target.clone(), id.clone())];
    module.deps = DependencyGraph::from([(id.clone(), Package::leaf(id))]);
    module.status = status;
    module
}
