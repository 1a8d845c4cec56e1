//! HTTP client for the analysis service.
//!
//! - [`archive`] packs a raw module directory into a content-addressed tarball.
//! - [`client`] uploads tarballs and normalized builds, and builds report URLs.

pub mod archive;
pub mod client;

use std::path::Path;

use async_trait::async_trait;

use crate::error::UploadError;
use crate::locator::Locator;

pub use client::ApiClient;

/// Uploads a directory as an opaque content blob.
#[async_trait]
pub trait TarballUploader: Send + Sync {
    /// Returns the locator the service assigned to the uploaded content.
    async fn upload_tarball(&self, path: &Path) -> Result<Locator, UploadError>;
}

/// Metadata attached to an uploaded build. Each field only affects the
/// remote record, never the dependency graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub branch: Option<String>,
    pub project_url: Option<String>,
    pub jira_project_key: Option<String>,
    pub link: Option<String>,
    pub team: Option<String>,
}
