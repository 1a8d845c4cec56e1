use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::archive::{archive_name, pack_directory};
use super::{TarballUploader, UploadOptions};
use crate::error::UploadError;
use crate::locator::Locator;
use crate::normalize::SourceUnit;

const USER_AGENT: &str = concat!("depsync/", env!("CARGO_PKG_VERSION"));
const ARCHIVE_FETCHER: &str = "archive";
const DEFAULT_BRANCH: &str = "master";

/// Client for the analysis service. The API key is fixed at construction.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    locator: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedUrlResponse {
    signed_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ArchiveBuild<'a> {
    package_spec: &'a str,
    revision: &'a str,
}

#[derive(Debug, Serialize)]
struct BuildRequest<'a> {
    archives: Vec<ArchiveBuild<'a>>,
}

impl ApiClient {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, UploadError> {
        let endpoint = Url::parse(endpoint).map_err(|_| UploadError::Endpoint(endpoint.to_string()))?;
        if endpoint.cannot_be_a_base() {
            return Err(UploadError::Endpoint(endpoint.to_string()));
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|source| UploadError::Http {
                url: endpoint.to_string(),
                source,
            })?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Upload normalized source units as a build of `locator`.
    pub async fn upload(
        &self,
        title: &str,
        locator: &Locator,
        options: &UploadOptions,
        units: &[SourceUnit],
    ) -> Result<Locator, UploadError> {
        let url = self.upload_url(title, locator, options);
        info!(locator = %locator, units = units.len(), "uploading analysis");

        let response: UploadResponse = self
            .send(self.authorized(Method::POST, url.clone())?.json(units), &url)
            .await?
            .json()
            .await
            .map_err(|source| UploadError::Http {
                url: url.to_string(),
                source,
            })?;

        Ok(response.locator.parse::<Locator>()?)
    }

    /// Human-facing URL of an uploaded build.
    pub fn report_url(&self, locator: &Locator, branch: Option<&str>) -> String {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("projects")
                .push(&locator.project_key())
                .push("refs")
                .push("branch")
                .push(branch.unwrap_or(DEFAULT_BRANCH))
                .push(locator.revision());
        }
        url.to_string()
    }

    pub(crate) fn upload_url(&self, title: &str, locator: &Locator, options: &UploadOptions) -> Url {
        let mut url = self.api_url(&["api", "builds", "custom"]);
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("locator", &locator.to_string())
                .append_pair("v", env!("CARGO_PKG_VERSION"))
                .append_pair("managedBuild", "true")
                .append_pair("title", title);
            let optional = [
                ("branch", &options.branch),
                ("projectURL", &options.project_url),
                ("jiraProjectKey", &options.jira_project_key),
                ("link", &options.link),
                ("team", &options.team),
            ];
            for (key, value) in optional {
                if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                    query.append_pair(key, value);
                }
            }
        }
        url
    }

    fn api_url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, method: Method, url: Url) -> Result<RequestBuilder, UploadError> {
        let key = self.api_key.as_deref().ok_or(UploadError::MissingApiKey)?;
        Ok(self
            .client
            .request(method, url)
            .header("Authorization", format!("token {}", key)))
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<reqwest::Response, UploadError> {
        let response = request.send().await.map_err(|source| UploadError::Http {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl TarballUploader for ApiClient {
    async fn upload_tarball(&self, path: &Path) -> Result<Locator, UploadError> {
        if self.api_key.is_none() {
            return Err(UploadError::MissingApiKey);
        }

        let name = archive_name(path);
        let owned = path.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || pack_directory(&owned))
            .await
            .map_err(|e| UploadError::Archive {
                path: path.to_path_buf(),
                source: std::io::Error::other(e),
            })?
            .map_err(|source| UploadError::Archive {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(
            path = %path.display(),
            bytes = archive.bytes.len(),
            revision = %archive.digest,
            "packed raw module"
        );

        let mut signed_url = self.api_url(&["api", "components", "signed_url"]);
        signed_url
            .query_pairs_mut()
            .append_pair("packageSpec", &name)
            .append_pair("revision", &archive.digest);
        let signed: SignedUrlResponse = self
            .send(self.authorized(Method::GET, signed_url.clone())?, &signed_url)
            .await?
            .json()
            .await
            .map_err(|source| UploadError::Http {
                url: signed_url.to_string(),
                source,
            })?;

        let put_url =
            Url::parse(&signed.signed_url).map_err(|_| UploadError::Endpoint(signed.signed_url.clone()))?;
        self.send(
            self.client.put(put_url.clone()).body(archive.bytes),
            &put_url,
        )
        .await?;

        let build_url = self.api_url(&["api", "components", "build"]);
        let body = BuildRequest {
            archives: vec![ArchiveBuild {
                package_spec: &name,
                revision: &archive.digest,
            }],
        };
        self.send(
            self.authorized(Method::POST, build_url.clone())?.json(&body),
            &build_url,
        )
        .await?;

        Ok(Locator::new(ARCHIVE_FETCHER, name, archive.digest)?)
    }
}
