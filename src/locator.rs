//! Locators: the `fetcher+project$revision` addresses the remote service uses
//! for analyzed units and their dependencies.

use std::str::FromStr;

use crate::error::LocatorError;
use crate::models::PackageId;

const FETCHER_SEPARATOR: char = '+';
const REVISION_SEPARATOR: char = '$';

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    fetcher: String,
    project: String,
    revision: String,
}

impl Locator {
    /// Build a locator. Fetcher and project must be non-empty and must not
    /// contain `+` or `$`; the revision is unrestricted and may be empty.
    pub fn new(
        fetcher: impl Into<String>,
        project: impl Into<String>,
        revision: impl Into<String>,
    ) -> Result<Self, LocatorError> {
        let fetcher = fetcher.into();
        let project = project.into();
        check_field("fetcher", &fetcher)?;
        check_field("project", &project)?;
        Ok(Self {
            fetcher,
            project,
            revision: revision.into(),
        })
    }

    /// Locator the remote service uses for a resolved package.
    pub fn of(id: &PackageId) -> Result<Self, LocatorError> {
        Self::new(id.ty.fetcher(), id.name.clone(), id.revision.clone())
    }

    pub fn fetcher(&self) -> &str {
        &self.fetcher
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// `fetcher+project`, the revision-less project key.
    pub fn project_key(&self) -> String {
        format!("{}{}{}", self.fetcher, FETCHER_SEPARATOR, self.project)
    }
}

fn check_field(field: &'static str, value: &str) -> Result<(), LocatorError> {
    if value.is_empty() {
        return Err(LocatorError::Empty { field });
    }
    for separator in [FETCHER_SEPARATOR, REVISION_SEPARATOR] {
        if value.contains(separator) {
            return Err(LocatorError::ReservedSeparator {
                field,
                value: value.to_string(),
                separator,
            });
        }
    }
    Ok(())
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.fetcher, FETCHER_SEPARATOR, self.project, REVISION_SEPARATOR, self.revision
        )
    }
}

impl FromStr for Locator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || LocatorError::Malformed(s.to_string());
        let (fetcher, rest) = s.split_once(FETCHER_SEPARATOR).ok_or_else(malformed)?;
        let (project, revision) = rest.split_once(REVISION_SEPARATOR).ok_or_else(malformed)?;
        Locator::new(fetcher, project, revision)
    }
}
