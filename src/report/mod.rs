//! Local renderers for analysis results, used instead of uploading.
//!
//! - JSON: the normalized source units, pretty-printed.
//! - [`terminal`]: colored per-module summary table.

pub mod terminal;

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::ReportFormat;
use crate::models::Module;
use crate::normalize::SourceUnit;

/// Render results in `format` and write them to `target` (`-` for stdout).
pub fn write_report(
    format: ReportFormat,
    modules: &[Module],
    units: &[SourceUnit],
    project: &str,
    target: &Path,
) -> Result<()> {
    let rendered = match format {
        ReportFormat::Json => {
            let mut json = serde_json::to_string_pretty(units)?;
            json.push('\n');
            json
        }
        ReportFormat::Terminal => terminal::render(modules, units, project),
    };

    if target == Path::new("-") {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(rendered.as_bytes())?;
        stdout.flush()?;
    } else {
        std::fs::write(target, rendered)
            .with_context(|| format!("could not write {}", target.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModuleType;
    use crate::normalize::normalize;

    #[test]
    fn test_json_report_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.json");
        let modules = vec![Module::new("web", ModuleType::Npm, "./web")];
        let units = normalize(&modules).unwrap();

        write_report(ReportFormat::Json, &modules, &units, "acme", &path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written[0]["Locator"], "npm+web$");
        assert_eq!(written[0]["Build"]["Artifact"], "default");
    }

    #[test]
    fn test_unwritable_target() {
        let modules = Vec::new();
        let err = write_report(
            ReportFormat::Json,
            &modules,
            &[],
            "acme",
            Path::new("/definitely/not/here/out.json"),
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("could not write"));
    }
}
