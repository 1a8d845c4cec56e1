use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::models::{Module, ModuleStatus};
use crate::normalize::SourceUnit;

/// Render a summary of analyzed modules: one row per module with its
/// status, dependency counts and locator.
///
/// `units` must be the normalized form of `modules`, in the same order.
pub fn render(modules: &[Module], units: &[SourceUnit], project: &str) -> String {
    let analyzed = modules
        .iter()
        .filter(|m| m.status == ModuleStatus::Analyzed)
        .count();
    let failed = modules.len() - analyzed;

    let mut out = String::new();
    out.push_str(&format!(
        "\n {} v{}\n Project: {}\n\n",
        "depsync".bold(),
        env!("CARGO_PKG_VERSION"),
        project
    ));

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Module").add_attribute(Attribute::Bold),
            Cell::new("Type").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Direct").add_attribute(Attribute::Bold),
            Cell::new("Transitive").add_attribute(Attribute::Bold),
            Cell::new("Locator").add_attribute(Attribute::Bold),
        ]);

    for (module, unit) in modules.iter().zip(units) {
        let (status, color) = match module.status {
            ModuleStatus::Analyzed => ("✓ analyzed", Color::Green),
            ModuleStatus::Unanalyzed => ("⚠ unanalyzed", Color::Yellow),
            ModuleStatus::Pending => ("… pending", Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(&module.name),
            Cell::new(module.ty.to_string()),
            Cell::new(status).fg(color),
            Cell::new(module.imports.len()).set_alignment(CellAlignment::Right),
            Cell::new(module.deps.len()).set_alignment(CellAlignment::Right),
            Cell::new(&unit.locator),
        ]);
    }
    out.push_str(&table.to_string());
    out.push('\n');

    out.push_str(&format!(
        "\n Modules: {}  {} {}  {} {}\n",
        modules.len(),
        "Analyzed:".green(),
        analyzed,
        "Unanalyzed:".yellow(),
        failed
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Import, ModuleType, Package, PackageId};
    use crate::normalize::normalize;

    #[test]
    fn test_render_lists_every_module() {
        colored::control::set_override(false);

        let dep = PackageId::new(ModuleType::Cargo, "serde", "1.0.200");
        let mut core = Module::new("core", ModuleType::Cargo, "./core");
        core.imports = vec![Import::new("serde", dep.clone())];
        core.deps.insert(dep.clone(), Package::leaf(dep));
        core.revision = Some("0.3.0".to_string());
        core.status = ModuleStatus::Analyzed;
        let mut svc = Module::new("svc", ModuleType::Go, "./svc");
        svc.status = ModuleStatus::Unanalyzed;

        let modules = vec![core, svc];
        let units = normalize(&modules).unwrap();
        let text = render(&modules, &units, "acme");

        assert!(text.contains("Project: acme"));
        assert!(text.contains("cargo+core$0.3.0"));
        assert!(text.contains("go+svc$"));
        assert!(text.contains("unanalyzed"));
        assert!(text.contains("Modules: 2  Analyzed: 1  Unanalyzed: 1"));
    }
}
