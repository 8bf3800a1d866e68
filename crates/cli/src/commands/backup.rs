use std::path::Path;

use reqtrack_core::{ExportScope, MergePolicy, Requisition};
use reqtrack_executor::Desk;
use reqtrack_storage::JsonFileStore;

use super::parse_date;
use crate::render::print_json;
use crate::{OutputFormat, ScopeArg};

static BACKUP_SCHEMA_STR: &str = include_str!("../../schema/backup-schema.json");

/// Check `doc` against the embedded backup schema. Returns every violation.
pub(crate) fn validate_backup(doc: &serde_json::Value) -> Result<(), Vec<String>> {
    let schema: serde_json::Value = serde_json::from_str(BACKUP_SCHEMA_STR).map_err(|e| {
        vec![format!(
            "internal error: failed to parse embedded backup schema: {}",
            e
        )]
    })?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| vec![format!("internal error: failed to compile schema: {}", e)])?;
    let errors: Vec<String> = validator
        .iter_errors(doc)
        .map(|e| format!("{}", e))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub(crate) async fn cmd_import(
    desk: &Desk<JsonFileStore>,
    file: &Path,
    strict: bool,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| format!("error reading file '{}': {}", file.display(), e))?;
    let doc: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| format!("error parsing JSON in '{}': {}", file.display(), e))?;
    if let Err(errors) = validate_backup(&doc) {
        return Err(format!(
            "invalid backup '{}':\n  - {}",
            file.display(),
            errors.join("\n  - ")
        ));
    }
    let imported: Vec<Requisition> = serde_json::from_value(doc)
        .map_err(|e| format!("invalid backup '{}': {}", file.display(), e))?;

    let policy = if strict {
        MergePolicy::Strict
    } else {
        MergePolicy::ImportWins
    };
    let summary = desk
        .import(imported, policy)
        .await
        .map_err(|e| e.to_string())?;

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "inserted": summary.inserted,
            "replaced": summary.replaced,
            "carried": summary.carried,
            "rejected": summary.rejected,
        }))?,
        OutputFormat::Text if !quiet => println!(
            "imported: {} new, {} replaced, {} unchanged, {} rejected",
            summary.inserted, summary.replaced, summary.carried, summary.rejected
        ),
        OutputFormat::Text => {}
    }
    Ok(())
}

fn export_scope(scope: ScopeArg, from: Option<&str>, to: Option<&str>) -> Result<ExportScope, String> {
    match scope {
        ScopeArg::All => Ok(ExportScope::All),
        ScopeArg::Closed => Ok(ExportScope::Closed),
        ScopeArg::Range => {
            let (Some(from), Some(to)) = (from, to) else {
                return Err("--scope range needs both --from and --to".to_string());
            };
            let (from, to) = (parse_date(from)?, parse_date(to)?);
            if from > to {
                return Err(format!("--from {} is after --to {}", from, to));
            }
            Ok(ExportScope::DateRange { from, to })
        }
    }
}

/// The backup itself goes to `out` or stdout regardless of `--output`.
pub(crate) async fn cmd_export(
    desk: &Desk<JsonFileStore>,
    scope: ScopeArg,
    from: Option<&str>,
    to: Option<&str>,
    out: Option<&Path>,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let scope = export_scope(scope, from, to)?;
    let selected = desk.export(&scope).await.map_err(|e| e.to_string())?;

    match out {
        None => print_json(&selected),
        Some(path) => {
            let text = serde_json::to_string_pretty(&selected)
                .map_err(|e| format!("cannot serialize export: {}", e))?;
            std::fs::write(path, text)
                .map_err(|e| format!("cannot write '{}': {}", path.display(), e))?;
            match output {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "exported": selected.len(),
                    "path": path.display().to_string(),
                })),
                OutputFormat::Text => {
                    if !quiet {
                        println!("exported {} requisition(s) to {}", selected.len(), path.display());
                    }
                    Ok(())
                }
            }
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
