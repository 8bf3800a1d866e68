use reqtrack_core::{BatchAction, RequisitionQuery};
use reqtrack_executor::Desk;
use reqtrack_storage::JsonFileStore;

use crate::render::print_json;
use crate::{BatchCommands, OutputFormat, Selection};

/// References named on the command line, then every member of `--phase`.
async fn collect(desk: &Desk<JsonFileStore>, selection: Selection) -> Result<Vec<String>, String> {
    let mut references = selection.references;
    if let Some(phase) = selection.phase {
        let query = RequisitionQuery {
            phase: Some(phase),
            ..Default::default()
        };
        let members = desk.search(&query).await.map_err(|e| e.to_string())?;
        references.extend(members.into_iter().map(|r| r.id));
    }
    if references.is_empty() {
        return Err("no requisitions selected: pass ids/serials or --phase".to_string());
    }
    Ok(references)
}

pub(crate) async fn cmd_batch(
    desk: &Desk<JsonFileStore>,
    command: BatchCommands,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let (selection, action) = match command {
        BatchCommands::Advance { selection, note } => (selection, BatchAction::Advance { note }),
        BatchCommands::Revert { selection, reason } => (selection, BatchAction::Revert { reason }),
        BatchCommands::Receive {
            selection,
            pickup_name,
            note,
        } => (selection, BatchAction::Receiver { pickup_name, note }),
        BatchCommands::Complete { selection, note } => {
            (selection, BatchAction::DirectComplete { note })
        }
    };
    let references = collect(desk, selection).await?;
    let outcome = desk
        .apply_batch(&references, &action)
        .await
        .map_err(|e| e.to_string())?;

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "action": action.name(),
            "applied": outcome.applied_count,
            "skipped": outcome.skipped_count,
            "appliedSerials": outcome.applied.iter().map(|r| r.serial_id.as_str()).collect::<Vec<_>>(),
            "skippedSerials": outcome.skipped.iter().map(|s| s.serial_id.as_str()).collect::<Vec<_>>(),
        }))?,
        OutputFormat::Text if !quiet => {
            println!(
                "{}: {} applied, {} skipped",
                action.name(),
                outcome.applied_count,
                outcome.skipped_count
            );
            for s in &outcome.skipped {
                println!("  skipped {} ({})", s.serial_id, s.status);
            }
        }
        OutputFormat::Text => {}
    }
    Ok(())
}
