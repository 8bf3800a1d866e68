use reqtrack_core::YearMonth;
use reqtrack_executor::Desk;
use reqtrack_storage::JsonFileStore;

use crate::render::print_json;
use crate::OutputFormat;

pub(crate) async fn cmd_archive(desk: &Desk<JsonFileStore>, output: OutputFormat) -> Result<(), String> {
    let months = desk.closed_months().await.map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => {
            let groups: Vec<serde_json::Value> = months
                .iter()
                .map(|m| {
                    serde_json::json!({
                        "month": m.month.to_string(),
                        "count": m.requisitions.len(),
                        "serials": m.requisitions.iter().map(|r| r.serial_id.as_str()).collect::<Vec<_>>(),
                    })
                })
                .collect();
            print_json(&groups)?;
        }
        OutputFormat::Text => {
            for m in &months {
                println!("{}  {} closed", m.month, m.requisitions.len());
            }
        }
    }
    Ok(())
}

pub(crate) async fn cmd_purge_closed(
    desk: &Desk<JsonFileStore>,
    month: &str,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let month: YearMonth = month.parse()?;
    let purged = desk
        .purge_closed_month(month)
        .await
        .map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "month": month.to_string(),
            "deleted": purged.iter().map(|r| r.serial_id.as_str()).collect::<Vec<_>>(),
        }))?,
        OutputFormat::Text if !quiet => {
            println!("deleted {} closed requisition(s) from {}", purged.len(), month)
        }
        OutputFormat::Text => {}
    }
    Ok(())
}
