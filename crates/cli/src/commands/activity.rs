use reqtrack_executor::Desk;
use reqtrack_storage::{ActivityFilter, ActivityKind, JsonFileStore};

use crate::render::{print_json, timestamp};
use crate::OutputFormat;

pub(crate) async fn cmd_activity(
    desk: &Desk<JsonFileStore>,
    kind: Option<&str>,
    operator: Option<String>,
    limit: usize,
    output: OutputFormat,
) -> Result<(), String> {
    let filter = ActivityFilter {
        kind: kind.map(str::parse::<ActivityKind>).transpose()?,
        operator,
        limit,
    };
    let records = desk.activity(&filter).await.map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Text => {
            for r in &records {
                println!(
                    "{}  {:<20} {:<10} {}",
                    timestamp(r.timestamp),
                    r.kind.as_str(),
                    r.operator,
                    r.detail
                );
            }
        }
    }
    Ok(())
}
