use reqtrack_core::{DirectoryKind, RequisitionQuery, Transition, YearMonth};
use reqtrack_executor::Desk;
use reqtrack_storage::JsonFileStore;

use super::{parse_date, parse_draft};
use crate::render::{detail, print_json, summary_line};
use crate::{DraftArgs, OutputFormat, QueryArgs};

/// Remember the novel header values when asked to, otherwise point them out.
async fn settle_directory(
    desk: &Desk<JsonFileStore>,
    novel: &[(DirectoryKind, String)],
    remember: bool,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    if remember && !novel.is_empty() {
        desk.remember(novel).await.map_err(|e| e.to_string())?;
    }
    if output == OutputFormat::Json || quiet {
        return Ok(());
    }
    for (kind, value) in novel {
        if remember {
            println!("  remembered {}: {}", kind, value);
        } else {
            println!("  new {}: {} (not in directory; --remember keeps it)", kind, value);
        }
    }
    Ok(())
}

pub(crate) async fn cmd_create(
    desk: &Desk<JsonFileStore>,
    draft: DraftArgs,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let remember = draft.remember;
    let draft = parse_draft(draft)?;
    let novel = desk
        .novel_entries(&draft)
        .await
        .map_err(|e| e.to_string())?;
    let created = desk.create(draft).await.map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => print_json(&created)?,
        OutputFormat::Text if !quiet => println!("created {} {}", created.serial_id, created.id),
        OutputFormat::Text => {}
    }
    settle_directory(desk, &novel, remember, output, quiet).await
}

pub(crate) async fn cmd_edit(
    desk: &Desk<JsonFileStore>,
    reference: &str,
    draft: DraftArgs,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let remember = draft.remember;
    let draft = parse_draft(draft)?;
    let novel = desk
        .novel_entries(&draft)
        .await
        .map_err(|e| e.to_string())?;
    let edited = desk
        .edit(reference, draft)
        .await
        .map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => print_json(&edited)?,
        OutputFormat::Text if !quiet => println!("updated {}", edited.serial_id),
        OutputFormat::Text => {}
    }
    settle_directory(desk, &novel, remember, output, quiet).await
}

pub(crate) async fn cmd_show(
    desk: &Desk<JsonFileStore>,
    reference: &str,
    output: OutputFormat,
) -> Result<(), String> {
    let req = desk.show(reference).await.map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => print_json(&req)?,
        OutputFormat::Text => print!("{}", detail(desk.graph(), &req)),
    }
    Ok(())
}

fn build_query(args: QueryArgs) -> Result<RequisitionQuery, String> {
    let created_in = args
        .month
        .as_deref()
        .map(str::parse::<YearMonth>)
        .transpose()?;
    let applied_between = match (args.from.as_deref(), args.to.as_deref()) {
        (Some(from), Some(to)) => Some((parse_date(from)?, parse_date(to)?)),
        _ => None,
    };
    Ok(RequisitionQuery {
        phase: args.phase,
        urgent_only: args.urgent,
        vendor: args.vendor,
        text: args.search,
        created_in,
        applied_between,
    })
}

pub(crate) async fn cmd_list(
    desk: &Desk<JsonFileStore>,
    args: QueryArgs,
    output: OutputFormat,
) -> Result<(), String> {
    let query = build_query(args)?;
    let found = desk.search(&query).await.map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => print_json(&found)?,
        OutputFormat::Text => {
            for req in &found {
                println!("{}", summary_line(req));
            }
        }
    }
    Ok(())
}

fn report_transition(t: &Transition, output: OutputFormat, quiet: bool) -> Result<(), String> {
    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "serialId": t.requisition.serial_id,
            "from": t.from,
            "to": t.to,
            "note": t.event.note,
        })),
        OutputFormat::Text => {
            if !quiet {
                println!("{}: {} -> {}", t.requisition.serial_id, t.from, t.to);
            }
            Ok(())
        }
    }
}

pub(crate) async fn cmd_advance(
    desk: &Desk<JsonFileStore>,
    reference: &str,
    note: Option<&str>,
    pickup_name: Option<&str>,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let t = desk
        .advance(reference, note, pickup_name)
        .await
        .map_err(|e| e.to_string())?;
    report_transition(&t, output, quiet)
}

pub(crate) async fn cmd_revert(
    desk: &Desk<JsonFileStore>,
    reference: &str,
    reason: &str,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let t = desk
        .revert(reference, reason)
        .await
        .map_err(|e| e.to_string())?;
    report_transition(&t, output, quiet)
}

pub(crate) async fn cmd_urgent(
    desk: &Desk<JsonFileStore>,
    reference: &str,
    urgent: bool,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let req = desk
        .set_urgent(reference, urgent)
        .await
        .map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => print_json(&req)?,
        OutputFormat::Text if !quiet => println!(
            "{} {}",
            req.serial_id,
            if req.is_urgent { "urgent" } else { "not urgent" }
        ),
        OutputFormat::Text => {}
    }
    Ok(())
}

pub(crate) async fn cmd_delete(
    desk: &Desk<JsonFileStore>,
    reference: &str,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let removed = desk.delete(reference).await.map_err(|e| e.to_string())?;
    match output {
        OutputFormat::Json => print_json(&serde_json::json!({ "deleted": removed.serial_id }))?,
        OutputFormat::Text if !quiet => println!("deleted {}", removed.serial_id),
        OutputFormat::Text => {}
    }
    Ok(())
}
