use reqtrack_core::DirectoryKind;
use reqtrack_executor::Desk;
use reqtrack_storage::JsonFileStore;

use crate::render::print_json;
use crate::{DirectoryCommands, OutputFormat};

pub(crate) async fn cmd_directory(
    desk: &Desk<JsonFileStore>,
    command: DirectoryCommands,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    match command {
        DirectoryCommands::List { kind } => {
            let directory = desk.directory().await.map_err(|e| e.to_string())?;
            let kinds: Vec<DirectoryKind> = match kind {
                Some(kind) => vec![kind.into()],
                None => DirectoryKind::ALL.to_vec(),
            };
            match output {
                OutputFormat::Json => match kind {
                    Some(kind) => print_json(directory.entries(kind.into()))?,
                    None => print_json(&directory)?,
                },
                OutputFormat::Text => {
                    for kind in kinds {
                        for value in directory.entries(kind) {
                            println!("{:<10} {}", kind.as_str(), value);
                        }
                    }
                }
            }
        }
        DirectoryCommands::Add { kind, values } => {
            let kind = DirectoryKind::from(kind);
            let entries: Vec<(DirectoryKind, String)> =
                values.into_iter().map(|v| (kind, v)).collect();
            let added = desk.remember(&entries).await.map_err(|e| e.to_string())?;
            match output {
                OutputFormat::Json => print_json(&serde_json::json!({ "added": added.len() }))?,
                OutputFormat::Text if !quiet => {
                    println!("{} {} value(s) added", added.len(), kind)
                }
                OutputFormat::Text => {}
            }
        }
    }
    Ok(())
}
