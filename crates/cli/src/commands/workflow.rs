use reqtrack_core::WorkflowGraph;

use crate::OutputFormat;

pub(crate) fn cmd_workflow(graph: &WorkflowGraph, output: OutputFormat) {
    match output {
        OutputFormat::Json => {
            let states: Vec<serde_json::Value> = graph
                .states()
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "key": s.key,
                        "label": s.label,
                        "phase": s.phase,
                        "nextAction": s.next_action,
                        "requiresPickup": s.requires_pickup,
                        "returned": s.returned,
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&states).unwrap_or_default()
            );
        }
        OutputFormat::Text => {
            for s in graph.states() {
                let mut flags = Vec::new();
                if s.requires_pickup {
                    flags.push("pickup");
                }
                if s.returned {
                    flags.push("returned");
                }
                println!(
                    "{}  {:<14} {}{}",
                    s.phase,
                    s.key,
                    s.label,
                    if flags.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", flags.join(", "))
                    }
                );
            }
        }
    }
}
