use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use uuid::Uuid;

use vellum_resolve::models::{DatasetKind, DatasetRef};
use vellum_resolve::resolver::ReferenceResolver;

use super::{Context, OutputFormat};

pub async fn resolve_command(
    context: &Context,
    process_id: Uuid,
    exchange: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let process = context
        .load(&DatasetRef::new(DatasetKind::Process, process_id))
        .await?;

    let resolver = ReferenceResolver::new(context.store.clone());
    let mut results = resolver.resolve_process(&process).await;
    if let Some(internal_id) = exchange {
        results.retain(|resolution| resolution.exchange.internal_id == internal_id);
        if results.is_empty() {
            anyhow::bail!("Process {process_id} has no exchange with internal id {internal_id}");
        }
    }

    match format {
        OutputFormat::Human => {
            for resolution in &results {
                let exchange_id = &resolution.exchange;
                match &resolution.result {
                    Ok(resolved) => println!(
                        "#{} {} {} (flow {}, property #{}, unit group {}, unit #{})",
                        exchange_id.internal_id,
                        "->".dimmed(),
                        resolved.unit_name.green().bold(),
                        resolved.trace.flow,
                        resolved.trace.flow_property,
                        resolved.trace.unit_group,
                        resolved.trace.unit
                    ),
                    Err(e) => println!(
                        "#{} {} {} at the {} hop: {e}",
                        exchange_id.internal_id,
                        "->".dimmed(),
                        "unresolved".red().bold(),
                        e.hop()
                    ),
                }
            }
        }
        OutputFormat::Json => {
            let entries: Vec<serde_json::Value> = results
                .iter()
                .map(|resolution| match &resolution.result {
                    Ok(resolved) => json!({
                        "exchange": resolution.exchange,
                        "unit_name": resolved.unit_name,
                        "trace": resolved.trace,
                    }),
                    Err(e) => json!({
                        "exchange": resolution.exchange,
                        "hop": e.hop(),
                        "error": e.to_string(),
                    }),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }

    let failed = results.iter().filter(|resolution| resolution.result.is_err()).count();
    if failed > 0 {
        anyhow::bail!("{failed} exchange(s) could not be resolved");
    }
    Ok(())
}
