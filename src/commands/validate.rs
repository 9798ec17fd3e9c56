use anyhow::Result;
use std::sync::Arc;

use vellum_resolve::diagnostics::render::render_corpus;
use vellum_resolve::diagnostics::{Cancellation, DiagnosticsAggregator};
use vellum_resolve::models::DatasetRef;
use vellum_resolve::validation::SemanticValidator;

use super::{Context, OutputFormat, parse_dataset_spec};

pub async fn validate_command(context: &Context, specs: &[String], format: OutputFormat) -> Result<()> {
    let validator = SemanticValidator::new(context.store.clone(), context.config.clone());
    let aggregator = DiagnosticsAggregator::with_validator(Arc::new(validator));

    // Ctrl-C stops the run; finished datasets are still reported
    let cancel = Cancellation::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let report = if specs.is_empty() {
        aggregator.validate_corpus(Some(&cancel)).await
    } else {
        let datasets = specs
            .iter()
            .map(|spec| parse_dataset_spec(spec))
            .collect::<Result<Vec<DatasetRef>>>()?;
        aggregator.aggregate_corpus(datasets, Some(&cancel)).await
    };

    match format {
        OutputFormat::Human => print!("{}", render_corpus(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if report.has_errors() {
        anyhow::bail!("Validation failed with {} error(s)", report.error_count());
    }
    if report.cancelled {
        anyhow::bail!("Validation was cancelled");
    }
    Ok(())
}
