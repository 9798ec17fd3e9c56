use anyhow::Result;
use uuid::Uuid;

use vellum_resolve::models::DatasetRef;

use super::{Context, KindArg};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum InspectFormat {
    Pretty,
    Json,
    Yaml,
}

pub async fn inspect_command(context: &Context, kind: KindArg, id: Uuid, format: InspectFormat) -> Result<()> {
    let document = context.load(&DatasetRef::new(kind.into(), id)).await?;

    match format {
        InspectFormat::Pretty => document.pretty_print(),
        InspectFormat::Json => println!("{}", serde_json::to_string_pretty(&*document)?),
        InspectFormat::Yaml => print!("{}", serde_yaml::to_string(&*document)?),
    }

    Ok(())
}
