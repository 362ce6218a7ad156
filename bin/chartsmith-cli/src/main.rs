// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use anyhow::{Context, Result};
use chartsmith::records::load_records_file;
use chartsmith::request::{ErrorPayload, PreviewReply};
use chartsmith::{
    ChartBuilder, ChartBuilderError, ChartDataResponse, ChartType, EngineSettings, ErrorReporter,
    InMemoryRecordSource, PreviewRequest, PreviewState,
};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("chartsmith")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Builds chart previews from a business field catalog and raw records")
        .arg(
            Arg::new("settings")
                .long("settings")
                .value_name("FILE")
                .help("Engine settings YAML"),
        )
        .arg(
            Arg::new("catalog")
                .long("catalog")
                .value_name("FILE")
                .help("Catalog YAML to use instead of the built-in QA catalog"),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .action(ArgAction::SetTrue)
                .help("Print the catalog's datasets and exit"),
        )
        .arg(
            Arg::new("request")
                .short('r')
                .long("request")
                .value_name("FILE")
                .conflicts_with_all(["dataset", "metric", "dimension"])
                .help("Preview request JSON"),
        )
        .arg(
            Arg::new("dataset")
                .short('d')
                .long("dataset")
                .value_name("ID"),
        )
        .arg(
            Arg::new("metric")
                .short('m')
                .long("metric")
                .value_name("ID")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("dimension")
                .short('g')
                .long("dimension")
                .value_name("ID")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("level")
                .short('l')
                .long("level")
                .value_name("1-4")
                .value_parser(clap::value_parser!(i64))
                .help("Disclosure level; out-of-range values are clamped"),
        )
        .arg(
            Arg::new("chart-type")
                .long("chart-type")
                .value_name("TYPE")
                .value_parser(|s: &str| s.parse::<ChartType>()),
        )
        .arg(
            Arg::new("records")
                .long("records")
                .value_name("FILE")
                .help("Records for the selected dataset (.json or .csv)"),
        )
        .arg(
            Arg::new("interactive")
                .long("interactive")
                .action(ArgAction::SetTrue)
                .conflicts_with("settings")
                .help("Use the interactive preset: 300 ms latency, 25-point cap, level 2"),
        )
        .arg(
            Arg::new("envelope")
                .long("envelope")
                .action(ArgAction::SetTrue)
                .help("Print the chart data envelope instead of the preview reply"),
        )
        .arg(
            Arg::new("simulate-latency")
                .long("simulate-latency")
                .action(ArgAction::SetTrue)
                .help("Keep the configured preview delay"),
        )
}

fn load_settings(matches: &ArgMatches) -> Result<EngineSettings> {
    let mut settings = match matches.get_one::<String>("settings") {
        Some(path) => EngineSettings::from_yaml_file(path)
            .with_context(|| format!("loading settings from {path}"))?,
        None if matches.get_flag("interactive") => EngineSettings::for_interactive(),
        None => EngineSettings::default(),
    };
    if let Some(path) = matches.get_one::<String>("catalog") {
        settings.catalog_path = Some(PathBuf::from(path));
    }
    if !matches.get_flag("simulate-latency") {
        settings.preview.simulated_latency_ms = 0;
    }
    Ok(settings)
}

fn build_request(matches: &ArgMatches) -> Result<Option<PreviewRequest>> {
    if let Some(path) = matches.get_one::<String>("request") {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading request {path}"))?;
        return Ok(Some(PreviewRequest::from_json(&content)?));
    }
    let Some(dataset) = matches.get_one::<String>("dataset") else {
        return Ok(None);
    };
    let mut request = PreviewRequest::new(dataset.as_str());
    request.metric_ids = matches
        .get_many::<String>("metric")
        .map(|ids| ids.cloned().collect())
        .unwrap_or_default();
    request.dimension_ids = matches
        .get_many::<String>("dimension")
        .map(|ids| ids.cloned().collect())
        .unwrap_or_default();
    if let Some(level) = matches.get_one::<i64>("level") {
        request.disclosure_level = *level;
    }
    request.chart_type = matches.get_one::<ChartType>("chart-type").copied();
    Ok(Some(request))
}

fn print_catalog(builder: &ChartBuilder) -> Result<()> {
    let datasets: Vec<_> = builder
        .list_datasets()
        .iter()
        .map(|dataset| {
            json!({
                "id": dataset.id,
                "name": dataset.name,
                "metrics": dataset.metrics.iter().map(|m| &m.id).collect::<Vec<_>>(),
                "dimensions": dataset.dimensions.iter().map(|d| &d.id).collect::<Vec<_>>(),
                "filters": dataset.filters.iter().map(|f| &f.id).collect::<Vec<_>>(),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&datasets)?);
    Ok(())
}

fn report_failure(err: &ChartBuilderError) -> Result<ExitCode> {
    eprint!("{}", ErrorReporter::new().report(err));
    let reply = PreviewReply::Error(ErrorPayload::from(err));
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(ExitCode::FAILURE)
}

async fn run(matches: ArgMatches) -> Result<ExitCode> {
    let settings = load_settings(&matches)?;
    let mut builder = ChartBuilder::with_settings(settings)?;

    if matches.get_flag("list") {
        print_catalog(&builder)?;
        return Ok(ExitCode::SUCCESS);
    }
    let Some(request) = build_request(&matches)? else {
        anyhow::bail!("nothing to do: pass --list, --request or --dataset");
    };
    if let Err(err) = builder.apply_request(&request) {
        return report_failure(&err);
    }

    let records = match matches.get_one::<String>("records") {
        Some(path) => load_records_file(path).with_context(|| format!("loading records from {path}"))?,
        None => Vec::new(),
    };
    info!(dataset = %request.dataset_id, records = records.len(), "Running preview");
    let source = InMemoryRecordSource::new().with_records(request.dataset_id.clone(), records);
    let state = builder.refresh_preview(&source).await.clone();
    debug!(phase = ?state.phase(), "Preview settled");

    let output = match &state {
        PreviewState::Ready(result) if matches.get_flag("envelope") => {
            let dataset = builder.catalog().get_dataset(&request.dataset_id)?;
            serde_json::to_value(ChartDataResponse::from_preview(dataset, result))?
        }
        PreviewState::Ready(result) => {
            serde_json::to_value(PreviewReply::Preview(result.clone().into()))?
        }
        PreviewState::Error(failure) => {
            eprintln!("Preview failed: {}", failure.message);
            println!("{}", serde_json::to_string_pretty(failure)?);
            return Ok(ExitCode::FAILURE);
        }
        PreviewState::Idle | PreviewState::Loading { .. } => {
            let incomplete = builder
                .configuration()
                .and_then(|config| config.require_complete().err())
                .map(ChartBuilderError::from);
            match incomplete {
                Some(err) => {
                    eprint!("{}", ErrorReporter::new().report(&err));
                    let payload = ErrorPayload::from(&err);
                    json!({
                        "chartType": ChartType::Table,
                        "points": [],
                        "kind": payload.kind,
                        "message": payload.message,
                    })
                }
                None => json!({"chartType": ChartType::Table, "points": []}),
            }
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    run(cli().get_matches()).await
}
