//! `vislang` - generate guided and unguided Vega-Lite charts from a prompt

mod benchmark;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vislang_core::{EncodingRec, Pipeline, PipelineConfig, PipelineRequest, PipelineResult};

#[derive(Debug, Parser)]
#[command(name = "vislang", version, about = "Oracle-guided Vega-Lite generation")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Text oracle model, e.g. anthropic/claude-opus-4-6
    #[arg(long, global = true)]
    model: Option<String>,

    /// Do not write a run directory
    #[arg(long, global = true)]
    no_log: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the pipeline for one request
    Run {
        /// What to visualize
        prompt: String,
        /// Data file (csv, tsv or json)
        data: String,
    },
    /// Run the built-in benchmark tasks
    Benchmark {
        /// Run tasks one at a time
        #[arg(long)]
        sequential: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = PipelineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(model) = cli.model {
        config = config.with_model(model);
    }
    if cli.no_log {
        config = config.with_logging(false);
    }
    let pipeline = Pipeline::from_config(config).context("building pipeline")?;

    match cli.command {
        Command::Run { prompt, data } => {
            let result = pipeline
                .run(&PipelineRequest::new(prompt, data))
                .await
                .context("pipeline run failed")?;
            print_result(&result);
        }
        Command::Benchmark { sequential } => {
            benchmark::run(&pipeline, !sequential).await;
        }
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn,hyper_util=warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_result(result: &PipelineResult) {
    println!();
    match &result.recommendation {
        Some(rec) => {
            let encodings: Vec<String> = rec.encodings.iter().map(describe_encoding).collect();
            println!("Draco recommends: {} [{}]", rec.mark_type, encodings.join(", "));
        }
        None => println!("Draco recommends: nothing (guided path skipped)"),
    }
    for report in result.reports() {
        println!("  {report}");
    }
    if !result.comparison.is_empty() {
        println!();
        println!("Summary: {}", result.comparison.summary);
        println!("Verdict: {}", result.comparison.verdict);
    }
    if let Some(dir) = &result.log_dir {
        println!();
        println!("Artifacts: {}", dir.display());
    }
}

fn describe_encoding(enc: &EncodingRec) -> String {
    let field = enc.field.as_deref().unwrap_or("*");
    match &enc.aggregate {
        Some(agg) => format!("{}={agg}({field})", enc.channel),
        None => format!("{}={field}", enc.channel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_global_flags() {
        let cli = Cli::try_parse_from([
            "vislang",
            "run",
            "mass by species",
            "penguins.json",
            "--model",
            "openai/gpt-4o",
            "--no-log",
        ])
        .unwrap();
        assert!(cli.no_log);
        assert_eq!(cli.model.as_deref(), Some("openai/gpt-4o"));
        assert!(matches!(cli.command, Command::Run { ref data, .. } if data == "penguins.json"));
    }

    #[test]
    fn encoding_descriptions() {
        let enc = EncodingRec {
            channel: "y".into(),
            field: Some("body_mass".into()),
            aggregate: Some("mean".into()),
            binning: None,
            stack: None,
        };
        assert_eq!(describe_encoding(&enc), "y=mean(body_mass)");
        let count = EncodingRec {
            channel: "y".into(),
            field: None,
            aggregate: None,
            binning: None,
            stack: None,
        };
        assert_eq!(describe_encoding(&count), "y=*");
    }
}
