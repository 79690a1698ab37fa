//! Benchmark suite
//!
//! Ten fixed tasks: five general multi-field requests, and five aimed at
//! designs text-only models tend to miss (aggregate summaries, size
//! encoding, faceting).

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use vislang_core::{Pipeline, PipelineRequest, Verdict};

pub(crate) struct Task {
    pub(crate) prompt: &'static str,
    pub(crate) data: &'static str,
    pub(crate) tag: &'static str,
}

pub(crate) static TASKS: [Task; 10] = [
    Task {
        prompt: "Show how life expectancy relates to fertility rate across countries, and whether income level explains the pattern",
        data: "gapminder-health-income.csv",
        tag: "original",
    },
    Task {
        prompt: "Show how unemployment rates across industries changed during recessions vs expansions",
        data: "unemployment-across-industries.json",
        tag: "original",
    },
    Task {
        prompt: "Show the yield of different barley varieties across sites: which varieties perform best and does it depend on location?",
        data: "barley.json",
        tag: "original",
    },
    Task {
        prompt: "How has the mix of energy sources in Iowa changed over time, and which sources are growing fastest?",
        data: "iowa-electricity.csv",
        tag: "original",
    },
    Task {
        prompt: "Compare the seasonal patterns of temperature and precipitation in Seattle: are wet months also cold months?",
        data: "seattle-weather.csv",
        tag: "original",
    },
    // Best design puts body mass on size; models tend to force it onto y.
    Task {
        prompt: "Compare the typical body mass of each penguin species and whether flipper length varies with it",
        data: "penguins.json",
        tag: "dracogpt: summary + size",
    },
    Task {
        prompt: "How does the age distribution of the US population differ between males and females?",
        data: "population.json",
        tag: "dracogpt: faceting",
    },
    Task {
        prompt: "Which job categories show the largest gender gap in employment share?",
        data: "jobs.json",
        tag: "dracogpt: aggregate comparison",
    },
    Task {
        prompt: "Show how the scale and frequency of natural disasters has changed over time across different disaster types",
        data: "disasters.csv",
        tag: "dracogpt: size for important var",
    },
    Task {
        prompt: "Compare how fertility rates and life expectancy relate across world regions, and whether population size plays a role",
        data: "gapminder.json",
        tag: "dracogpt: size + faceting",
    },
];

/// Outcome of one task
pub(crate) struct Row {
    pub(crate) index: usize,
    pub(crate) task: &'static Task,
    pub(crate) winner: Option<Verdict>,
    pub(crate) mark: String,
    pub(crate) elapsed: Duration,
    pub(crate) log_dir: Option<PathBuf>,
    pub(crate) error: Option<String>,
}

/// Run every task and print the summary table
pub(crate) async fn run(pipeline: &Pipeline, parallel: bool) {
    println!("Model: {}", pipeline.config().model);
    println!("Mode: {}", if parallel { "parallel" } else { "sequential" });
    println!("Tasks: {}", TASKS.len());

    let start = Instant::now();
    let mut rows = Vec::with_capacity(TASKS.len());

    if parallel {
        let mut set = JoinSet::new();
        for (i, task) in TASKS.iter().enumerate() {
            let pipeline = pipeline.clone();
            set.spawn(async move { run_task(&pipeline, i + 1, task).await });
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(row) => rows.push(row),
                Err(e) => tracing::error!(error = %e, "Benchmark task panicked"),
            }
        }
        rows.sort_by_key(|r| r.index);
    } else {
        for (i, task) in TASKS.iter().enumerate() {
            println!("\nRunning task {}/{}: {}...", i + 1, TASKS.len(), preview(task.prompt));
            rows.push(run_task(pipeline, i + 1, task).await);
        }
    }

    for row in &rows {
        print_row(row);
    }
    print_summary(&rows, start.elapsed());
}

async fn run_task(pipeline: &Pipeline, index: usize, task: &'static Task) -> Row {
    let start = Instant::now();
    let outcome = pipeline
        .run(&PipelineRequest::new(task.prompt, task.data))
        .await;
    let elapsed = start.elapsed();

    match outcome {
        Ok(result) => Row {
            index,
            task,
            winner: result.comparison.winner(),
            mark: result
                .recommendation
                .as_ref()
                .map_or_else(|| "?".to_string(), |r| r.mark_type.clone()),
            elapsed,
            log_dir: result.log_dir,
            error: None,
        },
        Err(e) => {
            tracing::error!(task = index, error = %e, "Benchmark task failed");
            Row {
                index,
                task,
                winner: None,
                mark: "?".into(),
                elapsed,
                log_dir: None,
                error: Some(e.to_string()),
            }
        }
    }
}

fn print_row(row: &Row) {
    println!("\n{}", "=".repeat(60));
    println!("TASK {}: {}...", row.index, preview(row.task.prompt));
    println!("  [{}]", row.task.tag);
    println!("  Data: {}", row.task.data);
    println!("  Draco mark: {}", row.mark);
    match &row.error {
        Some(e) => println!("  Error: {e}"),
        None => println!("  Winner: {}", winner_label(row.winner)),
    }
    println!("  Time: {:.1}s", row.elapsed.as_secs_f64());
    if let Some(dir) = &row.log_dir {
        println!("  Logs: {}", dir.display());
    }
}

fn print_summary(rows: &[Row], total: Duration) {
    println!("\n\n{}", "=".repeat(60));
    println!("BENCHMARK SUMMARY");
    println!("{}", "=".repeat(60));
    println!("{:<4} {:<32} {:<36} {:<10} {:>6}", "#", "Tag", "Data", "Winner", "Time");
    println!("{} {} {} {} {}", "-".repeat(4), "-".repeat(32), "-".repeat(36), "-".repeat(10), "-".repeat(6));
    for row in rows {
        println!(
            "{:<4} {:<32} {:<36} {:<10} {:>5.0}s",
            row.index,
            row.task.tag,
            row.task.data,
            winner_label(row.winner),
            row.elapsed.as_secs_f64()
        );
    }

    let tally = Tally::of(rows);
    println!(
        "\nDraco: {}  Baseline: {}  Tie: {}  Unjudged: {}",
        tally.guided, tally.unguided, tally.tie, tally.unjudged
    );
    println!("Total time: {:.0}s", total.as_secs_f64());
}

fn winner_label(winner: Option<Verdict>) -> &'static str {
    match winner {
        Some(Verdict::Guided) => "draco",
        Some(Verdict::Unguided) => "baseline",
        Some(Verdict::Tie) => "tie",
        None => "?",
    }
}

fn preview(prompt: &str) -> String {
    prompt.chars().take(60).collect()
}

/// Win counts across rows
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Tally {
    pub(crate) guided: usize,
    pub(crate) unguided: usize,
    pub(crate) tie: usize,
    pub(crate) unjudged: usize,
}

impl Tally {
    pub(crate) fn of(rows: &[Row]) -> Self {
        rows.iter().fold(Self::default(), |mut t, row| {
            match row.winner {
                Some(Verdict::Guided) => t.guided += 1,
                Some(Verdict::Unguided) => t.unguided += 1,
                Some(Verdict::Tie) => t.tie += 1,
                None => t.unjudged += 1,
            }
            t
        })
    }
}
