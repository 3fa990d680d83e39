use anyhow::Context;
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use sql2gql::dataset::{discover_datasets, load_examples, load_tables, write_output};
use sql2gql::{BatchDriver, Config, ConsolePrompt, ModelRegistry, RunSummary, SchemaDirectory};

/// sql2gql - Compile Spider SQL queries into GraphQL queries
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Spider dataset directory
    spider_path: PathBuf,

    /// Directory holding <db_id>/schema.json introspection documents
    #[arg(long)]
    schemas: PathBuf,

    /// Relational schemas [default: <SPIDER_PATH>/tables.json]
    #[arg(long)]
    tables: Option<PathBuf>,

    /// Dataset files to compile [default: train and dev files of SPIDER_PATH]
    #[arg(long = "dataset")]
    datasets: Vec<PathBuf>,

    /// Output directory [default: SPIDER_PATH]
    #[arg(long)]
    output: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ask on the console when a relation path needs a manual choice
    #[arg(long)]
    interactive: bool,

    /// Worker threads (0 uses one per core)
    #[arg(long, default_value_t = 0)]
    jobs: usize,

    /// Skip the syntax check of produced queries
    #[arg(long)]
    no_validate: bool,
}

impl Cli {
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_path(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Config::default(),
        };
        config.interactive |= self.interactive;
        if self.no_validate {
            config.validate_output = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    // Defaults to INFO level, can be overridden with RUST_LOG
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.config()?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.jobs)
        .build_global()
        .context("failed to start worker pool")?;

    let tables_path = cli
        .tables
        .clone()
        .unwrap_or_else(|| cli.spider_path.join("tables.json"));
    let relational = load_tables(&tables_path)?;
    log::info!("loaded {} relational schemas", relational.len());

    let datasets = if cli.datasets.is_empty() {
        discover_datasets(&cli.spider_path)?
    } else {
        cli.datasets.clone()
    };
    if datasets.is_empty() {
        anyhow::bail!("no dataset files found in {}", cli.spider_path.display());
    }

    let output_dir = cli.output.clone().unwrap_or_else(|| cli.spider_path.clone());
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let registry = ModelRegistry::new(relational, SchemaDirectory::new(&cli.schemas));
    let interactive = config.interactive;
    let mut driver = BatchDriver::new(registry, config);
    if interactive {
        driver = driver.with_prompt(ConsolePrompt::stdio());
    }

    let mut total = RunSummary::default();
    for dataset in &datasets {
        let examples = load_examples(dataset)?;
        log::info!("compiling {} examples of {}", examples.len(), dataset.display());

        let reports = driver.run(examples);
        let outputs: Vec<_> = reports
            .iter()
            .flat_map(|report| report.successes.iter().cloned())
            .collect();

        let stem = dataset
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("dataset");
        let output_path = output_dir.join(format!("{}_graphql.json", stem));
        write_output(&output_path, &outputs)?;

        let summary = RunSummary::from_reports(&reports);
        println!("{}:\n{}", dataset.display(), summary);
        for report in &reports {
            total.add(report);
        }
    }

    if datasets.len() > 1 {
        println!("total:\n{}", total);
    }
    Ok(())
}
