use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use algobench::answers::AnswerBook;
use algobench::batch::RunContext;
use algobench::config::CliArgs;
use algobench::runner::Router;
use algobench::score::update_benchmark;
use algobench::store::{BenchmarkFile, DataRoot};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let config = cli.to_config()?;
    let languages = cli.languages()?;
    let data_root = DataRoot::new(&cli.data_dir);

    let answers = AnswerBook::load(&data_root.answers_path())?;
    let router = Arc::new(Router::from_config(&config)?);

    // One context per run: caches and collaborators live here, not in
    // process globals.
    let context = RunContext {
        data_root: data_root.clone(),
        answers,
        router,
        batch_size: cli.batch_size(),
        override_mode: cli.override_mode(),
        concurrent: cli.concurrent,
    };

    let store_names = if cli.allmodels {
        let names = BenchmarkFile::load(&data_root.benchmark_path()).store_names();
        if names.is_empty() {
            log::warn!("--allmodels requested but the benchmark document lists no stores");
        }
        names
    } else {
        vec![cli.model.clone()]
    };

    for language in &languages {
        for store_name in &store_names {
            let report = context.run_batch(store_name, *language).await?;
            log::info!(
                "Executed all {language} files for '{store_name}' ({} recorded)",
                report.record.len()
            );
            update_benchmark(
                &data_root,
                store_name,
                *language,
                context.batch_size,
                &report.record,
                &context.answers,
                report.enumerated,
            )?;
        }
    }

    Ok(())
}
