mod compiled;
mod eval;
mod python;

pub use compiled::CompiledRunner;
pub use eval::EvalRunner;
pub use python::PythonSandbox;

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use crate::config::{Config, StrategyConfig};
use crate::language::Language;

/// Categorical result of attempting one candidate execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    CompileError,
    Timeout,
    RuntimeError,
    /// The expected answer was found verbatim in the source text; nothing
    /// was executed.
    EmbeddedAnswerFound,
}

/// What came out of running (or refusing to run) one solution artifact.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub problem_number: u32,
    pub raw_output: String,
    pub classification: Classification,
}

impl ExecutionOutcome {
    pub fn new(problem_number: u32, classification: Classification, raw_output: String) -> Self {
        Self {
            problem_number,
            raw_output,
            classification,
        }
    }
}

/// Reduces raw program output to the single line compared against the
/// expected solution. Candidate programs are presumed to print diagnostics
/// before a final answer line.
pub fn final_output_line(raw_output: &str) -> String {
    raw_output.trim().lines().last().unwrap_or("").to_string()
}

/// One execution strategy per supported language family.
///
/// Implementations absorb every per-problem failure into a classified
/// outcome; they never leak temporary artifacts and never exceed the
/// configured timeout by more than process-reap overhead.
#[async_trait]
pub trait LanguageRunner: Send + Sync {
    async fn run(&self, problem_number: u32, source_text: &str) -> ExecutionOutcome;
}

/// Dispatch table mapping a language tag to its runner.
pub struct Router {
    runners: HashMap<Language, Arc<dyn LanguageRunner>>,
}

impl Router {
    /// Builds the runner registry from the language table.
    pub fn from_config(config: &Config) -> Result<Self> {
        let run_timeout = Duration::from_secs(config.timeout_secs);
        let compile_timeout = Duration::from_secs(config.compile_timeout_secs);

        let mut runners: HashMap<Language, Arc<dyn LanguageRunner>> = HashMap::new();
        for language_config in &config.languages {
            let language = language_config.language;
            let runner: Arc<dyn LanguageRunner> = match &language_config.strategy {
                StrategyConfig::Sandbox => Arc::new(PythonSandbox::new(run_timeout)),
                StrategyConfig::Compiled(spec) => Arc::new(CompiledRunner::new(
                    language,
                    spec.clone(),
                    compile_timeout,
                    run_timeout,
                )?),
                StrategyConfig::Interpreter { command } => {
                    Arc::new(EvalRunner::new(command.clone(), run_timeout))
                }
            };
            runners.insert(language, runner);
        }

        Ok(Self { runners })
    }

    /// A registry with explicitly registered runners.
    pub fn with_runners(
        entries: impl IntoIterator<Item = (Language, Arc<dyn LanguageRunner>)>,
    ) -> Self {
        Self {
            runners: entries.into_iter().collect(),
        }
    }

    /// Looks up the runner for a language. A miss is a fatal configuration
    /// error: the caller requested an input set the engine was never set up
    /// for, so the whole batch aborts rather than one item.
    pub fn dispatch(&self, language: Language) -> Result<&Arc<dyn LanguageRunner>> {
        match self.runners.get(&language) {
            Some(runner) => Ok(runner),
            None => bail!("No runner registered for language: {language}"),
        }
    }
}

/// Applies `%PLACEHOLDER%` substitutions to a command template.
pub(crate) fn render_command(template: &[String], mapping: &HashMap<&str, String>) -> Vec<String> {
    template
        .iter()
        .map(|part| {
            let mut rendered = part.clone();
            for (key, value) in mapping {
                rendered = rendered.replace(key, value);
            }
            rendered
        })
        .collect()
}

/// Spawns a command with stdout/stderr captured fully in memory.
///
/// `kill_on_drop` guarantees the child is reaped when the caller's timeout
/// drops this future mid-flight.
pub(crate) async fn run_captured(
    command: &[String],
    current_dir: Option<&Path>,
) -> Result<std::process::Output> {
    let (program, args) = command.split_first().context("Empty command template")?;

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }

    let child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn '{program}'"))?;
    Ok(child.wait_with_output().await?)
}
