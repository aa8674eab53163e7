use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use regex::Regex;
use tokio::time::timeout;

use crate::config::CompiledSpec;
use crate::language::Language;

use super::{Classification, ExecutionOutcome, LanguageRunner, render_command, run_captured};

/// Compile-then-run strategy, parameterized per compiled language by data:
/// command templates and the rule that names the source file.
pub struct CompiledRunner {
    language: Language,
    spec: CompiledSpec,
    type_name: Option<Regex>,
    compile_timeout: Duration,
    run_timeout: Duration,
}

impl CompiledRunner {
    pub fn new(
        language: Language,
        spec: CompiledSpec,
        compile_timeout: Duration,
        run_timeout: Duration,
    ) -> Result<Self> {
        let type_name = match &spec.type_name_pattern {
            Some(pattern) => Some(Regex::new(pattern)?),
            None => None,
        };
        if type_name.is_none() && spec.source_file.is_none() {
            bail!("Language {language} has neither a source file name nor a type name pattern");
        }
        Ok(Self {
            language,
            spec,
            type_name,
            compile_timeout,
            run_timeout,
        })
    }

    /// Resolves the (file name, type name) pair for one candidate source.
    /// A required-but-absent type name is a per-item compile failure.
    fn source_name(&self, source_text: &str) -> Result<(String, String)> {
        if let Some(pattern) = &self.type_name {
            let Some(capture) = pattern
                .captures(source_text)
                .and_then(|captures| captures.get(1))
            else {
                bail!("No type name matching '{pattern}' found in the source");
            };
            let name = capture.as_str().to_string();
            let file_name = format!("{name}.{}", self.language.extension());
            return Ok((file_name, name));
        }
        // new() guarantees one of the two naming rules is present.
        let file_name = self.spec.source_file.clone().unwrap_or_default();
        let name = file_name
            .split('.')
            .next()
            .unwrap_or(&file_name)
            .to_string();
        Ok((file_name, name))
    }

    async fn compile_and_run(
        &self,
        problem_number: u32,
        source_text: &str,
        dir: &Path,
    ) -> ExecutionOutcome {
        let (file_name, type_name) = match self.source_name(source_text) {
            Ok(names) => names,
            Err(e) => {
                return ExecutionOutcome::new(
                    problem_number,
                    Classification::CompileError,
                    format!("Error: {e}"),
                );
            }
        };

        let source_path = dir.join(&file_name);
        if let Err(e) = std::fs::write(&source_path, format!("{source_text}\n")) {
            return ExecutionOutcome::new(
                problem_number,
                Classification::RuntimeError,
                format!("Error writing source file: {e}"),
            );
        }

        let executable = dir.join(if cfg!(windows) { "main.exe" } else { "main" });
        let mut mapping = HashMap::new();
        mapping.insert("%INPUT%", source_path.to_string_lossy().into_owned());
        mapping.insert("%OUTPUT%", executable.to_string_lossy().into_owned());
        mapping.insert("%DIR%", dir.to_string_lossy().into_owned());
        mapping.insert("%NAME%", type_name);

        // Step 1: compile. A rejected source short-circuits; the artifact
        // is never executed.
        let compile_command = render_command(&self.spec.compile_command, &mapping);
        match timeout(self.compile_timeout, run_captured(&compile_command, Some(dir))).await {
            Ok(Ok(output)) if output.status.success() => {}
            Ok(Ok(output)) => {
                let mut diagnostic = String::from_utf8_lossy(&output.stdout).into_owned();
                diagnostic.push_str(&String::from_utf8_lossy(&output.stderr));
                return ExecutionOutcome::new(
                    problem_number,
                    Classification::CompileError,
                    format!("Error: {} compilation failed:\n{diagnostic}", self.language),
                );
            }
            Ok(Err(e)) => {
                return ExecutionOutcome::new(
                    problem_number,
                    Classification::CompileError,
                    format!("Error: compilation process error: {e}"),
                );
            }
            Err(_) => {
                log::warn!("Problem {problem_number}: {} compilation timed out", self.language);
                return ExecutionOutcome::new(
                    problem_number,
                    Classification::Timeout,
                    String::new(),
                );
            }
        }

        // Step 2: run the produced artifact under the execution timeout.
        let run_command = render_command(&self.spec.run_command, &mapping);
        match timeout(self.run_timeout, run_captured(&run_command, Some(dir))).await {
            Ok(Ok(output)) if output.status.success() => ExecutionOutcome::new(
                problem_number,
                Classification::Success,
                String::from_utf8_lossy(&output.stdout).into_owned(),
            ),
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                ExecutionOutcome::new(
                    problem_number,
                    Classification::RuntimeError,
                    format!(
                        "{}\nError: process exited with code {:?}",
                        stdout.trim_end(),
                        output.status.code()
                    ),
                )
            }
            Ok(Err(e)) => ExecutionOutcome::new(
                problem_number,
                Classification::RuntimeError,
                format!("Error executing code: {e}"),
            ),
            Err(_) => {
                log::warn!("Problem {problem_number}: {} execution timed out", self.language);
                ExecutionOutcome::new(problem_number, Classification::Timeout, String::new())
            }
        }
    }
}

#[async_trait]
impl LanguageRunner for CompiledRunner {
    async fn run(&self, problem_number: u32, source_text: &str) -> ExecutionOutcome {
        // A freshly named directory per invocation: concurrent runs can
        // never collide, and dropping it removes every artifact on every
        // exit path, timeouts included.
        let work_dir = match tempfile::Builder::new()
            .prefix(&format!("algobench-{}-", self.language))
            .tempdir()
        {
            Ok(dir) => dir,
            Err(e) => {
                return ExecutionOutcome::new(
                    problem_number,
                    Classification::RuntimeError,
                    format!("Error creating work directory: {e}"),
                );
            }
        };

        let outcome = self
            .compile_and_run(problem_number, source_text, work_dir.path())
            .await;

        if let Err(e) = work_dir.close() {
            log::warn!("Failed to remove work directory for problem {problem_number}: {e}");
        }
        outcome
    }
}
