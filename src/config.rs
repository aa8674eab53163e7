use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::language::Language;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_COMPILE_TIMEOUT_SECS: u64 = 30;

#[derive(Parser)]
#[command(name = "algobench", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Store name whose solutions are executed and scored
    #[arg(long = "model", short = 'm', default_value = "llama3.2:latest")]
    pub model: String,

    /// Comma-separated list of languages to run
    #[arg(long = "language", short = 'l', default_value = "python,java,rust,clojure")]
    pub language: String,

    /// Run every store already recorded in the benchmark document
    #[arg(long = "allmodels", default_value_t = false)]
    pub allmodels: bool,

    /// Only the first 100 problems (default)
    #[arg(long = "n100", default_value_t = false)]
    pub n100: bool,

    /// Only the first 200 problems
    #[arg(long = "n200", default_value_t = false)]
    pub n200: bool,

    /// Only the first 400 problems
    #[arg(long = "n400", default_value_t = false)]
    pub n400: bool,

    /// All problems
    #[arg(long = "nall", default_value_t = false)]
    pub nall: bool,

    /// Fan executions out to a bounded worker pool instead of running
    /// one at a time
    #[arg(long = "concurrent", default_value_t = false)]
    pub concurrent: bool,

    /// Per-execution wall-clock timeout in seconds
    #[arg(long = "timeout", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Re-run every problem, overwriting recorded outputs
    #[arg(long = "rerun-all", default_value_t = false)]
    pub rerun_all: bool,

    /// Re-run only problems whose recorded output is not the expected answer
    #[arg(long = "rerun-failures", default_value_t = false)]
    pub rerun_failures: bool,

    /// Root directory holding answers.json, solutions/ and benchmark.json
    #[arg(long = "data-dir", short = 'd', default_value = ".")]
    pub data_dir: PathBuf,

    /// Optional JSON file overriding the built-in language table
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<PathBuf>,
}

impl CliArgs {
    /// Load the execution configuration, from the given file when present.
    pub fn to_config(&self) -> Result<Config> {
        let mut config = match &self.config_path {
            Some(path) => {
                let file = std::fs::File::open(path)
                    .with_context(|| format!("Failed to open config file '{}'", path.display()))?;
                let reader = std::io::BufReader::new(file);
                serde_json::from_reader(reader)
                    .with_context(|| format!("Failed to parse config file '{}'", path.display()))?
            }
            None => Config::default(),
        };
        config.timeout_secs = self.timeout_secs;
        Ok(config)
    }

    pub fn batch_size(&self) -> BatchSize {
        if self.nall {
            BatchSize::All
        } else if self.n400 {
            BatchSize::Limit(400)
        } else if self.n200 {
            BatchSize::Limit(200)
        } else {
            BatchSize::Limit(100)
        }
    }

    pub fn override_mode(&self) -> OverrideMode {
        if self.rerun_all {
            OverrideMode::RerunAll
        } else if self.rerun_failures {
            OverrideMode::RerunFailures
        } else {
            OverrideMode::SkipExisting
        }
    }

    pub fn languages(&self) -> Result<Vec<Language>> {
        self.language
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(Language::from_name)
            .collect()
    }
}

/// Declared number of problems that makes one benchmark run complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSize {
    Limit(u32),
    All,
}

impl BatchSize {
    /// Highest problem number included in the batch, if bounded.
    pub fn cutoff(self) -> Option<u32> {
        match self {
            BatchSize::Limit(limit) => Some(limit),
            BatchSize::All => None,
        }
    }

    /// Outcome count that counts as a complete batch. The unlimited
    /// sentinel is complete once every enumerated artifact has run.
    pub fn declared_size(self, enumerated: usize) -> usize {
        match self {
            BatchSize::Limit(limit) => limit as usize,
            BatchSize::All => enumerated,
        }
    }

    /// Fragment used in benchmark series keys ("100", "200", "400", "all").
    pub fn label(self) -> String {
        match self {
            BatchSize::Limit(limit) => limit.to_string(),
            BatchSize::All => "all".to_string(),
        }
    }
}

/// What to do with problems that already have a recorded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideMode {
    /// Previously completed problems are left untouched (default).
    SkipExisting,
    /// Re-attempt problems whose recorded output misses the expected answer.
    RerunFailures,
    /// Re-attempt everything, overwriting recorded outputs.
    RerunAll,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_compile_timeout_secs")]
    pub compile_timeout_secs: u64,
    pub languages: Vec<LanguageConfig>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_compile_timeout_secs() -> u64 {
    DEFAULT_COMPILE_TIMEOUT_SECS
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LanguageConfig {
    pub language: Language,
    #[serde(flatten)]
    pub strategy: StrategyConfig,
}

/// Execution strategy for one language. Per-language quirks live here as
/// data (command templates, source naming rules) rather than as code.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Restricted interpreter subprocess; the source arrives on stdin.
    Sandbox,
    /// Compile with an external toolchain, then run the produced artifact.
    Compiled(CompiledSpec),
    /// Evaluate directly through an external interpreter CLI.
    Interpreter { command: Vec<String> },
}

/// Toolchain contract for one compiled language.
///
/// Command templates use `%INPUT%` (source path), `%OUTPUT%` (artifact
/// path), `%DIR%` (work directory) and `%NAME%` (required type name)
/// placeholders.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CompiledSpec {
    /// Fixed source file name, for toolchains that accept any name.
    #[serde(default)]
    pub source_file: Option<String>,
    /// Pattern whose first capture is the type name the source file must be
    /// named after. Absence of a match in a candidate is a per-item
    /// compile failure.
    #[serde(default)]
    pub type_name_pattern: Option<String>,
    pub compile_command: Vec<String>,
    pub run_command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let cmd = |parts: &[&str]| parts.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            compile_timeout_secs: DEFAULT_COMPILE_TIMEOUT_SECS,
            languages: vec![
                LanguageConfig {
                    language: Language::Python,
                    strategy: StrategyConfig::Sandbox,
                },
                LanguageConfig {
                    language: Language::Rust,
                    strategy: StrategyConfig::Compiled(CompiledSpec {
                        source_file: Some("main.rs".to_string()),
                        type_name_pattern: None,
                        compile_command: cmd(&["rustc", "-A", "warnings", "%INPUT%", "-o", "%OUTPUT%"]),
                        run_command: cmd(&["%OUTPUT%"]),
                    }),
                },
                LanguageConfig {
                    language: Language::Java,
                    strategy: StrategyConfig::Compiled(CompiledSpec {
                        source_file: None,
                        type_name_pattern: Some(r"public\s+class\s+(\w+)".to_string()),
                        compile_command: cmd(&["javac", "%INPUT%"]),
                        run_command: cmd(&["java", "-cp", "%DIR%", "%NAME%"]),
                    }),
                },
                LanguageConfig {
                    language: Language::Clojure,
                    strategy: StrategyConfig::Interpreter {
                        command: cmd(&["clj", "-M", "-e", "%CODE%"]),
                    },
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_covers_all_supported_languages() {
        let config = Config::default();
        let mut languages: Vec<Language> =
            config.languages.iter().map(|l| l.language).collect();
        languages.sort();
        assert_eq!(
            languages,
            vec![
                Language::Python,
                Language::Java,
                Language::Rust,
                Language::Clojure,
            ]
        );
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.compile_timeout_secs, 30);
    }

    #[test]
    fn test_config_deserialization() {
        let raw = r#"{
            "timeout_secs": 5,
            "languages": [
                { "language": "java",
                  "strategy": "compiled",
                  "type_name_pattern": "public\\s+class\\s+(\\w+)",
                  "compile_command": ["javac", "%INPUT%"],
                  "run_command": ["java", "-cp", "%DIR%", "%NAME%"] },
                { "language": "python", "strategy": "sandbox" }
            ]
        }"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.compile_timeout_secs, DEFAULT_COMPILE_TIMEOUT_SECS);
        assert_eq!(config.languages[0].language, Language::Java);
        assert_eq!(config.languages[1].strategy, StrategyConfig::Sandbox);
    }

    #[test]
    fn batch_size_flags_pick_largest_requested() {
        let args = CliArgs::parse_from(["algobench", "--n200"]);
        assert_eq!(args.batch_size(), BatchSize::Limit(200));
        let args = CliArgs::parse_from(["algobench", "--nall"]);
        assert_eq!(args.batch_size(), BatchSize::All);
        let args = CliArgs::parse_from(["algobench"]);
        assert_eq!(args.batch_size(), BatchSize::Limit(100));
    }

    #[test]
    fn override_mode_defaults_to_skip_existing() {
        let args = CliArgs::parse_from(["algobench"]);
        assert_eq!(args.override_mode(), OverrideMode::SkipExisting);
        let args = CliArgs::parse_from(["algobench", "--rerun-failures"]);
        assert_eq!(args.override_mode(), OverrideMode::RerunFailures);
    }

    #[test]
    fn language_list_is_parsed_and_validated() {
        let args = CliArgs::parse_from(["algobench", "--language", "python, rust"]);
        assert_eq!(
            args.languages().unwrap(),
            vec![Language::Python, Language::Rust]
        );
        let args = CliArgs::parse_from(["algobench", "--language", "cobol"]);
        assert!(args.languages().is_err());
    }

    #[test]
    fn declared_size_for_all_follows_enumeration() {
        assert_eq!(BatchSize::Limit(100).declared_size(73), 100);
        assert_eq!(BatchSize::All.declared_size(73), 73);
        assert_eq!(BatchSize::All.label(), "all");
        assert_eq!(BatchSize::Limit(400).label(), "400");
    }
}
