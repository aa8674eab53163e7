use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};

use crate::language::Language;

const ANSWERS_FILE: &str = "answers.json";
const RECORD_FILE: &str = "solutions.json";
const BENCHMARK_FILE: &str = "benchmark.json";

/// Series used to order the benchmark document on every write; the
/// leaderboard reads entries top-down, so the strongest stores come first.
const PRIMARY_SERIES: &str = "python-100";

/// Filesystem layout of all persisted benchmark state.
#[derive(Debug, Clone)]
pub struct DataRoot {
    root: PathBuf,
}

impl DataRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn answers_path(&self) -> PathBuf {
        self.root.join(ANSWERS_FILE)
    }

    /// Directory holding one (store, language) pair's solution artifacts.
    pub fn solutions_dir(&self, store_name: &str, language: Language) -> PathBuf {
        self.root
            .join("solutions")
            .join(store_name)
            .join(language.name())
    }

    pub fn record_path(&self, store_name: &str, language: Language) -> PathBuf {
        self.solutions_dir(store_name, language).join(RECORD_FILE)
    }

    pub fn benchmark_path(&self) -> PathBuf {
        self.root.join(BENCHMARK_FILE)
    }
}

/// Enumerates candidate artifact files for one (store, language) pair.
///
/// Dotfiles and foreign extensions are skipped; stems that are not numbers
/// are skipped with a warning. The result is ordered by **numeric** problem
/// number and cut off after the configured limit, so zero-padded file names
/// are a convention rather than a correctness requirement.
pub fn enumerate_artifacts(
    dir: &Path,
    language: Language,
    cutoff: Option<u32>,
) -> Result<Vec<(u32, PathBuf)>> {
    if !dir.is_dir() {
        bail!("Directory '{}' does not exist", dir.display());
    }

    let suffix = format!(".{}", language.extension());
    let mut numbered = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to list '{}'", dir.display()))?
    {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let Some(stem) = name.strip_suffix(&suffix) else {
            continue;
        };
        match stem.parse::<u32>() {
            Ok(number) => numbered.push((number, path)),
            Err(_) => log::warn!("Skipping '{name}': file stem is not a problem number"),
        }
    }

    numbered.sort_by_key(|(number, _)| *number);
    if let Some(cutoff) = cutoff {
        let within = numbered
            .iter()
            .position(|(number, _)| *number > cutoff)
            .unwrap_or(numbered.len());
        numbered.truncate(within);
    }
    Ok(numbered)
}

/// Per (store, language) checkpoint mapping problem number to the final
/// output line. Durable across interruptions between problems; entries are
/// only ever overwritten under an explicit override mode.
#[derive(Debug, Default)]
pub struct SolutionsRecord {
    entries: BTreeMap<u32, String>,
}

impl SolutionsRecord {
    /// Loads an existing record, or an empty one when nothing is stored yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open record '{}'", path.display()))?;
        let raw: BTreeMap<String, String> = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to parse record '{}'", path.display()))?;

        let mut entries = BTreeMap::new();
        for (key, output) in raw {
            match key.parse::<u32>() {
                Ok(number) => {
                    entries.insert(number, output);
                }
                Err(_) => log::warn!("Skipping record entry with non-numeric key '{key}'"),
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, problem_number: u32) -> Option<&str> {
        self.entries.get(&problem_number).map(String::as_str)
    }

    pub fn insert(&mut self, problem_number: u32, output: String) {
        self.entries.insert(problem_number, output);
    }

    pub fn entries(&self) -> &BTreeMap<u32, String> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the full record, keys zero-padded to match the artifact
    /// naming convention.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut document = Map::new();
        for (number, output) in &self.entries {
            document.insert(format!("{number:04}"), Value::String(output.clone()));
        }
        let text = serde_json::to_string_pretty(&Value::Object(document))?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write record '{}'", path.display()))
    }
}

/// The benchmark document: store name → series key → score or bit string.
///
/// Missing or corrupt files degrade to an empty document with a logged
/// error, so one bad write never blocks future scoring.
#[derive(Debug, Default)]
pub struct BenchmarkFile {
    entries: Map<String, Value>,
}

impl BenchmarkFile {
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => {
                log::info!(
                    "No benchmark document at '{}', starting from an empty one",
                    path.display()
                );
                return Self::default();
            }
        };
        match serde_json::from_str::<Map<String, Value>>(&text) {
            Ok(entries) => Self { entries },
            Err(e) => {
                log::error!("Error decoding benchmark document '{}': {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn store_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn series(&self, store_name: &str, key: &str) -> Option<&Value> {
        self.entries.get(store_name)?.get(key)
    }

    /// Merges series values into one store's entry, preserving the rest.
    pub fn merge_entry(
        &mut self,
        store_name: &str,
        values: impl IntoIterator<Item = (String, Value)>,
    ) {
        let entry = self
            .entries
            .entry(store_name.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = entry {
            for (key, value) in values {
                map.insert(key, value);
            }
        }
    }

    /// Persists the document, sorted by the primary series descending.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut ordered: Vec<(&String, &Value)> = self.entries.iter().collect();
        let score_of = |value: &Value| {
            value
                .get(PRIMARY_SERIES)
                .and_then(Value::as_f64)
                .unwrap_or(0.0)
        };
        ordered.sort_by(|(_, a), (_, b)| {
            score_of(b)
                .partial_cmp(&score_of(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let document: Map<String, Value> = ordered
            .into_iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let text = serde_json::to_string_pretty(&Value::Object(document))?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write benchmark document '{}'", path.display()))
    }
}
