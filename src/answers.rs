use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Canonical correct value for one problem, with its point weight and the
/// fraction of historical human solvers who got it right.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpectedAnswer {
    pub solution: String,
    pub points: f64,
    /// 0..100, used as a probability weight when estimating human scores.
    pub percentage_solved: f64,
}

/// All expected answers for one run, keyed by numeric problem number.
/// Loaded once at startup and never mutated afterwards.
#[derive(Debug, Default)]
pub struct AnswerBook {
    answers: HashMap<u32, ExpectedAnswer>,
}

impl AnswerBook {
    /// Loads the answer document. Keys are stored zero-padded; entries whose
    /// key is not a number are skipped with a warning.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open answer file '{}'", path.display()))?;
        let reader = std::io::BufReader::new(file);
        let raw: HashMap<String, ExpectedAnswer> = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse answer file '{}'", path.display()))?;

        let mut answers = HashMap::with_capacity(raw.len());
        for (key, answer) in raw {
            match key.parse::<u32>() {
                Ok(number) => {
                    answers.insert(number, answer);
                }
                Err(_) => log::warn!("Skipping answer entry with non-numeric key '{key}'"),
            }
        }

        log::info!(
            "Loaded {} expected answers from '{}'",
            answers.len(),
            path.display()
        );
        Ok(Self { answers })
    }

    pub fn get(&self, problem_number: u32) -> Option<&ExpectedAnswer> {
        self.answers.get(&problem_number)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

impl FromIterator<(u32, ExpectedAnswer)> for AnswerBook {
    fn from_iter<T: IntoIterator<Item = (u32, ExpectedAnswer)>>(iter: T) -> Self {
        Self {
            answers: iter.into_iter().collect(),
        }
    }
}

/// Scans raw solution text for a literal occurrence of the expected answer.
///
/// Model responses sometimes contain only reasoning prose; when upstream code
/// extraction falls back to treating the whole response as code, the correct
/// final answer may still be stated verbatim in it. Thousands separators are
/// stripped first so `233,168` matches `233168`. A hit means the candidate is
/// credited without any process being spawned for this problem.
pub fn find_embedded_answer(source_text: &str, expected: &ExpectedAnswer) -> Option<String> {
    let solution = expected.solution.as_str();
    if solution.is_empty() {
        return None;
    }

    let normalized = source_text.trim().replace(',', "");
    let index = normalized.find(solution)?;

    let start = index.saturating_sub(20);
    let end = (index + solution.len() + 20).min(normalized.len());
    let context = normalized.get(start..end).unwrap_or(solution);
    log::info!("Found expected answer {solution} in content: ...{context}...");

    Some(solution.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn answer(solution: &str) -> ExpectedAnswer {
        ExpectedAnswer {
            solution: solution.to_string(),
            points: 5.0,
            percentage_solved: 50.0,
        }
    }

    #[test]
    fn finds_answer_in_prose() {
        let text = "After summing all multiples of 3 and 5, the result is 233168.";
        assert_eq!(
            find_embedded_answer(text, &answer("233168")),
            Some("233168".to_string())
        );
    }

    #[test]
    fn strips_thousands_separators_before_matching() {
        let text = "The final answer is 233,168 as computed above.";
        assert_eq!(
            find_embedded_answer(text, &answer("233168")),
            Some("233168".to_string())
        );
    }

    #[test]
    fn no_match_yields_none() {
        assert_eq!(find_embedded_answer("print(1 + 2)", &answer("233168")), None);
    }

    #[test]
    fn empty_expected_solution_never_matches() {
        assert_eq!(find_embedded_answer("anything", &answer("")), None);
    }

    #[test]
    fn book_lookup_by_numeric_key() {
        let book: AnswerBook = [(1, answer("233168")), (2, answer("4613732"))]
            .into_iter()
            .collect();
        assert_eq!(book.len(), 2);
        assert_eq!(book.get(2).unwrap().solution, "4613732");
        assert!(book.get(3).is_none());
    }
}
