use anyhow::Result;
use serde_json::json;

use crate::answers::AnswerBook;
use crate::config::BatchSize;
use crate::language::Language;
use crate::store::{BenchmarkFile, DataRoot, SolutionsRecord};

/// Aggregated point averages for one complete batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchScore {
    pub candidate_point_average: f64,
    pub human_point_average: f64,
    pub maximum_point_average: f64,
    pub candidate_count: u32,
    pub counted: u32,
    /// `'0'`/`'1'` per problem index (`problem_number - 1`), recording
    /// exact correctness.
    pub test_bits: String,
}

/// Computes the weighted score for a complete outcome set.
///
/// Returns `None` when the in-cutoff outcome count does not equal the
/// declared batch size: an incomplete run never produces a score, so a
/// previously stored one is never overwritten by it.
pub fn score_batch(
    record: &SolutionsRecord,
    answers: &AnswerBook,
    batch_size: BatchSize,
    enumerated: usize,
) -> Option<BatchScore> {
    let outcomes: Vec<(u32, &str)> = record
        .entries()
        .iter()
        .filter(|(number, _)| batch_size.cutoff().is_none_or(|cutoff| **number <= cutoff))
        .map(|(number, output)| (*number, output.as_str()))
        .collect();

    let declared = batch_size.declared_size(enumerated);
    if outcomes.len() != declared {
        log::warn!(
            "Only {}/{declared} solutions were executed, so the benchmark was not updated",
            outcomes.len()
        );
        return None;
    }

    let mut human_points = 0.0;
    let mut candidate_points = 0.0;
    let mut maximum_points = 0.0;
    let mut human_count = 0.0;
    let mut candidate_count = 0u32;
    let mut counted = 0u32;
    let mut passed = Vec::new();

    for (number, output) in &outcomes {
        let Some(expected) = answers.get(*number) else {
            log::warn!("Problem {number} not found in expected answers, skipped");
            continue;
        };
        // Probability weight, not a boolean: the human reference score is a
        // continuous estimate over historical solver rates.
        let likelihood = expected.percentage_solved * 0.01;
        human_count += likelihood;
        human_points += expected.points * likelihood;
        maximum_points += expected.points;
        if *output == expected.solution {
            candidate_points += expected.points;
            candidate_count += 1;
            passed.push(*number);
        }
        counted += 1;
    }

    if counted == 0 {
        log::warn!("No problems with expected answers in this batch; nothing to score");
        return None;
    }

    let bits_len = match batch_size {
        BatchSize::Limit(limit) => limit as usize,
        BatchSize::All => outcomes
            .iter()
            .map(|(number, _)| *number as usize)
            .max()
            .unwrap_or(0),
    };
    let mut bits = vec![b'0'; bits_len];
    for number in &passed {
        let index = *number as usize - 1;
        if index < bits.len() {
            bits[index] = b'1';
        }
    }

    let round2 = |value: f64| (value * 100.0).round() / 100.0;
    let score = BatchScore {
        candidate_point_average: round2(candidate_points / f64::from(counted)),
        human_point_average: round2(human_points / f64::from(counted)),
        maximum_point_average: round2(maximum_points / f64::from(counted)),
        candidate_count,
        counted,
        test_bits: String::from_utf8(bits).unwrap_or_default(),
    };

    log::info!("Maximum points: {maximum_points} over {counted} problems");
    log::info!(
        "Human points: {human_points:.2} (~{human_count:.2} solved), average {}",
        score.human_point_average
    );
    log::info!(
        "Candidate points: {candidate_points} ({candidate_count} solved), average {}",
        score.candidate_point_average
    );

    Some(score)
}

/// Merges a batch score into the benchmark document and persists it
/// immediately. Returns `false` when the batch is incomplete, leaving the
/// stored entries untouched.
pub fn update_benchmark(
    data_root: &DataRoot,
    store_name: &str,
    language: Language,
    batch_size: BatchSize,
    record: &SolutionsRecord,
    answers: &AnswerBook,
    enumerated: usize,
) -> Result<bool> {
    let Some(score) = score_batch(record, answers, batch_size, enumerated) else {
        return Ok(false);
    };

    let series = format!("{language}-{}", batch_size.label());
    let benchmark_path = data_root.benchmark_path();
    let mut benchmark = BenchmarkFile::load(&benchmark_path);
    benchmark.merge_entry(
        store_name,
        [
            (series.clone(), json!(score.candidate_point_average)),
            (format!("{series}-test"), json!(score.test_bits)),
        ],
    );
    benchmark.save(&benchmark_path)?;

    log::info!(
        "Updated benchmark entry '{series}' for '{store_name}': {}",
        score.candidate_point_average
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::ExpectedAnswer;
    use pretty_assertions::assert_eq;

    fn answer(solution: &str, points: f64, percentage_solved: f64) -> ExpectedAnswer {
        ExpectedAnswer {
            solution: solution.to_string(),
            points,
            percentage_solved,
        }
    }

    /// 100 problems worth 5 points each, half of humanity solving each one.
    fn uniform_answers() -> AnswerBook {
        (1..=100)
            .map(|number| (number, answer(&number.to_string(), 5.0, 50.0)))
            .collect()
    }

    fn record_with_correct(correct: u32, total: u32) -> SolutionsRecord {
        let mut record = SolutionsRecord::default();
        for number in 1..=total {
            let output = if number <= correct {
                number.to_string()
            } else {
                "wrong".to_string()
            };
            record.insert(number, output);
        }
        record
    }

    #[test]
    fn complete_batch_produces_weighted_averages() {
        // 40 of 100 correct at 5 points each: 200 candidate points over 100
        // problems. Maximum is 500, human estimate 250.
        let score = score_batch(
            &record_with_correct(40, 100),
            &uniform_answers(),
            BatchSize::Limit(100),
            100,
        )
        .unwrap();
        assert_eq!(score.candidate_point_average, 2.0);
        assert_eq!(score.maximum_point_average, 5.0);
        assert_eq!(score.human_point_average, 2.5);
        assert_eq!(score.candidate_count, 40);
        assert_eq!(score.counted, 100);
    }

    #[test]
    fn incomplete_batch_is_not_scored() {
        assert!(
            score_batch(
                &record_with_correct(40, 99),
                &uniform_answers(),
                BatchSize::Limit(100),
                100,
            )
            .is_none()
        );
    }

    #[test]
    fn entries_beyond_the_cutoff_do_not_break_the_gate() {
        // A record left over from a larger run still scores the first 100.
        let record = record_with_correct(40, 120);
        let answers = (1..=120)
            .map(|number| (number, answer(&number.to_string(), 5.0, 50.0)))
            .collect();
        let score = score_batch(&record, &answers, BatchSize::Limit(100), 100).unwrap();
        assert_eq!(score.counted, 100);
        assert_eq!(score.candidate_count, 40);
    }

    #[test]
    fn bit_string_is_indexed_by_problem_number() {
        let score = score_batch(
            &record_with_correct(2, 5),
            &(1..=5)
                .map(|number| (number, answer(&number.to_string(), 1.0, 10.0)))
                .collect(),
            BatchSize::Limit(5),
            5,
        )
        .unwrap();
        assert_eq!(score.test_bits, "11000");
    }

    #[test]
    fn problems_without_expected_answers_are_excluded_from_all_counts() {
        let answers: AnswerBook = (1..=4)
            .map(|number| (number, answer(&number.to_string(), 4.0, 25.0)))
            .collect();
        // Problem 5 has a recorded outcome but no expected answer.
        let score = score_batch(
            &record_with_correct(4, 5),
            &answers,
            BatchSize::Limit(5),
            5,
        )
        .unwrap();
        assert_eq!(score.counted, 4);
        assert_eq!(score.candidate_point_average, 4.0);
        assert_eq!(score.test_bits, "11110");
    }

    #[test]
    fn unlimited_batches_score_once_everything_enumerated_ran() {
        let answers: AnswerBook = (1..=7)
            .map(|number| (number, answer(&number.to_string(), 2.0, 50.0)))
            .collect();
        let score = score_batch(&record_with_correct(7, 7), &answers, BatchSize::All, 7).unwrap();
        assert_eq!(score.candidate_point_average, 2.0);
        assert_eq!(score.test_bits, "1111111");
        assert!(score_batch(&record_with_correct(7, 7), &answers, BatchSize::All, 9).is_none());
    }

    #[test]
    fn rounding_is_to_two_decimals() {
        let answers: AnswerBook = (1..=3)
            .map(|number| (number, answer(&number.to_string(), 1.0, 33.0)))
            .collect();
        let score = score_batch(&record_with_correct(1, 3), &answers, BatchSize::Limit(3), 3)
            .unwrap();
        assert_eq!(score.candidate_point_average, 0.33);
        assert_eq!(score.human_point_average, 0.33);
    }
}
