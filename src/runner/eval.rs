use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::time::timeout;

use super::{Classification, ExecutionOutcome, LanguageRunner, render_command, run_captured};

/// Direct-evaluation strategy for languages invoked through an external
/// interpreter CLI (`clj -M -e` by default). The source is evaluated as a
/// single form; no files are written.
pub struct EvalRunner {
    command: Vec<String>,
    timeout: Duration,
    ns_form: Regex,
    main_defn: Regex,
}

impl EvalRunner {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self {
            command,
            timeout,
            ns_form: Regex::new(r"\(ns\s+[\w\.\-]+(?:\s+\(:[^\)]+\))*\s*\)")
                .expect("hard-coded pattern"),
            main_defn: Regex::new(r"\(defn\s+-main\s*\[").expect("hard-coded pattern"),
        }
    }

    /// Direct `-e` evaluation chokes on namespace declarations, and
    /// model-generated code sometimes defines `-main` without ever calling
    /// it. Both are normalized away before evaluation.
    fn normalize(&self, source_text: &str) -> String {
        let mut code = self.ns_form.replace_all(source_text, "").into_owned();
        if self.main_defn.is_match(&code) && !code.contains("(-main") {
            code = format!("{}\n(-main)", code.trim_end());
        }
        code
    }
}

#[async_trait]
impl LanguageRunner for EvalRunner {
    async fn run(&self, problem_number: u32, source_text: &str) -> ExecutionOutcome {
        let mut mapping = HashMap::new();
        mapping.insert("%CODE%", self.normalize(source_text));
        let command = render_command(&self.command, &mapping);

        match timeout(self.timeout, run_captured(&command, None)).await {
            Ok(Ok(output)) if output.status.success() => ExecutionOutcome::new(
                problem_number,
                Classification::Success,
                String::from_utf8_lossy(&output.stdout).into_owned(),
            ),
            Ok(Ok(output)) => {
                let mut diagnostic = String::from_utf8_lossy(&output.stdout).into_owned();
                diagnostic.push_str(&String::from_utf8_lossy(&output.stderr));
                ExecutionOutcome::new(
                    problem_number,
                    Classification::RuntimeError,
                    format!(
                        "{}\nError: evaluation exited with code {:?}",
                        diagnostic.trim_end(),
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
                log::warn!("Problem {problem_number}: evaluation timed out");
                ExecutionOutcome::new(problem_number, Classification::Timeout, String::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn eval_runner() -> EvalRunner {
        EvalRunner::new(
            vec![
                "clj".to_string(),
                "-M".to_string(),
                "-e".to_string(),
                "%CODE%".to_string(),
            ],
            Duration::from_secs(10),
        )
    }

    #[test]
    fn namespace_declarations_are_stripped() {
        let runner = eval_runner();
        let code = "(ns candidate.core (:require [clojure.string :as str]))\n(println 42)";
        let normalized = runner.normalize(code);
        assert!(!normalized.contains("(ns "));
        assert!(normalized.contains("(println 42)"));
    }

    #[test]
    fn uncalled_main_gets_invoked() {
        let runner = eval_runner();
        let code = "(defn -main [] (println 233168))";
        assert_eq!(
            runner.normalize(code),
            "(defn -main [] (println 233168))\n(-main)"
        );
    }

    #[test]
    fn already_called_main_is_left_alone() {
        let runner = eval_runner();
        let code = "(defn -main [] (println 233168))\n(-main)";
        assert_eq!(runner.normalize(code), code);
    }

    #[test]
    fn plain_expressions_are_untouched() {
        let runner = eval_runner();
        let code = "(println (reduce + (range 10)))";
        assert_eq!(runner.normalize(code), code);
    }

    #[tokio::test]
    async fn evaluation_output_is_captured() {
        // `echo` stands in for the interpreter CLI: it prints the evaluated
        // form and exits zero.
        let runner = EvalRunner::new(
            vec!["echo".to_string(), "%CODE%".to_string()],
            Duration::from_secs(5),
        );
        let outcome = runner.run(1, "(println 42)").await;
        assert_eq!(outcome.classification, Classification::Success);
        assert_eq!(outcome.raw_output, "(println 42)\n");
    }

    #[tokio::test]
    async fn nonzero_exit_becomes_a_failing_outcome() {
        let runner = EvalRunner::new(vec!["false".to_string()], Duration::from_secs(5));
        let outcome = runner.run(2, "(boom)").await;
        assert_eq!(outcome.classification, Classification::RuntimeError);
        assert!(outcome.raw_output.contains("exited with code"));
    }
}
