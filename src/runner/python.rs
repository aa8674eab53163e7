use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use super::{Classification, ExecutionOutcome, LanguageRunner};

/// Restricted interpreter harness passed to `python3 -c`. The candidate
/// source arrives on stdin, so untrusted text never touches the command
/// line. Builtins and imports are limited to the enumerated allow-lists;
/// every other import is rejected with an ImportError inside the child, and
/// exceptions are rendered as a diagnostic on stdout rather than escaping.
const SANDBOX_BOOTSTRAP: &str = r#"
import sys
import builtins
import traceback

SAFE_BUILTINS = [
    'abs', 'all', 'any', 'ascii', 'bin', 'bool', 'bytearray',
    'bytes', 'callable', 'chr', 'complex', 'delattr', 'dict',
    'dir', 'divmod', 'enumerate', 'eval', 'exit', 'filter', 'float',
    'frozenset', 'getattr', 'globals', 'hasattr', 'hash', 'hex', 'id',
    'int', 'isinstance', 'issubclass', 'iter', 'len', 'list', 'locals',
    'map', 'max', 'min', 'next', 'oct', 'ord', 'pow', 'print', 'property',
    'range', 'repr', 'reversed', 'round', 'set', 'setattr', 'slice',
    'sorted', 'str', 'sum', 'tuple', 'type', 'vars', 'zip',
    'ZeroDivisionError', 'ValueError',
]
ALLOWED_MODULES = [
    'math', 'itertools', 'random', 'collections', 'datetime', 'string',
    'sympy', 'heapq', 'decimal', 'numpy', 'fractions',
]

code = sys.stdin.read()

allowed_builtins = {}
for name in SAFE_BUILTINS:
    if hasattr(builtins, name):
        allowed_builtins[name] = getattr(builtins, name)

allowed_modules = {}
for name in ALLOWED_MODULES:
    try:
        allowed_modules[name] = __import__(name)
    except ImportError:
        pass

def safe_import(name, globals=None, locals=None, fromlist=(), level=0):
    if name in allowed_modules:
        return allowed_modules[name]
    raise ImportError('Importing module %r is not allowed.' % name)

allowed_builtins['__import__'] = safe_import

restricted_globals = {
    '__builtins__': allowed_builtins,
    '__import__': safe_import,
    '__name__': '__main__',
    '__file__': None,
    '__package__': None,
}
restricted_globals.update(allowed_modules)

try:
    exec(code, restricted_globals)
except BaseException as e:
    print('Error executing code: %s' % e)
    print('Traceback:')
    traceback.print_exc(file=sys.stdout)
    sys.exit(1)
"#;

/// Executes candidate text in a separate restricted interpreter process.
///
/// A separate process, not an in-process call: only the process boundary
/// allows unconditional termination when the timeout expires.
pub struct PythonSandbox {
    command: Vec<String>,
    timeout: Duration,
}

impl PythonSandbox {
    pub fn new(timeout: Duration) -> Self {
        Self {
            command: vec![
                "python3".to_string(),
                "-c".to_string(),
                SANDBOX_BOOTSTRAP.to_string(),
            ],
            timeout,
        }
    }

    #[cfg(test)]
    fn with_command(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    async fn execute(&self, source_text: &str) -> Result<(bool, String)> {
        let (program, args) = self
            .command
            .split_first()
            .context("Empty sandbox command")?;

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn '{program}'"))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(source_text.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() && text.trim().is_empty() {
            // Bootstrap-level failures (bad interpreter flags, OOM kill)
            // leave nothing on stdout; fall back to stderr.
            text = String::from_utf8_lossy(&output.stderr).into_owned();
        }
        Ok((output.status.success(), text))
    }
}

#[async_trait]
impl LanguageRunner for PythonSandbox {
    async fn run(&self, problem_number: u32, source_text: &str) -> ExecutionOutcome {
        match timeout(self.timeout, self.execute(source_text)).await {
            Ok(Ok((true, output))) => {
                ExecutionOutcome::new(problem_number, Classification::Success, output)
            }
            Ok(Ok((false, diagnostic))) => {
                ExecutionOutcome::new(problem_number, Classification::RuntimeError, diagnostic)
            }
            Ok(Err(e)) => ExecutionOutcome::new(
                problem_number,
                Classification::RuntimeError,
                format!("Error executing code: {e}"),
            ),
            Err(_) => {
                log::warn!("Problem {problem_number}: sandbox execution timed out");
                // No partial output is ever returned for a timed-out run.
                ExecutionOutcome::new(problem_number, Classification::Timeout, String::new())
            }
        }
    }
}
