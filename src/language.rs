use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Languages the execution engine knows how to run.
///
/// Anything outside this set is a configuration error: requesting it means
/// the caller asked for an inappropriate input set, not that one problem
/// misbehaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    Rust,
    Clojure,
}

impl Language {
    /// File extension used by stored solution artifacts in this language.
    pub fn extension(self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::Java => "java",
            Language::Rust => "rs",
            Language::Clojure => "clj",
        }
    }

    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension {
            "py" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "rs" => Ok(Language::Rust),
            "clj" => Ok(Language::Clojure),
            other => bail!("Unsupported extension: {other}"),
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "python" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "rust" => Ok(Language::Rust),
            "clojure" => Ok(Language::Clojure),
            other => bail!("Unsupported language: {other}"),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::Rust => "rust",
            Language::Clojure => "clojure",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
