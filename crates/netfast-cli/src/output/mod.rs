//! Output formatting for different formats.

use anyhow::Result;
use clap::ValueEnum;
use netfast_agent::Envelope;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Available output formats.
#[derive(Debug, Clone, Copy, Default, ValueEnum, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed tables with colors
    #[default]
    Pretty,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "table" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => anyhow::bail!(
                "Unknown output format: {}\n\
                 Valid formats: pretty, json, yaml",
                s
            ),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
        }
    }
}

impl OutputFormat {
    /// Print `value` if this is a machine-readable format.
    ///
    /// Returns false for `Pretty`, leaving rendering to the caller.
    pub fn print_structured<T: Serialize>(self, value: &T) -> Result<bool> {
        match self {
            Self::Json => println!("{}", serde_json::to_string_pretty(value)?),
            Self::Yaml => print!("{}", serde_yaml::to_string(value)?),
            Self::Pretty => return Ok(false),
        }
        Ok(true)
    }
}

/// Turn a handler envelope into a command result.
///
/// The user-facing message becomes the error; `verbose` appends the
/// technical detail.
pub fn into_result<T>(envelope: Envelope<T>, verbose: bool) -> Result<T> {
    match envelope {
        Envelope {
            success: true,
            result: Some(value),
            ..
        } => Ok(value),
        Envelope { error, detail, .. } => {
            let message = error.unwrap_or_else(|| "Operation failed".to_string());
            match detail {
                Some(detail) if verbose => anyhow::bail!("{message}\n\nDetail: {detail}"),
                _ => anyhow::bail!("{message}"),
            }
        }
    }
}
