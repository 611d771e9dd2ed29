//! Generic tag extraction through `exiftool -json`.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    tags::{TagExtractor, TagMap},
};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use crate::command::{run_command, DEFAULT_COMMAND_TIMEOUT};

/// Tag extractor that shells out to exiftool.
pub struct ExiftoolExtractor {
    program: String,
    timeout: Duration,
}

impl ExiftoolExtractor {
    pub fn new() -> Self {
        Self {
            program: "exiftool".to_string(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ExiftoolExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TagExtractor for ExiftoolExtractor {
    async fn extract(&self, path: &Path) -> Result<TagMap> {
        let path_arg = path.to_string_lossy();
        let output = run_command(&self.program, &["-json", &path_arg], self.timeout).await?;
        parse_exiftool_output(&output)
    }
}

/// exiftool prints a JSON array with one object per input file.
fn parse_exiftool_output(raw: &str) -> Result<TagMap> {
    let malformed = |message: String| BridgeError::Malformed {
        source_name: "exiftool".to_string(),
        message,
    };

    let value: Value = serde_json::from_str(raw).map_err(|e| malformed(e.to_string()))?;
    match value {
        Value::Array(items) => match items.into_iter().next() {
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(malformed(format!("expected object, got {}", other))),
            None => Err(malformed("empty result array".to_string())),
        },
        other => Err(malformed(format!("expected array, got {}", other))),
    }
}
