// src/store.rs
//! JSON documents on disk. Outputs are encoded fully before any file is
//! touched, so a failed run never leaves a half-written document behind.
use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::PipelineError;

fn read_text(path: &Path) -> Result<String, PipelineError> {
    fs::read_to_string(path).map_err(|source| PipelineError::ReadInput {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_json(path: &Path, text: &str) -> Result<Value, PipelineError> {
    serde_json::from_str(text).map_err(|source| PipelineError::InvalidJson {
        path: path.to_path_buf(),
        preview: text.chars().take(200).collect(),
        source,
    })
}

/// Read a whole JSON document.
pub fn read_json(path: &Path) -> Result<Value, PipelineError> {
    let text = read_text(path)?;
    parse_json(path, &text)
}

/// Read rows from a JSON array or, failing that, newline-delimited JSON.
/// Unparseable NDJSON lines are skipped with a warning.
pub fn read_rows(path: &Path) -> Result<Vec<Value>, PipelineError> {
    let text = read_text(path)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return match parse_json(path, trimmed)? {
            Value::Array(rows) => Ok(rows),
            other => Ok(vec![other]),
        };
    }

    let rows = trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(i, line)| match serde_json::from_str(line) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Skipping invalid JSON on line {}: {}", i + 1, e);
                None
            }
        })
        .collect();
    Ok(rows)
}

/// Pretty-print `doc` to `path`.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, doc: &T) -> Result<(), PipelineError> {
    let text = serde_json::to_string_pretty(doc)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| PipelineError::WriteOutput {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, text).map_err(|source| PipelineError::WriteOutput {
        path: path.to_path_buf(),
        source,
    })?;
    info!("💾 Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_array_and_ndjson() {
        let dir = tempfile::tempdir().unwrap();

        let array = dir.path().join("rows.json");
        fs::write(&array, r#"[{"a":1},{"a":2}]"#).unwrap();
        assert_eq!(read_rows(&array).unwrap().len(), 2);

        let ndjson = dir.path().join("rows.ndjson");
        fs::write(&ndjson, "{\"a\":1}\nnot json\n\n{\"a\":3}\n").unwrap();
        let rows = read_rows(&ndjson).unwrap();
        assert_eq!(rows, vec![json!({"a": 1}), json!({"a": 3})]);

        let empty = dir.path().join("empty.json");
        fs::write(&empty, "  \n").unwrap();
        assert!(read_rows(&empty).unwrap().is_empty());
    }

    #[test]
    fn invalid_document_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(read_json(&path), Err(PipelineError::InvalidJson { .. })));
        assert!(matches!(
            read_json(&dir.path().join("missing.json")),
            Err(PipelineError::ReadInput { .. })
        ));
    }

    #[test]
    fn writes_pretty_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("doc.json");
        write_json(&path, &json!({"ok": true})).unwrap();
        assert_eq!(read_json(&path).unwrap(), json!({"ok": true}));
        assert!(fs::read_to_string(&path).unwrap().contains('\n'));
    }
}
