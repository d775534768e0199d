//! One-line JSON audit trail of every wrapper invocation

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    /// RFC 3339 start time
    pub time: String,
    pub args: Vec<String>,
    pub exit_code: i32,
    pub bundle_entries: Vec<String>,
    pub errors: Vec<String>,
}

impl AuditRecord {
    #[must_use]
    pub fn new(args: Vec<String>) -> Self {
        Self {
            time: chrono::Local::now().to_rfc3339(),
            args,
            exit_code: 0,
            bundle_entries: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn error(&mut self, err: impl std::fmt::Display) {
        self.errors.push(err.to_string());
    }

    /// Append as a single line with one write
    ///
    /// # Errors
    /// Returns an error if the log cannot be opened or written.
    pub fn append_to(&self, path: &Path) -> io::Result<()> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(&line)
    }
}

/// Sorted entry names of `dir`, empty if it cannot be read
#[must_use]
pub fn list_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| entries.flatten().map(|e| e.file_name().to_string_lossy().into_owned()).collect())
        .unwrap_or_default();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_are_appended_as_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log/dkrunc.log");

        let mut first = AuditRecord::new(vec!["create".to_string(), "abc".to_string()]);
        first.error("mount destination /x already present in spec");
        first.append_to(&path).unwrap();

        let mut second = AuditRecord::new(vec!["start".to_string()]);
        second.exit_code = 1;
        second.append_to(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["args"], serde_json::json!(["create", "abc"]));
        assert_eq!(value["exit_code"], 0);
        assert_eq!(value["errors"].as_array().unwrap().len(), 1);
        assert!(chrono::DateTime::parse_from_rfc3339(value["time"].as_str().unwrap()).is_ok());

        let value: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(value["exit_code"], 1);
    }

    #[test]
    fn test_list_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), "{}").unwrap();
        fs::create_dir(dir.path().join("rootfs")).unwrap();

        assert_eq!(list_entries(dir.path()), vec!["config.json", "rootfs"]);
        assert!(list_entries(&dir.path().join("missing")).is_empty());
    }
}
