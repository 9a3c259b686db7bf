//! Node names from the `.row` companion file
//!
//! A row file is a list of sections, each starting with a
//! `LEVEL <level> SIZE <n>` line followed by `<n>` labels, one per line.
//! Annotated traces name their nodes in the `APPL` section, in node-id order.

use crate::error::{Result, StressError};
use std::path::{Path, PathBuf};

pub(crate) const APPL_LEVEL: &str = "APPL";
pub(crate) const NODE_LEVEL: &str = "NODE";

/// Row file path for a trace: same path with a `.row` extension
pub fn row_file_path(trace_path: &Path) -> PathBuf {
    trace_path.with_extension("row")
}

/// Read node names from a row file
pub fn read_node_names(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| StressError::io(path, e))?;
    parse_node_names(&content).map_err(|reason| StressError::format(path, reason))
}

/// Parse node names out of row file content
pub fn parse_node_names(content: &str) -> std::result::Result<Vec<String>, String> {
    parse_level(content, APPL_LEVEL)
}

/// Labels of the first `LEVEL <level> SIZE <n>` section
pub fn parse_level(content: &str, level: &str) -> std::result::Result<Vec<String>, String> {
    let header = format!("LEVEL {} SIZE", level);
    let mut lines = content.lines();

    let size_line = lines
        .by_ref()
        .find(|l| l.contains(&header))
        .ok_or_else(|| format!("missing '{} <n>' section", header))?;
    let count: usize = size_line
        .split_whitespace()
        .last()
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| format!("invalid node count in '{}'", size_line.trim()))?;

    let names: Vec<String> = lines.take(count).map(|l| l.trim().to_string()).collect();
    if names.len() < count {
        tracing::warn!(
            "Row file declares {} {} labels but lists only {}",
            count,
            level,
            names.len()
        );
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROW: &str = "LEVEL CPU SIZE 2\n1.node-a\n2.node-b\n\nLEVEL APPL SIZE 3\nnode-a\nnode-b\nnode-c\n\nLEVEL TASK SIZE 1\nx\n";

    #[test]
    fn test_parse_appl_section() {
        let names = parse_node_names(ROW).unwrap();
        assert_eq!(names, vec!["node-a", "node-b", "node-c"]);
    }

    #[test]
    fn test_parse_other_level() {
        let row = "LEVEL NODE SIZE 2\nhost-a\nhost-b\n\nLEVEL APPL SIZE 1\napp\n";
        assert_eq!(parse_level(row, NODE_LEVEL).unwrap(), vec!["host-a", "host-b"]);
        assert_eq!(parse_node_names(row).unwrap(), vec!["app"]);
    }

    #[test]
    fn test_missing_section() {
        assert!(parse_node_names("LEVEL CPU SIZE 1\ncpu\n").is_err());
    }

    #[test]
    fn test_invalid_count() {
        assert!(parse_node_names("LEVEL APPL SIZE many\n").is_err());
    }

    #[test]
    fn test_truncated_section_keeps_available_names() {
        let names = parse_node_names("LEVEL APPL SIZE 3\nonly-one\n").unwrap();
        assert_eq!(names, vec!["only-one"]);
    }

    #[test]
    fn test_row_file_path() {
        assert_eq!(
            row_file_path(Path::new("/traces/app.prv")),
            PathBuf::from("/traces/app.row")
        );
    }
}
