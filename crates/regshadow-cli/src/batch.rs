//! Batch input: one module per line, with optional assembly name and version
//! separated by `|`.

use std::path::PathBuf;

/// One parsed batch line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLine {
    pub path: PathBuf,
    pub name: Option<String>,
    pub version: Option<String>,
}

/// Parse a `path|name|version` line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<BatchLine> {
    let mut fields = line.split('|');
    let path = clean(fields.next()?);
    if path.is_empty() {
        return None;
    }
    let name = fields.next().map(clean).filter(|s| !s.is_empty());
    let version = fields.next().map(clean).filter(|s| !s.is_empty());
    Some(BatchLine {
        path: PathBuf::from(path),
        name,
        version,
    })
}

fn clean(field: &str) -> String {
    field.trim().trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_line_parses_all_fields() {
        let line = parse_line("widgets.dll|widgets|2.1.0.0").unwrap();
        assert_eq!(line.path, PathBuf::from("widgets.dll"));
        assert_eq!(line.name.as_deref(), Some("widgets"));
        assert_eq!(line.version.as_deref(), Some("2.1.0.0"));
    }

    #[test]
    fn path_only_line_leaves_name_and_version_unset() {
        let line = parse_line("widgets.dll").unwrap();
        assert_eq!(line.name, None);
        assert_eq!(line.version, None);
    }

    #[test]
    fn fields_are_trimmed_of_spaces_and_quotes() {
        let line = parse_line("  \"C:\\libs\\widgets.dll\"  | widgets | 1.0.0.0 ").unwrap();
        assert_eq!(line.path, PathBuf::from("C:\\libs\\widgets.dll"));
        assert_eq!(line.name.as_deref(), Some("widgets"));
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("   "), None);
    }

    #[test]
    fn empty_middle_field_falls_back() {
        let line = parse_line("widgets.dll||3.0.0.0").unwrap();
        assert_eq!(line.name, None);
        assert_eq!(line.version.as_deref(), Some("3.0.0.0"));
    }
}
