//! Block-level lexing of the DSX record language.
//!
//! A DSX file is a flat sequence of `BEGIN <kind> … END <kind>` blocks
//! (HEADER, DSJOB, DSRECORD, DSSUBRECORD) whose lines are `Key "value"`
//! pairs. Values are either double-quoted strings or multi-line literals
//! bracketed by `=+=+…` sentinel lines.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref RECORD_BLOCK: Regex =
        Regex::new(r#"(?s)BEGIN DSRECORD\s+Identifier\s+"([^"]+)"(.*?)END DSRECORD"#).unwrap();
    static ref HEADER_BLOCK: Regex =
        Regex::new(r"(?s)BEGIN HEADER\s+(.*?)\s+END HEADER").unwrap();
}

/// One `BEGIN DSRECORD … END DSRECORD` block, borrowed from the input.
#[derive(Debug, Clone, Copy)]
pub struct RecordBlock<'a> {
    pub identifier: &'a str,
    pub body: &'a str,
}

/// Yields every DSRECORD block in `content` (DSSUBRECORDs stay inside the
/// enclosing record's body).
pub fn record_blocks(content: &str) -> impl Iterator<Item = RecordBlock<'_>> {
    RECORD_BLOCK.captures_iter(content).map(|caps| RecordBlock {
        identifier: caps.get(1).unwrap().as_str(),
        body: caps.get(2).unwrap().as_str(),
    })
}

/// The interior of the `BEGIN HEADER` block, if the file has one.
pub fn header_slice(content: &str) -> Option<&str> {
    HEADER_BLOCK
        .captures(content)
        .map(|caps| caps.get(1).unwrap().as_str())
}

/// Splits the content into per-job slices. Each slice runs from a
/// `BEGIN DSJOB` to the next one (or end of input), so it covers the whole
/// job block including its nested records.
pub fn job_slices(content: &str) -> Vec<&str> {
    let starts: Vec<usize> = content
        .match_indices("BEGIN DSJOB")
        .map(|(at, _)| at)
        .collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| match starts.get(i + 1) {
            Some(&next) => &content[start..next],
            None => &content[start..],
        })
        .collect()
}

/// Reads the first `Key "value"` line for `key`. Keys are matched at line
/// start only, so `Name` never matches inside `SchemaName`. Empty values are
/// treated as absent.
pub fn quoted_value(body: &str, key: &str) -> Option<String> {
    for line in body.lines() {
        let line = line.trim_start();
        let Some(rest) = line.strip_prefix(key) else {
            continue;
        };
        if !rest.starts_with(|c: char| c.is_whitespace()) {
            continue;
        }
        let Some(value) = rest.trim_start().strip_prefix('"') else {
            continue;
        };
        match value.find('"') {
            Some(0) | None => continue,
            Some(end) => return Some(value[..end].to_string()),
        }
    }
    None
}

/// Reads the multi-line literal of the DSSUBRECORD named `name`, with the
/// `=+=+…` sentinel lines stripped.
pub fn subrecord_literal(body: &str, name: &str) -> Option<String> {
    let pattern = format!(
        r#"(?s)Name\s+"{}"\s+Value\s+(.*?)\s*END DSSUBRECORD"#,
        regex::escape(name)
    );
    let re = Regex::new(&pattern).expect("static subrecord pattern");
    let raw = re.captures(body)?.get(1)?.as_str();
    let value = strip_sentinels(raw);
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn strip_sentinels(value: &str) -> String {
    let is_sentinel = |line: &str| {
        let line = line.trim();
        !line.is_empty() && line.chars().all(|c| c == '=' || c == '+')
    };
    let mut lines: Vec<&str> = value.lines().collect();
    if lines.first().copied().is_some_and(is_sentinel) {
        lines.remove(0);
    }
    if lines.last().copied().is_some_and(is_sentinel) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn quoted_value_anchors_at_line_start() {
        let body = "   SchemaName \"dbo\"\n   Name \"S_WRHS\"\n";
        assert_eq!(quoted_value(body, "Name").as_deref(), Some("S_WRHS"));
        assert_eq!(quoted_value(body, "SchemaName").as_deref(), Some("dbo"));
    }

    #[test]
    fn quoted_value_requires_whitespace_after_key() {
        let body = "   NameSuffix \"x\"\n";
        assert_eq!(quoted_value(body, "Name"), None);
    }

    #[test]
    fn empty_quoted_values_are_absent() {
        assert_eq!(quoted_value("   StageType \"\"\n", "StageType"), None);
    }

    #[test]
    fn record_blocks_split_on_end_dsrecord() {
        let content = "BEGIN DSRECORD\n   Identifier \"A\"\n   Name \"first\"\nEND DSRECORD\nBEGIN DSRECORD\n   Identifier \"B\"\nEND DSRECORD\n";
        let blocks: Vec<_> = record_blocks(content).collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].identifier, "A");
        assert_eq!(blocks[1].identifier, "B");
        assert_eq!(quoted_value(blocks[0].body, "Name").as_deref(), Some("first"));
    }

    #[test]
    fn subrecord_literal_strips_sentinels() {
        let body = "BEGIN DSSUBRECORD\n   Name \"XMLProperties\"\n   Value =+=+=+=\n<Properties/>\n=+=+=+=\nEND DSSUBRECORD\n";
        assert_eq!(
            subrecord_literal(body, "XMLProperties").as_deref(),
            Some("<Properties/>")
        );
    }

    #[test]
    fn job_slices_cover_to_next_job() {
        let content = "BEGIN DSJOB\n   Identifier \"J1\"\nEND DSJOB\nBEGIN DSJOB\n   Identifier \"J2\"\nEND DSJOB\n";
        let slices = job_slices(content);
        assert_eq!(slices.len(), 2);
        assert!(slices[0].contains("J1") && !slices[0].contains("J2"));
        assert!(slices[1].contains("J2"));
    }
}
