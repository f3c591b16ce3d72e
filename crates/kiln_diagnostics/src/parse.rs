//! Parsing of line-oriented diagnostic output from external tools.

use crate::diagnostic::Diagnostic;
use crate::severity::Severity;

/// Severity markers in the order they should be tried.
///
/// "fatal error" must come before "error" so it is not matched as a message
/// that merely begins with "fatal".
const MARKERS: [(&str, Severity); 4] = [
    ("fatal error", Severity::Error),
    ("error", Severity::Error),
    ("warning", Severity::Warning),
    ("note", Severity::Note),
];

/// Parses one logical tool output line into a structured diagnostic.
///
/// Recognizes the common `path:line: severity: message` shape, including the
/// `path:line:col:` variant and the location-less `severity: message` form.
/// Returns `None` for lines that are not diagnostics; callers pass those
/// through as plain log output.
pub fn parse_tool_line(line: &str) -> Option<Diagnostic> {
    let line = line.trim_end();

    let mut best: Option<(usize, &str, Severity)> = None;
    for (marker, severity) in MARKERS {
        let tagged = format!("{marker}: ");
        if let Some(pos) = find_marker(line, &tagged) {
            match best {
                Some((best_pos, _, _)) if best_pos <= pos => {}
                _ => best = Some((pos, marker, severity)),
            }
        }
    }
    let (pos, marker, severity) = best?;

    let message = line[pos + marker.len() + 2..].trim();
    if message.is_empty() {
        return None;
    }

    let mut diag = match severity {
        Severity::Error => Diagnostic::error(message),
        Severity::Warning => Diagnostic::warning(message),
        Severity::Note => Diagnostic::note(message),
    };

    let location = line[..pos].trim_end_matches(": ").trim_end_matches(':');
    if !location.is_empty() {
        let (file, line_no) = split_location(location);
        diag = match line_no {
            Some(n) => diag.with_location(file, n),
            None => diag.with_file(file),
        };
    }

    Some(diag)
}

/// Finds `tagged` either at the start of the line or preceded by `": "`.
fn find_marker(line: &str, tagged: &str) -> Option<usize> {
    if line.starts_with(tagged) {
        return Some(0);
    }
    let with_sep = format!(": {tagged}");
    line.find(&with_sep).map(|p| p + 2)
}

/// Splits `path:line[:col]` into the path and the line number.
///
/// Trailing numeric segments are peeled off (at most two, for line and
/// column); everything before them is the path, so drive-letter paths and
/// paths containing colons survive.
fn split_location(location: &str) -> (String, Option<u32>) {
    let mut path = location;
    let mut numbers: Vec<u32> = Vec::new();

    while numbers.len() < 2 {
        match path.rsplit_once(':') {
            Some((head, tail)) if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) => {
                if let Ok(n) = tail.parse() {
                    numbers.push(n);
                    path = head;
                } else {
                    break;
                }
            }
            _ => break,
        }
    }

    // numbers are collected column-first; the line is the last one peeled
    (path.to_string(), numbers.last().copied())
}
