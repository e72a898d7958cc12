//! Line diffs between archived and freshly observed bodies.
//!
//! Produces standard unified diffs (`---`/`+++` headers, `@@` hunks,
//! `\ No newline at end of file` markers). Byte-exact: applying the diff to
//! the old body with [`apply_unified`] yields the new body.

use crate::error::{AppError, Result};
use crate::models::{FileDiff, Fingerprint};
use crate::storage::SnapshotArchive;

/// Default number of context lines around each change.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Above this many LCS cells the changed region is emitted as one
/// delete-then-insert block instead of a minimal diff.
const MAX_LCS_CELLS: usize = 4_000_000;

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Equal,
    Delete,
    Insert,
}

#[derive(Debug, Clone, Copy)]
struct Op<'a> {
    tag: Tag,
    line: &'a str,
}

/// Unified line differ.
#[derive(Debug, Clone)]
pub struct LineDiff {
    context_lines: usize,
}

impl Default for LineDiff {
    fn default() -> Self {
        Self::new()
    }
}

impl LineDiff {
    /// Create a differ with three lines of context.
    pub fn new() -> Self {
        Self {
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }

    /// Render a unified diff. Returns an empty string for identical input.
    pub fn unified(&self, old: &str, new: &str, from_label: &str, to_label: &str) -> String {
        let old_lines: Vec<&str> = old.split_inclusive('\n').collect();
        let new_lines: Vec<&str> = new.split_inclusive('\n').collect();
        let ops = line_ops(&old_lines, &new_lines);

        if ops.iter().all(|op| op.tag == Tag::Equal) {
            return String::new();
        }

        let mut out = String::new();
        out.push_str(&format!("--- {}\n", single_line(from_label)));
        out.push_str(&format!("+++ {}\n", single_line(to_label)));

        // Line positions before each op
        let mut old_pos = Vec::with_capacity(ops.len());
        let mut new_pos = Vec::with_capacity(ops.len());
        let (mut o, mut n) = (0usize, 0usize);
        for op in &ops {
            old_pos.push(o);
            new_pos.push(n);
            match op.tag {
                Tag::Equal => {
                    o += 1;
                    n += 1;
                }
                Tag::Delete => o += 1,
                Tag::Insert => n += 1,
            }
        }

        let keep = self.context_mask(&ops);
        let mut i = 0;
        while i < ops.len() {
            if !keep[i] {
                i += 1;
                continue;
            }
            let start = i;
            while i < ops.len() && keep[i] {
                i += 1;
            }
            let hunk = &ops[start..i];

            let old_len = hunk.iter().filter(|op| op.tag != Tag::Insert).count();
            let new_len = hunk.iter().filter(|op| op.tag != Tag::Delete).count();
            let old_start = if old_len == 0 { old_pos[start] } else { old_pos[start] + 1 };
            let new_start = if new_len == 0 { new_pos[start] } else { new_pos[start] + 1 };
            out.push_str(&format!(
                "@@ -{},{} +{},{} @@\n",
                old_start, old_len, new_start, new_len
            ));

            for op in hunk {
                let prefix = match op.tag {
                    Tag::Equal => ' ',
                    Tag::Delete => '-',
                    Tag::Insert => '+',
                };
                out.push(prefix);
                out.push_str(op.line);
                if !op.line.ends_with('\n') {
                    out.push('\n');
                    out.push_str(NO_NEWLINE_MARKER);
                }
            }
        }
        out
    }

    /// Mark changed ops and the equal ops within context distance of one.
    fn context_mask(&self, ops: &[Op<'_>]) -> Vec<bool> {
        let ctx = self.context_lines;
        let mut keep = vec![false; ops.len()];

        let mut since_change: Option<usize> = None;
        for (i, op) in ops.iter().enumerate() {
            if op.tag != Tag::Equal {
                keep[i] = true;
                since_change = Some(0);
            } else if let Some(d) = since_change.as_mut() {
                *d += 1;
                keep[i] = *d <= ctx;
            }
        }

        let mut until_change: Option<usize> = None;
        for (i, op) in ops.iter().enumerate().rev() {
            if op.tag != Tag::Equal {
                until_change = Some(0);
            } else if let Some(d) = until_change.as_mut() {
                *d += 1;
                keep[i] |= *d <= ctx;
            }
        }
        keep
    }
}

/// Render a unified diff with default context.
pub fn unified_diff(old: &str, new: &str, from_label: &str, to_label: &str) -> String {
    LineDiff::new().unified(old, new, from_label, to_label)
}

fn single_line(label: &str) -> String {
    label.replace(['\n', '\r'], " ")
}

/// Edit script from `old` to `new`: common prefix and suffix are matched
/// directly, the middle via longest common subsequence.
fn line_ops<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<Op<'a>> {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut ops = Vec::with_capacity(old.len() + new.len());
    ops.extend(old[..prefix].iter().map(|line| Op {
        tag: Tag::Equal,
        line,
    }));

    let (a, b) = (old_mid.len(), new_mid.len());
    if a.saturating_mul(b) > MAX_LCS_CELLS {
        ops.extend(old_mid.iter().map(|line| Op {
            tag: Tag::Delete,
            line,
        }));
        ops.extend(new_mid.iter().map(|line| Op {
            tag: Tag::Insert,
            line,
        }));
    } else {
        lcs_ops(old_mid, new_mid, &mut ops);
    }

    ops.extend(old[old.len() - suffix..].iter().map(|line| Op {
        tag: Tag::Equal,
        line,
    }));
    ops
}

fn lcs_ops<'a>(old: &[&'a str], new: &[&'a str], ops: &mut Vec<Op<'a>>) {
    let (a, b) = (old.len(), new.len());
    let width = b + 1;
    // table[i * width + j] = LCS length of old[i..] and new[j..]
    let mut table = vec![0u32; (a + 1) * width];
    for i in (0..a).rev() {
        for j in (0..b).rev() {
            table[i * width + j] = if old[i] == new[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < a && j < b {
        if old[i] == new[j] {
            ops.push(Op {
                tag: Tag::Equal,
                line: old[i],
            });
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            ops.push(Op {
                tag: Tag::Delete,
                line: old[i],
            });
            i += 1;
        } else {
            ops.push(Op {
                tag: Tag::Insert,
                line: new[j],
            });
            j += 1;
        }
    }
    ops.extend(old[i..].iter().map(|line| Op {
        tag: Tag::Delete,
        line,
    }));
    ops.extend(new[j..].iter().map(|line| Op {
        tag: Tag::Insert,
        line,
    }));
}

/// Apply a unified diff produced by [`LineDiff`] to `old`.
pub fn apply_unified(old: &str, diff: &str) -> Result<String> {
    let old_lines: Vec<&str> = old.split_inclusive('\n').collect();
    let lines: Vec<&str> = diff.split_inclusive('\n').collect();
    let mut out = String::with_capacity(old.len());
    let mut old_idx = 0usize;
    let mut idx = 0usize;

    while idx < lines.len() {
        let line = lines[idx];
        idx += 1;
        if !line.starts_with("@@ ") {
            continue;
        }

        let (old_start, old_len, new_len) = parse_hunk_header(line)?;
        let begin = if old_len == 0 { old_start } else { old_start - 1 };
        if begin < old_idx || begin > old_lines.len() {
            return Err(AppError::validation(format!(
                "hunk '{}' out of range",
                line.trim_end()
            )));
        }
        for l in &old_lines[old_idx..begin] {
            out.push_str(l);
        }
        old_idx = begin;

        let (mut old_seen, mut new_seen) = (0usize, 0usize);
        while old_seen < old_len || new_seen < new_len {
            let raw = lines
                .get(idx)
                .ok_or_else(|| AppError::validation("diff ends inside a hunk"))?;
            idx += 1;

            let missing_newline = lines
                .get(idx)
                .is_some_and(|next| next.starts_with('\\'));
            if missing_newline {
                idx += 1;
            }

            let mut chars = raw.chars();
            let tag = chars.next().unwrap_or(' ');
            let rest = chars.as_str();
            let content = if missing_newline {
                rest.strip_suffix('\n').unwrap_or(rest)
            } else {
                rest
            };

            match tag {
                ' ' | '-' => {
                    let original = old_lines.get(old_idx).copied().unwrap_or_default();
                    if original != content {
                        return Err(AppError::validation(format!(
                            "diff does not apply at old line {}",
                            old_idx + 1
                        )));
                    }
                    if tag == ' ' {
                        out.push_str(original);
                        new_seen += 1;
                    }
                    old_idx += 1;
                    old_seen += 1;
                }
                '+' => {
                    out.push_str(content);
                    new_seen += 1;
                }
                other => {
                    return Err(AppError::validation(format!(
                        "unexpected hunk line prefix '{other}'"
                    )));
                }
            }
        }
    }

    for l in old_lines.iter().skip(old_idx) {
        out.push_str(l);
    }
    Ok(out)
}

/// Parse `@@ -a,b +c,d @@` into `(a, b, d)`. Counts default to 1.
fn parse_hunk_header(line: &str) -> Result<(usize, usize, usize)> {
    let invalid = || AppError::validation(format!("bad hunk header '{}'", line.trim_end()));
    let mut parts = line.split_whitespace();
    let _at = parts.next();
    let old = parts.next().and_then(|p| p.strip_prefix('-')).ok_or_else(invalid)?;
    let new = parts.next().and_then(|p| p.strip_prefix('+')).ok_or_else(invalid)?;

    let range = |text: &str| -> Option<(usize, usize)> {
        match text.split_once(',') {
            Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
            None => Some((text.parse().ok()?, 1)),
        }
    };
    let (old_start, old_len) = range(old).ok_or_else(invalid)?;
    let (_, new_len) = range(new).ok_or_else(invalid)?;
    if old_len > 0 && old_start == 0 {
        return Err(invalid());
    }
    Ok((old_start, old_len, new_len))
}

/// Diff a new body against the archived body of `old`.
///
/// A missing baseline is not an error: it yields [`FileDiff::NoBaseline`].
pub async fn diff_against_archive(
    archive: &dyn SnapshotArchive,
    domain: &str,
    url: &str,
    old: &Fingerprint,
    new_body: &str,
) -> Result<FileDiff> {
    match archive.get(old).await? {
        Some(old_body) => {
            let new_fp = Fingerprint::of(new_body);
            let text = unified_diff(
                &old_body,
                new_body,
                &format!("{url}@{}", old.short()),
                &format!("{url}@{}", new_fp.short()),
            );
            Ok(FileDiff::Unified(text))
        }
        None => {
            let missing = AppError::DiffBaselineMissing {
                url: url.to_string(),
                fingerprint: old.short().to_string(),
            };
            log::warn!("[{}] {}; alerting without diff", domain, missing);
            Ok(FileDiff::NoBaseline)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn round_trip(old: &str, new: &str) {
        let diff = unified_diff(old, new, "old", "new");
        if old == new {
            assert!(diff.is_empty());
        } else {
            assert!(!diff.is_empty(), "diff must not be empty for {old:?} -> {new:?}");
        }
        let applied = apply_unified(old, &diff).unwrap();
        assert_eq!(applied, new, "diff was:\n{diff}");
    }

    #[test]
    fn test_identical_bodies_produce_empty_diff() {
        assert!(unified_diff("a\nb\n", "a\nb\n", "x", "y").is_empty());
    }

    #[test]
    fn test_single_line_change_format() {
        let diff = unified_diff("a\nb\nc\n", "a\nB\nc\n", "old", "new");
        assert_eq!(
            diff,
            "--- old\n+++ new\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n"
        );
    }

    #[test]
    fn test_missing_trailing_newline_marker() {
        let diff = unified_diff("a\n", "a", "old", "new");
        assert!(diff.contains("+a\n\\ No newline at end of file\n"));
        assert_eq!(apply_unified("a\n", &diff).unwrap(), "a");
    }

    #[test]
    fn test_distant_changes_split_into_hunks() {
        let old: String = (1..=30).map(|i| format!("line {i}\n")).collect();
        let new = old
            .replace("line 2\n", "line two\n")
            .replace("line 28\n", "line twenty-eight\n");
        let diff = unified_diff(&old, &new, "old", "new");
        assert_eq!(diff.matches("@@ -").count(), 2);
        round_trip(&old, &new);
    }

    #[test]
    fn test_round_trips() {
        round_trip("", "");
        round_trip("", "fresh\n");
        round_trip("gone\n", "");
        round_trip("a\nb\nc\n", "a\nc\n");
        round_trip("a\nc\n", "a\nb\nc\n");
        round_trip("x", "y");
        round_trip("one\ntwo", "one\ntwo\nthree");
        round_trip("--- a\n+++ b\n@@ x\n", "--- a\n+++ c\n@@ x\n");
        round_trip("\n\n\n", "\n\nx\n\n");
        round_trip(
            "var a=1;\nfunction f(){return a}\nexport default f;\n",
            "var a=2;\nvar key='AKIA';\nfunction f(){return a}\n",
        );
    }

    #[test]
    fn test_large_change_falls_back_to_block_replace() {
        let old: String = (0..3000).map(|i| format!("o{i}\n")).collect();
        let new: String = (0..3000).map(|i| format!("n{i}\n")).collect();
        round_trip(&old, &new);
    }

    #[test]
    fn test_apply_rejects_mismatched_base() {
        let diff = unified_diff("a\nb\n", "a\nc\n", "old", "new");
        assert!(apply_unified("z\nb\n", &diff).is_err());
    }

    #[tokio::test]
    async fn test_diff_against_archive() {
        let archive = MemoryStorage::new();
        let old_body = "let x = 1;\n";
        let old_fp = Fingerprint::of(old_body);

        let missing = diff_against_archive(
            &archive,
            "example.com",
            "https://example.com/a.js",
            &old_fp,
            "let x = 2;\n",
        )
        .await
        .unwrap();
        assert_eq!(missing, FileDiff::NoBaseline);

        archive.put(&old_fp, old_body).await.unwrap();
        let diff = diff_against_archive(
            &archive,
            "example.com",
            "https://example.com/a.js",
            &old_fp,
            "let x = 2;\n",
        )
        .await
        .unwrap();
        let text = diff.text().unwrap();
        assert!(text.contains("-let x = 1;\n+let x = 2;\n"));
        assert_eq!(apply_unified(old_body, text).unwrap(), "let x = 2;\n");
    }
}
