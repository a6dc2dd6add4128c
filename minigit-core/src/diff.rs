use crate::hash::ObjectId;
use serde::{Deserialize, Serialize};
use similar::{capture_diff_slices, Algorithm, DiffTag};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub old_blob: Option<ObjectId>,
    pub new_blob: Option<ObjectId>,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: DiffKind,
    pub text: String,
    pub old_line_number: Option<usize>,
    pub new_line_number: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffKind {
    Equal,
    Added,
    Removed,
}

impl DiffLine {
    /// 1-based line number on the side the line belongs to.
    pub fn line_number(&self) -> usize {
        match self.kind {
            DiffKind::Added => self.new_line_number.unwrap_or(0),
            DiffKind::Equal | DiffKind::Removed => self.old_line_number.unwrap_or(0),
        }
    }
}

/// A replaced region: `base` lines of the old text became `other` lines of the new.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Edit {
    pub base: Range<usize>,
    pub other: Range<usize>,
}

/// Splits text into lines that keep their terminators, so joining is lossless.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

fn display_text(line: &str) -> String {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
        .to_string()
}

/// Minimal line diff: the unchanged lines form a longest common subsequence.
///
/// Myers runs in linear space, so large files are fine as long as they are
/// mostly alike.
pub fn diff_lines(old: &[&str], new: &[&str]) -> Vec<DiffLine> {
    let mut lines = Vec::with_capacity(old.len().max(new.len()));

    for op in capture_diff_slices(Algorithm::Myers, old, new) {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => {
                for (i, j) in old_range.zip(new_range) {
                    lines.push(DiffLine {
                        kind: DiffKind::Equal,
                        text: display_text(old[i]),
                        old_line_number: Some(i + 1),
                        new_line_number: Some(j + 1),
                    });
                }
            }
            DiffTag::Delete | DiffTag::Insert | DiffTag::Replace => {
                for i in old_range {
                    lines.push(DiffLine {
                        kind: DiffKind::Removed,
                        text: display_text(old[i]),
                        old_line_number: Some(i + 1),
                        new_line_number: None,
                    });
                }
                for j in new_range {
                    lines.push(DiffLine {
                        kind: DiffKind::Added,
                        text: display_text(new[j]),
                        old_line_number: None,
                        new_line_number: Some(j + 1),
                    });
                }
            }
        }
    }

    lines
}

/// Non-equal regions of a minimal alignment, in base order.
pub(crate) fn edits(base: &[&str], other: &[&str]) -> Vec<Edit> {
    capture_diff_slices(Algorithm::Myers, base, other)
        .into_iter()
        .filter_map(|op| {
            let (tag, base, other) = op.as_tag_tuple();
            (tag != DiffTag::Equal).then_some(Edit { base, other })
        })
        .collect()
}

impl FileDiff {
    pub fn new(
        path: impl Into<String>,
        old_blob: Option<ObjectId>,
        new_blob: Option<ObjectId>,
        old_text: &str,
        new_text: &str,
    ) -> Self {
        Self {
            path: path.into(),
            old_blob,
            new_blob,
            lines: diff_lines(&split_lines(old_text), &split_lines(new_text)),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.lines.iter().all(|l| l.kind == DiffKind::Equal)
    }

    pub fn additions(&self) -> usize {
        self.lines.iter().filter(|l| l.kind == DiffKind::Added).count()
    }

    pub fn deletions(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.kind == DiffKind::Removed)
            .count()
    }

    /// Index ranges into `lines` for each hunk, with `context` equal lines around changes.
    pub fn hunk_ranges(&self, context: usize) -> Vec<Range<usize>> {
        let mut ranges: Vec<Range<usize>> = Vec::new();
        for (i, line) in self.lines.iter().enumerate() {
            if line.kind == DiffKind::Equal {
                continue;
            }
            let start = i.saturating_sub(context);
            let end = (i + context + 1).min(self.lines.len());
            match ranges.last_mut() {
                Some(last) if start <= last.end => last.end = end,
                _ => ranges.push(start..end),
            }
        }
        ranges
    }

    pub fn format_unified(&self, context: usize) -> String {
        let mut output = String::new();

        output.push_str(&format!("--- a/{}\n", self.path));
        output.push_str(&format!("+++ b/{}\n", self.path));

        for range in self.hunk_ranges(context) {
            let before = &self.lines[..range.start];
            let hunk = &self.lines[range];

            let old_before = before.iter().filter(|l| l.kind != DiffKind::Added).count();
            let new_before = before.iter().filter(|l| l.kind != DiffKind::Removed).count();
            let old_count = hunk.iter().filter(|l| l.kind != DiffKind::Added).count();
            let new_count = hunk.iter().filter(|l| l.kind != DiffKind::Removed).count();
            let old_start = if old_count == 0 { old_before } else { old_before + 1 };
            let new_start = if new_count == 0 { new_before } else { new_before + 1 };

            output.push_str(&format!(
                "@@ -{},{} +{},{} @@\n",
                old_start, old_count, new_start, new_count
            ));
            for line in hunk {
                let prefix = match line.kind {
                    DiffKind::Added => '+',
                    DiffKind::Removed => '-',
                    DiffKind::Equal => ' ',
                };
                output.push(prefix);
                output.push_str(&line.text);
                output.push('\n');
            }
        }

        output
    }
}
