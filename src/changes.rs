//! Section-level change summary between a run's document and its
//! predecessor's.

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub first_run: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
    pub additions: usize,
    pub deletions: usize,
}

impl ChangeSummary {
    pub fn render_markdown(&self) -> String {
        let mut lines = vec!["## Change Summary (vs previous run)".to_string()];
        if self.first_run {
            lines.push("- No prior design doc found. First run.".to_string());
            return lines.join("\n") + "\n";
        }
        if !self.added.is_empty() {
            lines.push(format!("- Added sections: {}", self.added.join(", ")));
        }
        if !self.removed.is_empty() {
            lines.push(format!("- Removed sections: {}", self.removed.join(", ")));
        }
        if !self.modified.is_empty() {
            lines.push(format!("- Modified sections: {}", self.modified.join(", ")));
        }
        if self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty() {
            lines.push("- No section-level changes detected.".to_string());
        }
        lines.push(format!(
            "- Diff stats: {} additions, {} deletions",
            self.additions, self.deletions
        ));
        lines.join("\n") + "\n"
    }
}

/// Splits markdown on `## ` headings, in document order. Text before the
/// first heading is not part of any section. A repeated heading keeps its
/// last body.
pub fn split_sections(markdown: &str) -> Vec<(String, String)> {
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut current: Option<String> = None;
    let mut buffer: Vec<&str> = Vec::new();

    let mut flush = |current: Option<String>, buffer: &mut Vec<&str>| {
        if let Some(title) = current {
            let body = buffer.join("\n").trim().to_string();
            match sections.iter_mut().find(|(existing, _)| *existing == title) {
                Some(entry) => entry.1 = body,
                None => sections.push((title, body)),
            }
        }
        buffer.clear();
    };

    for line in markdown.lines() {
        if let Some(title) = line.strip_prefix("## ") {
            flush(current.take(), &mut buffer);
            current = Some(title.trim().to_string());
        } else {
            buffer.push(line);
        }
    }
    flush(current, &mut buffer);
    sections
}

pub fn summarize_changes(previous: Option<&str>, current: &str) -> ChangeSummary {
    let Some(previous) = previous.filter(|text| !text.is_empty()) else {
        return ChangeSummary {
            first_run: true,
            ..ChangeSummary::default()
        };
    };

    let before = split_sections(previous);
    let after = split_sections(current);
    let body_of = |sections: &[(String, String)], title: &str| {
        sections
            .iter()
            .find(|(existing, _)| existing == title)
            .map(|(_, body)| body.clone())
    };

    let added = after
        .iter()
        .filter(|(title, _)| body_of(&before, title).is_none())
        .map(|(title, _)| title.clone())
        .collect();
    let removed = before
        .iter()
        .filter(|(title, _)| body_of(&after, title).is_none())
        .map(|(title, _)| title.clone())
        .collect();
    let modified = after
        .iter()
        .filter(|(title, body)| body_of(&before, title).is_some_and(|old| old != *body))
        .map(|(title, _)| title.clone())
        .collect();

    let (additions, deletions) = line_diff_stats(previous, current);
    ChangeSummary {
        first_run: false,
        added,
        removed,
        modified,
        additions,
        deletions,
    }
}

/// Lines added and removed, from a shortest-edit-script line diff.
pub fn line_diff_stats(previous: &str, current: &str) -> (usize, usize) {
    let old = previous.lines().collect::<Vec<_>>();
    let new = current.lines().collect::<Vec<_>>();

    // Common prefix and suffix never contribute to the diff.
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(left, right)| left == right)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(left, right)| left == right)
        .count();
    let old = &old[prefix..old.len() - suffix];
    let new = &new[prefix..new.len() - suffix];

    let edits = edit_distance(old, new);
    // Every edit is one insertion or one deletion: edits = old + new - 2 * common.
    let common = (old.len() + new.len() - edits) / 2;
    (new.len() - common, old.len() - common)
}

/// Length of the shortest insert/delete script turning `old` into `new`
/// (Myers' greedy forward search). Keeps only the furthest-reaching x per
/// diagonal, so memory is linear in the input length.
fn edit_distance(old: &[&str], new: &[&str]) -> usize {
    let (n, m) = (old.len() as isize, new.len() as isize);
    let max = n + m;
    if max == 0 {
        return 0;
    }
    let offset = max + 1;
    let mut furthest = vec![0_isize; (2 * max + 3) as usize];

    for d in 0..=max {
        let mut k = -d;
        while k <= d {
            let at = (k + offset) as usize;
            let mut x = if k == -d || (k != d && furthest[at - 1] < furthest[at + 1]) {
                furthest[at + 1]
            } else {
                furthest[at - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && old[x as usize] == new[y as usize] {
                x += 1;
                y += 1;
            }
            furthest[at] = x;
            if x >= n && y >= m {
                return d as usize;
            }
            k += 2;
        }
    }
    max as usize
}
