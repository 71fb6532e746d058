//! Unified diff generation.
//!
//! Line-level diff of two renderings of a file, grouped into hunks with
//! three lines of context.

const CONTEXT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Keep,
    Remove,
    Add,
}

/// Render a unified diff between `old` and `new`.
///
/// Returns an empty string when the texts are identical. `old_path` is
/// `/dev/null` for created files and `new_path` for deleted ones.
pub fn unified_diff(old_path: &str, new_path: &str, old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let script = edit_script(&old_lines, &new_lines);

    let mut out = String::new();
    out.push_str(&format!("--- {}\n", label("a", old_path)));
    out.push_str(&format!("+++ {}\n", label("b", new_path)));

    for (start, end) in hunk_ranges(&script) {
        let (mut old_start, mut new_start) = (0usize, 0usize);
        for op in &script[..start] {
            match op.0 {
                Op::Keep => {
                    old_start += 1;
                    new_start += 1;
                }
                Op::Remove => old_start += 1,
                Op::Add => new_start += 1,
            }
        }
        let old_count = script[start..end]
            .iter()
            .filter(|(op, _)| *op != Op::Add)
            .count();
        let new_count = script[start..end]
            .iter()
            .filter(|(op, _)| *op != Op::Remove)
            .count();
        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            hunk_start(old_start, old_count),
            old_count,
            hunk_start(new_start, new_count),
            new_count
        ));
        for (op, line) in &script[start..end] {
            let prefix = match op {
                Op::Keep => ' ',
                Op::Remove => '-',
                Op::Add => '+',
            };
            out.push(prefix);
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

fn label(side: &str, path: &str) -> String {
    if path == "/dev/null" {
        path.to_string()
    } else {
        format!("{side}/{path}")
    }
}

fn hunk_start(offset: usize, count: usize) -> usize {
    if count == 0 {
        offset
    } else {
        offset + 1
    }
}

/// Longest-common-subsequence edit script.
fn edit_script<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<(Op, &'a str)> {
    let (n, m) = (old.len(), new.len());
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut script = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            script.push((Op::Keep, old[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            script.push((Op::Remove, old[i]));
            i += 1;
        } else {
            script.push((Op::Add, new[j]));
            j += 1;
        }
    }
    script.extend(old[i..].iter().map(|l| (Op::Remove, *l)));
    script.extend(new[j..].iter().map(|l| (Op::Add, *l)));
    script
}

/// Group changed lines into `[start, end)` ranges of the script, merging
/// hunks whose context would touch.
fn hunk_ranges(script: &[(Op, &str)]) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (idx, (op, _)) in script.iter().enumerate() {
        if *op == Op::Keep {
            continue;
        }
        let start = idx.saturating_sub(CONTEXT);
        let end = (idx + 1 + CONTEXT).min(script.len());
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => ranges.push((start, end)),
        }
    }
    ranges
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_produce_no_diff() {
        assert_eq!(unified_diff("a.java", "a.java", "x\n", "x\n"), "");
    }

    #[test]
    fn single_line_change_has_context() {
        let old = "a\nb\nc\nd\ne\n";
        let new = "a\nb\nC\nd\ne\n";
        let diff = unified_diff("p/A.java", "p/A.java", old, new);
        assert!(diff.starts_with("--- a/p/A.java\n+++ b/p/A.java\n"));
        assert!(diff.contains("@@ -1,5 +1,5 @@"));
        assert!(diff.contains("-c\n+C\n"));
        assert!(diff.contains(" a\n"));
    }

    #[test]
    fn distant_changes_form_separate_hunks() {
        let old: String = (0..20).map(|i| format!("line{i}\n")).collect();
        let new = old.replace("line1\n", "first\n").replace("line18\n", "last\n");
        let diff = unified_diff("f", "f", &old, &new);
        assert_eq!(diff.matches("@@ -").count(), 2);
    }

    #[test]
    fn created_file_diffs_against_dev_null() {
        let diff = unified_diff("/dev/null", "p/I.java", "", "interface I {\n}\n");
        assert!(diff.starts_with("--- /dev/null\n+++ b/p/I.java\n"));
        assert!(diff.contains("@@ -0,0 +1,2 @@"));
    }
}
