use anyhow::Result;
use colored::Colorize;
use minigit_core::{DiffKind, Error, FileDiff};
use std::path::PathBuf;

const CONTEXT_LINES: usize = 3;

pub fn run(repo_path: Option<PathBuf>, path: Option<String>, commit: Option<String>) -> Result<()> {
    let repo = super::open_repo(repo_path)?;
    let against = commit.map(|rev| repo.resolve_commit(&rev)).transpose()?;

    let paths = match path {
        Some(path) => vec![path],
        None => {
            let mut paths = repo.changes()?.paths();
            if let Some(id) = &against {
                paths.extend(repo.get_commit(id)?.snapshot.into_keys());
                if let Some(head) = repo.head()? {
                    paths.extend(repo.get_commit(&head)?.snapshot.into_keys());
                }
                paths.sort();
                paths.dedup();
            }
            if paths.is_empty() {
                println!("{}", "No uncommitted changes".green());
                return Ok(());
            }
            paths
        }
    };

    for path in paths {
        let diff = match repo.diff_worktree(&path, against.as_ref()) {
            Ok(diff) => diff,
            // Gone from disk and absent from the commit compared against.
            Err(Error::PathNotTracked(_)) => continue,
            Err(e) => return Err(e.into()),
        };
        if diff.is_unchanged() {
            continue;
        }
        print_diff(&diff);
    }

    Ok(())
}

fn print_diff(diff: &FileDiff) {
    println!("{}", "━".repeat(80).bright_black());

    let status = match (&diff.old_blob, &diff.new_blob) {
        (None, Some(_)) => "NEW".green(),
        (Some(_), None) => "DEL".red(),
        _ => "MOD".yellow(),
    };
    println!("{} {}", status, diff.path.white().bold());
    println!(
        "  {} {}",
        format!("+{}", diff.additions()).green(),
        format!("-{}", diff.deletions()).red()
    );
    println!();

    for range in diff.hunk_ranges(CONTEXT_LINES) {
        let first = &diff.lines[range.start];
        println!(
            "{}",
            format!("@@ line {} @@", first.line_number()).cyan()
        );
        for line in &diff.lines[range] {
            let (prefix, color): (&str, fn(&str) -> colored::ColoredString) = match line.kind {
                DiffKind::Added => ("+", |s| s.green()),
                DiffKind::Removed => ("-", |s| s.red()),
                DiffKind::Equal => (" ", |s| s.normal()),
            };
            println!("{}", color(&format!("{}{}", prefix, line.text)));
        }
    }
    println!();
}
