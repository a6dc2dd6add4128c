use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use minigit_core::{ConflictKind, FileConflict, MergeOutcome, Side};
use std::path::PathBuf;

pub fn run(
    repo_path: Option<PathBuf>,
    source: String,
    yes: bool,
    author: Option<String>,
) -> Result<()> {
    let mut repo = super::open_repo(repo_path)?;
    let current = repo.current_branch_label()?;

    println!("{}", "Merge Preview".bold().cyan());
    println!("  {}: {}", "From".bold(), source);
    println!("  {}: {}", "Into".bold(), current);
    if let (Some(ours), Ok(theirs)) = (repo.head()?, repo.resolve_commit(&source)) {
        if let Some(base) = repo.lowest_common_ancestor(&ours, &theirs)? {
            println!(
                "  {}: {} {}",
                "Base".bold(),
                super::short(&base.id),
                base.summary().dimmed()
            );
        }
    }
    println!();

    if !yes {
        let proceed = Confirm::new()
            .with_prompt("Proceed with merge?")
            .default(false)
            .interact()?;
        if !proceed {
            println!("{}", "Merge cancelled".yellow());
            return Ok(());
        }
    }

    match repo.merge(&source, author.as_deref())? {
        MergeOutcome::Clean(commit) => {
            println!("{}", "✓ Merge completed".green().bold());
            println!("  {}: {}", "Commit".bold(), commit.id);
            println!("  {}: {}", "Message".bold(), commit.message);
        }
        MergeOutcome::Conflicted(conflicts) => {
            println!(
                "{} {}",
                "⚠ Merge stopped with conflicts in".yellow().bold(),
                format!("{} file(s)", conflicts.len()).yellow()
            );
            println!();
            print_conflicts(&conflicts, &current, &source);
            println!();
            println!(
                "Edit the files, then run {} (or {})",
                "minigit resolve".cyan(),
                "minigit merge-abort".cyan()
            );
        }
    }

    Ok(())
}

pub fn resolve(repo_path: Option<PathBuf>, message: String, author: Option<String>) -> Result<()> {
    let mut repo = super::open_repo(repo_path)?;
    let commit = repo.resolve_and_commit(&message, author.as_deref())?;

    println!("{}", "✓ Merge resolved".green().bold());
    println!("  {}: {}", "Commit".bold(), commit.id);
    let parents: Vec<String> = commit.parents.iter().map(super::short).collect();
    println!("  {}: {}", "Parents".bold(), parents.join(" "));

    Ok(())
}

pub fn abort(repo_path: Option<PathBuf>) -> Result<()> {
    let mut repo = super::open_repo(repo_path)?;
    repo.abort_merge()?;

    println!("{}", "✓ Merge aborted; work tree restored".green().bold());

    Ok(())
}

/// Lists the conflicts a merge of `source` would hit, without merging.
pub fn detect(repo_path: Option<PathBuf>, source: String) -> Result<()> {
    let repo = super::open_repo(repo_path)?;
    let current = repo.current_branch_label()?;
    let conflicts = repo.detect_conflicts(&source)?;

    if conflicts.is_empty() {
        println!(
            "{} {} {} {}",
            "✓".green().bold(),
            source,
            "merges cleanly into".green(),
            current
        );
        return Ok(());
    }

    println!(
        "{} {}",
        "⚠ Merging would conflict in".yellow().bold(),
        format!("{} file(s)", conflicts.len()).yellow()
    );
    println!();
    print_conflicts(&conflicts, &current, &source);

    Ok(())
}

fn print_conflicts(conflicts: &[FileConflict], current: &str, source: &str) {
    for conflict in conflicts {
        let detail = conflict_detail(conflict, current, source);
        println!("  {} {} {}", "!".red().bold(), conflict.path, detail.dimmed());
    }
}

fn conflict_detail(conflict: &FileConflict, current: &str, source: &str) -> String {
    match &conflict.kind {
        ConflictKind::Content => {
            let lines: Vec<String> = conflict
                .regions
                .iter()
                .map(|r| r.base_line.to_string())
                .collect();
            format!("conflicting edits near line(s) {}", lines.join(", "))
        }
        ConflictKind::DeleteModify { deleted_by: Side::Ours } => {
            format!("deleted on {current}, modified on {source}")
        }
        ConflictKind::DeleteModify { deleted_by: Side::Theirs } => {
            format!("modified on {current}, deleted on {source}")
        }
        ConflictKind::Binary => "binary content changed on both sides".to_string(),
    }
}
