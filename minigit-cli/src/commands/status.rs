use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub fn run(repo_path: Option<PathBuf>) -> Result<()> {
    let repo = super::open_repo(repo_path)?;
    let status = repo.status()?;

    println!("{}", "Repository Status".bold().cyan());
    println!("  {}: {}", "Root".bold(), repo.root().display());
    println!("  {}: {}", "Branch".bold(), status.branch);
    match &status.head {
        Some(head) => println!("  {}: {}", "Head".bold(), super::short(head)),
        None => println!("  {}: {}", "Head".bold(), "no commits yet".dimmed()),
    }
    println!();

    if let Some(pending) = &status.pending_merge {
        println!(
            "{} {}",
            "Merging".yellow().bold(),
            pending.source_branch.yellow()
        );
        for path in &pending.conflicted_paths {
            println!("  {} {}", "!".red().bold(), path);
        }
        println!(
            "Edit the files, then run {} (or {})",
            "minigit resolve".cyan(),
            "minigit merge-abort".cyan()
        );
        println!();
    }

    let changes = &status.changes;
    if changes.is_empty() {
        println!("{}", "No uncommitted changes".green());
        return Ok(());
    }

    println!(
        "{} {}",
        "Uncommitted changes:".bold(),
        format!("({})", changes.len()).yellow()
    );
    println!();
    for path in &changes.added {
        println!("  {} {}", "+".green(), path);
    }
    for path in &changes.modified {
        println!("  {} {}", "~".yellow(), path);
    }
    for path in &changes.deleted {
        println!("  {} {}", "-".red(), path);
    }
    println!();
    println!(
        "Run {} to commit these changes",
        "minigit commit -m \"message\"".cyan()
    );

    Ok(())
}
