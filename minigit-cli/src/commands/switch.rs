use anyhow::Result;
use colored::Colorize;
use minigit_core::Error;
use std::path::PathBuf;

pub fn run(repo_path: Option<PathBuf>, name: String) -> Result<()> {
    let mut repo = super::open_repo(repo_path)?;

    let summary = match repo.switch_branch(&name) {
        Ok(summary) => summary,
        Err(Error::UncommittedChanges(paths)) => {
            println!("{}", "Cannot switch with uncommitted changes:".yellow().bold());
            for path in &paths {
                println!("  {} {}", "~".yellow(), path);
            }
            println!(
                "Commit them or restore them with {}",
                "minigit revert <path>".cyan()
            );
            return Err(Error::UncommittedChanges(paths).into());
        }
        Err(e) => return Err(e.into()),
    };

    println!("{} {}", "✓ Switched to branch".green().bold(), name.bold());
    println!(
        "  {} created, {} updated, {} removed",
        summary.created.len().to_string().green(),
        summary.updated.len().to_string().yellow(),
        summary.removed.len().to_string().red()
    );

    Ok(())
}
