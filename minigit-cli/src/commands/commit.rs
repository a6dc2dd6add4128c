use anyhow::Result;
use colored::Colorize;
use minigit_core::Error;
use std::path::PathBuf;

pub fn run(repo_path: Option<PathBuf>, message: String, author: Option<String>) -> Result<()> {
    let mut repo = super::open_repo(repo_path)?;
    let changes = repo.changes()?;

    if changes.is_empty() {
        println!("{}", "Nothing to commit, working tree clean".yellow());
        return Ok(());
    }

    println!("{}", "Creating commit...".bold());
    println!("  {}: {}", "Changes".bold(), changes.len());
    println!();

    let commit = match repo.create_commit(&message, author.as_deref(), &changes) {
        Ok(commit) => commit,
        Err(Error::MergeInProgress) => {
            println!("{}", "A merge is in progress.".yellow());
            println!(
                "Run {} to finish it or {} to drop it",
                "minigit resolve".cyan(),
                "minigit merge-abort".cyan()
            );
            return Err(Error::MergeInProgress.into());
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", "✓ Commit created successfully!".green().bold());
    println!("  {}: {}", "Commit".bold(), commit.id);
    println!("  {}: {}", "Branch".bold(), repo.current_branch_label()?);
    println!("  {}: {}", "Message".bold(), commit.message);
    println!("  {}: {}", "Author".bold(), commit.author);
    println!(
        "  {}: {} added, {} modified, {} deleted",
        "Files".bold(),
        changes.added.len().to_string().green(),
        changes.modified.len().to_string().yellow(),
        changes.deleted.len().to_string().red()
    );

    Ok(())
}
