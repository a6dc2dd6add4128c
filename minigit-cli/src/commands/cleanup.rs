use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use minigit_core::Repository;
use std::path::PathBuf;

pub fn run(repo_path: Option<PathBuf>, yes: bool) -> Result<()> {
    let repo = super::open_repo(repo_path)?;
    let root = repo.root().to_path_buf();
    drop(repo);

    println!("{}", "Cleanup".bold().cyan());
    println!("  {}: {}", "Repository".bold(), root.display());
    println!("  {}", "All history and branches will be deleted; work-tree files stay.".dimmed());
    println!();

    if !yes {
        let proceed = Confirm::new()
            .with_prompt("Delete the repository metadata?")
            .default(false)
            .interact()?;
        if !proceed {
            println!("{}", "Cleanup cancelled".yellow());
            return Ok(());
        }
    }

    Repository::destroy(&root)?;
    println!("{}", "✓ Repository removed".green().bold());

    Ok(())
}
