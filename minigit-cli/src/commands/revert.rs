use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub fn run(repo_path: Option<PathBuf>, path: String) -> Result<()> {
    let mut repo = super::open_repo(repo_path)?;
    repo.revert(&path)?;

    println!("{} {}", "✓ Restored".green().bold(), path);
    if let Some(head) = repo.head()? {
        println!("  {}: {}", "From".bold(), super::short(&head));
    }

    Ok(())
}
