use anyhow::Result;
use colored::Colorize;
use minigit_core::{RepoConfig, Repository};
use std::path::PathBuf;

use super::EventLog;

pub fn run(path: Option<PathBuf>, branch: String, ignore: Vec<String>) -> Result<()> {
    let root = super::get_repo_root(path)?;
    std::fs::create_dir_all(&root)?;

    let mut config = RepoConfig::default().with_default_branch(branch);
    config.ignore_patterns.extend(ignore);

    let sink = EventLog::new(&std::fs::canonicalize(&root)?);
    let repo = Repository::init_with_sink(&root, config, Box::new(sink))?;

    println!("{}", "✓ Initialized empty minigit repository".green().bold());
    println!("  {}: {}", "Root".bold(), repo.root().display());
    println!("  {}: {}", "Branch".bold(), repo.config().default_branch);
    println!(
        "  {}: {}",
        "Ignoring".bold(),
        repo.config().ignore_patterns.join(", ").dimmed()
    );

    Ok(())
}
