use anyhow::Result;
use colored::Colorize;
use minigit_core::DirectoryRemote;
use std::path::PathBuf;

fn remote_for(root: &std::path::Path, custom: Option<PathBuf>) -> DirectoryRemote {
    match custom {
        Some(dir) => DirectoryRemote::new(dir),
        None => DirectoryRemote::beside(root),
    }
}

pub fn push(repo_path: Option<PathBuf>, remote: Option<PathBuf>) -> Result<()> {
    let repo = super::open_repo(repo_path)?;
    let remote = remote_for(repo.root(), remote);
    let report = repo.push(&remote)?;

    println!("{}", "✓ Pushed".green().bold());
    println!("  {}: {}", "Remote".bold(), remote.dir().display());
    println!(
        "  {} commit(s), {} blob(s), {} branch(es)",
        report.commits.to_string().cyan(),
        report.blobs.to_string().cyan(),
        report.branches.to_string().cyan()
    );

    Ok(())
}

pub fn pull(repo_path: Option<PathBuf>, remote: Option<PathBuf>, checkout: bool) -> Result<()> {
    let mut repo = super::open_repo(repo_path)?;
    let remote = remote_for(repo.root(), remote);

    let Some(report) = repo.pull(&remote)? else {
        println!("{}", "Remote is empty; nothing to pull".yellow());
        return Ok(());
    };

    println!("{}", "✓ Pulled".green().bold());
    println!("  {}: {}", "Remote".bold(), remote.dir().display());
    println!(
        "  {} new commit(s), {} new blob(s)",
        report.commits.to_string().cyan(),
        report.blobs.to_string().cyan()
    );
    for name in &report.branches_created {
        println!("  {} {}", "+ branch".green(), name);
    }

    let current = repo.current_branch_label()?;
    if checkout {
        let restored = repo.restore_missing()?;
        println!(
            "  {} missing file(s) written to the work tree",
            restored.len().to_string().cyan()
        );
    } else if report.adopted.contains(&current) {
        println!();
        println!(
            "{} now has commits but its files are not in the work tree; run {} to write them",
            current.bold(),
            "minigit pull --checkout".cyan()
        );
    }
    if !report.diverged.is_empty() {
        println!();
        println!("{}", "Branches that differ from the remote (left unchanged):".yellow());
        for name in &report.diverged {
            println!("  {} {}", "≠".yellow(), name);
        }
    }

    Ok(())
}
