use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub fn run(repo_path: Option<PathBuf>, name: Option<String>, delete: bool) -> Result<()> {
    let mut repo = super::open_repo(repo_path)?;

    match (name, delete) {
        (Some(name), true) => {
            repo.delete_branch(&name)?;
            println!("{} {}", "✓ Deleted branch".green().bold(), name);
        }
        (Some(name), false) => {
            let branch = repo.create_branch(&name)?;
            println!("{} {}", "✓ Created branch".green().bold(), branch.name);
            if let Some(head) = &branch.head {
                println!("  {}: {}", "At".bold(), super::short(head));
            }
            println!("Run {} to check it out", format!("minigit switch {name}").cyan());
        }
        (None, true) => anyhow::bail!("Give the name of the branch to delete"),
        (None, false) => {
            for info in repo.branches()? {
                let head = info
                    .branch
                    .head
                    .as_ref()
                    .map(super::short)
                    .unwrap_or_else(|| "(no commits)".to_string());
                if info.is_current {
                    println!("{} {} {}", "*".green().bold(), info.branch.name.green().bold(), head.dimmed());
                } else {
                    println!("  {} {}", info.branch.name, head.dimmed());
                }
            }
        }
    }

    Ok(())
}
