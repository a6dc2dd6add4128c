use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub fn run(repo_path: Option<PathBuf>, limit: Option<usize>) -> Result<()> {
    let repo = super::open_repo(repo_path)?;
    let entries = repo.log(limit)?;

    if entries.is_empty() {
        println!("{}", "No commits yet".yellow());
        return Ok(());
    }

    println!(
        "{} {}",
        "Commit History".bold().cyan(),
        format!("({})", repo.current_branch_label()?).dimmed()
    );
    println!();

    for entry in &entries {
        let commit = &entry.commit;

        println!(
            "{} {}",
            "commit".yellow().bold(),
            commit.id.to_string().yellow()
        );
        if commit.is_merge() {
            let parents: Vec<String> = commit.parents.iter().map(super::short).collect();
            println!("{}: {}", "Merge".bold(), parents.join(" "));
        }
        println!("{}: {}", "Author".bold(), commit.author);
        println!(
            "{}: {}",
            "Date".bold(),
            commit
                .timestamp
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
        );
        println!();
        for line in commit.message.lines() {
            println!("    {}", line);
        }
        println!();
        println!("    {} file(s) changed", entry.files.len().to_string().cyan());

        for path in entry.files.iter().take(5) {
            println!("      • {}", path.dimmed());
        }
        if entry.files.len() > 5 {
            println!(
                "      {} and {} more...",
                "...".dimmed(),
                (entry.files.len() - 5).to_string().dimmed()
            );
        }

        println!();
    }

    if limit.is_some_and(|n| entries.len() == n) {
        println!("Use {} to see more", "-n N".cyan());
    }

    Ok(())
}
