use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use repatch::{
    fingerprint, load_from_path, run_patch_set, FileOutcome, FileReport, RuleStatus, WriteMode,
};
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "repatch")]
#[command(about = "Rule-driven text patching with per-rule verification", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply rule sets to files under a root directory
    Apply {
        /// Root directory containing the target files (defaults to
        /// REPATCH_ROOT, then the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Specific rule set to apply (otherwise applies all in patches/)
        #[arg(short = 'p', long)]
        rules: Option<PathBuf>,

        /// Dry run - report what would change without writing anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Emit the full report as JSON instead of human output
        #[arg(long)]
        json: bool,
    },

    /// Report what each rule set would do without writing or failing
    Check {
        /// Root directory containing the target files
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Specific rule set to check (otherwise checks all in patches/)
        #[arg(short = 'p', long)]
        rules: Option<PathBuf>,

        /// Emit the full report as JSON instead of human output
        #[arg(long)]
        json: bool,
    },

    /// List rule sets, their targets, and their rules
    List {
        /// Specific rule set to list (otherwise lists all in patches/)
        #[arg(short = 'p', long)]
        rules: Option<PathBuf>,
    },

    /// Print a file's content fingerprint for use as expect_hash
    Hash {
        /// File to fingerprint
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            root,
            rules,
            dry_run,
            diff,
            json,
        } => cmd_apply(root, rules, dry_run, diff, json),

        Commands::Check { root, rules, json } => cmd_check(root, rules, json),

        Commands::List { rules } => cmd_list(rules),

        Commands::Hash { path } => cmd_hash(path),
    }
}

/// Resolve the patch root.
///
/// Priority order:
/// 1. Explicit --root flag
/// 2. REPATCH_ROOT environment variable
/// 3. Current directory
fn resolve_root(cli_root: Option<PathBuf>) -> Result<PathBuf> {
    // 1. Explicit flag (highest priority)
    if let Some(path) = cli_root {
        return Ok(path.canonicalize()?);
    }

    // 2. Environment variable
    if let Ok(env_path) = env::var("REPATCH_ROOT") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: REPATCH_ROOT is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    // 3. Current directory
    Ok(env::current_dir()?.canonicalize()?)
}

/// Helper: Discover all .toml rule sets in a patches/ directory.
///
/// Discovery order:
/// 1. `<root>/patches` (allows keeping rule sets alongside the target).
/// 2. `./patches` relative to the current working directory (typical when
///    running from the repo that owns the rule sets).
fn discover_rule_files(root: &Path) -> Result<Vec<PathBuf>> {
    let cwd_patches_dir = env::current_dir().ok().map(|cwd| cwd.join("patches"));
    let root_patches_dir = root.join("patches");

    let candidate_dirs: Vec<PathBuf> = std::iter::once(root_patches_dir)
        .chain(cwd_patches_dir.into_iter())
        .collect();

    for patches_dir in candidate_dirs {
        if !patches_dir.exists() {
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&patches_dir).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort();

        if !files.is_empty() {
            return Ok(files);
        }
    }

    anyhow::bail!(
        "No .toml rule sets found in either ./patches or {}/patches",
        root.display()
    )
}

/// Helper: Show unified diff between original and patched content
fn display_diff(file: &Path, original: &str, patched: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, patched);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn print_file_report(report: &FileReport, show_diff: bool) {
    match &report.outcome {
        FileOutcome::Patched | FileOutcome::WouldPatch => {
            println!(
                "{} {}: {}",
                "✓".green(),
                report.path.display(),
                report.outcome
            );
        }
        FileOutcome::Unchanged => {
            println!(
                "{} {}: {}",
                "⊙".yellow(),
                report.path.display(),
                report.outcome
            );
        }
        FileOutcome::Withheld => {
            println!(
                "{} {}: {}",
                "⊘".cyan(),
                report.path.display(),
                report.outcome
            );
        }
        FileOutcome::Drifted { .. } | FileOutcome::Failed { .. } => {
            eprintln!(
                "{} {}: {}",
                "✗".red(),
                report.path.display(),
                report.outcome
            );
        }
    }

    for result in &report.results {
        match &result.status {
            RuleStatus::Replaced => {
                println!("  {} {}: {}", "✓".green(), result.rule_id, result);
            }
            RuleStatus::NoMatch => {
                println!("  {} {}: {}", "⊙".yellow(), result.rule_id, result);
            }
            RuleStatus::AmbiguousMatch { .. } => {
                println!("  {} {}: {}", "⊘".cyan(), result.rule_id, result);
            }
            RuleStatus::MissingRequiredMatch | RuleStatus::InvalidMatcher { .. } => {
                eprintln!("  {} {}: {}", "✗".red(), result.rule_id, result);
            }
        }
    }

    for hint in &report.hints {
        println!("  {}", format!("{}", hint).dimmed());
    }

    if show_diff
        && matches!(
            report.outcome,
            FileOutcome::Patched | FileOutcome::WouldPatch
        )
    {
        display_diff(&report.path, &report.original, &report.patched);
    }
}

fn cmd_apply(
    root: Option<PathBuf>,
    rules: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
    json: bool,
) -> Result<()> {
    // 1. Resolve the patch root
    let root = resolve_root(root)?;

    // 2. Determine rule sets to load
    let rule_files = if let Some(path) = rules {
        vec![path]
    } else {
        discover_rule_files(&root)?
    };

    let mode = if dry_run {
        WriteMode::DryRun
    } else {
        WriteMode::Apply
    };

    if !json {
        println!("Root: {}", root.display());
        if dry_run {
            println!("{}", "[DRY RUN - no files will be modified]".cyan());
        }
        println!();
    }

    // 3. Run each rule set and report per file
    let mut total_patched = 0;
    let mut total_unchanged = 0;
    let mut total_withheld = 0;
    let mut total_failed = 0;
    let mut run_failed = false;
    let mut all_reports: Vec<FileReport> = Vec::new();

    for rule_file in rule_files {
        if !json {
            println!("Loading rules from {}...", rule_file.display());
        }

        let set = load_from_path(&rule_file)?;
        let reports = run_patch_set(&set, &root, mode)?;

        for report in &reports {
            if !report.succeeded {
                run_failed = true;
            }

            match &report.outcome {
                FileOutcome::Patched | FileOutcome::WouldPatch => total_patched += 1,
                FileOutcome::Unchanged => total_unchanged += 1,
                FileOutcome::Withheld => total_withheld += 1,
                FileOutcome::Drifted { .. } | FileOutcome::Failed { .. } => total_failed += 1,
            }

            if !json {
                print_file_report(report, show_diff);
            }
        }

        all_reports.extend(reports);

        if !json {
            println!();
        }
    }

    // 4. Summary
    if json {
        println!("{}", serde_json::to_string_pretty(&all_reports)?);
    } else {
        let patched_label = if dry_run { "would patch" } else { "patched" };
        println!("{}", "Summary:".bold());
        println!(
            "  {} {}",
            format!("{}", total_patched).green(),
            patched_label
        );
        println!("  {} unchanged", format!("{}", total_unchanged).yellow());
        println!("  {} withheld", format!("{}", total_withheld).cyan());
        println!("  {} failed", format!("{}", total_failed).red());
    }

    if run_failed {
        std::process::exit(1);
    }

    Ok(())
}

/// Human reason for a file that needs attention, taken from its first
/// failing rule.
fn failure_reason(report: &FileReport) -> String {
    report
        .results
        .iter()
        .find(|result| !result.succeeded)
        .map(|result| match &result.status {
            RuleStatus::MissingRequiredMatch => {
                format!("rule '{}' matched nothing", result.rule_id)
            }
            RuleStatus::AmbiguousMatch {
                expected, found, ..
            } => format!(
                "rule '{}' found {} occurrence(s), expected {}",
                result.rule_id, found, expected
            ),
            RuleStatus::InvalidMatcher { .. } => {
                format!("rule '{}' has an invalid matcher", result.rule_id)
            }
            _ => format!("rule '{}' failed", result.rule_id),
        })
        .unwrap_or_else(|| "rule failures".to_string())
}

fn cmd_check(root: Option<PathBuf>, rules: Option<PathBuf>, json: bool) -> Result<()> {
    // 1. Resolve the patch root
    let root = resolve_root(root)?;

    // 2. Discover rule sets
    let rule_files = if let Some(path) = rules {
        vec![path]
    } else {
        discover_rule_files(&root)?
    };

    if !json {
        println!("{}", "Rule Set Status".bold());
        println!("Root: {}", root.display());
        println!();
    }

    let mut pending = Vec::new();
    let mut clean = Vec::new();
    let mut attention = Vec::new();
    let mut all_reports: Vec<FileReport> = Vec::new();

    // 3. Evaluate every rule set without writing; check reports but
    //    never fails the process
    for rule_file in rule_files {
        let set = load_from_path(&rule_file)?;
        let reports = run_patch_set(&set, &root, WriteMode::DryRun)?;

        for report in &reports {
            let path = report.path.display().to_string();
            match &report.outcome {
                FileOutcome::WouldPatch => {
                    let changed = report
                        .results
                        .iter()
                        .filter(|result| result.occurrences_replaced > 0)
                        .count();
                    pending.push((path, format!("{} rule(s) would change it", changed)));
                }
                FileOutcome::Unchanged if report.succeeded => {
                    clean.push(path);
                }
                FileOutcome::Unchanged => {
                    attention.push((path, failure_reason(report)));
                }
                FileOutcome::Withheld => {
                    attention.push((path, format!("withheld: {}", failure_reason(report))));
                }
                other => {
                    attention.push((path, other.to_string()));
                }
            }
        }

        all_reports.extend(reports);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&all_reports)?);
        return Ok(());
    }

    // 4. Report grouped by status
    if !pending.is_empty() {
        println!(
            "{} {} ({} files)",
            "⊙".yellow(),
            "PENDING".yellow().bold(),
            pending.len()
        );
        for (path, detail) in &pending {
            println!("  - {} ({})", path, detail.dimmed());
        }
        println!();
    }

    if !clean.is_empty() {
        println!(
            "{} {} ({} files)",
            "✓".green(),
            "UP TO DATE".green().bold(),
            clean.len()
        );
        for path in &clean {
            println!("  - {}", path);
        }
        println!();
    }

    if !attention.is_empty() {
        println!(
            "{} {} ({} files)",
            "✗".red(),
            "NEEDS ATTENTION".red().bold(),
            attention.len()
        );
        for (path, reason) in &attention {
            println!("  - {} ({})", path, reason.dimmed());
        }
        println!();
    }

    Ok(())
}

fn cmd_list(rules: Option<PathBuf>) -> Result<()> {
    let rule_files = if let Some(path) = rules {
        vec![path]
    } else {
        let root = resolve_root(None)?;
        discover_rule_files(&root)?
    };

    for rule_file in rule_files {
        let set = load_from_path(&rule_file)?;

        let title = if set.meta.name.is_empty() {
            rule_file.display().to_string()
        } else {
            set.meta.name.clone()
        };
        println!("{}", title.bold());
        if let Some(description) = &set.meta.description {
            println!("  {}", description.dimmed());
        }
        println!("  write: {}, strict: {}", set.meta.write, set.meta.strict);

        for file in &set.files {
            println!("  {}", file.path);
            for rule in &file.rules {
                let marker = if rule.required { "required" } else { "optional" };
                println!(
                    "    {} [{}, x{}] {}",
                    rule.id.bold(),
                    marker,
                    rule.occurrences,
                    preview(rule.matcher.source()).dimmed()
                );
            }
        }
        println!();
    }

    Ok(())
}

fn cmd_hash(path: PathBuf) -> Result<()> {
    let hash = fingerprint(&path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    println!("{hash:016x}");
    Ok(())
}

/// One-line preview of a matcher source for listings.
fn preview(text: &str) -> String {
    const MAX: usize = 45;
    let flat = text.replace('\n', "\\n");
    if flat.chars().count() > MAX {
        let cut: String = flat.chars().take(MAX).collect();
        format!("{cut}…")
    } else {
        flat
    }
}
