#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory as _, Parser, Subcommand};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::config::{self, Config};
use crate::core::display;
use crate::core::git::Git;
use crate::core::worktree::{Worktree, WorktreeManager};
use crate::error::GwtError;
use crate::lock::WorktreeLock;
use crate::logging;
use crate::output::table::Table;
use crate::select::{self, Selection};
use crate::shell::{self, Shell};
use crate::term;

#[derive(Debug, Parser)]
#[command(name = "git-wt", version, about = "Navigate and manage git worktrees")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a worktree and switch to it
    New(NewArgs),
    /// Remove worktrees
    #[command(alias = "remove")]
    Rm(RmArgs),
    /// Switch to a worktree
    #[command(alias = "switch")]
    Go(GoArgs),
    /// List worktrees
    #[command(alias = "ls")]
    List(ListArgs),
    /// Prune worktrees whose directory is gone
    Clean(CleanArgs),
    Config(ConfigArgs),
    /// Print the shell function that enables directory switching
    Init(InitArgs),
    Completion(CompletionArgs),
    Version,
}

#[derive(Debug, Parser)]
pub struct NewArgs {
    /// Branch to check out (created when it does not exist)
    pub branch: String,
    /// Start point for a new branch
    #[arg(short = 'b', long = "base")]
    pub base: Option<String>,
    /// Worktree directory (default: <base_dir>/<repo>-<branch>)
    #[arg(short = 'p', long = "path")]
    pub path: Option<PathBuf>,
    /// Stay in the current directory
    #[arg(long = "no-cd")]
    pub no_cd: bool,
}

#[derive(Debug, Parser)]
pub struct RmArgs {
    /// Force removal even if the worktree is dirty
    #[arg(short = 'f', long = "force")]
    pub force: bool,
    /// Also delete the worktree's branch
    #[arg(short = 'b', long = "delete-branch")]
    pub delete_branch: bool,
    /// Show what would be removed
    #[arg(short = 'd', long = "dry-run")]
    pub dry_run: bool,
    /// Substring of branch or path
    pub pattern: Option<String>,
}

#[derive(Debug, Parser)]
pub struct GoArgs {
    /// Substring of branch or path
    pub pattern: Option<String>,
}

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Output in JSON format
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct CleanArgs {
    /// Report without pruning
    #[arg(short = 'd', long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    List,
    Get(ConfigGetArgs),
}

#[derive(Debug, Parser)]
pub struct ConfigGetArgs {
    pub key: String,
}

#[derive(Debug, Parser)]
pub struct InitArgs {
    pub shell: Shell,
    /// Name of the generated function
    #[arg(long = "name", default_value = "gwt")]
    pub name: String,
}

#[derive(Debug, Parser)]
pub struct CompletionArgs {
    pub shell: clap_complete::Shell,
}

pub fn main() -> ExitCode {
    let cli = Cli::parse();

    let level_var = std::env::var(logging::LOG_LEVEL_ENV).ok();
    if let Err(err) = logging::setup_logging(logging::level_from(level_var.as_deref()))
        && level_var.is_some()
    {
        eprintln!("Warning: logging disabled: {err:#}");
    }

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            if matches!(err.downcast_ref::<GwtError>(), Some(GwtError::Cancelled)) {
                eprintln!("Cancelled");
                return ExitCode::SUCCESS;
            }
            log::debug!("command failed: {err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.cmd {
        Commands::New(args) => cmd_new(args),
        Commands::Rm(args) => cmd_rm(args),
        Commands::Go(args) => cmd_go(args),
        Commands::List(args) => cmd_list(args),
        Commands::Clean(args) => cmd_clean(args),
        Commands::Config(args) => match args.cmd {
            ConfigCmd::List => {
                print!("{}", config::list_resolved_toml()?);
                Ok(ExitCode::SUCCESS)
            }
            ConfigCmd::Get(get) => match config::get_value_string(&get.key)? {
                Some(v) => {
                    println!("{v}");
                    Ok(ExitCode::SUCCESS)
                }
                None => anyhow::bail!(
                    "configuration key '{}' not found - use 'git-wt config list' to see available keys",
                    get.key
                ),
            },
        },
        Commands::Init(args) => {
            print!("{}", shell::init_script(args.shell, &args.name, "git-wt"));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Completion(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "git-wt", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Version => {
            println!("git-wt {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn manager() -> anyhow::Result<(Config, WorktreeManager)> {
    let cfg = config::load()?;
    let git = Git::from_cwd()?;
    let wm = WorktreeManager::new(git, cfg.clone());
    Ok((cfg, wm))
}

fn cmd_new(args: NewArgs) -> anyhow::Result<ExitCode> {
    let (cfg, wm) = manager()?;

    let path = with_repo_lock(wm.git(), &cfg, || {
        Ok(wm.add(&args.branch, args.base.as_deref(), args.path.as_deref())?)
    })?;
    println!(
        "Created worktree for branch '{}' at {}",
        args.branch,
        path.display()
    );

    if !args.no_cd {
        shell::emit_cd(&path)?;
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_rm(args: RmArgs) -> anyhow::Result<ExitCode> {
    let (cfg, wm) = manager()?;

    let candidates: Vec<Worktree> = wm.list()?.into_iter().filter(|w| !w.is_main).collect();
    if candidates.is_empty() {
        anyhow::bail!("no removable worktrees found");
    }

    let selected = match args.pattern.as_deref() {
        Some(pat) => {
            let matches: Vec<Worktree> =
                candidates.into_iter().filter(|w| w.matches(pat)).collect();
            match matches.len() {
                0 => anyhow::bail!("no worktree matches pattern: {pat}"),
                1 => matches,
                _ => pick_many("Select worktrees to remove", matches, &cfg)?,
            }
        }
        None => pick_many("Select worktrees to remove", candidates, &cfg)?,
    };

    if args.dry_run {
        println!("Would remove the following worktrees:");
        for wt in &selected {
            println!("  {} ({})", display_branch(wt), wt.path);
            if args.delete_branch && !wt.branch.is_empty() {
                println!("    - Would delete branch: {}", wt.branch);
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let (failures, left_current) = with_repo_lock(wm.git(), &cfg, || {
        let mut failures = 0usize;
        let mut left_current = false;
        for wt in &selected {
            if let Err(e) = wm.remove(wt, args.force, args.delete_branch) {
                eprintln!("Error: failed to remove {}: {e}", display_branch(wt));
                failures += 1;
                continue;
            }
            println!("Removed worktree: {}", display_branch(wt));
            if args.delete_branch && !wt.branch.is_empty() {
                println!("Deleted branch: {}", wt.branch);
            }
            left_current |= wt.is_current;
        }
        Ok((failures, left_current))
    })?;

    // The shell is sitting in a directory that no longer exists.
    if left_current && let Some(main) = wm.list()?.into_iter().find(|w| w.is_main) {
        shell::emit_cd(Path::new(&main.path))?;
    }

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn cmd_go(args: GoArgs) -> anyhow::Result<ExitCode> {
    let (cfg, wm) = manager()?;

    let worktrees = match args.pattern.as_deref() {
        Some(pat) => wm.matching(pat)?,
        None => wm.list()?,
    };
    let target = match worktrees.len() {
        0 => match args.pattern {
            Some(pat) => anyhow::bail!("no worktree matches pattern: {pat}"),
            None => anyhow::bail!("no worktrees found"),
        },
        1 => worktrees.into_iter().next(),
        _ => pick_one("Select worktree", worktrees, &cfg)?,
    };
    let Some(target) = target else {
        return Err(GwtError::Cancelled.into());
    };

    shell::emit_cd(Path::new(&target.path))?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_list(args: ListArgs) -> anyhow::Result<ExitCode> {
    let (_cfg, wm) = manager()?;
    let worktrees = wm.list()?;

    if args.json {
        let mut out = serde_json::to_string_pretty(&worktrees)?;
        out.push('\n');
        print!("{out}");
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = Table::new(["", "BRANCH", "HEAD", "PATH"]);
    for wt in &worktrees {
        let marker = if wt.is_current { "*" } else { "" };
        let mut path = wt.path.clone();
        if wt.prunable {
            path.push_str(" (missing)");
        } else if wt.locked {
            path.push_str(" (locked)");
        }
        table.row([
            marker.to_owned(),
            display_branch(wt).to_owned(),
            wt.head.chars().take(7).collect(),
            path,
        ]);
    }
    table.print()?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_clean(args: CleanArgs) -> anyhow::Result<ExitCode> {
    let (cfg, wm) = manager()?;

    let report = if args.dry_run {
        wm.prune(true)?
    } else {
        with_repo_lock(wm.git(), &cfg, || Ok(wm.prune(false)?))?
    };

    if report.is_empty() {
        println!("Nothing to clean");
    } else {
        let verb = if args.dry_run { "Would prune" } else { "Pruned" };
        for line in report {
            println!("{verb}: {line}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Runs `f` while holding the repository lock, reaping a lock left behind
/// by a dead process first.
fn with_repo_lock<T>(
    git: &Git,
    cfg: &Config,
    f: impl FnOnce() -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let mut lock = WorktreeLock::for_git_dir(&git.git_common_dir()?);

    match lock.clean_stale() {
        Ok(true) => eprintln!("Removed stale lock {}", lock.path().display()),
        Ok(false) => {}
        Err(e) => {
            log::warn!("stale lock check failed: {e}");
            eprintln!("Warning: {e}");
        }
    }

    if let Err(e) = lock.acquire(cfg.lock.timeout()) {
        if let Ok(Some(holder)) = lock.holder() {
            let since = holder
                .acquired_at
                .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
                .and_then(|t| t.format(&Rfc3339).ok())
                .unwrap_or_else(|| "an unknown time".to_owned());
            eprintln!("Lock held by pid {} since {since}", holder.pid);
        }
        return Err(e.into());
    }

    let result = f();
    lock.release();
    result
}

fn pick_one(
    title: &str,
    worktrees: Vec<Worktree>,
    cfg: &Config,
) -> anyhow::Result<Option<Worktree>> {
    print_title(title);
    let items = display::format_items(&worktrees);
    match select::choose(&items, false, cfg.select.options())? {
        Selection::Single(i) => Ok(worktrees.into_iter().nth(i)),
        Selection::Multiple(_) | Selection::Cancelled => Err(GwtError::Cancelled.into()),
    }
}

fn pick_many(
    title: &str,
    worktrees: Vec<Worktree>,
    cfg: &Config,
) -> anyhow::Result<Vec<Worktree>> {
    print_title(title);
    let items = display::format_items(&worktrees);
    let picked = match select::choose(&items, true, cfg.select.options())? {
        Selection::Multiple(picked) => picked,
        Selection::Single(i) => vec![i],
        Selection::Cancelled => return Err(GwtError::Cancelled.into()),
    };
    if picked.is_empty() {
        return Err(GwtError::Cancelled.into());
    }
    Ok(worktrees
        .into_iter()
        .enumerate()
        .filter_map(|(i, wt)| picked.binary_search(&i).is_ok().then_some(wt))
        .collect())
}

/// The list is drawn on stdout below the title; the numbered fallback
/// prompts on stderr.
fn print_title(title: &str) {
    if term::is_interactive() {
        println!("{title}");
    } else {
        eprintln!("{title}");
    }
}

fn display_branch(wt: &Worktree) -> &str {
    if wt.branch.is_empty() {
        "(detached)"
    } else {
        &wt.branch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_new_with_base() {
        let cli = Cli::try_parse_from(["git-wt", "new", "feature/x", "--base", "main"]).unwrap();
        match cli.cmd {
            Commands::New(args) => {
                assert_eq!(args.branch, "feature/x");
                assert_eq!(args.base.as_deref(), Some("main"));
                assert!(!args.no_cd);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn aliases_resolve() {
        assert!(matches!(
            Cli::try_parse_from(["git-wt", "remove", "-f"]).unwrap().cmd,
            Commands::Rm(RmArgs { force: true, .. })
        ));
        assert!(matches!(
            Cli::try_parse_from(["git-wt", "switch", "auth"]).unwrap().cmd,
            Commands::Go(_)
        ));
        assert!(matches!(
            Cli::try_parse_from(["git-wt", "ls", "--json"]).unwrap().cmd,
            Commands::List(ListArgs { json: true })
        ));
    }

    #[test]
    fn detached_worktrees_display_placeholder() {
        let wt = Worktree::default();
        assert_eq!(display_branch(&wt), "(detached)");
    }
}
