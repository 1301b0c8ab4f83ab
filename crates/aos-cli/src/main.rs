//! Command-line front end (§6): `run`, `replay`, `replay-sqlite`,
//! `scoreboard export|query`, `registry gen`, `episodes list|events`, all
//! driving the same in-process backends the daemon exposes over HTTP.
//!
//! The CLI returns JSON on stdout and human-readable messages on stderr;
//! exit codes are `0` on success, non-zero on any stage failure or
//! unresolved ambiguity (§7).

mod commands;
mod config;

use clap::{Parser, Subcommand};
use commands::ScoreboardQueryArgs;
use config::CliConfig;
use std::path::PathBuf;

/// Deterministic closed-loop agent orchestration, from the command line.
#[derive(Parser, Debug)]
#[command(name = "aos", version, about)]
struct Cli {
    /// Path to a JSON configuration file (§6 "Environment & config").
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the closed loop once against an SRS file and writes a report.
    Run {
        /// Path to the `TaskSpec` (SRS) JSON file.
        #[arg(long)]
        srs: PathBuf,
        /// Overrides the SRS's `inputs.csv_path`.
        #[arg(long)]
        data: Option<PathBuf>,
        /// Output path for the final Markdown report.
        #[arg(long)]
        out: PathBuf,
        /// Overrides the configured Planner implementation.
        #[arg(long)]
        planner: Option<String>,
        /// Overrides the configured Executor implementation.
        #[arg(long)]
        executor: Option<String>,
        /// Overrides the configured Critic implementation.
        #[arg(long)]
        critic: Option<String>,
        /// Overrides the configured Reviser implementation.
        #[arg(long)]
        reviser: Option<String>,
        /// Also writes a small reproduction script next to `--out`.
        #[arg(long)]
        emit_script: bool,
    },

    /// Reports or re-executes a saved episode from the configured outbox.
    Replay {
        /// Literal trace id or unambiguous prefix.
        #[arg(long)]
        trace: Option<String>,
        /// Selects the most recently recorded episode instead of `--trace`.
        #[arg(long)]
        last: bool,
        /// Lists every known trace id instead of replaying one.
        #[arg(long)]
        list: bool,
        /// Re-executes the saved plan offline instead of reporting the last review.
        #[arg(long)]
        rerun: bool,
        /// Overrides the regenerated report's output path (`--rerun` only).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Reports or re-executes a saved episode from a specific sqlite database.
    ReplaySqlite {
        /// Path to the sqlite outbox database.
        #[arg(long, default_value = "episodes.db")]
        db: PathBuf,
        /// Literal trace id or unambiguous prefix.
        #[arg(long)]
        trace: String,
        /// Re-executes the saved plan offline instead of reporting the last review.
        #[arg(long)]
        rerun: bool,
        /// Overrides the regenerated report's output path (`--rerun` only).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Scoreboard projection export and query (§4.9).
    #[command(subcommand)]
    Scoreboard(ScoreboardCommands),

    /// Skill registry maintenance (§2 C1).
    #[command(subcommand)]
    Registry(RegistryCommands),

    /// Saved-episode inspection (§4.5).
    #[command(subcommand)]
    Episodes(EpisodesCommands),
}

#[derive(Subcommand, Debug)]
enum ScoreboardCommands {
    /// Projects every episode visible to the configured outbox into a scoreboard.
    Export {
        /// Output path: a CSV file or a scoreboard sqlite database, per `--fmt`.
        #[arg(long)]
        out: PathBuf,
        /// `csv` or `sqlite`.
        #[arg(long, default_value = "csv")]
        fmt: String,
    },
    /// Filters/groups/ranks rows from a previously exported scoreboard database.
    Query {
        /// Path to the scoreboard sqlite database (see `scoreboard export --fmt sqlite`).
        #[arg(long)]
        db: PathBuf,
        /// Keep rows whose `model` contains this substring.
        #[arg(long)]
        model: Option<String>,
        /// Keep rows whose `provider` contains this substring.
        #[arg(long)]
        provider: Option<String>,
        /// Absolute ISO-8601 lower bound on `ts`.
        #[arg(long)]
        since: Option<String>,
        /// Absolute ISO-8601 upper bound on `ts`.
        #[arg(long)]
        until: Option<String>,
        /// Relative window, e.g. `7d` or `24h`; overrides `--since`/`--until`.
        #[arg(long)]
        window: Option<String>,
        /// Groups summary rows by `model` or `provider`.
        #[arg(long = "group-by")]
        group_by: Option<String>,
        /// Number of highest-scoring rows to report.
        #[arg(long = "top-n", default_value_t = 10)]
        top_n: usize,
    },
}

#[derive(Subcommand, Debug)]
enum RegistryCommands {
    /// Hashes every skill file under a root directory into a pinned registry.
    Gen {
        /// Directory whose direct children are hashed.
        #[arg(long, default_value = "skills")]
        skills_root: PathBuf,
        /// Output path for the generated registry JSON.
        #[arg(long, default_value = "skills/registry.json")]
        out: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum EpisodesCommands {
    /// Lists known trace ids.
    List {
        /// Also loads and summarizes each episode, not just its trace id.
        #[arg(long)]
        full: bool,
    },
    /// Prints every recorded event for one episode.
    Events {
        /// Literal trace id or unambiguous prefix.
        #[arg(long)]
        trace: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    match dispatch(&cli).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value).expect("json values always serialize"));
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(exit_code(&e));
        }
    }
}

async fn dispatch(cli: &Cli) -> anyhow::Result<serde_json::Value> {
    let cfg = CliConfig::load(cli.config.as_ref())?;

    match &cli.command {
        Commands::Run { srs, data, out, planner, executor, critic, reviser, emit_script } => {
            commands::cmd_run(&cfg, srs, data.as_deref(), out, planner.clone(), executor.clone(), critic.clone(), reviser.clone(), *emit_script).await
        }
        Commands::Replay { trace, last, list, rerun, out } => commands::cmd_replay(&cfg, trace.as_deref(), *last, *list, *rerun, out.as_deref()).await,
        Commands::ReplaySqlite { db, trace, rerun, out } => commands::cmd_replay_sqlite(db, trace, *rerun, out.as_deref()).await,
        Commands::Scoreboard(ScoreboardCommands::Export { out, fmt }) => commands::cmd_scoreboard_export(&cfg, out, fmt).await,
        Commands::Scoreboard(ScoreboardCommands::Query { db, model, provider, since, until, window, group_by, top_n }) => {
            let args = ScoreboardQueryArgs {
                model: model.clone(),
                provider: provider.clone(),
                since: since.clone(),
                until: until.clone(),
                window: window.clone(),
                group_by: group_by.clone(),
                top_n: *top_n,
            };
            commands::cmd_scoreboard_query(db, &args).await
        }
        Commands::Registry(RegistryCommands::Gen { skills_root, out }) => commands::cmd_registry_gen(skills_root, out),
        Commands::Episodes(EpisodesCommands::List { full }) => commands::cmd_episodes_list(&cfg, *full).await,
        Commands::Episodes(EpisodesCommands::Events { trace }) => commands::cmd_episodes_events(&cfg, trace).await,
    }
}

/// Maps a failed command's error onto a process exit code (§7): any stage
/// failure or unresolved ambiguity is non-zero, distinguished just enough
/// to be scriptable (lookup/ambiguity vs. everything else).
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<aos_error::AosError>().map(|e| e.code) {
        Some(aos_error::ErrorCode::NotFound) => 2,
        Some(aos_error::ErrorCode::AmbiguousPrefix) => 3,
        Some(_) => 1,
        None => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_with_required_flags() {
        let cli = Cli::parse_from(["aos", "run", "--srs", "srs.json", "--out", "report.md"]);
        match cli.command {
            Commands::Run { srs, out, .. } => {
                assert_eq!(srs, PathBuf::from("srs.json"));
                assert_eq!(out, PathBuf::from("report.md"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_replay_last_and_rerun() {
        let cli = Cli::parse_from(["aos", "replay", "--last", "--rerun"]);
        match cli.command {
            Commands::Replay { last, rerun, .. } => {
                assert!(last);
                assert!(rerun);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_scoreboard_query_group_by() {
        let cli = Cli::parse_from(["aos", "scoreboard", "query", "--db", "s.db", "--group-by", "model"]);
        match cli.command {
            Commands::Scoreboard(ScoreboardCommands::Query { group_by, top_n, .. }) => {
                assert_eq!(group_by.as_deref(), Some("model"));
                assert_eq!(top_n, 10);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_registry_gen_defaults() {
        let cli = Cli::parse_from(["aos", "registry", "gen"]);
        match cli.command {
            Commands::Registry(RegistryCommands::Gen { skills_root, out }) => {
                assert_eq!(skills_root, PathBuf::from("skills"));
                assert_eq!(out, PathBuf::from("skills/registry.json"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn exit_code_distinguishes_not_found_from_generic_failure() {
        let not_found = anyhow::Error::new(aos_error::AosError::new(aos_error::ErrorCode::NotFound, "no such trace"));
        assert_eq!(exit_code(&not_found), 2);

        let generic = anyhow::anyhow!("boom");
        assert_eq!(exit_code(&generic), 1);
    }
}
