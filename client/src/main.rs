//! A simple CLI for roller derby game statistics.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::too_many_lines)]

extern crate derby_common;
use derby_common::chart_series::{
    NO_BLOCKER_DATA, NO_JAMMER_DATA, NO_SCORE_DATA, SummaryRow, jam_share_tooltip, stats_charts,
};
use derby_common::client_api::{StoreClient, StoreConfig, load_game_stats};
use derby_common::{
    CLIENT_VERSION, DEFAULT_MAX_RETRIES, Game, GameStatsReport, PeriodFilter, Selection,
    SelectionTracker, TeamSide,
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::debug;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// The game to show stats for
    #[arg(env = "DERBY_GAME_ID")]
    game_id: String,

    /// The team whose jammers and lines are summarized
    #[arg(short, long, value_enum, default_value = "home", env = "DERBY_SIDE")]
    side: TeamSide,

    /// Restrict the stats to one period
    #[arg(short, long, value_enum, default_value = "all", env = "DERBY_PERIOD")]
    period: PeriodFilter,

    /// The base URL of the hosted database
    #[arg(long, env = "DERBY_API_BASE")]
    api_base: String,

    /// The anonymous API key of the hosted database
    #[arg(long, env = "DERBY_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Give up on a request after this many attempts
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES, env = "DERBY_MAX_RETRIES")]
    max_retries: u32,

    /// How to print the stats
    #[arg(short, long, value_enum, default_value = "text", env = "DERBY_FORMAT")]
    format: OutputFormat,

    /// Read side and period changes from stdin and reload on each one
    #[arg(short, long, env = "DERBY_INTERACTIVE")]
    interactive: bool,

    /// Suppress all output except the stats
    #[arg(short, long, env = "DERBY_QUIET")]
    quiet: bool,

    /// Show additional output
    #[arg(short, long, env = "DERBY_VERBOSE")]
    verbose: bool,
}

/// Apply one interactive command to the current selection.
fn apply_command(command: &str, current: &Selection) -> Result<Selection, String> {
    let command = command.trim();
    if matches!(command, "r" | "reload") {
        return Ok(current.clone());
    }
    if let Ok(side) = command.parse::<TeamSide>() {
        return Ok(current.with_side(side));
    }
    if let Ok(period) = command.parse::<PeriodFilter>() {
        return Ok(current.with_period(period));
    }
    Err(format!(
        "Unknown command {command:?}. Try home, visiting, all, 1, 2, reload or quit."
    ))
}

fn side_name(game: &Game, side: TeamSide) -> String {
    game.team_name(side).to_string()
}

fn period_name(period: PeriodFilter) -> &'static str {
    match period {
        PeriodFilter::All => "Full Game",
        PeriodFilter::First => "Period 1",
        PeriodFilter::Second => "Period 2",
    }
}

/// Print the table of one summary section.
fn print_rows<R: SummaryRow>(title: &str, rows: &[R], total_jams: usize, empty_message: &str) {
    println!("== {title} ==");
    if rows.is_empty() {
        println!("{empty_message}");
        return;
    }
    println!(
        "{:<28} {:>22} {:>7} {:>5} {:>8} {:>6}",
        "", "Jams", "Lead %", "For", "Against", "Total"
    );
    for row in rows {
        // strip the tooltip prefix, keep "n/total (pct%)"
        let share = jam_share_tooltip(row.jam_count(), total_jams);
        let share = share.trim_start_matches("Jams played: ");
        println!(
            "{:<28} {:>22} {:>6.0}% {:>5} {:>8} {:>+6}",
            row.label(),
            share,
            row.lead_percentage(),
            row.points_for(),
            row.points_against(),
            row.point_differential()
        );
    }
}

fn print_text(report: &GameStatsReport, game: &Game) {
    let home = side_name(game, TeamSide::Home);
    let visiting = side_name(game, TeamSide::Visiting);
    let selected = side_name(game, report.selection.side);

    println!(
        "{home} vs {visiting} ({}), stats for {selected}",
        period_name(report.selection.period)
    );
    if let Some(location) = &game.location {
        println!("Location: {location}");
    }
    if let Some(start) = game.start_date {
        println!("Date: {}", start.format("%Y-%m-%d %H:%M"));
    }
    println!();

    println!("== Score Evolution ==");
    if report.timeline.is_empty() {
        println!("{NO_SCORE_DATA}");
    } else {
        for point in &report.timeline {
            println!(
                "{:<8} {:>4} - {:<4}",
                point.label, point.home_score, point.visiting_score
            );
        }
        let (home_score, visiting_score) = report.final_score;
        println!("Score: {home} {home_score} - {visiting_score} {visiting}");
    }
    println!();

    print_rows("Jammer Stats", &report.jammers, report.total_jams, NO_JAMMER_DATA);
    println!();
    print_rows("Blocker Stats", &report.lines, report.total_jams, NO_BLOCKER_DATA);
}

fn print_report(report: &GameStatsReport, game: &Game, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print_text(report, game),
        OutputFormat::Json => {
            let charts = stats_charts(
                report,
                game.home_team.as_ref().map(|t| t.name.as_str()),
                game.visiting_team.as_ref().map(|t| t.name.as_str()),
            );
            let output = serde_json::json!({
                "game": game,
                "report": report,
                "charts": charts,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("Failed to serialize report")?
            );
        }
    }
    Ok(())
}

/// Start loading `selection` in the background. The result is printed only if
/// no newer selection was made in the meantime.
fn spawn_load(
    client: &Arc<StoreClient>,
    tracker: &Arc<SelectionTracker>,
    game: &Arc<Game>,
    selection: Selection,
    format: OutputFormat,
) -> JoinHandle<()> {
    let client = Arc::clone(client);
    let tracker = Arc::clone(tracker);
    let game = Arc::clone(game);
    // taken now, before the task is first polled
    let token = tracker.begin(selection.clone());
    tokio::spawn(async move {
        match load_game_stats(&client, &tracker, token, &selection).await {
            Ok(Some(report)) => {
                if let Err(e) = print_report(&report, &game, format) {
                    eprintln!("Error: {e:#}");
                }
            }
            Ok(None) => debug!("Load superseded by a newer selection"),
            Err(e) => eprintln!("Error: {e:#}"),
        }
    })
}

/// Read selector changes from stdin until EOF or "quit".
async fn run_interactive(
    client: Arc<StoreClient>,
    game: Arc<Game>,
    mut selection: Selection,
    cli: &Cli,
) -> Result<()> {
    let tracker = Arc::new(SelectionTracker::new());
    let mut in_flight = spawn_load(&client, &tracker, &game, selection.clone(), cli.format);

    if !cli.quiet {
        eprintln!("Commands: home, visiting, all, 1, 2, reload, quit");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if matches!(command, "q" | "quit" | "exit") {
            break;
        }
        match apply_command(command, &selection) {
            Ok(next) => {
                selection = next;
                // the token already hides its output, aborting just saves the requests
                in_flight.abort();
                in_flight = spawn_load(&client, &tracker, &game, selection.clone(), cli.format);
            }
            Err(msg) => eprintln!("{msg}"),
        }
    }

    // let the last load finish before exiting
    if !in_flight.is_finished() {
        let _ = in_flight.await;
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = StoreConfig::new(&cli.api_base, cli.api_key.clone()).with_max_retries(cli.max_retries);
    let client = Arc::new(StoreClient::new(config)?);
    if cli.verbose {
        eprintln!("Store: {}", client.config().table_url("jams"));
    }

    let game = client
        .fetch_game(&cli.game_id)
        .await
        .context("Failed to load game")?;
    if cli.verbose {
        eprintln!("Game: {game:?}");
    }
    let game = Arc::new(game);
    let selection = Selection::new(cli.game_id.clone(), cli.side, cli.period);

    if cli.interactive {
        return run_interactive(client, game, selection, &cli).await;
    }

    let tracker = SelectionTracker::new();
    let token = tracker.begin(selection.clone());
    if let Some(report) = load_game_stats(&client, &tracker, token, &selection).await? {
        print_report(&report, &game, cli.format)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Pick up DERBY_* settings from a local .env before parsing
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let cli = Cli::parse();

    // Set up logger
    env_logger::init();

    if !cli.quiet {
        eprintln!(
            "Derby Stats v{CLIENT_VERSION}: game {}, {} side, period {}.",
            cli.game_id, cli.side, cli.period
        );
    }
    if cli.verbose {
        // the key is left out on purpose
        eprintln!(
            "CLI Inputs: api_base={} max_retries={} format={:?} interactive={}",
            cli.api_base, cli.max_retries, cli.format, cli.interactive
        );
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
