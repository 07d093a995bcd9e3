use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use sheets_adapter::{HttpSheetsApi, SpreadsheetStorageAdapter};
use sqlite_adapter::SqliteStorageAdapter;
use tracing::debug;
use volleystat_core::application::{PlayerReport, TeamReport, VolleyStatSystem};
use volleystat_core::config::AppConfig;
use volleystat_core::domain::{DateRange, NewMatch, PlayerId, Position, StatLine, Team, TeamId};
use volleystat_core::error::VolleyStatError;

use crate::args;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a team
    AddTeam {
        name: String,
    },
    /// Register a player on a team
    AddPlayer {
        name: String,
        /// Outside Hitter, Setter, Middle Blocker, Libero or Opposite
        #[arg(short, long)]
        position: Position,
        #[arg(short, long)]
        team: TeamId,
    },
    /// Record a match result with per-player stats
    RecordMatch(RecordMatchArgs),
    /// Record a training session (serving, attacking or blocking)
    RecordTraining {
        #[arg(long)]
        team: TeamId,
        #[arg(long = "type")]
        session_type: String,
        #[arg(long, value_parser = args::date)]
        date: NaiveDate,
        /// Minutes
        #[arg(long)]
        duration: u32,
    },
    /// Performance report for one player
    PlayerReport {
        player: PlayerId,
    },
    /// Performance report for one team
    TeamReport {
        team: TeamId,
    },
    /// Training focus for a player or a team
    Recommend {
        #[arg(long, conflicts_with = "team", required_unless_present = "team")]
        player: Option<PlayerId>,
        #[arg(long)]
        team: Option<TeamId>,
    },
    /// List stored teams, players, matches or training sessions
    List {
        #[command(subcommand)]
        what: ListCommand,
    },
    /// Write the report sheets to the configured spreadsheet
    Export {
        #[arg(long, value_parser = args::date)]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = args::date)]
        to: Option<NaiveDate>,
        /// Export only this player's report to its own sheet
        #[arg(long, conflicts_with_all = ["from", "to", "team"])]
        player: Option<PlayerId>,
        /// Export only this team's report to its own sheet
        #[arg(long, conflicts_with_all = ["from", "to"])]
        team: Option<TeamId>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ListCommand {
    Teams,
    /// Players, optionally for one team
    Players {
        #[arg(long)]
        team: Option<TeamId>,
    },
    /// Matches, most recent first
    Matches {
        #[arg(long)]
        team: Option<TeamId>,
    },
    /// Training sessions, most recent first
    Training {
        #[arg(long)]
        team: Option<TeamId>,
    },
}

/// What `export` writes.
enum ExportScope {
    Season(DateRange),
    Player(PlayerId),
    Team(TeamId),
}

#[derive(Args, Debug)]
pub struct RecordMatchArgs {
    #[arg(long)]
    team: TeamId,
    #[arg(long)]
    opponent: String,
    #[arg(long, value_parser = args::date)]
    date: NaiveDate,
    #[arg(long)]
    sets_won: u32,
    #[arg(long)]
    sets_lost: u32,
    /// PLAYER:ATTACKS:KILLS:ERRORS:BLOCKS:DIGS:ACES, repeatable
    #[arg(long = "stat", value_parser = args::stat_line)]
    stats: Vec<StatLine>,
}

pub fn run(command: Command, config: &AppConfig) -> Result<()> {
    let mut system = open_system(config)?;

    match command {
        Command::AddTeam { name } => {
            let id = system.add_team(&name)?;
            println!("Added team {name} (id {id})");
        }
        Command::AddPlayer { name, position, team } => {
            let id = system.add_player(&name, position, team)?;
            println!("Added {position} {name} to team {team} (id {id})");
        }
        Command::RecordMatch(m) => {
            let new_match = NewMatch {
                team_id: m.team,
                opponent: m.opponent,
                date: m.date,
                sets_won: m.sets_won,
                sets_lost: m.sets_lost,
            };
            let recorded = system.record_match(new_match, &m.stats)?;
            let record = &recorded.record;
            println!(
                "Recorded match {}: {} {}-{} vs {} on {} ({} stat lines)",
                record.id,
                record.outcome().label(),
                record.sets_won,
                record.sets_lost,
                record.opponent,
                record.date,
                recorded.stat_ids.len()
            );
            println!("Notified {} subscribers", recorded.notifications.delivered);
            for failure in &recorded.notifications.failures {
                eprintln!("  {} was not notified: {}", failure.observer, failure.error);
            }
        }
        Command::RecordTraining {
            team,
            session_type,
            date,
            duration,
        } => {
            let (id, session) = system.record_training_session(&session_type, team, date, duration)?;
            println!("Recorded {} session {id} on {date} ({duration} min)", session.session_type());
            for drill in session.drills() {
                println!("  - {drill}");
            }
        }
        Command::PlayerReport { player } => print_player_report(&system.player_report(player)?),
        Command::TeamReport { team } => print_team_report(&system.team_report(team)?),
        Command::Recommend { player, team } => match (player, team) {
            (Some(player), _) => {
                let rec = system.player_training_recommendation(player)?;
                println!("{} should focus on {} training", rec.player.name, rec.focus);
                for drill in rec.drills {
                    println!("  - {drill}");
                }
            }
            (None, Some(team)) => {
                let rec = system.team_training_recommendation(team)?;
                match rec.weakness {
                    Some(weakness) => {
                        println!("{}: weakest area is {}", rec.team.name, weakness.label());
                        for focus in weakness.focus() {
                            println!("  - {focus}");
                        }
                    }
                    None => println!("{}: no stats recorded yet", rec.team.name),
                }
                if rec.end_of_set_focus {
                    println!("  - Practice end-of-set scenarios (close losses are frequent)");
                }
            }
            (None, None) => bail!("pass --player or --team"),
        },
        Command::List { what } => list(&system, what)?,
        Command::Export { from, to, player, team } => {
            let scope = match (player, team) {
                (Some(player), _) => ExportScope::Player(player),
                (None, Some(team)) => ExportScope::Team(team),
                (None, None) => {
                    let all = DateRange::all_time();
                    ExportScope::Season(DateRange::new(from.unwrap_or(all.start()), to.unwrap_or(all.end()))?)
                }
            };
            export(&mut system, config, scope)?;
        }
    }

    Ok(())
}

fn open_system(config: &AppConfig) -> Result<VolleyStatSystem> {
    let store = SqliteStorageAdapter::new(config.database.path.clone());
    let mut system = VolleyStatSystem::open(Box::new(store), config.policy)
        .with_context(|| format!("opening database {}", config.database.path))?;
    for observer in &config.observers {
        system.subscribe(observer.build()?);
    }
    debug!(observers = config.observers.len(), "system ready");
    Ok(system)
}

/// Teams to list for: the one asked for, or all of them.
fn selected_teams(system: &VolleyStatSystem, team: Option<TeamId>) -> Result<Vec<Team>> {
    Ok(match team {
        Some(id) => vec![system.team(id)?],
        None => system.teams()?,
    })
}

fn list(system: &VolleyStatSystem, what: ListCommand) -> Result<()> {
    match what {
        ListCommand::Teams => {
            let teams = system.teams()?;
            if teams.is_empty() {
                println!("No teams found.");
            }
            for team in teams {
                println!("{:>4}  {}", team.id, team.name);
            }
        }
        ListCommand::Players { team } => {
            for team in selected_teams(system, team)? {
                println!("{}", team.name);
                for player in system.players(team.id)? {
                    println!("  {:>4}  {} ({})", player.id, player.name, player.position);
                }
            }
        }
        ListCommand::Matches { team } => {
            for team in selected_teams(system, team)? {
                println!("{}", team.name);
                for game in system.team_matches(team.id)? {
                    println!(
                        "  {:>4}  {} vs {}: {} {}-{}",
                        game.id,
                        game.date,
                        game.opponent,
                        game.outcome().label(),
                        game.sets_won,
                        game.sets_lost
                    );
                }
            }
        }
        ListCommand::Training { team } => {
            for team in selected_teams(system, team)? {
                println!("{}", team.name);
                for stored in system.training_sessions(team.id)? {
                    let details = stored.session.details();
                    println!(
                        "  {:>4}  {} {} ({} min)",
                        stored.id,
                        details.date,
                        stored.session.session_type(),
                        details.duration_minutes
                    );
                }
            }
        }
    }
    Ok(())
}

fn export(system: &mut VolleyStatSystem, config: &AppConfig, scope: ExportScope) -> Result<()> {
    let Some(sheets) = &config.sheets else {
        bail!("no [sheets] section in the configuration; nothing to export to");
    };

    let api = HttpSheetsApi::from_config(sheets)?;
    system
        .attach_spreadsheet(Box::new(SpreadsheetStorageAdapter::new(api, sheets.spreadsheet_id.clone())))
        .context("connecting to the spreadsheet")?;

    let range = match scope {
        ExportScope::Season(range) => range,
        ExportScope::Player(player) => {
            let written = system.export_player_report(player)?;
            println!("Exported player report to {} ({} rows)", written.anchor, written.rows);
            return Ok(());
        }
        ExportScope::Team(team) => {
            let written = system.export_team_report(team)?;
            println!("Exported team report to {} ({} rows)", written.anchor, written.rows);
            return Ok(());
        }
    };

    match system.export_report(range) {
        Ok(report) => {
            for (sheet, rows) in &report.written {
                println!("{sheet}: {rows} rows");
            }
            println!("Exported {} sheets to spreadsheet {}", report.written.len(), sheets.spreadsheet_id);
            Ok(())
        }
        Err(VolleyStatError::PartialExport(failure)) => {
            for sheet in &failure.succeeded {
                println!("{sheet}: written");
            }
            eprintln!("{}: failed ({})", failure.failed, failure.reason);
            for sheet in &failure.not_attempted {
                eprintln!("{sheet}: not attempted");
            }
            Err(VolleyStatError::PartialExport(failure).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_player_report(report: &PlayerReport) {
    let m = &report.metrics;
    println!("{} ({})", report.player.name, report.player.position);
    println!("  Attacking efficiency: {:.2}%", m.attacking_efficiency);
    println!("  Blocking average:     {:.2}", m.blocking_average);
    println!("  Serving aces:         {}", m.serving_aces);
    if !report.recent.is_empty() {
        println!("  Recent matches:");
        for entry in &report.recent {
            println!(
                "    {} vs {}: {} kills, {} blocks, {} aces",
                entry.date, entry.opponent, entry.line.kills, entry.line.blocks, entry.line.aces
            );
        }
    }
    for rec in &report.recommendations {
        println!("  * {rec}");
    }
}

fn print_team_report(report: &TeamReport) {
    let m = &report.metrics;
    println!("{}", report.team.name);
    println!("  Record: {}-{} ({:.2}% wins)", m.matches_won, m.matches_played - m.matches_won, m.win_percentage);
    println!("  Set win percentage: {:.2}%", m.set_win_percentage);
    if !report.recent.is_empty() {
        println!("  Recent matches:");
        for game in &report.recent {
            println!(
                "    {} vs {}: {} {}-{}",
                game.date,
                game.opponent,
                game.outcome().label(),
                game.sets_won,
                game.sets_lost
            );
        }
    }
    if !report.top_performers.is_empty() {
        println!("  Top performers:");
        for p in &report.top_performers {
            println!(
                "    {} ({}): {} kills, {} blocks, {} aces",
                p.name, p.position, p.kills, p.blocks, p.aces
            );
        }
    }
    for rec in &report.recommendations {
        println!("  * {rec}");
    }
}
