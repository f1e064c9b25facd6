// Copyright 2025 Recoshard Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Recoshard CLI - line-oriented front end for a single shard
//!

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use chrono::{TimeZone, Utc};
use clap::Parser;
use colored::{Color, Colorize};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, CellAlignment, ContentArrangement, Table};
use log::Level;

use recoshard::storage::{DEFAULT_MAX_RECOMMEND_TASKS, DEFAULT_SIMILARITY_ROWS};
use recoshard::{
    version_info, EntityId, OwnerId, Recommendation, Recommender, ShardStats, StoreConfig,
    SyncMode,
};

/// Recoshard preference shard CLI
#[derive(Parser, Debug)]
#[command(name = "recoshard")]
#[command(author = "Recoshard Contributors")]
#[command(version)]
#[command(about = "Single-shard preference store with similarity recommendations")]
#[command(
    long_about = "Recoshard keeps which entities each owner likes in one data file and\n\
answers requests against it from a single worker thread.\n\n\
COMMANDS (one per line, from -e or stdin):\n\
  get <owner>                 Entities liked by an owner\n\
  like <owner> <entity>       Record a like\n\
  unlike <owner> <entity>     Forget a like\n\
  recommend <owner>           Entities liked by the most similar owners\n\
  stats                       Shard counters\n\
  help                        Show the command list\n\
  quit                        Shut down and exit\n\n\
EXAMPLES:\n\
  recoshard --data /tmp/prefs.dat -e 'like 7 100'\n\
  printf 'like 1 10\\nrecommend 1\\n' | recoshard --data /tmp/prefs.dat\n\
  RECOSHARD_DATA=/tmp/prefs.dat recoshard --sync full"
)]
struct Args {
    /// Preference data file; created when missing
    #[arg(short = 'd', long = "data", env = "RECOSHARD_DATA")]
    data: PathBuf,

    /// Recommend requests served together in one pass
    #[arg(
        long = "max-recommend-tasks",
        env = "RECOSHARD_MAX_RECOMMEND_TASKS",
        default_value_t = DEFAULT_MAX_RECOMMEND_TASKS
    )]
    max_recommend_tasks: usize,

    /// Most similar owners considered per recommendation
    #[arg(long = "similarity-rows", default_value_t = DEFAULT_SIMILARITY_ROWS)]
    similarity_rows: usize,

    /// Header sync mode after each changing pass (none, normal, full)
    /// - none: header written only on shutdown
    /// - normal: header written after every change (default)
    /// - full: header written and the file synced to disk
    #[arg(short = 's', long = "sync", value_name = "MODE", default_value = "normal")]
    sync_mode: String,

    /// Log level written to stderr
    #[arg(
        long = "log-level",
        default_value = "warn",
        value_parser = ["off", "error", "warn", "info", "debug", "trace"]
    )]
    log_level: String,

    /// Execute a single command and exit
    #[arg(short = 'e', long = "execute")]
    execute: Option<String>,
}

/// One parsed input line
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Get(OwnerId),
    Like(OwnerId, EntityId),
    Unlike(OwnerId, EntityId),
    Recommend(OwnerId),
    Stats,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or_else(|| "empty command".to_string())?;
        let args: Vec<&str> = words.collect();

        let command = match (name.to_lowercase().as_str(), args.as_slice()) {
            ("get", [owner]) => Command::Get(parse_id("owner", owner)?),
            ("like", [owner, entity]) => {
                Command::Like(parse_id("owner", owner)?, parse_id("entity", entity)?)
            }
            ("unlike", [owner, entity]) => {
                Command::Unlike(parse_id("owner", owner)?, parse_id("entity", entity)?)
            }
            ("recommend", [owner]) => Command::Recommend(parse_id("owner", owner)?),
            ("stats", []) => Command::Stats,
            ("help" | "\\h" | "\\?", []) => Command::Help,
            ("quit" | "exit" | "\\q", []) => Command::Quit,
            ("get" | "recommend", _) => return Err(format!("usage: {} <owner>", name)),
            ("like" | "unlike", _) => return Err(format!("usage: {} <owner> <entity>", name)),
            _ => return Err(format!("unknown command '{}', try 'help'", name)),
        };
        Ok(command)
    }
}

fn parse_id(what: &str, text: &str) -> Result<u64, String> {
    text.parse()
        .map_err(|_| format!("invalid {} id '{}': expected an unsigned integer", what, text))
}

/// Whether the session keeps reading input after a command
enum Flow {
    Continue,
    Quit,
}

fn execute(shard: &Recommender, command: Command) -> recoshard::Result<Flow> {
    match command {
        Command::Get(owner) => match shard.get_preferences(owner).wait()? {
            Some(ids) if ids.is_empty() => println!("(none)"),
            Some(ids) => {
                let ids: Vec<String> = ids.iter().map(u64::to_string).collect();
                println!("{}", ids.join(" "));
            }
            None => println!("not found"),
        },
        Command::Like(owner, entity) => {
            let created = shard.add_preference(owner, entity).wait()?;
            println!("{}", if created { "created" } else { "exists" });
        }
        Command::Unlike(owner, entity) => {
            let removed = shard.remove_preference(owner, entity).wait()?;
            println!("{}", if removed { "removed" } else { "not found" });
        }
        Command::Recommend(owner) => match shard.recommend(owner).wait()? {
            Some(list) => print_recommendations(&list),
            None => println!("not found"),
        },
        Command::Stats => print_stats(&shard.stats()),
        Command::Help => print_help(),
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

fn print_recommendations(list: &[Recommendation]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["entity", "weight"]);

    for recommendation in list {
        table.add_row(vec![
            Cell::new(recommendation.entity_id),
            Cell::new(format!("{:.2}", recommendation.weight)).set_alignment(CellAlignment::Right),
        ]);
    }

    println!("{table}");
    let row_text = if list.len() == 1 { "entity" } else { "entities" };
    println!("{}", format!("{} {} recommended", list.len(), row_text).green());
}

fn print_stats(stats: &ShardStats) {
    let changed = Utc
        .timestamp_millis_opt(stats.change_time_millis)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| stats.change_time_millis.to_string());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_header(vec!["counter", "value"]);
    table.add_row(vec![
        Cell::new("preference sets"),
        Cell::new(stats.preference_set_count),
    ]);
    table.add_row(vec![
        Cell::new("preferences"),
        Cell::new(stats.preference_count),
    ]);
    table.add_row(vec![Cell::new("last change"), Cell::new(changed)]);
    table.add_row(vec![Cell::new("passes"), Cell::new(stats.passes)]);
    println!("{table}");
}

fn print_help() {
    println!("{}", "Recoshard commands:".bold());
    println!("    get <owner>              Entities liked by an owner");
    println!("    like <owner> <entity>    Record a like");
    println!("    unlike <owner> <entity>  Forget a like");
    println!("    recommend <owner>        Entities liked by the most similar owners");
    println!("    stats                    Shard counters");
    println!("    help, \\h, \\?             Show this help message");
    println!("    quit, exit, \\q           Shut down and exit");
}

/// Runs one input line; returns `false` when the session should end
fn run_line(shard: &Recommender, line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return true;
    }

    let command = match line.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            return true;
        }
    };

    let start = Instant::now();
    match execute(shard, command) {
        Ok(Flow::Continue) => {
            log::debug!("'{}' served in {:?}", line, start.elapsed());
            true
        }
        Ok(Flow::Quit) => false,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            // A stopped worker will not answer anything else
            shard.is_running()
        }
    }
}

fn run_input(shard: &Recommender) -> io::Result<()> {
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();

    if interactive {
        println!("{}", version_info());
        println!("Enter commands, 'help' for assistance, or 'quit' to exit.");
    }

    let mut lines = stdin.lock().lines();
    loop {
        if interactive {
            print!("{} ", ">".cyan().bold());
            io::stdout().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        if !run_line(shard, &line?) {
            break;
        }
    }
    Ok(())
}

fn setup_logger(level: log::LevelFilter) -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            let color = match record.level() {
                Level::Error => Color::Red,
                Level::Warn => Color::Yellow,
                Level::Info => Color::Blue,
                Level::Debug => Color::Magenta,
                Level::Trace => Color::Green,
            };
            let tag = format!("{}:", record.level().to_string().to_lowercase());
            out.finish(format_args!("{} {}", tag.color(color), message))
        })
        .level(level)
        .chain(io::stderr())
        .apply()?;
    Ok(())
}

fn build_config(args: &Args) -> Result<StoreConfig, String> {
    let sync_mode: SyncMode = args.sync_mode.parse().map_err(|e| format!("{}", e))?;
    let config = StoreConfig::new(&args.data)
        .with_max_recommend_tasks(args.max_recommend_tasks)
        .with_similarity_rows(args.similarity_rows)
        .with_sync_mode(sync_mode);
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn main() {
    let args = Args::parse();

    let level = log::LevelFilter::from_str(&args.log_level).unwrap_or(log::LevelFilter::Warn);
    if let Err(e) = setup_logger(level) {
        eprintln!("Error initializing logger: {}", e);
        std::process::exit(1);
    }

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(2);
        }
    };

    let shard = match Recommender::open(&config) {
        Ok(shard) => shard,
        Err(e) => {
            eprintln!("Error opening {}: {}", config.path.display(), e);
            std::process::exit(1);
        }
    };
    log::info!("Opened {}", config.path.display());

    let mut exit_code = 0;
    if let Some(ref line) = args.execute {
        run_line(&shard, line);
    } else if let Err(e) = run_input(&shard) {
        eprintln!("Error reading input: {}", e);
        exit_code = 1;
    }

    if let Err(e) = shard.shutdown() {
        eprintln!("{} {}", "Error closing shard:".red().bold(), e);
        exit_code = 1;
    }
    std::process::exit(exit_code);
}
