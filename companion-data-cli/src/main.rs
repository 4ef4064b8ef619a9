use clap::{Parser, Subcommand};
use companion_data_core::{
    ColorRatingsQuery, CompanionConfig, CompanionData, RatingRecord, RatingsQuery, RatingsSource,
    RatingsTable,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "companion-data")]
#[command(about = "Look up MTG Arena card metadata and 17Lands ratings")]
struct Cli {
    /// SQLite card table (defaults to the platform data directory)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,
    /// Directory for fallback ratings files
    #[arg(long, global = true)]
    ratings_cache_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    scryfall_url: Option<String>,
    #[arg(long, global = true)]
    ratings_url: Option<String>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one card by Arena ID
    Card { arena_id: u32 },
    /// Resolve several cards by Arena ID
    Cards {
        #[arg(required = true)]
        arena_ids: Vec<u32>,
    },
    /// Search stored cards by name, falling back to an exact Scryfall lookup
    Search { name: String },
    /// Resolve printings by set code and collector number, e.g. DMU:107
    Printings {
        #[arg(required = true, value_parser = parse_printing)]
        printings: Vec<(String, String)>,
    },
    /// Re-fetch stored cards whose metadata is past the stale age
    Refresh {
        /// Most cards to refresh in this run
        #[arg(long, default_value = "100")]
        limit: usize,
    },
    /// Card store size and freshness plus client counters
    Stats {
        /// Fetch these ratings first so the 17Lands counters reflect a live call
        #[arg(long, num_args = 2, value_names = ["EXPANSION", "FORMAT"])]
        check_ratings: Option<Vec<String>>,
    },
    /// Card ratings for a set and format
    Ratings {
        /// Set code, e.g. BLB
        expansion: String,
        /// Event format, e.g. PremierDraft
        format: String,
        /// Deck colors, e.g. WG
        #[arg(long)]
        colors: Option<String>,
        /// Start date (YYYY-MM-DD)
        #[arg(long, requires = "end")]
        start: Option<String>,
        /// End date (YYYY-MM-DD)
        #[arg(long, requires = "start")]
        end: Option<String>,
        /// Number of rows to print
        #[arg(long, default_value = "20")]
        top: usize,
    },
    /// Win rates per color pair for a set and event type
    ColorRatings {
        expansion: String,
        event_type: String,
        #[arg(long)]
        combine_splash: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = CompanionConfig {
        card_db_path: cli.db_path.clone(),
        ratings_cache_dir: cli.ratings_cache_dir.clone(),
        ..CompanionConfig::default()
    };
    if let Some(url) = &cli.scryfall_url {
        config.scryfall = config.scryfall.with_base_url(url.clone());
    }
    if let Some(url) = &cli.ratings_url {
        config.ratings = config.ratings.with_base_url(url.clone());
    }

    let companion = Arc::new(CompanionData::open(config)?);

    let interrupted = companion.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling outstanding requests");
            interrupted.shutdown();
        }
    });

    match cli.command {
        Commands::Card { arena_id } => {
            let card = companion.get_card(arena_id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&card)?);
            } else {
                println!(
                    "{} [{}] {} {} ({} #{})",
                    card.name,
                    card.arena_id,
                    card.mana_cost.as_deref().unwrap_or(""),
                    card.type_line,
                    card.set_code.to_uppercase(),
                    card.collector_number
                );
                if let Some(text) = &card.oracle_text {
                    println!("{}", text);
                }
            }
        }
        Commands::Cards { arena_ids } => {
            let cards = companion.get_cards(&arena_ids).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&cards)?);
            } else {
                for arena_id in &arena_ids {
                    match cards.get(arena_id) {
                        Some(card) => println!("{:>7}  {}", arena_id, card.name),
                        None => println!("{:>7}  (not resolved)", arena_id),
                    }
                }
            }
            info!(requested = arena_ids.len(), resolved = cards.len(), "Done");
        }
        Commands::Search { name } => {
            let cards = companion.search_by_name(&name).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&cards)?);
            } else if cards.is_empty() {
                println!("No cards matching '{}'", name);
            } else {
                for card in &cards {
                    println!("{:>7}  {} ({})", card.arena_id, card.name, card.set_code.to_uppercase());
                }
            }
        }
        Commands::Printings { printings } => {
            let result = companion.get_cards_by_set_and_numbers(&printings).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result.cards)?);
            } else {
                for card in &result.cards {
                    println!(
                        "{:>7}  {} ({} #{})",
                        card.arena_id,
                        card.name,
                        card.set_code.to_uppercase(),
                        card.collector_number
                    );
                }
                for missing in &result.not_found {
                    println!("{:>7}  {} (not found)", "-", missing);
                }
            }
        }
        Commands::Refresh { limit } => {
            let report = companion.refresh_stale_cards(limit).await?;
            println!(
                "Checked {} stale cards: {} refreshed, {} failed",
                report.checked, report.refreshed, report.failed
            );
        }
        Commands::Stats { check_ratings } => {
            if let Some([expansion, format]) = check_ratings.as_deref() {
                let query = RatingsQuery::new(expansion.clone(), format.clone());
                if let Err(e) = companion.get_ratings(&query).await {
                    warn!(error = %e, "Ratings check failed");
                }
            }
            let freshness = companion.card_freshness()?;
            let stats = companion.ratings().stats();
            if cli.json {
                let value = serde_json::json!({
                    "stored_cards": freshness.map(|f| f.total),
                    "fresh": freshness.map(|f| f.fresh),
                    "stale": freshness.map(|f| f.stale),
                    "very_stale": freshness.map(|f| f.very_stale),
                    "memory_cache": companion.service().memory_cache_len(),
                    "ratings": {
                        "total_requests": stats.total_requests,
                        "successful_requests": stats.successful_requests,
                        "failed_requests": stats.failed_requests,
                        "cached_responses": stats.cached_responses,
                        "consecutive_failures": stats.consecutive_failures,
                        "average_latency_ms": stats.average_latency.as_millis() as u64,
                    },
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                match freshness {
                    Some(f) => println!(
                        "Card store: {} cards ({} fresh, {} stale, {} very stale)",
                        f.total, f.fresh, f.stale, f.very_stale
                    ),
                    None => println!("Card store: disabled"),
                }
                println!("Memory cache: {} cards", companion.service().memory_cache_len());
                println!(
                    "17Lands: {} requests, {} ok, {} failed, {} served from cache, {}ms average",
                    stats.total_requests,
                    stats.successful_requests,
                    stats.failed_requests,
                    stats.cached_responses,
                    stats.average_latency.as_millis()
                );
                if let Some(remaining) = companion.ratings().cooldown_remaining() {
                    println!("17Lands cooldown: {}s left", remaining.as_secs());
                }
            }
        }
        Commands::Ratings {
            expansion,
            format,
            colors,
            start,
            end,
            top,
        } => {
            let mut query = RatingsQuery::new(expansion, format);
            if let Some(colors) = colors {
                query = query.with_colors(colors);
            }
            if let (Some(start), Some(end)) = (start, end) {
                query = query.with_dates(start, end);
            }

            let table = companion.get_ratings(&query).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&table.records)?);
            } else {
                print_card_ratings(&table, top);
            }
            debug!(stats = ?companion.ratings().stats(), "17Lands client stats");
        }
        Commands::ColorRatings {
            expansion,
            event_type,
            combine_splash,
        } => {
            let query = ColorRatingsQuery::new(expansion, event_type).with_combine_splash(combine_splash);
            let table = companion.get_color_ratings(&query).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&table.records)?);
            } else {
                print_source(table.source, table.age().as_secs());
                for rating in &table.records {
                    let rate = rating
                        .win_rate_percent()
                        .map(|r| format!("{:.1}%", r))
                        .unwrap_or_else(|| "-".to_string());
                    let marker = if rating.is_summary { "*" } else { " " };
                    println!("{}{:<32} {:>7} {:>8} games", marker, rating.color_name, rate, rating.games);
                }
            }
        }
    }

    Ok(())
}

fn parse_printing(value: &str) -> Result<(String, String), String> {
    match value.split_once(':') {
        Some((set, number)) if !set.trim().is_empty() && !number.trim().is_empty() => {
            Ok((set.trim().to_string(), number.trim().to_string()))
        }
        _ => Err(format!("expected SET:NUMBER, got '{}'", value)),
    }
}

fn print_source(source: RatingsSource, age_secs: u64) {
    match source {
        RatingsSource::Upstream => println!("Source: 17Lands"),
        RatingsSource::Cache => println!("Source: local cache ({} minutes old)", age_secs / 60),
    }
}

fn print_card_ratings(table: &RatingsTable<RatingRecord>, top: usize) {
    print_source(table.source, table.age().as_secs());

    let mut records: Vec<&RatingRecord> = table.records.iter().collect();
    records.sort_by(|a, b| {
        let a = a.smoothed.gih_wr.unwrap_or(f64::MIN);
        let b = b.smoothed.gih_wr.unwrap_or(f64::MIN);
        b.total_cmp(&a)
    });

    println!("{:<32} {:>8} {:>7} {:>6} {:>6}", "Card", "GIH WR", "# GIH", "ALSA", "ATA");
    for record in records.into_iter().take(top) {
        let gih = match record.smoothed.gih_wr {
            Some(rate) => format!("{:.1}{}", rate, if record.smoothed.gih_adjusted { "*" } else { "" }),
            None => "-".to_string(),
        };
        println!(
            "{:<32} {:>8} {:>7} {:>6} {:>6}",
            record.name,
            gih,
            record.gih_count,
            record.alsa.map_or("-".to_string(), |v| format!("{:.2}", v)),
            record.ata.map_or("-".to_string(), |v| format!("{:.2}", v)),
        );
    }
}
