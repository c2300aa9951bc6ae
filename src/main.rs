//! dnscourier - carry byte payloads inside DNS query names
//!
//! `encode` turns a payload into query names ready to hand to a resolver,
//! `assemble` is the receiving half for names captured server-side, and
//! `capacity` shows how much payload one query can carry for a domain.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::io::Read;

use dnscourier::{MessageCache, QueryChunk, QueryEncoder, SessionId, MAX_QUERY_LEN};

#[derive(Parser)]
#[command(name = "dnscourier")]
#[command(version)]
#[command(about = "Encode byte payloads into DNS query names", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a payload into query names, one per line
    Encode {
        /// Base domain the resolver forwards upstream
        #[arg(short, long)]
        domain: String,

        /// 13-character session id (random when omitted)
        #[arg(short, long)]
        session_id: Option<String>,

        /// Maximum query-name length
        #[arg(short, long, default_value_t = MAX_QUERY_LEN)]
        max_query_len: usize,

        /// Payload is already DNS-safe text; skip the base32 step
        #[arg(long)]
        text: bool,

        /// Inline payload; read from stdin when omitted
        payload: Option<String>,
    },

    /// Show how many payload bytes fit in one query for a domain
    Capacity {
        /// Base domain the resolver forwards upstream
        #[arg(short, long)]
        domain: String,

        /// Maximum query-name length
        #[arg(short, long, default_value_t = MAX_QUERY_LEN)]
        max_query_len: usize,
    },

    /// Reassemble captured query names (one per line on stdin)
    Assemble {
        /// Base domain the queries were sent under
        #[arg(short, long)]
        domain: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match cli.command {
        Commands::Encode {
            domain,
            session_id,
            max_query_len,
            text,
            payload,
        } => encode(domain, session_id, max_query_len, text, payload),
        Commands::Capacity {
            domain,
            max_query_len,
        } => capacity(domain, max_query_len),
        Commands::Assemble { domain } => assemble(domain),
    }
}

fn encode(
    domain: String,
    session_id: Option<String>,
    max_query_len: usize,
    text: bool,
    payload: Option<String>,
) -> Result<()> {
    let payload = match payload {
        Some(inline) => inline.into_bytes(),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("reading payload from stdin")?;
            buf
        }
    };

    let id = match session_id {
        Some(s) => SessionId::new(&s)?,
        None => {
            let id = SessionId::random();
            info!("generated session id {}", id);
            id
        }
    };

    let encoder = QueryEncoder::new(domain);
    let queries = if text {
        // Shells leave a trailing newline on here-strings and echo
        let trimmed: Vec<u8> = payload
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let count = encoder.query_count(&trimmed, max_query_len)?;
        let mut queries = Vec::with_capacity(count);
        for index in 0..count {
            if let Some(q) = encoder.build_query(index, &id, &trimmed, max_query_len)? {
                queries.push(q);
            }
        }
        queries
    } else {
        encoder.encode_message(&id, &payload, max_query_len)?
    };

    info!("{} bytes across {} queries", payload.len(), queries.len());
    for query in queries {
        println!("{}", query);
    }
    Ok(())
}

fn capacity(domain: String, max_query_len: usize) -> Result<()> {
    let encoder = QueryEncoder::new(domain);
    let cap = encoder.capacity(max_query_len)?;
    println!(
        "{} payload bytes per query, {} max per session",
        cap,
        cap * dnscourier::MAX_QUERIES_PER_SESSION
    );
    Ok(())
}

fn assemble(domain: String) -> Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("reading query names from stdin")?;

    let mut cache = MessageCache::new(16);
    for line in input.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let chunk = match QueryChunk::parse(line, &domain) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("skipping '{}': {}", line, e);
                continue;
            }
        };
        let id = chunk.id;
        if cache.insert(chunk) {
            if let Some(message) = cache.take(&id) {
                println!("{} {}", id, message);
            }
        }
    }

    if !cache.is_empty() {
        warn!("{} session(s) still incomplete", cache.len());
    }
    Ok(())
}
