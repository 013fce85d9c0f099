use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use threadview::auth::StaticCredential;
use threadview::model::parse_tweet_ref;
use threadview::{
    Config, HttpGateway, Renderer, ResolveError, ResolveOptions, Thread, ThreadResolver,
    TweetCache, TweetId, TwitterApi,
};

/// Exit status when only part of the thread could be shown
const EXIT_PARTIAL: u8 = 2;

/// Reconstruct a Twitter thread from its last tweet and print it.
#[derive(Parser)]
#[command(name = "threadview")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Stop walking back once this tweet is reached
    #[arg(long, value_name = "ID")]
    head: Option<String>,

    /// Most tweets to follow before giving up
    #[arg(long, value_name = "N")]
    max_length: Option<usize>,

    /// Column to wrap tweet text at
    #[arg(long, value_name = "N")]
    width: Option<usize>,

    /// Print the thread as JSON
    #[arg(long)]
    json: bool,

    /// The last tweet of the thread: an ID or a status URL
    tweet: String,
}

fn parse_ref(input: &str) -> Result<TweetId> {
    parse_tweet_ref(input).with_context(|| format!("not a tweet ID or status URL: {input:?}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout stays clean for --json
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(max_length) = cli.max_length {
        config.max_chain_length = max_length;
    }
    if let Some(width) = cli.width {
        config.wrap_width = width;
    }
    config.validate()?;

    let tail = parse_ref(&cli.tweet)?;
    let head = cli.head.as_deref().map(parse_ref).transpose()?;

    let credentials = Arc::new(StaticCredential::new(config.bearer_token.clone()));
    let api: Arc<dyn TwitterApi> = Arc::new(HttpGateway::new(&config, credentials)?);
    let cache = Arc::new(TweetCache::new());

    let resolver = ThreadResolver::new(
        Arc::clone(&api),
        Arc::clone(&cache),
        ResolveOptions::from(&config),
    );
    let renderer = Renderer::from_config(api, Arc::clone(&cache), &config)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let (thread, code) = match resolver.resolve_range_cancellable(tail, head, &cancel).await {
        Ok(thread) => (thread, ExitCode::SUCCESS),
        Err(ResolveError::BrokenChain {
            missing, partial, ..
        }) => {
            warn!(%missing, resolved = partial.len(), "Thread is incomplete");
            eprintln!(
                "warning: tweet {missing} is unavailable, showing the {} tweet(s) after it",
                partial.len()
            );
            let tweets: Vec<_> = partial.iter().filter_map(|&id| cache.get(id)).collect();
            (Thread::from_tweets(&tweets), ExitCode::from(EXIT_PARTIAL))
        }
        Err(err) => return Err(err.into()),
    };

    if cli.json {
        println!("{}", renderer.render_json(&thread).await?);
    } else {
        print!("{}", renderer.render_text(&thread).await?);
    }

    Ok(code)
}
