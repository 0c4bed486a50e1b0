use clap::Parser;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genoreach::{
    Config,
    dictionary::Dictionary,
    formats::SourceOpener,
    handlers::{AppState, DataRoot, create_router},
    storage::{HttpFetcher, IndexCache},
};

fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let fetcher = Arc::new(HttpFetcher::new(config.timeout()));
    let cache = IndexCache::new(config.effective_cache_dir(), fetcher)?;
    if config.clear_cache {
        cache.clear()?;
    }
    let opener = Arc::new(SourceOpener::new(Arc::new(cache), config.unresolved));

    let dictionary = match &config.dictionary {
        Some(path) => Some(Arc::new(Dictionary::build(path)?)),
        None => None,
    };

    let root = match &config.remote_base_url {
        Some(url) => DataRoot::Remote(url.clone()),
        None => DataRoot::Local(config.data_dir.clone()),
    };

    let state = AppState {
        opener,
        root,
        dictionary,
    };

    let app = create_router(state).layer(TraceLayer::new_for_http());
    let app = if config.cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };

    // The core is blocking, so the runtime is only built for the server
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let addr = config.listen_addr();
        tracing::info!("Starting genoreach server on {}", addr);
        tracing::info!("Index cache: {:?}", config.effective_cache_dir());

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;
        Ok::<(), anyhow::Error>(())
    })
}
