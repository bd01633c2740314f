use std::sync::Arc;

use spirestats::cache::AnalyticsCache;
use spirestats::config::Config;
use spirestats::range::window_label;
use spirestats::run::JsonlRunSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    dotenvy::dotenv().ok();

    let mut watch = false;
    let mut range_expr = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--watch" => watch = true,
            _ => range_expr = Some(arg),
        }
    }

    let config = Config::load();
    tracing::info!(
        runs_dir = %config.runs_dir.display(),
        profile = config.profile,
        "spirestats starting"
    );

    let source = Arc::new(JsonlRunSource::new(config.runs_dir.clone()));
    let cache = Arc::new(AnalyticsCache::new(source, &config));
    cache.refresh().await;

    if let Some(expr) = range_expr.as_deref() {
        match cache.get_run_stats_by_date_string(expr).await {
            Ok(stats) => {
                tracing::info!("range: showing {}", window_label(&stats.window));
                println!("{}", serde_json::to_string_pretty(&*stats)?);
            }
            Err(e) => {
                tracing::warn!("range: {e}");
                anyhow::bail!(e.user_message());
            }
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&cache.report().await)?);
    }

    if watch {
        let handle = Arc::clone(&cache).spawn_refresh_loop(config.refresh_interval());
        tokio::signal::ctrl_c().await?;
        handle.abort();
        println!("{}", serde_json::to_string_pretty(&cache.report().await)?);
    }

    tracing::info!("spirestats shutting down");
    Ok(())
}
