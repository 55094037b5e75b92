use std::path::PathBuf;

use playlist_sync::error::Result;
use playlist_sync::models::ItemFilter;
use playlist_sync::{App, Config};

const USAGE: &str = "usage: plsync [--subscribe NAME URL [--reverse] | --unsubscribe NAME | --import FILE | --update | --list | --cleanup]";

#[tokio::main]
async fn main() -> Result<()> {
    // Only warnings and errors unless RUST_LOG says otherwise
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = Config::load()?;
    let app = App::new(&config).await?;

    match args.get(1).map(String::as_str) {
        Some("--subscribe") if args.len() >= 4 => {
            let reverse = args.get(4).map(String::as_str) == Some("--reverse");
            app.subscribe(&args[2], &args[3], reverse).await?;
            println!("Subscribed to {}", args[2]);
        }
        Some("--unsubscribe") if args.len() >= 3 => {
            app.unsubscribe(&args[2]).await?;
            println!("Unsubscribed from {}", args[2]);
        }
        Some("--import") if args.len() >= 3 => {
            let path = PathBuf::from(&args[2]);
            let imported = app.import_subscriptions(&path).await?;
            println!("Imported {} playlists from {:?}", imported, path);
        }
        Some("--update") => {
            let updater = app.updater();
            let cancel = updater.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            let report = updater.update().await?;
            for failed in report.errors() {
                eprintln!(
                    "Failed to update {}: {}",
                    failed.name,
                    failed.error.as_deref().unwrap_or_default()
                );
            }
            println!(
                "Updated {} playlists: {} new items, {} failures",
                report.playlists.len(),
                report.added(),
                report.failed()
            );
        }
        Some("--list") => {
            let filter = ItemFilter {
                watched: Some(false),
                ..Default::default()
            };
            for item in app.list_items(filter).await? {
                println!("{}", serde_json::to_string(&item)?);
            }
        }
        Some("--cleanup") => {
            let removed = app.cleanup(config.cleanup_keep).await?;
            println!("Removed {} watched items", removed);
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}
