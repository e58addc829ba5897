use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use familycloud_album::backend;
use familycloud_album::catalog::{Catalog, RefreshSource, RECENT_PHOTOS};
use familycloud_album::config::AlbumConfig;
use familycloud_album::coordinator::Coordinator;
use familycloud_album::slots::{FileSlotStore, SlotStore};
use familycloud_common::documents::{PhotoFile, PhotoRecord};

const DEFAULT_CONFIG_PATH: &str = "album.toml";

const USAGE: &str = "usage: familycloud <list|recent|usage|filter LABEL|upload FILE...|delete ID>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!(USAGE);
    };

    let config_path = PathBuf::from(
        std::env::var("FAMILYCLOUD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
    );
    let config = AlbumConfig::load(&config_path)?;
    info!(user = %config.user, data_dir = %config.data_dir.display(), "familycloud starting");

    let store: Arc<dyn SlotStore> = Arc::new(
        FileSlotStore::open(&config.data_dir)
            .with_context(|| format!("Failed to open {}", config.data_dir.display()))?,
    );
    let local = backend::local_from_config(&config, store.clone());
    let coordinator = match backend::remote_from_config(&config) {
        Some(remote) => Coordinator::new(remote, local),
        None => Coordinator::local_only(local),
    };
    let mut catalog = Catalog::new(coordinator, store);

    match catalog.refresh().await {
        RefreshSource::Backend(kind) => info!(backend = %kind, count = catalog.len(), "Catalog loaded"),
        RefreshSource::Snapshot => info!(count = catalog.len(), "Showing cached photos"),
        RefreshSource::Empty => info!("No photos available"),
    }

    match (command.as_str(), &args[1..]) {
        ("list", []) => print_photos(catalog.photos().iter()),
        ("recent", []) => print_photos(catalog.recent(RECENT_PHOTOS).into_iter()),
        ("filter", [label]) => print_photos(catalog.filter_by_uploader(label).into_iter()),
        ("usage", []) => {
            let usage = catalog.usage().await?;
            println!("{}", usage.summary());
        }
        ("delete", [id]) => {
            catalog.delete(id).await?;
            println!("deleted {}", id);
        }
        ("upload", paths) if !paths.is_empty() => {
            let files = paths
                .iter()
                .map(|p| read_photo_file(Path::new(p)))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let (tx, mut rx) = watch::channel(0.0);
            let printer = tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let pct = *rx.borrow_and_update();
                    eprint!("\ruploading... {:>3.0}%", pct);
                }
                eprintln!();
            });

            let user = config.user.clone();
            let report = catalog.upload_batch(files, &user, Some(&tx)).await;
            drop(tx);
            printer.await?;

            println!(
                "{} uploaded ({} remote, {} local), {} failed",
                report.succeeded(),
                report.remote,
                report.local,
                report.unsuccessful()
            );
            for failure in report.rejected.iter().chain(report.failed.iter()) {
                println!("  {}: {}", failure.name, failure.reason);
            }
        }
        _ => bail!(USAGE),
    }

    Ok(())
}

fn read_photo_file(path: &Path) -> anyhow::Result<PhotoFile> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let content_type = mime_guess::from_path(path).first_or_octet_stream().to_string();
    Ok(PhotoFile::new(name, content_type, bytes))
}

fn print_photos<'a>(photos: impl Iterator<Item = &'a PhotoRecord>) {
    let mut count = 0;
    for photo in photos {
        count += 1;
        let location = if photo.is_embedded() { "local" } else { photo.content_ref() };
        println!(
            "{}\t{}\t{}\t{}\t{}",
            photo.id,
            photo.name,
            photo.uploaded_at.format("%Y-%m-%d %H:%M"),
            photo.uploaded_by,
            location
        );
    }
    if count == 0 {
        println!("No photos yet. Upload some memories!");
    }
}
