use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use rollcall_core::CacheHandle;
use rollcall_store::{AttendanceLedger, FsGallery, GalleryStore};

mod config;
mod dbus_interface;
mod encoder;
mod session;

use config::Config;
use dbus_interface::AttendanceService;
use encoder::BusFaceEngine;
use session::{spawn_session, SessionHandle};

const BUS_NAME: &str = "org.rollcall.Attendance1";
const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env();
    tracing::info!(
        gallery = %config.gallery_dir.display(),
        attendance = %config.attendance_dir.display(),
        threshold = config.match_threshold,
        engine = %config.engine_service,
        "configuration loaded"
    );

    let gallery: Arc<dyn GalleryStore> = Arc::new(FsGallery::open(&config.gallery_dir)?);
    let ledger = Arc::new(AttendanceLedger::open(&config.attendance_dir)?);
    let cache = CacheHandle::new();

    // The blocking bus client and the initial cache build must run off
    // the async runtime.
    let session = {
        let gallery = gallery.clone();
        let ledger = ledger.clone();
        let cache = cache.clone();
        let service = config.engine_service.clone();
        let threshold = config.match_threshold;
        tokio::task::spawn_blocking(move || -> Result<SessionHandle> {
            let engine = Box::new(BusFaceEngine::connect(&service)?);
            Ok(spawn_session(gallery, ledger, cache, engine, threshold)?)
        })
        .await??
    };

    let service = AttendanceService {
        session,
        gallery,
        ledger,
        cache,
        threshold: config.match_threshold,
    };
    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "rollcalld ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
