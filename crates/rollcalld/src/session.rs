use std::sync::Arc;

use chrono::{Local, Timelike};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use rollcall_core::{
    CacheHandle, EncodingCache, EngineError, EuclideanMatcher, FaceEngine, Identity, MarkOutcome,
    Matcher, RegisterOutcome,
};
use rollcall_store::{AttendanceLedger, GalleryError, GalleryStore, LedgerError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("gallery error: {0}")]
    Gallery(#[from] GalleryError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("session thread exited")]
    ChannelClosed,
}

/// Messages sent from D-Bus handlers to the session thread.
enum SessionRequest {
    Mark {
        images: Vec<Vec<u8>>,
        reply: oneshot::Sender<Result<Vec<MarkOutcome>, SessionError>>,
    },
    Register {
        name: String,
        images: Vec<Vec<u8>>,
        reply: oneshot::Sender<Result<RegisterOutcome, SessionError>>,
    },
}

/// Clone-safe handle to the session thread.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionRequest>,
}

impl SessionHandle {
    /// Identify every face in the probe images and record attendance.
    pub async fn mark(&self, images: Vec<Vec<u8>>) -> Result<Vec<MarkOutcome>, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionRequest::Mark {
                images,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    /// Store reference images for `name`, then rebuild the encoding cache.
    pub async fn register(
        &self,
        name: String,
        images: Vec<Vec<u8>>,
    ) -> Result<RegisterOutcome, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionRequest::Register {
                name,
                images,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SessionError::ChannelClosed)?
    }
}

/// Everything the session thread owns.
struct SessionState {
    engine: Box<dyn FaceEngine>,
    gallery: Arc<dyn GalleryStore>,
    ledger: Arc<AttendanceLedger>,
    cache: CacheHandle,
    threshold: f32,
}

/// Spawn the session controller on a dedicated OS thread.
///
/// Encodes the whole gallery up front so the first mark request finds a
/// ready cache, then enters a request loop. Fails fast at startup if the
/// gallery cannot be read.
pub fn spawn_session(
    gallery: Arc<dyn GalleryStore>,
    ledger: Arc<AttendanceLedger>,
    cache: CacheHandle,
    mut engine: Box<dyn FaceEngine>,
    threshold: f32,
) -> Result<SessionHandle, SessionError> {
    let references = gallery.load_all()?;
    let initial = EncodingCache::from_references(&references, engine.as_mut());
    tracing::info!(
        identities = initial.identity_count(),
        encodings = initial.len(),
        threshold,
        "initial encoding cache ready"
    );
    cache.install(initial);

    let (tx, mut rx) = mpsc::channel::<SessionRequest>(4);
    let mut state = SessionState {
        engine,
        gallery,
        ledger,
        cache,
        threshold,
    };

    std::thread::Builder::new()
        .name("rollcall-session".into())
        .spawn(move || {
            tracing::info!("session thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    SessionRequest::Mark { images, reply } => {
                        let result = run_mark(&mut state, &images);
                        let _ = reply.send(result);
                    }
                    SessionRequest::Register {
                        name,
                        images,
                        reply,
                    } => {
                        let result = run_register(&mut state, &name, &images);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("session thread exiting");
        })
        .expect("failed to spawn session thread");

    Ok(SessionHandle { tx })
}

/// Match every face in the probe images against one cache snapshot and
/// record the matches. One outcome per detected face; a single
/// [`MarkOutcome::NoFaceDetected`] when no image held any face.
fn run_mark(state: &mut SessionState, images: &[Vec<u8>]) -> Result<Vec<MarkOutcome>, SessionError> {
    let cache = state.cache.snapshot();
    let matcher = EuclideanMatcher;
    let mut outcomes = Vec::new();

    for image in images {
        let faces = state.engine.detect_faces(image)?;
        for face in faces {
            let result = matcher.compare(&face.encoding, &cache, state.threshold);
            match result.identity {
                Some(identity) => {
                    outcomes.push(record_mark(&state.ledger, &identity, result.distance)?);
                }
                None => {
                    tracing::debug!(distance = result.distance, "probe face matched nobody");
                    outcomes.push(MarkOutcome::NoMatch {
                        distance: result.distance.is_finite().then_some(result.distance),
                    });
                }
            }
        }
    }

    if outcomes.is_empty() {
        tracing::debug!(images = images.len(), "no face in any probe image");
        return Ok(vec![MarkOutcome::NoFaceDetected]);
    }
    Ok(outcomes)
}

/// Record one matched identity in the ledger, at most once per day.
fn record_mark(
    ledger: &AttendanceLedger,
    identity: &Identity,
    distance: f32,
) -> Result<MarkOutcome, SessionError> {
    let now = Local::now();
    let date = now.date_naive();
    let time = now.time().with_nanosecond(0).unwrap_or_else(|| now.time());

    if let Some(existing) = ledger.recorded_at(identity, date)? {
        tracing::debug!(name = %identity, date = %date, "already marked today");
        return Ok(MarkOutcome::AlreadyMarked {
            name: identity.clone(),
            date,
            time: existing,
        });
    }

    match ledger.append(identity, date, time) {
        Ok(record) => {
            tracing::info!(
                name = %record.name,
                date = %record.date,
                time = %record.time,
                distance,
                "attendance marked"
            );
            Ok(MarkOutcome::Marked {
                name: record.name,
                date: record.date,
                time: record.time,
                distance,
            })
        }
        // Lost the insert race to a parallel mark; surface the winner's time.
        Err(LedgerError::DuplicateRecord { name, date, time }) => {
            Ok(MarkOutcome::AlreadyMarked { name, date, time })
        }
        Err(err) => Err(err.into()),
    }
}

/// Validate, store, and re-encode one registration request.
///
/// Every submitted image must hold a detectable face before anything
/// lands in the gallery; the cache rebuild would otherwise skip the bad
/// image silently and the stored set would never match.
fn run_register(
    state: &mut SessionState,
    name: &str,
    images: &[Vec<u8>],
) -> Result<RegisterOutcome, SessionError> {
    let identity = match Identity::new(name) {
        Ok(identity) => identity,
        Err(err) => {
            tracing::debug!(name, error = %err, "registration refused");
            return Ok(RegisterOutcome::InvalidIdentity {
                reason: err.to_string(),
            });
        }
    };
    if images.is_empty() {
        tracing::debug!(name = %identity, "registration without images refused");
        return Ok(RegisterOutcome::NoImage);
    }

    for (index, image) in images.iter().enumerate() {
        if state.engine.detect_faces(image)?.is_empty() {
            tracing::debug!(name = %identity, image_index = index, "registration image has no face");
            return Ok(RegisterOutcome::NoFaceDetected { image_index: index });
        }
    }

    let images_added = match state.gallery.register(identity.as_str(), images) {
        Ok(count) => count,
        Err(GalleryError::UnsupportedImage { image_index }) => {
            tracing::debug!(name = %identity, image_index, "registration image format refused");
            return Ok(RegisterOutcome::UnsupportedImage { image_index });
        }
        Err(err) => return Err(err.into()),
    };

    let cache_entries = rebuild_cache(state)?;
    tracing::info!(name = %identity, images_added, cache_entries, "registered");

    Ok(RegisterOutcome::Registered {
        name: identity,
        images_added,
        cache_entries,
    })
}

/// Re-encode the whole gallery and swap the new cache in whole.
fn rebuild_cache(state: &mut SessionState) -> Result<usize, SessionError> {
    let references = state.gallery.load_all()?;
    let cache = EncodingCache::from_references(&references, state.engine.as_mut());
    let entries = cache.len();
    state.cache.install(cache);
    Ok(entries)
}
