use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Directory of reference images, one subdirectory per person.
    pub gallery_dir: PathBuf,
    /// Directory of per-date attendance files.
    pub attendance_dir: PathBuf,
    /// Euclidean distance at or under which a probe matches.
    pub match_threshold: f32,
    /// Bus name of the external face engine service.
    pub engine_service: String,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("ROLLCALL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        Self {
            gallery_dir: std::env::var("ROLLCALL_GALLERY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("known_faces")),
            attendance_dir: std::env::var("ROLLCALL_ATTENDANCE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("attendance")),
            match_threshold: env_f32("ROLLCALL_MATCH_THRESHOLD", 0.6),
            engine_service: std::env::var("ROLLCALL_ENGINE_SERVICE")
                .unwrap_or_else(|_| "org.rollcall.FaceEngine1".to_string()),
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
