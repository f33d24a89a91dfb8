//! Configuration default values
//!
//! Central location for every `#[serde(default = "...")]` constant used by
//! `Config`, so defaults can be changed in one place.

// Directories
pub const DEFAULT_CACHE_DIR: &str = "./data/cache";
pub const DEFAULT_DOWNLOADS_DIR: &str = "./data/downloads";
pub const DEFAULT_TEMP_DIR: &str = "./data/temp";

// Local Session Cache
pub const DEFAULT_SESSION_CACHE_FILENAME: &str = "remote_sessions.json";
pub const DEFAULT_SESSION_EXPIRY_SECS: i64 = 24 * 60 * 60;

// Remote Service Server
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

// Downloader
pub const DEFAULT_WORKERS_PER_TRACK: u32 = 4;
pub const DEFAULT_CONCURRENT_DOWNLOADS: u32 = 2;
pub const DEFAULT_DOWNLOAD_TIMEOUT: &str = "30s";

// HTTP Client Facade / retry policy
pub const DEFAULT_HTTP_BACKEND: &str = "standard";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 60;
pub const DEFAULT_RETRYABLE_STATUS_CODES: &[&str] = &["429", "500", "502", "503", "504"];
pub const DEFAULT_RETRYABLE_METHODS: &[&str] = &["GET", "POST"];

// Remote Service Proxy retry-and-auth-escalation (spec.md §4.5/§5/§8)
pub const PROXY_RETRY_DELAYS_SECS: &[u64] = &[2, 4, 8];
pub const PROXY_MAX_RETRIES: u32 = 3;

// output_template defaults, grounded in the original's per-type naming conventions
pub const DEFAULT_OUTPUT_TEMPLATE_MOVIES: &str = "{title} ({year}) {quality} {video} {audio}";
pub const DEFAULT_OUTPUT_TEMPLATE_SERIES: &str = "{title} {season_episode} {episode_name?} {quality} {video} {audio}";
pub const DEFAULT_OUTPUT_TEMPLATE_SONGS: &str = "{artist} - {album} - {track_number?} {title}";
