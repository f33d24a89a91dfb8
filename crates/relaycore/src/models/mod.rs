//! Data model shared by every layer of the engine: the Service Descriptor,
//! Session Record, Credential, Title/Track/Chapter sum types, Remote Service
//! Binding, Download Job, and the resolved-proxy newtype.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Seconds a Session Record stays valid after `cached_at` (spec.md §3/§4.4).
pub const SESSION_EXPIRY_SECS: i64 = 24 * 60 * 60;

/// Immutable record identifying a service adapter, created at discovery time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceDescriptor {
    /// Canonical short name, e.g. "atvp"
    pub tag: String,
    /// Alternative tags, matched case-insensitively
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Country codes where the origin is reachable
    #[serde(default)]
    pub geofence: Vec<String>,
    /// Regexes mapping free-form user input to an internal id
    #[serde(default)]
    pub title_regex: Vec<String>,
    /// Human-readable description shown in `/api/services`
    #[serde(default)]
    pub help: String,
    /// Origin base URL, empty for adapters with no single fixed origin
    #[serde(default)]
    pub url: String,
}

impl ServiceDescriptor {
    /// Case-insensitive match against tag or any alias.
    pub fn matches_tag(&self, candidate: &str) -> bool {
        self.tag.eq_ignore_ascii_case(candidate)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(candidate))
    }

    /// Compile `title_regex` entries, skipping any that fail to parse.
    pub fn compiled_title_patterns(&self) -> Vec<regex::Regex> {
        self.title_regex
            .iter()
            .filter_map(|p| regex::Regex::new(p).ok())
            .collect()
    }
}

/// A single cookie attribute set, as carried inside a Session Record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Cookie {
    pub value: String,
    #[serde(default = "default_cookie_domain")]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    /// Seconds since epoch; `None` means a session cookie.
    #[serde(default)]
    pub expires: Option<i64>,
}

fn default_cookie_domain() -> String {
    String::new()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// Portable snapshot of an authenticated HTTP session (spec.md §3/§4.2).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionRecord {
    #[serde(default)]
    pub cookies: HashMap<String, Cookie>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub service_tag: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Seconds since epoch.
    pub cached_at: i64,
    #[serde(default)]
    pub authenticated: bool,
}

fn default_profile() -> String {
    "default".to_string()
}

impl SessionRecord {
    pub fn new(service_tag: impl Into<String>, profile: impl Into<String>, cached_at: i64) -> Self {
        Self {
            cookies: HashMap::new(),
            headers: HashMap::new(),
            service_tag: service_tag.into(),
            profile: profile.into(),
            cached_at,
            authenticated: false,
        }
    }

    /// A Session Record is valid iff it carries at least one cookie or an
    /// Authorization header (spec.md §3 invariant).
    pub fn is_valid(&self) -> bool {
        !self.cookies.is_empty() || self.has_authorization_header()
    }

    fn has_authorization_header(&self) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case("authorization"))
    }

    /// `cached_at + 24h` boundary check.
    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        now_secs - self.cached_at >= SESSION_EXPIRY_SECS
    }

    /// True within the last hour of a valid session's life.
    pub fn is_nearing_expiry_at(&self, now_secs: i64) -> bool {
        let age = now_secs - self.cached_at;
        (SESSION_EXPIRY_SECS - 60 * 60..SESSION_EXPIRY_SECS).contains(&age)
    }
}

/// Username/password pair. Never serialized into a Session Record — used
/// only to produce one via interactive authentication.
#[derive(Clone, Deserialize, Serialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Per-title key/value bag fed to `TemplateFormatter`.
pub type TemplateContext = HashMap<String, String>;

/// Sum type over the three kinds of acquirable title.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind")]
pub enum Title {
    Movie(Movie),
    Episode(Episode),
    Song(Song),
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Movie {
    pub id: String,
    pub service_tag: String,
    pub name: String,
    pub year: Option<i32>,
    pub language: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Episode {
    pub id: String,
    pub service_tag: String,
    pub series_title: String,
    /// season 0 marks a special-feature/specials episode
    pub season: i32,
    pub number: i32,
    pub name: Option<String>,
    pub year: Option<i32>,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Song {
    pub id: String,
    pub service_tag: String,
    pub name: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub track_number: Option<i32>,
    pub disc: Option<i32>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Title {
    /// Identity for caching purposes: (service_tag, id).
    pub fn cache_key(&self) -> (&str, &str) {
        match self {
            Title::Movie(m) => (&m.service_tag, &m.id),
            Title::Episode(e) => (&e.service_tag, &e.id),
            Title::Song(s) => (&s.service_tag, &s.id),
        }
    }

    /// Builds the filename-template substitution context (spec.md §6
    /// `output_template`), grounded in the original's per-title
    /// `_build_template_context` methods. Video/audio-derived variables are
    /// filled in by the caller once a Track has been resolved.
    pub fn template_context(&self) -> TemplateContext {
        let mut ctx = TemplateContext::new();
        match self {
            Title::Movie(m) => {
                ctx.insert("title".to_string(), m.name.clone());
                if let Some(year) = m.year {
                    ctx.insert("year".to_string(), year.to_string());
                }
                ctx.insert("tag".to_string(), m.service_tag.clone());
                ctx.insert("source".to_string(), m.service_tag.clone());
            }
            Title::Episode(e) => {
                ctx.insert("title".to_string(), e.series_title.clone());
                if let Some(year) = e.year {
                    ctx.insert("year".to_string(), year.to_string());
                }
                ctx.insert("season".to_string(), format!("S{:02}", e.season));
                ctx.insert("episode".to_string(), format!("E{:02}", e.number));
                ctx.insert(
                    "season_episode".to_string(),
                    format!("S{:02}E{:02}", e.season, e.number),
                );
                if let Some(name) = episode_display_name(e) {
                    ctx.insert("episode_name".to_string(), name);
                }
                ctx.insert("tag".to_string(), e.service_tag.clone());
                ctx.insert("source".to_string(), e.service_tag.clone());
            }
            Title::Song(s) => {
                ctx.insert("title".to_string(), s.name.clone());
                if let Some(artist) = &s.artist {
                    ctx.insert("artist".to_string(), artist.clone());
                }
                if let Some(album) = &s.album {
                    ctx.insert("album".to_string(), album.clone());
                }
                if let Some(year) = s.year {
                    ctx.insert("year".to_string(), year.to_string());
                }
                if let Some(n) = s.track_number {
                    ctx.insert("track_number".to_string(), n.to_string());
                }
                if let Some(d) = s.disc {
                    ctx.insert("disc".to_string(), d.to_string());
                }
                ctx.insert("tag".to_string(), s.service_tag.clone());
                ctx.insert("source".to_string(), s.service_tag.clone());
            }
        }
        ctx
    }
}

/// Elides an episode name that is just a restatement of the episode number
/// or of the series title, matching the original's cosmetic cleanup.
fn episode_display_name(e: &Episode) -> Option<String> {
    let name = e.name.as_ref()?;
    if name.eq_ignore_ascii_case(&e.series_title) {
        return None;
    }
    let generic = regex::Regex::new(r"(?i)^episode ?#?\d+$").unwrap();
    if generic.is_match(name) {
        return None;
    }
    Some(name.clone())
}

/// Video dynamic range classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum DynamicRange {
    Sdr,
    Hdr10,
    #[serde(rename = "HDR10+")]
    Hdr10Plus,
    Dv,
    Hlg,
    Hybrid,
}

/// Manifest container format a track's `url` points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ManifestDescriptor {
    Hls,
    Dash,
    Raw,
}

/// Codec identifier shared across video/audio tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Codec {
    H264,
    H265,
    Vp9,
    Av1,
    Aac,
    Ac3,
    Eac3,
    Flac,
    Opus,
    Other(String),
}

/// DRM metadata advertised alongside a protected track.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DrmDescriptor {
    pub scheme: String,
    pub license_url: String,
    #[serde(default)]
    pub license_headers: HashMap<String, String>,
    /// Base64-encoded PSSH / init data.
    pub init_data: String,
}

/// Fields shared by every track kind.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrackCommon {
    /// Fingerprint of origin-specific selectors; stable track id.
    pub id: String,
    pub codec: Codec,
    pub language: String,
    pub descriptor: ManifestDescriptor,
    /// Origin URL, or a `file://` pointer to a materialized manifest.
    /// May be empty when returned by a Remote Service Proxy — the
    /// downloader fills it in from the rehydrated session.
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drm: Option<DrmDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VideoTrack {
    #[serde(flatten)]
    pub common: TrackCommon,
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    pub bitrate: u64,
    pub range: DynamicRange,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AudioTrack {
    #[serde(flatten)]
    pub common: TrackCommon,
    pub channels: f32,
    pub bitrate: u64,
    #[serde(default)]
    pub atmos: bool,
    pub is_original_lang: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubtitleTrack {
    #[serde(flatten)]
    pub common: TrackCommon,
    #[serde(default)]
    pub forced: bool,
    #[serde(default)]
    pub sdh: bool,
    #[serde(default)]
    pub cc: bool,
    pub is_original_lang: bool,
}

/// Sum type over video/audio/subtitle tracks.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "track_type", rename_all = "lowercase")]
pub enum Track {
    Video(VideoTrack),
    Audio(AudioTrack),
    Subtitle(SubtitleTrack),
}

impl Track {
    pub fn common(&self) -> &TrackCommon {
        match self {
            Track::Video(t) => &t.common,
            Track::Audio(t) => &t.common,
            Track::Subtitle(t) => &t.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut TrackCommon {
        match self {
            Track::Video(t) => &mut t.common,
            Track::Audio(t) => &mut t.common,
            Track::Subtitle(t) => &mut t.common,
        }
    }
}

/// A chapter marker within a title.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Chapter {
    /// Seconds, monotonically non-decreasing within a title.
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Discovered remote, keyed by `remote_<tag>` to avoid local/remote clashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteServiceBinding {
    pub remote_url: String,
    pub api_key: String,
    pub service_tag: String,
    pub descriptor: ServiceDescriptor,
}

impl RemoteServiceBinding {
    /// Registry key, e.g. `remote_atvp`.
    pub fn registry_key(&self) -> String {
        format!("remote_{}", self.service_tag.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DownloadJobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// In-memory, cooperatively-cancellable server-side download job.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DownloadJob {
    pub job_id: Uuid,
    pub service_tag: String,
    pub title_id: String,
    pub status: DownloadJobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// 0.0..=1.0
    pub progress: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadJob {
    pub fn new(service_tag: impl Into<String>, title_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            service_tag: service_tag.into(),
            title_id: title_id.into(),
            status: DownloadJobStatus::Queued,
            created_at: now,
            updated_at: now,
            progress: 0.0,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            DownloadJobStatus::Completed | DownloadJobStatus::Failed | DownloadJobStatus::Cancelled
        )
    }
}

/// A proxy token resolved client-side to a fully qualified URI, validated
/// against `^https?://` before it is allowed to reach a remote server.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResolvedProxy(String);

impl ResolvedProxy {
    pub fn parse(candidate: &str) -> Result<Self, String> {
        if is_qualified_proxy_uri(candidate) {
            Ok(Self(candidate.to_string()))
        } else {
            Err(format!("'{candidate}' is not a qualified http(s) proxy URI"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `^https?://` check shared by client-side validation and the server's
/// rejection of unresolved proxy tokens (spec.md §4.6 step 3, §8 boundary).
pub fn is_qualified_proxy_uri(candidate: &str) -> bool {
    candidate.starts_with("http://") || candidate.starts_with("https://")
}
