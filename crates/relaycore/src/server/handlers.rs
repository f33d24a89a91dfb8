//! Remote Service Server handlers (spec.md §4.6/§6). Stateless: every
//! handler resolves a fresh `Service` instance per call and never
//! persists sessions, credentials, cookies, or DRM keys.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ApiKeyConfig;
use crate::download::wanted::{Episode as WantedEpisode, WantedSet};
use crate::errors::{AppError, AppResult, ServerError};
use crate::http::HttpRequest;
use crate::models::{is_qualified_proxy_uri, Credential, SessionRecord, Title};
use crate::server::response::ApiOk;
use crate::server::state::AppState;

/// Common request body shape across search/titles/tracks/chapters/license:
/// the identifier field is accepted under any of three names, and
/// authentication material is supplied in exactly one of three forms.
#[derive(Debug, Deserialize, Default)]
pub struct OperationRequest {
    /// Service tag for `/api/download`, where there is no `/{tag}` path
    /// segment to carry it.
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub title_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub no_proxy: bool,
    #[serde(default)]
    pub cookies: Option<Value>,
    #[serde(default)]
    pub credential: Option<Credential>,
    #[serde(default)]
    pub pre_authenticated_session: Option<SessionRecord>,
    #[serde(default)]
    pub season: Option<i32>,
    #[serde(default)]
    pub episode: Option<i32>,
    #[serde(default)]
    pub wanted: Option<String>,
    #[serde(default)]
    pub track_id: Option<String>,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub pssh: Option<String>,
    #[serde(default)]
    pub cdm: Option<String>,
}

impl OperationRequest {
    fn identifier(&self) -> AppResult<&str> {
        self.title
            .as_deref()
            .or(self.title_id.as_deref())
            .or(self.url.as_deref())
            .ok_or_else(|| AppError::validation("request is missing title/title_id/url"))
    }

    fn profile_or_default(&self) -> &str {
        self.profile.as_deref().unwrap_or("default")
    }

    /// Proxy check per spec.md §4.6 step 3: an unresolved provider token
    /// reaching the server is always rejected.
    fn validate_proxy(&self) -> AppResult<()> {
        if self.no_proxy {
            return Ok(());
        }
        if let Some(proxy) = &self.proxy {
            if !is_qualified_proxy_uri(proxy) {
                return Err(ServerError::InvalidProxy { token: proxy.clone() }.into());
            }
        }
        Ok(())
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Resolves the session to operate with, or an `AuthRequired`/`SessionExpired`
/// error, per spec.md §4.6 step 6.
async fn resolve_session(service: &dyn crate::service::Service, req: &OperationRequest) -> AppResult<SessionRecord> {
    if let Some(session) = &req.pre_authenticated_session {
        if session.is_expired_at(now_secs()) {
            return Err(ServerError::SessionExpired.into());
        }
        return Ok(session.clone());
    }

    if req.cookies.is_some() || req.credential.is_some() {
        let credential = req.credential.clone().unwrap_or(Credential { username: String::new(), password: String::new() });
        let mut session = service
            .authenticate(&credential)
            .await
            .map_err(|e| AppError::Server(ServerError::AuthFailed { message: e.to_string() }))?;
        session.profile = req.profile_or_default().to_string();
        return Ok(session);
    }

    Err(ServerError::AuthRequired.into())
}

/// Resolves a tag to a `Service` trait object, checked local-adapter-first
/// then against discovered remote bindings — the caller (every handler
/// below) only ever sees `Arc<dyn Service>` and never branches on which
/// kind it got (spec.md §4.3/§9).
async fn locate_service(state: &AppState, tag: &str) -> AppResult<(String, Arc<dyn crate::service::Service>)> {
    let resolved = state.registry.resolve_tag(tag).await;

    if let Some(service) = state.locator.find(&resolved).await {
        return Ok((resolved, service));
    }

    if let Some(service) = state
        .registry
        .resolve_remote_service(&resolved, state.client_factory.clone(), state.session_cache.clone(), state.config.clone())
        .await
    {
        return Ok((resolved, service));
    }

    Err(AppError::Server(ServerError::UnknownService { tag: tag.to_string() }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let breaker_stats = state.client_factory.circuit_breaker_health().await;
    ApiOk::new(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "update_check": "disabled",
        "circuit_breakers": breaker_stats,
    }))
}

pub async fn list_services(State(state): State<AppState>) -> impl IntoResponse {
    let services = state.registry.list_local().await;
    ApiOk::new(json!({ "services": services }))
}

pub async fn list_remote_services(State(state): State<AppState>) -> impl IntoResponse {
    let services: Vec<_> = state.registry.list_remote().await.into_iter().map(|b| b.descriptor).collect();
    ApiOk::new(json!({ "services": services }))
}

pub async fn search(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    Json(req): Json<OperationRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate_proxy()?;
    let (_, service) = locate_service(&state, &tag).await?;
    let query = req.query.clone().ok_or_else(|| AppError::validation("search requires 'query'"))?;
    let session = resolve_session(service.as_ref(), &req).await?;

    let results = service.search(&session, &query).await.map_err(|e| AppError::Server(ServerError::ServiceError { message: e.to_string() }))?;

    Ok(ApiOk::new(json!({
        "results": results,
        "session": session,
    })))
}

pub async fn titles(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    Json(req): Json<OperationRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate_proxy()?;
    let (_, service) = locate_service(&state, &tag).await?;
    let identifier = req.identifier()?.to_string();
    let session = resolve_session(service.as_ref(), &req).await?;

    let results = service.titles(&session, &identifier).await.map_err(|e| AppError::Server(ServerError::ServiceError { message: e.to_string() }))?;

    Ok(ApiOk::new(json!({
        "titles": results,
        "session": session,
        "geofence": service.descriptor().geofence,
    })))
}

/// Filters a title list by the `wanted`/`season`+`episode` episode
/// selector, separating resolvable episodes from ones that must be
/// reported in `unavailable_episodes` rather than aborting the request
/// (spec.md §4.6, end-to-end scenario 5). An episode is "unavailable" if it
/// was asked for but the catalog never returned a matching title.
fn filter_episodes(titles: Vec<Title>, req: &OperationRequest) -> (Vec<Title>, Vec<String>) {
    let wanted = match (&req.wanted, req.season, req.episode) {
        (Some(spec), _, _) => WantedSet::parse(spec).ok(),
        (None, Some(season), Some(number)) => {
            WantedSet::parse(&format!("{season}x{number}")).ok()
        }
        _ => None,
    };

    let Some(wanted) = wanted else {
        return (titles, vec![]);
    };

    let mut matched = Vec::new();
    let mut found = std::collections::HashSet::new();
    for title in titles {
        if let Title::Episode(e) = &title {
            let episode = WantedEpisode { season: e.season.max(0) as u32, number: e.number.max(0) as u32 };
            if wanted.matches(episode) {
                found.insert(episode);
                matched.push(title);
            }
        } else {
            matched.push(title);
        }
    }

    let unavailable =
        wanted.requested_episodes().into_iter().filter(|e| !found.contains(e)).map(|e| e.to_string()).collect();
    (matched, unavailable)
}

/// Label used to report a title in `unavailable_episodes` when its track
/// lookup fails; `SxxEyy` for episodes, the catalog id otherwise.
fn title_label(title: &Title) -> String {
    match title {
        Title::Episode(e) => WantedEpisode { season: e.season.max(0) as u32, number: e.number.max(0) as u32 }.to_string(),
        other => other.cache_key().1.to_string(),
    }
}

pub async fn tracks(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    Json(req): Json<OperationRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate_proxy()?;
    let (_, service) = locate_service(&state, &tag).await?;
    let identifier = req.identifier()?.to_string();
    let session = resolve_session(service.as_ref(), &req).await?;

    let resolved_titles =
        service.titles(&session, &identifier).await.map_err(|e| AppError::Server(ServerError::ServiceError { message: e.to_string() }))?;
    let (wanted_titles, mut unavailable) = filter_episodes(resolved_titles, &req);

    let mut episodes = Vec::new();
    let mut resolved = Vec::new();
    for title in wanted_titles {
        match service.tracks(&session, &title).await {
            Ok(track_list) => {
                episodes.push(json!({ "title": &title, "tracks": track_list }));
                resolved.push(title);
            }
            Err(e) => {
                tracing::warn!(title = %title_label(&title), error = %e, "track lookup failed for title, reporting as unavailable");
                unavailable.push(title_label(&title));
            }
        }
    }

    if episodes.is_empty() {
        return Err(ServerError::NotAvailable { title_id: identifier }.into());
    }

    let mut body = json!({
        "session": session,
        "geofence": service.descriptor().geofence,
    });
    if episodes.len() == 1 {
        let tracks = episodes.remove(0)["tracks"].take();
        body["title"] = serde_json::to_value(&resolved[0]).unwrap_or(Value::Null);
        body["tracks"] = tracks;
    } else {
        body["episodes"] = Value::Array(episodes);
    }
    if !unavailable.is_empty() {
        body["unavailable_episodes"] = json!(unavailable);
    }

    Ok(ApiOk::new(body))
}

pub async fn chapters(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    Json(req): Json<OperationRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate_proxy()?;
    let (_, service) = locate_service(&state, &tag).await?;
    let identifier = req.identifier()?.to_string();
    let session = resolve_session(service.as_ref(), &req).await?;

    let title_list =
        service.titles(&session, &identifier).await.map_err(|e| AppError::Server(ServerError::ServiceError { message: e.to_string() }))?;
    let title = title_list.into_iter().next().ok_or_else(|| AppError::from(ServerError::NotAvailable { title_id: identifier }))?;
    let chapters = service.chapters(&session, &title).await.map_err(|e| AppError::Server(ServerError::ServiceError { message: e.to_string() }))?;

    Ok(ApiOk::new(json!({ "chapters": chapters, "session": session })))
}

/// Client-CDM license proxy (spec.md §4.8): re-resolves the title, finds
/// the matching track, forwards the caller's base64 challenge to the
/// track's license URL using the server's session, and relays back the
/// base64 license. Does not parse or hold keys itself.
pub async fn license(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    Json(req): Json<OperationRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate_proxy()?;
    let (_, service) = locate_service(&state, &tag).await?;
    let identifier = req.identifier()?.to_string();
    let track_id = req.track_id.clone().ok_or_else(|| AppError::validation("license requires 'track_id'"))?;
    let challenge = req.challenge.clone().ok_or_else(|| AppError::validation("license requires 'challenge'"))?;
    let session = resolve_session(service.as_ref(), &req).await?;

    let title_list =
        service.titles(&session, &identifier).await.map_err(|e| AppError::Server(ServerError::ServiceError { message: e.to_string() }))?;
    let title = title_list.into_iter().next().ok_or_else(|| AppError::from(ServerError::NotAvailable { title_id: identifier.clone() }))?;
    let track_list = service.tracks(&session, &title).await.map_err(|e| AppError::Server(ServerError::ServiceError { message: e.to_string() }))?;

    let track = track_list
        .into_iter()
        .find(|t| t.common().id == track_id)
        .ok_or_else(|| AppError::not_found("track", track_id.clone()))?;
    let drm = track.common().drm.clone().ok_or_else(|| AppError::validation("track is not DRM-protected"))?;

    let client = state.client_factory.client("license").await?;
    let challenge_bytes = base64::engine::general_purpose::STANDARD
        .decode(&challenge)
        .map_err(|_| AppError::validation("challenge is not valid base64"))?;

    let mut request = HttpRequest::get(drm.license_url.clone());
    request.method = reqwest::Method::POST;
    for (key, value) in &drm.license_headers {
        request.headers.insert(key.clone(), value.clone());
    }
    for (key, value) in &session.headers {
        request.headers.entry(key.clone()).or_insert_with(|| value.clone());
    }
    request.body = Some(challenge_bytes);

    let response = client.execute(request).await.map_err(|e| AppError::Server(ServerError::ServiceError { message: e.to_string() }))?;
    let license_bytes = response.bytes().await.map_err(|e| AppError::Server(ServerError::ServiceError { message: e.to_string() }))?;
    let license_b64 = base64::engine::general_purpose::STANDARD.encode(license_bytes);

    Ok(ApiOk::new(json!({ "license": license_b64, "session": session })))
}

/// Server-CDM premium decrypt (spec.md §4.8). Actual CDM session
/// management is an external collaborator (out of scope); this endpoint
/// owns exactly the protocol surface: tier/CDM gating and the shape of
/// the response. It errors rather than fabricating key material.
pub async fn decrypt(
    Extension(tier): Extension<Option<ApiKeyConfig>>,
    State(_state): State<AppState>,
    Path(_tag): Path<String>,
    Json(req): Json<OperationRequest>,
) -> AppResult<impl IntoResponse> {
    use crate::config::ApiKeyTier;

    let tier = tier.ok_or(AppError::Server(ServerError::PremiumRequired))?;
    if !matches!(tier.tier, ApiKeyTier::Premium) {
        return Err(ServerError::PremiumRequired.into());
    }

    let cdm = req.cdm.clone().or_else(|| tier.default_cdm.clone()).ok_or_else(|| AppError::validation("decrypt requires 'cdm' or a configured default_cdm"))?;
    if !tier.allows_cdm(&cdm) {
        return Err(ServerError::CdmNotAllowed { cdm }.into());
    }
    if req.pssh.is_none() {
        return Err(AppError::validation("decrypt requires 'pssh'"));
    }

    Err(AppError::Server(ServerError::ServiceError {
        message: "server-held CDM session management is not implemented in this engine".to_string(),
    }))
}

pub async fn submit_download(State(state): State<AppState>, Json(req): Json<OperationRequest>) -> AppResult<impl IntoResponse> {
    let tag = req.service.clone().ok_or_else(|| AppError::validation("download requires 'service'"))?;
    let identifier = req.identifier()?.to_string();
    let job = state.jobs.submit(&tag, &identifier).await;
    Ok((axum::http::StatusCode::ACCEPTED, Json(job)))
}

pub async fn list_download_jobs(State(state): State<AppState>) -> impl IntoResponse {
    let jobs = state.jobs.list().await;
    ApiOk::new(json!({ "jobs": jobs }))
}

pub async fn get_download_job(State(state): State<AppState>, Path(job_id): Path<uuid::Uuid>) -> AppResult<impl IntoResponse> {
    let job = state.jobs.get(job_id).await.ok_or_else(|| AppError::not_found("download job", job_id.to_string()))?;
    Ok(ApiOk::new(json!({ "job": job })))
}

pub async fn cancel_download_job(State(state): State<AppState>, Path(job_id): Path<uuid::Uuid>) -> AppResult<impl IntoResponse> {
    let job = state.jobs.cancel(job_id).await?;
    Ok(ApiOk::new(json!({ "job": job })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Episode, Title};

    fn episode(season: i32, number: i32) -> Title {
        Title::Episode(Episode {
            id: format!("s{season}e{number}"),
            service_tag: "atvp".into(),
            series_title: "Show".into(),
            season,
            number,
            name: None,
            year: None,
            data: Value::Null,
        })
    }

    #[test]
    fn filter_episodes_by_wanted_token() {
        let req = OperationRequest { wanted: Some("2x7".to_string()), ..Default::default() };
        let (matched, _) = filter_episodes(vec![episode(2, 7), episode(2, 8), episode(3, 7)], &req);
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn filter_episodes_by_season_episode_params() {
        let req = OperationRequest { season: Some(1), episode: Some(1), ..Default::default() };
        let (matched, _) = filter_episodes(vec![episode(1, 1), episode(1, 2)], &req);
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn no_selector_returns_all_titles() {
        let req = OperationRequest::default();
        let (matched, _) = filter_episodes(vec![episode(1, 1), episode(1, 2)], &req);
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn filter_episodes_reports_requested_but_missing_as_unavailable() {
        let req = OperationRequest { wanted: Some("1x1,1x2".to_string()), ..Default::default() };
        let (matched, unavailable) = filter_episodes(vec![episode(1, 1)], &req);
        assert_eq!(matched.len(), 1);
        assert_eq!(unavailable, vec!["S01E02".to_string()]);
    }

    #[test]
    fn validate_proxy_rejects_unresolved_token() {
        let req = OperationRequest { proxy: Some("nordvpn:ca1066".to_string()), ..Default::default() };
        assert!(req.validate_proxy().is_err());
    }

    #[test]
    fn validate_proxy_accepts_qualified_uri() {
        let req = OperationRequest { proxy: Some("http://u:p@h:1".to_string()), ..Default::default() };
        assert!(req.validate_proxy().is_ok());
    }

    #[test]
    fn validate_proxy_skipped_when_no_proxy_set() {
        let req = OperationRequest { proxy: Some("nordvpn:ca1066".to_string()), no_proxy: true, ..Default::default() };
        assert!(req.validate_proxy().is_ok());
    }
}
