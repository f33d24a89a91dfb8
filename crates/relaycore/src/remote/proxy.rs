//! Client-side Remote Service Proxy: forwards operations to a Remote
//! Service Server, rehydrating sessions from the Local Session Cache and
//! escalating through authentication automatically (spec.md §4.5).
//!
//! Grounded directly in the original's `RemoteService._make_request` flow:
//! check cache → attach session/credential → POST → on `SESSION_EXPIRED` or
//! `AUTH_REQUIRED` re-authenticate and retry once → on network failure retry
//! with fixed exponential backoff.
//!
//! Implements the same `Service` capability interface a local adapter
//! implements (spec.md §4.3): a caller dispatching through a `Service`
//! trait object never needs to know whether it landed on an in-process
//! adapter or a proxy to another `relayd`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::config::{defaults::{PROXY_MAX_RETRIES, PROXY_RETRY_DELAYS_SECS}, Config};
use crate::errors::{ProxyError, ProxyResult};
use crate::http::{ClientFactory, HttpRequest};
use crate::models::{Chapter, Credential, ServiceDescriptor, SessionRecord, Title, Track};
use crate::remote::auth::{LocalServiceLocator, RemoteAuthOrchestrator};
use crate::service::Service;
use crate::session::LocalSessionCache;

pub struct RemoteServiceProxy {
    remote_url: String,
    api_key: String,
    service_tag: String,
    profile: String,
    client_factory: Arc<ClientFactory>,
    session_cache: Arc<LocalSessionCache>,
    config: Arc<Config>,
    descriptor: ServiceDescriptor,
    credential: Option<Credential>,
    proxy: Option<String>,
    locator: Option<Arc<dyn LocalServiceLocator>>,
}

impl RemoteServiceProxy {
    pub fn new(
        remote_url: impl Into<String>,
        api_key: impl Into<String>,
        service_tag: impl Into<String>,
        profile: impl Into<String>,
        client_factory: Arc<ClientFactory>,
        session_cache: Arc<LocalSessionCache>,
        config: Arc<Config>,
    ) -> Self {
        let service_tag = service_tag.into();
        let descriptor = ServiceDescriptor {
            tag: service_tag.clone(),
            aliases: vec![],
            geofence: vec![],
            title_regex: vec![],
            help: String::new(),
            url: String::new(),
        };
        Self {
            remote_url: remote_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            service_tag,
            profile: profile.into(),
            client_factory,
            session_cache,
            config,
            descriptor,
            credential: None,
            proxy: None,
            locator: None,
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Attaches a friendly proxy provider token (or an already-qualified
    /// URI) to every outbound request (spec.md §3 "Proxy Resolution").
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Supplies the real Service Descriptor this proxy stands in for, e.g.
    /// from a discovered `RemoteServiceBinding`. Without one, a synthetic
    /// descriptor carrying only the service tag is used.
    pub fn with_descriptor(mut self, descriptor: ServiceDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Supplies a locator over in-process adapters, used to authenticate
    /// locally on this proxy's behalf (spec.md §4.7) when the remote
    /// reports `SESSION_EXPIRED`/`AUTH_REQUIRED`.
    pub fn with_locator(mut self, locator: Arc<dyn LocalServiceLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub async fn search(&self, query: &str) -> ProxyResult<Value> {
        self.make_request(&format!("/api/remote/{}/search", self.service_tag), json!({ "query": query })).await
    }

    pub async fn titles(&self, title: &str, extra: Value) -> ProxyResult<Value> {
        let mut data = json!({ "title": title });
        merge_extra(&mut data, extra);
        self.make_request(&format!("/api/remote/{}/titles", self.service_tag), data).await
    }

    pub async fn tracks(&self, title: &str, season: Option<i32>, episode: Option<i32>) -> ProxyResult<Value> {
        let mut data = json!({ "title": title });
        if let Some(s) = season {
            data["season"] = json!(s);
        }
        if let Some(e) = episode {
            data["episode"] = json!(e);
        }
        self.make_request(&format!("/api/remote/{}/tracks", self.service_tag), data).await
    }

    pub async fn chapters(&self, title: &str, season: Option<i32>, episode: Option<i32>) -> ProxyResult<Value> {
        let mut data = json!({ "title": title });
        if let Some(s) = season {
            data["season"] = json!(s);
        }
        if let Some(e) = episode {
            data["episode"] = json!(e);
        }
        self.make_request(&format!("/api/remote/{}/chapters", self.service_tag), data).await
    }

    /// Core request/retry/auth-escalation loop, for callers with no
    /// pre-resolved session of their own (the CLI convenience methods).
    async fn make_request(&self, endpoint: &str, mut data: Value) -> ProxyResult<Value> {
        self.attach_auth(&mut data).await?;
        self.attach_proxy(&mut data);
        self.make_request_with_retries(endpoint, data, 0).await
    }

    /// Same loop, but for `Service` trait callers that already hold a
    /// Session Record and want it attached directly rather than looked up
    /// from the Local Session Cache.
    async fn make_request_with_session(&self, endpoint: &str, mut data: Value, session: &SessionRecord) -> ProxyResult<Value> {
        data["pre_authenticated_session"] = serde_json::to_value(session).unwrap_or(Value::Null);
        self.attach_proxy(&mut data);
        self.make_request_with_retries(endpoint, data, 0).await
    }

    async fn attach_auth(&self, data: &mut Value) -> ProxyResult<()> {
        let cached = self
            .session_cache
            .get_session(&self.remote_url, &self.service_tag, &self.profile)
            .await
            .map_err(|_| ProxyError::SessionExpired { service_tag: self.service_tag.clone() })?;

        if let Some(session) = cached {
            data["pre_authenticated_session"] = serde_json::to_value(&session).unwrap_or(Value::Null);
        } else if let Some(credential) = &self.credential {
            data["credential"] = json!({ "username": credential.username, "password": credential.password });
        }
        Ok(())
    }

    /// Resolves `self.proxy` against `config.proxy_providers` and attaches
    /// it as the outbound `proxy` field; an unresolved token is forwarded
    /// verbatim so the server can reject it (spec.md §4.5 step 2).
    fn attach_proxy(&self, data: &mut Value) {
        if let Some(token) = &self.proxy {
            let resolved = self.config.resolve_proxy(token).unwrap_or_else(|| token.clone());
            data["proxy"] = json!(resolved);
        }
    }

    fn make_request_with_retries<'a>(
        &'a self,
        endpoint: &'a str,
        data: Value,
        retry_count: u32,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ProxyResult<Value>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}{}", self.remote_url, endpoint);
            let client = self
                .client_factory
                .client("default")
                .await
                .map_err(|e| ProxyError::Network { message: e.to_string() })?;

            let mut request = HttpRequest::get(&url);
            request.method = reqwest::Method::POST;
            request.headers.insert("X-API-Key".to_string(), self.api_key.clone());
            request.headers.insert("Content-Type".to_string(), "application/json".to_string());
            request.body = Some(serde_json::to_vec(&data).unwrap_or_default());

            let send_result = client.send_raw(request).await;

            let response = match send_result {
                Ok(response) => response,
                Err(err) => {
                    if retry_count < PROXY_MAX_RETRIES {
                        let delay = PROXY_RETRY_DELAYS_SECS
                            .get(retry_count as usize)
                            .copied()
                            .unwrap_or(*PROXY_RETRY_DELAYS_SECS.last().unwrap());
                        tracing::warn!(attempt = retry_count + 1, error = %err, "remote request failed, retrying");
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                        return self.make_request_with_retries(endpoint, data, retry_count + 1).await;
                    }
                    return Err(ProxyError::ConnectionExhausted { attempts: retry_count + 1 });
                }
            };

            if !response.status().is_success() {
                return Err(ProxyError::NetworkHttp { status: response.status().as_u16() });
            }

            let result: Value = response.json().await.map_err(|e| ProxyError::Network { message: e.to_string() })?;

            match result.get("error_code").and_then(|v| v.as_str()) {
                Some("SESSION_EXPIRED") => {
                    self.session_cache.delete_session(&self.remote_url, &self.service_tag, &self.profile).await.ok();
                    return self.reauthenticate_and_retry(endpoint, data, retry_count).await;
                }
                Some("AUTH_REQUIRED") if data.get("pre_authenticated_session").is_none() => {
                    return self.reauthenticate_and_retry(endpoint, data, retry_count).await;
                }
                _ => {}
            }

            Ok(result)
        })
    }

    async fn reauthenticate_and_retry(
        &self,
        endpoint: &str,
        mut data: Value,
        retry_count: u32,
    ) -> ProxyResult<Value> {
        let mut orchestrator = RemoteAuthOrchestrator::new(
            self.remote_url.clone(),
            self.api_key.clone(),
            self.client_factory.clone(),
        );
        if let Some(locator) = &self.locator {
            orchestrator = orchestrator.with_locator(locator.clone());
        }
        if let Some(credential) = &self.credential {
            orchestrator = orchestrator.with_credential(credential.clone());
        }

        let session = orchestrator
            .authenticate_service_locally(&self.service_tag, &self.profile)
            .await
            .map_err(|e| ProxyError::AuthFailed { service_tag: self.service_tag.clone(), message: e.to_string() })?;

        self.session_cache
            .store_session(&self.remote_url, &self.service_tag, &self.profile, session.clone())
            .await
            .map_err(|_| ProxyError::AuthFailed { service_tag: self.service_tag.clone(), message: "cache write failed".into() })?;

        if let Some(m) = data.as_object_mut() {
            m.remove("cookies");
            m.remove("credential");
        }
        data["pre_authenticated_session"] = serde_json::to_value(&session).unwrap_or(Value::Null);

        self.make_request_with_retries(endpoint, data, retry_count).await
    }
}

fn parse_field<T: DeserializeOwned>(result: &Value, field: &str) -> ProxyResult<Vec<T>> {
    let value = result.get(field).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| ProxyError::Network { message: e.to_string() })
}

#[async_trait]
impl Service for RemoteServiceProxy {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Authenticates the adapter this proxy fronts LOCALLY, via the
    /// configured locator, then caches the resulting session the way
    /// every other request path expects to find it (spec.md §4.7).
    async fn authenticate(&self, credential: &Credential) -> ProxyResult<SessionRecord> {
        let locator = self.locator.clone().ok_or_else(|| ProxyError::AuthFailed {
            service_tag: self.service_tag.clone(),
            message: "remote service proxy has no local service locator configured".to_string(),
        })?;

        let orchestrator = RemoteAuthOrchestrator::new(self.remote_url.clone(), self.api_key.clone(), self.client_factory.clone())
            .with_locator(locator)
            .with_credential(credential.clone());

        let session = orchestrator
            .authenticate_service_locally(&self.service_tag, &self.profile)
            .await
            .map_err(|e| ProxyError::AuthFailed { service_tag: self.service_tag.clone(), message: e.to_string() })?;

        self.session_cache
            .store_session(&self.remote_url, &self.service_tag, &self.profile, session.clone())
            .await
            .map_err(|_| ProxyError::AuthFailed { service_tag: self.service_tag.clone(), message: "cache write failed".into() })?;

        Ok(session)
    }

    async fn search(&self, session: &SessionRecord, query: &str) -> ProxyResult<Vec<Title>> {
        let data = json!({ "query": query });
        let endpoint = format!("/api/remote/{}/search", self.service_tag);
        let result = self.make_request_with_session(&endpoint, data, session).await?;
        parse_field(&result, "results")
    }

    async fn titles(&self, session: &SessionRecord, title_id: &str) -> ProxyResult<Vec<Title>> {
        let data = json!({ "title": title_id });
        let endpoint = format!("/api/remote/{}/titles", self.service_tag);
        let result = self.make_request_with_session(&endpoint, data, session).await?;
        parse_field(&result, "titles")
    }

    async fn tracks(&self, session: &SessionRecord, title: &Title) -> ProxyResult<Vec<Track>> {
        let mut data = json!({ "title": title.cache_key().1 });
        if let Title::Episode(e) = title {
            data["season"] = json!(e.season);
            data["episode"] = json!(e.number);
        }
        let endpoint = format!("/api/remote/{}/tracks", self.service_tag);
        let result = self.make_request_with_session(&endpoint, data, session).await?;
        let tracks = result.get("tracks").cloned().unwrap_or(Value::Null);
        serde_json::from_value(tracks).map_err(|e| ProxyError::Network { message: e.to_string() })
    }

    async fn chapters(&self, session: &SessionRecord, title: &Title) -> ProxyResult<Vec<Chapter>> {
        let mut data = json!({ "title": title.cache_key().1 });
        if let Title::Episode(e) = title {
            data["season"] = json!(e.season);
            data["episode"] = json!(e.number);
        }
        let endpoint = format!("/api/remote/{}/chapters", self.service_tag);
        let result = self.make_request_with_session(&endpoint, data, session).await?;
        let chapters = result.get("chapters").cloned().unwrap_or(Value::Null);
        serde_json::from_value(chapters).map_err(|e| ProxyError::Network { message: e.to_string() })
    }
}

fn merge_extra(data: &mut Value, extra: Value) {
    if let (Some(target), Some(source)) = (data.as_object_mut(), extra.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_extra_adds_new_keys() {
        let mut data = json!({ "title": "foo" });
        merge_extra(&mut data, json!({ "season": 1 }));
        assert_eq!(data["season"], 1);
        assert_eq!(data["title"], "foo");
    }

    async fn test_proxy(config: Config) -> RemoteServiceProxy {
        let factory = Arc::new(ClientFactory::new(
            Arc::new(Config::default()),
            Arc::new(crate::services::CircuitBreakerPool::new(Default::default())),
        ));
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(LocalSessionCache::open(dir.keep()).await.unwrap());
        RemoteServiceProxy::new("https://relay", "key", "atvp", "default", factory, cache, Arc::new(config))
    }

    #[tokio::test]
    async fn attach_proxy_resolves_configured_token() {
        let mut config = Config::default();
        let mut nordvpn = std::collections::HashMap::new();
        nordvpn.insert("username".to_string(), "u".to_string());
        nordvpn.insert("password".to_string(), "p".to_string());
        nordvpn.insert("ca1066".to_string(), "ca1066.nordvpn.com:89".to_string());
        config.proxy_providers.insert("nordvpn".to_string(), nordvpn);

        let proxy = test_proxy(config).await.with_proxy("nordvpn:ca1066");

        let mut data = json!({});
        proxy.attach_proxy(&mut data);
        assert_eq!(data["proxy"], "https://u:p@ca1066.nordvpn.com:89");
    }

    #[tokio::test]
    async fn attach_proxy_passes_through_unresolved_token() {
        let proxy = test_proxy(Config::default()).await.with_proxy("nordvpn:ca1066");

        let mut data = json!({});
        proxy.attach_proxy(&mut data);
        assert_eq!(data["proxy"], "nordvpn:ca1066");
    }
}
