//! Ordered-fallback resolution of the station roster.
//!
//! The hosted config document lists sources in priority order. Each source
//! is tried in turn and the first non-empty result wins outright; later
//! sources are never merged in. The last successful roster is kept in
//! memory so lookups keep working while every source is unreachable.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use azura_proto::stations::{
    AdminStation, ConfigDocument, ConfigFormat, ConfigSource, PublicStation, StationConfig,
};

use crate::error::ResolverError;

/// Timeout applied to every config-document and roster request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves the station roster from an ordered list of config sources.
pub struct ConfigResolver {
    http: reqwest::Client,
    config_url: String,
    api_key: Option<String>,
    cache: RwLock<Vec<StationConfig>>,
}

impl ConfigResolver {
    /// `config_url` points at the hosted config document; `file://` URLs
    /// are read from disk (bundled fallbacks, tests). `api_key` is the
    /// optional bearer token for the admin station API.
    pub fn new(
        config_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ResolverError> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            config_url: config_url.into(),
            api_key,
            cache: RwLock::new(Vec::new()),
        })
    }

    /// Fetch the station roster, trying each configured source in declared
    /// order and stopping at the first that yields stations. If the config
    /// document itself cannot be fetched, or every source fails, the last
    /// cached roster is returned instead; with no cache this is
    /// [`ResolverError::DataNotFound`].
    pub async fn fetch_stations(&self) -> Result<Vec<StationConfig>, ResolverError> {
        let sources = match self.fetch_config_document().await {
            Ok(sources) => sources,
            Err(err) => {
                warn!("config document fetch failed: {err}");
                return self.cached_or_not_found();
            }
        };

        for (index, source) in sources.iter().enumerate() {
            match self.try_source(source).await {
                Ok(stations) => {
                    debug!(index, count = stations.len(), "config source succeeded");
                    let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
                    *cache = stations.clone();
                    return Ok(stations);
                }
                Err(err) => {
                    debug!(index, "config source failed: {err}");
                }
            }
        }

        self.cached_or_not_found()
    }

    /// Cache-only lookup by shortcode. Returns nothing until a
    /// `fetch_stations` call has succeeded at least once.
    pub fn station_info(&self, short_code: &str) -> Option<StationConfig> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|station| station.short_code == short_code)
            .cloned()
    }

    pub fn has_cached_stations(&self) -> bool {
        !self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    async fn fetch_config_document(&self) -> Result<Vec<ConfigSource>, ResolverError> {
        let url = Url::parse(&self.config_url)
            .map_err(|_| ResolverError::UrlNotValid(self.config_url.clone()))?;

        if url.scheme() == "file" {
            let path = url
                .to_file_path()
                .map_err(|_| ResolverError::UrlNotValid(self.config_url.clone()))?;
            let raw = tokio::fs::read(path).await?;
            let doc: ConfigDocument = decode(&raw, "config document")?;
            return Ok(doc.configs);
        }

        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ResolverError::HttpStatus(response.status()));
        }
        let raw = response.bytes().await?;
        let doc: ConfigDocument = decode(&raw, "config document")?;
        debug!(sources = doc.configs.len(), "config document fetched");
        Ok(doc.configs)
    }

    async fn try_source(&self, source: &ConfigSource) -> Result<Vec<StationConfig>, ResolverError> {
        match source.format {
            ConfigFormat::Azuracast => self.try_azuracast(source).await,
            ConfigFormat::Static => {
                let stations = source.station_configs();
                if stations.is_empty() {
                    return Err(ResolverError::DataNotValid);
                }
                debug!(count = stations.len(), "using static station list");
                Ok(stations)
            }
        }
    }

    /// Public station API first; the admin API (optionally authenticated)
    /// only when the public one fails or filters down to nothing.
    async fn try_azuracast(
        &self,
        source: &ConfigSource,
    ) -> Result<Vec<StationConfig>, ResolverError> {
        let Some(server) = source.server.as_deref().filter(|server| !server.is_empty()) else {
            return Err(ResolverError::DataNotValid);
        };

        match self.try_public_api(server, &source.exclude).await {
            Ok(stations) => Ok(stations),
            Err(err) => {
                debug!("public station API failed ({err}), trying admin API");
                self.try_admin_api(server, &source.exclude).await
            }
        }
    }

    async fn try_public_api(
        &self,
        server: &str,
        exclude: &[String],
    ) -> Result<Vec<StationConfig>, ResolverError> {
        let url = format!("{}/api/stations", server_base(server));
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ResolverError::HttpStatus(response.status()));
        }
        let raw = response.bytes().await?;
        let stations: Vec<PublicStation> = decode(&raw, "public station list")?;

        let filtered: Vec<StationConfig> = stations
            .into_iter()
            .filter(|station| !exclude.contains(&station.shortcode))
            .map(|station| public_to_config(station, server))
            .collect();
        // Excluding everything counts as failure so the next source gets
        // its turn.
        if filtered.is_empty() {
            return Err(ResolverError::DataNotFound);
        }
        Ok(filtered)
    }

    async fn try_admin_api(
        &self,
        server: &str,
        exclude: &[String],
    ) -> Result<Vec<StationConfig>, ResolverError> {
        let url = format!("{}/api/admin/stations", server_base(server));
        let mut request = self.http.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ResolverError::HttpStatus(response.status()));
        }
        let raw = response.bytes().await?;
        let stations: Vec<AdminStation> = decode(&raw, "admin station list")?;

        let filtered: Vec<StationConfig> = stations
            .into_iter()
            .filter(|station| !exclude.contains(&station.short_code))
            .map(|station| admin_to_config(station, server))
            .collect();
        if filtered.is_empty() {
            return Err(ResolverError::DataNotFound);
        }
        Ok(filtered)
    }

    fn cached_or_not_found(&self) -> Result<Vec<StationConfig>, ResolverError> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        if cache.is_empty() {
            Err(ResolverError::DataNotFound)
        } else {
            debug!(count = cache.len(), "falling back to cached station list");
            Ok(cache.clone())
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    raw: &[u8],
    context: &'static str,
) -> Result<T, ResolverError> {
    serde_json::from_slice(raw).map_err(|source| ResolverError::Decode { context, source })
}

/// Servers are usually bare hostnames; a value with an explicit scheme is
/// used as the base verbatim so local and test instances can be addressed.
fn server_base(server: &str) -> String {
    if server.contains("://") {
        server.trim_end_matches('/').to_owned()
    } else {
        format!("https://{server}")
    }
}

fn public_to_config(station: PublicStation, server: &str) -> StationConfig {
    StationConfig {
        name: station.name,
        stream_url: station.listen_url,
        image_url: String::new(),
        description: station.description.clone(),
        long_description: station.description,
        server_host: server.to_owned(),
        short_code: station.shortcode,
        default_dj: String::new(),
    }
}

fn admin_to_config(station: AdminStation, server: &str) -> StationConfig {
    let description = station.description.unwrap_or_default();
    StationConfig {
        name: station.name,
        stream_url: format!("{}/radio/{}/live", server_base(server), station.short_code),
        image_url: String::new(),
        description: description.clone(),
        long_description: description,
        server_host: server.to_owned(),
        short_code: station.short_code,
        default_dj: String::new(),
    }
}
