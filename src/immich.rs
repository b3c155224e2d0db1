//! Immich REST client: metadata search and thumbnail download.
//!
//! Only three calls are needed:
//! - `POST {base}/search/metadata` to list candidate assets
//! - a uniform random pick from that list
//! - `GET {base}/assets/{id}/thumbnail?size=preview` for the image bytes

use crate::DEFAULT_TAKE;
use crate::error::Error;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout applied to every Immich request.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// How the API key is presented to Immich.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum AuthScheme {
    /// `x-api-key: <key>` (Immich API keys)
    #[default]
    ApiKey,
    /// `Authorization: Bearer <token>` (session tokens)
    Bearer,
}

/// One asset from a metadata search. Only the id matters to us.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: Option<String>,
    pub original_file_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    person_ids: Option<[&'a str; 1]>,
}

/// Immich has answered both with a paged object and a bare array over time.
/// `Bare` must come first: serde will happily read an array into a struct.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Bare(Vec<Asset>),
    Paged {
        #[serde(default)]
        assets: AssetPage,
    },
}

#[derive(Debug, Default, Deserialize)]
struct AssetPage {
    #[serde(default)]
    items: Vec<Asset>,
}

impl SearchResponse {
    fn into_assets(self) -> Vec<Asset> {
        match self {
            SearchResponse::Bare(items) => items,
            SearchResponse::Paged { assets } => assets.items,
        }
    }
}

/// Thin client over the Immich API.
#[derive(Debug, Clone)]
pub struct ImmichClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    auth: AuthScheme,
    take: u32,
}

impl ImmichClient {
    /// `base_url` is the API root, e.g. `https://immich.local/api`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            auth: AuthScheme::default(),
            take: DEFAULT_TAKE,
        }
    }

    #[must_use]
    pub fn with_auth_scheme(mut self, auth: AuthScheme) -> Self {
        self.auth = auth;
        self
    }

    /// Number of assets requested per search.
    #[must_use]
    pub fn with_take(mut self, take: u32) -> Self {
        self.take = take;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            AuthScheme::ApiKey => request.header("x-api-key", &self.api_key),
            AuthScheme::Bearer => request.bearer_auth(&self.api_key),
        }
    }

    /// Search asset metadata, optionally restricted to one person.
    ///
    /// # Errors
    ///
    /// - [`Error::NoAssets`] when the search returns nothing
    /// - [`Error::UnexpectedResponse`] when the body is neither a list nor
    ///   an object with `assets.items`
    pub async fn search_assets(&self, person_id: Option<&str>) -> Result<Vec<Asset>, Error> {
        let url = format!("{}/search/metadata", self.base_url);
        let payload = SearchRequest {
            size: self.take,
            person_ids: person_id.map(|id| [id]),
        };

        let response = self
            .authorize(self.http.post(&url))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api { status, body });
        }

        let body = response.bytes().await?;
        let assets = serde_json::from_slice::<SearchResponse>(&body)
            .map_err(|_| {
                Error::UnexpectedResponse("search result is not a list of assets".to_string())
            })?
            .into_assets();

        if assets.is_empty() {
            return Err(Error::NoAssets);
        }

        tracing::debug!(
            "Immich search returned {} assets (person: {})",
            assets.len(),
            person_id.unwrap_or("any")
        );
        Ok(assets)
    }

    /// Pick a random asset id, optionally belonging to `person_id`.
    pub async fn random_asset_id(&self, person_id: Option<&str>) -> Result<String, Error> {
        let assets = self.search_assets(person_id).await?;
        pick_asset_id(&assets).ok_or_else(|| match person_id {
            Some(person) => Error::UnexpectedResponse(format!(
                "unable to determine asset id for person {person}"
            )),
            None => Error::UnexpectedResponse("unable to determine asset id".to_string()),
        })
    }

    /// `{base}/assets/{id}/thumbnail?size=preview` with the id escaped as a
    /// single path segment.
    fn thumbnail_url(&self, asset_id: &str) -> Result<reqwest::Url, Error> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            Error::Config(format!("invalid Immich base URL '{}': {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                Error::Config(format!("Immich base URL '{}' cannot have a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(["assets", asset_id, "thumbnail"]);
        url.query_pairs_mut().append_pair("size", "preview");
        Ok(url)
    }

    /// Download the preview-sized thumbnail for an asset.
    pub async fn download_thumbnail(&self, asset_id: &str) -> Result<Vec<u8>, Error> {
        let url = self.thumbnail_url(asset_id)?;

        let response = self.authorize(self.http.get(url)).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api { status, body });
        }

        let bytes = response.bytes().await?;
        tracing::debug!("Downloaded thumbnail for {}: {} bytes", asset_id, bytes.len());
        Ok(bytes.to_vec())
    }
}

/// Uniform random choice; `None` if the chosen entry carries no id.
fn pick_asset_id(assets: &[Asset]) -> Option<String> {
    assets
        .choose(&mut rand::rng())
        .and_then(|asset| asset.id.clone())
        .filter(|id| !id.is_empty())
}
