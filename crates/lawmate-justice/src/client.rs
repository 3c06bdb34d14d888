//! HTTP client for the justice.cz open-data decisions feed.
//!
//! `GET {base}/opendata/{year}/{month}/{day}?page=0` returns
//! `{ "items": [ { "jednaciCislo", "soud", "predmetRizeni", "datumVydani",
//! "datumZverejneni", "klicovaSlova", "zminenaUstanoveni", "odkaz" } ] }`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDate};
use futures::StreamExt;
use lawmate_core::Citation;
use lawmate_core::text::{MAX_KEYWORDS, extract_keywords, normalize_text};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{CaseSearch, DEFAULT_MAX_ITEMS_PER_DAY, MAX_RESULTS};

pub const DEFAULT_BASE_URL: &str = "https://rozhodnuti.justice.cz/api";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Days fetched concurrently.
const CONCURRENT_DAYS: usize = 4;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("all {days} days of the decisions feed failed to load")]
    Unreachable { days: u32 },
}

/// One published court decision, as far as ranking and citing need it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    #[serde(default)]
    pub jednaci_cislo: String,
    #[serde(default)]
    pub soud: String,
    #[serde(default)]
    pub predmet_rizeni: String,
    #[serde(default)]
    pub datum_vydani: String,
    #[serde(default)]
    pub datum_zverejneni: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub klicova_slova: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub zminena_ustanoveni: Vec<String>,
    #[serde(default)]
    pub odkaz: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(d)?.unwrap_or_default())
}

impl Decision {
    /// Share of `keywords` found in the subject, keywords and cited provisions.
    pub fn score(&self, keywords: &[String]) -> f64 {
        if keywords.is_empty() {
            return 0.0;
        }
        let mut blob = normalize_text(&self.predmet_rizeni);
        for part in self.klicova_slova.iter().chain(&self.zminena_ustanoveni) {
            blob.push(' ');
            blob.push_str(part);
        }
        let blob = blob.to_lowercase();
        let overlap = keywords.iter().filter(|kw| blob.contains(kw.as_str())).count();
        overlap as f64 / keywords.len() as f64
    }

    pub fn to_citation(&self) -> Citation {
        Citation {
            citation_id: self.jednaci_cislo.clone(),
            title: format!("{} – {} ({})", self.soud, self.jednaci_cislo, self.datum_vydani),
            url: self.odkaz.clone(),
        }
    }
}

#[derive(Deserialize)]
struct DayPage {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

pub struct JusticeClient {
    client: reqwest::Client,
    base_url: String,
    max_items_per_day: usize,
    today: Option<NaiveDate>,
}

impl JusticeClient {
    /// `base_url` should be like `https://rozhodnuti.justice.cz/api`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_items_per_day: DEFAULT_MAX_ITEMS_PER_DAY,
            today: None,
        })
    }

    pub fn with_max_items_per_day(mut self, max: usize) -> Self {
        self.max_items_per_day = max;
        self
    }

    /// Pin the first day searched instead of using the local date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn day_url(&self, day: NaiveDate) -> String {
        format!(
            "{}/opendata/{}/{}/{}?page=0",
            self.base_url,
            day.year(),
            day.month(),
            day.day()
        )
    }

    /// Fetch the first page of decisions published on `day`.
    pub async fn fetch_day(&self, day: NaiveDate) -> Result<Vec<Decision>, SearchError> {
        let url = self.day_url(day);
        debug!(url = %url, "fetching decisions");
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let page: DayPage = serde_json::from_slice(&resp.bytes().await?)?;
        Ok(page
            .items
            .into_iter()
            .take(self.max_items_per_day)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect())
    }

    /// Rank decisions from the last `lookback_days` days against `question`.
    pub async fn search_decisions(
        &self,
        question: &str,
        lookback_days: u32,
    ) -> Result<Vec<(Decision, f64)>, SearchError> {
        let keywords = extract_keywords(question, MAX_KEYWORDS);
        if keywords.is_empty() || lookback_days == 0 {
            return Ok(Vec::new());
        }

        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        let days: Vec<NaiveDate> = (0..lookback_days)
            .filter_map(|i| today.checked_sub_days(chrono::Days::new(u64::from(i))))
            .collect();

        let results: Vec<(NaiveDate, Result<Vec<Decision>, SearchError>)> =
            futures::stream::iter(days)
                .map(|day| async move { (day, self.fetch_day(day).await) })
                .buffered(CONCURRENT_DAYS)
                .collect()
                .await;

        let mut failed = 0u32;
        let mut candidates = Vec::new();
        for (day, result) in results {
            match result {
                Ok(decisions) => {
                    for decision in decisions {
                        let score = decision.score(&keywords);
                        if score > 0.0 {
                            candidates.push((decision, score));
                        }
                    }
                }
                Err(e) => {
                    failed += 1;
                    warn!(day = %day, error = %e, "skipping day of decisions feed");
                }
            }
        }

        if failed == lookback_days {
            return Err(SearchError::Unreachable { days: failed });
        }

        // Stable: equal scores keep the more recent day first.
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        candidates.truncate(MAX_RESULTS);
        info!(
            keywords = keywords.len(),
            failed_days = failed,
            found = candidates.len(),
            "judicature search complete"
        );
        Ok(candidates)
    }
}

#[async_trait]
impl CaseSearch for JusticeClient {
    async fn search_cases(
        &self,
        query_text: &str,
        max_age_days: u32,
    ) -> Result<Vec<Citation>, SearchError> {
        Ok(self
            .search_decisions(query_text, max_age_days)
            .await?
            .iter()
            .map(|(d, _)| d.to_citation())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn day0() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()
    }

    fn item(jc: &str, predmet: &str, klic: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "jednaciCislo": jc,
            "soud": "Nejvyšší soud",
            "predmetRizeni": predmet,
            "datumVydani": "2025-02-20",
            "datumZverejneni": "2025-03-01",
            "klicovaSlova": klic,
            "zminenaUstanoveni": null,
            "odkaz": format!("https://rozhodnuti.justice.cz/rozhodnuti/{jc}")
        })
    }

    #[test]
    fn score_is_share_of_keywords_found() {
        let decision: Decision = serde_json::from_value(item(
            "25 Cdo 1/2025",
            "Vrácení jistoty z nájmu",
            &["nájem bytu", "kauce"],
        ))
        .unwrap();
        let kw = vec!["nájem".to_string(), "kauce".to_string(), "soused".to_string(), "auto".to_string()];
        assert_eq!(decision.score(&kw), 0.5);
        assert_eq!(decision.score(&[]), 0.0);
        assert!(decision.zminena_ustanoveni.is_empty());
    }

    #[test]
    fn citation_format() {
        let decision: Decision =
            serde_json::from_value(item("25 Cdo 1/2025", "x", &[])).unwrap();
        let c = decision.to_citation();
        assert_eq!(c.citation_id, "25 Cdo 1/2025");
        assert_eq!(c.title, "Nejvyšší soud – 25 Cdo 1/2025 (2025-02-20)");
        assert_eq!(c.url, "https://rozhodnuti.justice.cz/rozhodnuti/25 Cdo 1/2025");
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = JusticeClient::new("https://rozhodnuti.justice.cz/api/").unwrap();
        assert_eq!(client.base_url, "https://rozhodnuti.justice.cz/api");
        assert_eq!(
            client.day_url(day0()),
            "https://rozhodnuti.justice.cz/api/opendata/2025/3/2?page=0"
        );
    }

    #[tokio::test]
    async fn ranks_by_overlap_and_skips_failing_days() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/opendata/2025/3/2"))
            .and(query_param("page", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    item("A", "nájem bytu a kauce", &[]),
                    item("B", "dědictví", &[]),
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/opendata/2025/3/1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/opendata/2025/2/28"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [item("C", "spor o kauci", &["nájem"])]
            })))
            .mount(&server)
            .await;

        let client = JusticeClient::new(server.uri()).unwrap().with_today(day0());
        let ranked = client
            .search_decisions("Pronajímatel mi nevrátil kauce za nájem", 3)
            .await
            .unwrap();

        let ids: Vec<_> = ranked.iter().map(|(d, _)| d.jednaci_cislo.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[tokio::test]
    async fn returns_at_most_five() {
        let server = MockServer::start().await;
        let items: Vec<_> = (0..8).map(|i| item(&format!("{i} Cdo"), "nájem", &[])).collect();
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": items })))
            .mount(&server)
            .await;

        let client = JusticeClient::new(server.uri()).unwrap().with_today(day0());
        let cites = client.search_cases("nájem", 1).await.unwrap();
        assert_eq!(cites.len(), MAX_RESULTS);
    }

    #[tokio::test]
    async fn per_day_cap_is_applied() {
        let server = MockServer::start().await;
        let items: Vec<_> = (0..4).map(|i| item(&format!("{i}"), "nájem", &[])).collect();
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": items })))
            .mount(&server)
            .await;

        let client = JusticeClient::new(server.uri())
            .unwrap()
            .with_today(day0())
            .with_max_items_per_day(2);
        assert_eq!(client.search_cases("nájem", 1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_query_or_zero_days_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = JusticeClient::new(server.uri()).unwrap().with_today(day0());
        assert!(client.search_cases("a b", 14).await.unwrap().is_empty());
        assert!(client.search_cases("nájem", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_day_failing_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = JusticeClient::new(server.uri()).unwrap().with_today(day0());
        let err = client.search_cases("nájem", 2).await.unwrap_err();
        assert!(matches!(err, SearchError::Unreachable { days: 2 }));
    }
}
