use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use super::{Build, BuildFetcher, ExecutionTree};
use crate::domain::CiResult;
use crate::error::{QualensError, Result};

/// HTTP fetcher for Jenkins-style CI servers.
///
/// Job history comes from the folder job's JSON API; per-build data comes
/// from artifacts the build publishes (`buildInformation.json`,
/// `execution-tree.json`, per-run report files).
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpFetcher {
    /// Creates a new CI API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - CI server base URL (e.g., "https://ci.example.com")
    /// * `token` - Optional API token sent as a bearer header
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("qualens/0.3"));

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| QualensError::Config(format!("Invalid API token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| QualensError::Config(format!("Failed to create HTTP client: {e}")))?;

        let base_url = Url::parse(base_url)
            .map_err(|e| QualensError::Config(format!("Invalid base URL: {e}")))?;

        Ok(Self { client, base_url })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| QualensError::Fetch(format!("GET {url}: {e}")))?
            .error_for_status()
            .map_err(|e| QualensError::Fetch(format!("GET {url}: {e}")))?
            .json()
            .await
            .map_err(|e| QualensError::Fetch(format!("Malformed response from {url}: {e}")))
    }

    /// Fetches an optional artifact; a 404 means "not published", not an
    /// error.
    async fn get_artifact(&self, job_url: &str, artifact: &str) -> Result<Option<Vec<u8>>> {
        let url = format!("{}artifact/{artifact}", ensure_trailing_slash(job_url));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| QualensError::Fetch(format!("GET {url}: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = response
            .error_for_status()
            .map_err(|e| QualensError::Fetch(format!("GET {url}: {e}")))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| QualensError::Fetch(format!("Reading body of {url}: {e}")))?;

        Ok(Some(bytes.to_vec()))
    }
}

fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

/// Job history response shape.
#[derive(Deserialize)]
struct JobHistoryResponse {
    builds: Vec<BuildEntry>,
}

#[derive(Deserialize)]
struct BuildEntry {
    url: String,
    /// Epoch milliseconds
    timestamp: i64,
    #[serde(default)]
    building: bool,
    #[serde(default)]
    result: Option<CiResult>,
}

/// `buildInformation.json` artifact shape.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInformation {
    #[serde(default)]
    release: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    build_date_timestamp: Option<i64>,
    #[serde(default)]
    version_date_timestamp: Option<i64>,
}

#[async_trait::async_trait]
impl BuildFetcher for HttpFetcher {
    async fn list_job_history(&self, branch: &str, cycle_name: &str) -> Result<Vec<Build>> {
        let url = self
            .base_url
            .join(&format!("job/{branch}/job/{cycle_name}/api/json"))
            .map_err(|e| QualensError::Config(format!("Invalid job URL: {e}")))?;

        let history: JobHistoryResponse = self.get_json(url.as_str()).await?;

        Ok(history
            .builds
            .into_iter()
            .map(|entry| Build {
                link: Some(job_link_of(&entry.url)),
                url: entry.url,
                timestamp: millis_to_utc(entry.timestamp),
                building: entry.building,
                result: entry.result,
                release: None,
                version: None,
                version_timestamp: None,
            })
            .collect())
    }

    async fn get_execution_tree(&self, build: &Build) -> Result<ExecutionTree> {
        let bytes = self
            .get_artifact(&build.url, "execution-tree.json")
            .await?
            .ok_or_else(|| {
                QualensError::Fetch(format!("{} publishes no execution tree", build.url))
            })?;

        serde_json::from_slice(&bytes)
            .map_err(|e| QualensError::Fetch(format!("Malformed execution tree: {e}")))
    }

    async fn get_cucumber_report(&self, run_job_url: &str) -> Result<Option<String>> {
        let bytes = self.get_artifact(run_job_url, "report.json").await?;
        match bytes {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| QualensError::Fetch(format!("Cucumber report is not UTF-8: {e}"))),
            None => Ok(None),
        }
    }

    async fn get_postman_report(&self, run_job_url: &str) -> Result<Option<Vec<u8>>> {
        self.get_artifact(run_job_url, "newman-report.json").await
    }

    async fn complete_build_information(&self, build: &mut Build) -> Result<()> {
        let Some(bytes) = self
            .get_artifact(&build.url, "buildInformation.json")
            .await?
        else {
            return Ok(());
        };

        let info: BuildInformation = serde_json::from_slice(&bytes)
            .map_err(|e| QualensError::Fetch(format!("Malformed build information: {e}")))?;

        build.release = info.release.or(build.release.take());
        build.version = info.version.or(build.version.take());
        if let Some(millis) = info.build_date_timestamp {
            build.timestamp = millis_to_utc(millis);
        }
        build.version_timestamp = info
            .version_date_timestamp
            .map(millis_to_utc)
            .or(build.version_timestamp.take());

        Ok(())
    }
}

/// Derives the stable job link (path under the CI root) from a build URL.
fn job_link_of(build_url: &str) -> String {
    Url::parse(build_url)
        .map(|u| u.path().trim_matches('/').to_string())
        .unwrap_or_else(|_| build_url.trim_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_link_of_strips_host_and_slashes() {
        assert_eq!(
            job_link_of("https://ci.example.com/job/develop/job/day/42/"),
            "job/develop/job/day/42"
        );
    }

    #[tokio::test]
    async fn test_list_job_history_parses_builds() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/job/develop/job/day/api/json")
            .with_status(200)
            .with_body(
                r#"{"builds":[
                    {"url":"http://ci/job/develop/job/day/2/","timestamp":1700000000000,"building":true},
                    {"url":"http://ci/job/develop/job/day/1/","timestamp":1699990000000,"result":"SUCCESS"}
                ]}"#,
            )
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&server.url(), None).unwrap();
        let builds = fetcher.list_job_history("develop", "day").await.unwrap();

        mock.assert_async().await;
        assert_eq!(builds.len(), 2);
        assert!(builds[0].building);
        assert_eq!(builds[0].result, None);
        assert_eq!(builds[1].result, Some(CiResult::Success));
        assert_eq!(builds[1].link.as_deref(), Some("job/develop/job/day/1"));
    }

    #[tokio::test]
    async fn test_missing_report_artifact_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/run/1/artifact/newman-report.json")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&server.url(), None).unwrap();
        let run_url = format!("{}/run/1/", server.url());
        let report = fetcher.get_postman_report(&run_url).await.unwrap();

        assert!(report.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/job/develop/job/day/api/json")
            .with_status(500)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&server.url(), None).unwrap();
        let result = fetcher.list_job_history("develop", "day").await;

        assert!(matches!(result, Err(QualensError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_complete_build_information_fills_fields() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/build/7/artifact/buildInformation.json")
            .with_status(200)
            .with_body(
                r#"{"release":"r24","version":"1.4.2","buildDateTimestamp":1700000000000,"versionDateTimestamp":1699999000000}"#,
            )
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&server.url(), None).unwrap();
        let mut build = Build {
            url: format!("{}/build/7/", server.url()),
            link: None,
            timestamp: Utc::now(),
            building: false,
            result: Some(CiResult::Success),
            release: None,
            version: None,
            version_timestamp: None,
        };

        fetcher.complete_build_information(&mut build).await.unwrap();

        assert_eq!(build.release.as_deref(), Some("r24"));
        assert_eq!(build.version.as_deref(), Some("1.4.2"));
        assert_eq!(build.timestamp, millis_to_utc(1700000000000));
        assert_eq!(build.version_timestamp, Some(millis_to_utc(1699999000000)));
    }
}
