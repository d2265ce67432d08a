use std::{future::Future, time::Duration};

use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{
    entities::{
        ClockInRequest, ClockOutRequest, ListResponse, Shift, ShiftDraft, ShiftQuery,
        ShiftUpdate, TimeClockRecord,
    },
    TimekeepingApi,
};
use crate::error::{Result, TimekeepingError};

const TIME_CLOCKS_PATH: &str = "time-clocks/";
const SHIFTS_PATH: &str = "shifts/";
/// Guard against a backend that keeps handing out `next` links.
const MAX_PAGES: usize = 500;

/// [TimekeepingApi] over the backend's REST endpoints.
pub struct HttpApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpApiClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        // Url::join drops the last segment unless the base ends with a slash.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| TimekeepingError::InvalidState(format!("Bad api url {base_url}: {e}")))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| TimekeepingError::InvalidState(format!("Bad endpoint {path}: {e}")))
    }

    fn authorized(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        Ok(self.authorized(method, self.endpoint(path)?))
    }

    /// Every item of a list endpoint, across all pages.
    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<Vec<T>> {
        let mut first = self.endpoint(path)?;
        if !query.is_empty() {
            let mut pairs = first.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        collect_pages(first, move |url| {
            self.send::<ListResponse<T>>(self.authorized(Method::GET, url))
        })
        .await
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let body = self.send_raw(builder).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_raw(&self, builder: RequestBuilder) -> Result<String> {
        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await?;
        if status.is_success() {
            debug!("{status} from {url}");
            Ok(body)
        } else {
            warn!("{status} from {url}: {body}");
            Err(TimekeepingError::RemoteRejected {
                status: status.as_u16(),
                message: rejection_message(&body),
            })
        }
    }
}

/// Fetches `first` and keeps following `next` links until a page comes without one. Relative
/// links are resolved against the page they came from.
async fn collect_pages<T, F, Fut>(first: Url, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Url) -> Fut,
    Fut: Future<Output = Result<ListResponse<T>>>,
{
    let mut items = vec![];
    let mut url = first;
    for page in 1..=MAX_PAGES {
        let response = fetch(url.clone()).await?;
        let next = response
            .next_page()
            .map(|next| url.join(next))
            .transpose()
            .map_err(|e| TimekeepingError::MalformedResponse(format!("Bad next link: {e}")))?;
        items.extend(response.into_vec());
        match next {
            Some(next) if next == url => {
                return Err(TimekeepingError::MalformedResponse(format!(
                    "Page {page} at {url} links to itself"
                )));
            }
            Some(next) => {
                debug!("Following page {} at {next}", page + 1);
                url = next;
            }
            None => return Ok(items),
        }
    }
    Err(TimekeepingError::MalformedResponse(format!(
        "Gave up after {MAX_PAGES} pages at {url}"
    )))
}

/// Pulls the human readable part out of an error body. Backends answer with `{"detail": ..}`,
/// `{"message": ..}`, `{"error": ..}` or field errors like `{"end_time": ["..."]}`.
fn rejection_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    for key in ["detail", "message", "error"] {
        if let Some(Value::String(message)) = value.get(key) {
            return message.clone();
        }
    }
    match value {
        Value::Object(fields) if !fields.is_empty() => fields
            .into_iter()
            .map(|(field, errors)| match errors {
                Value::Array(items) => format!(
                    "{field}: {}",
                    items
                        .iter()
                        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                        .collect::<Vec<_>>()
                        .join(" ")
                ),
                other => format!("{field}: {other}"),
            })
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

#[async_trait]
impl TimekeepingApi for HttpApiClient {
    #[instrument(skip(self))]
    async fn list_time_clocks(&self, employee_id: &str) -> Result<Vec<TimeClockRecord>> {
        self.list(TIME_CLOCKS_PATH, &[("employee", employee_id.to_string())])
            .await
    }

    #[instrument(skip(self))]
    async fn clock_in(&self, request: ClockInRequest) -> Result<TimeClockRecord> {
        let builder = self
            .request(Method::POST, &format!("{TIME_CLOCKS_PATH}clock_in/"))?
            .json(&request);
        self.send(builder).await
    }

    #[instrument(skip(self))]
    async fn clock_out(&self, request: ClockOutRequest) -> Result<TimeClockRecord> {
        let builder = self
            .request(Method::POST, &format!("{TIME_CLOCKS_PATH}clock_out/"))?
            .json(&request);
        self.send(builder).await
    }

    #[instrument(skip(self))]
    async fn start_break(&self, time_clock_id: &str) -> Result<TimeClockRecord> {
        let builder = self.request(
            Method::POST,
            &format!("{TIME_CLOCKS_PATH}{time_clock_id}/start_break/"),
        )?;
        self.send(builder).await
    }

    #[instrument(skip(self))]
    async fn end_break(&self, time_clock_id: &str) -> Result<TimeClockRecord> {
        let builder = self.request(
            Method::POST,
            &format!("{TIME_CLOCKS_PATH}{time_clock_id}/end_break/"),
        )?;
        self.send(builder).await
    }

    #[instrument(skip(self))]
    async fn list_shifts(&self, query: ShiftQuery) -> Result<Vec<Shift>> {
        self.list(SHIFTS_PATH, &query.to_query()).await
    }

    #[instrument(skip(self))]
    async fn create_shift(&self, draft: ShiftDraft) -> Result<Shift> {
        let builder = self.request(Method::POST, SHIFTS_PATH)?.json(&draft);
        self.send(builder).await
    }

    #[instrument(skip(self))]
    async fn update_shift(&self, shift_id: &str, update: ShiftUpdate) -> Result<Shift> {
        let builder = self
            .request(Method::PATCH, &format!("{SHIFTS_PATH}{shift_id}/"))?
            .json(&update);
        self.send(builder).await
    }

    #[instrument(skip(self))]
    async fn delete_shift(&self, shift_id: &str) -> Result<()> {
        let builder = self.request(Method::DELETE, &format!("{SHIFTS_PATH}{shift_id}/"))?;
        self.send_raw(builder).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{future, time::Duration};

    use reqwest::Url;

    use super::{collect_pages, rejection_message, HttpApiClient};
    use crate::{api::entities::ListResponse, error::TimekeepingError};

    const FIRST: &str = "https://example.com/api/time-clocks/?employee=e1";

    fn page(results: Vec<u32>, next: Option<&str>) -> ListResponse<u32> {
        ListResponse::Page {
            results,
            next: next.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn follows_next_links_until_the_last_page() {
        let mut requested = vec![];
        let items = collect_pages(Url::parse(FIRST).unwrap(), |url| {
            requested.push(url.to_string());
            let response = match url.query() {
                Some("employee=e1") => page(
                    vec![1, 2],
                    Some("https://example.com/api/time-clocks/?employee=e1&page=2"),
                ),
                // Relative link, resolved against the current page.
                Some("employee=e1&page=2") => page(vec![3], Some("?employee=e1&page=3")),
                Some("employee=e1&page=3") => page(vec![4], None),
                other => panic!("unexpected page {other:?}"),
            };
            future::ready(Ok(response))
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4]);
        assert_eq!(requested.len(), 3);
        assert_eq!(
            requested[2],
            "https://example.com/api/time-clocks/?employee=e1&page=3"
        );
    }

    #[tokio::test]
    async fn bare_list_is_a_single_page() {
        let items = collect_pages(Url::parse(FIRST).unwrap(), |_| {
            future::ready(Ok(ListResponse::Bare(vec![7])))
        })
        .await
        .unwrap();
        assert_eq!(items, vec![7]);
    }

    #[tokio::test]
    async fn page_linking_to_itself_is_malformed() {
        let result = collect_pages(Url::parse(FIRST).unwrap(), |_| {
            future::ready(Ok(page(vec![1], Some(FIRST))))
        })
        .await;
        assert!(matches!(result, Err(TimekeepingError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn failing_page_fails_the_listing() {
        let result = collect_pages(Url::parse(FIRST).unwrap(), |url| {
            let response = if url.query() == Some("employee=e1") {
                Ok(page(vec![1], Some("?employee=e1&page=2")))
            } else {
                Err(TimekeepingError::NetworkFailure("timeout".into()))
            };
            future::ready(response)
        })
        .await;
        assert!(matches!(result, Err(TimekeepingError::NetworkFailure(_))));
    }

    #[test]
    fn endpoints_keep_base_path() {
        let client =
            HttpApiClient::new("https://example.com/api/v1", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint("shifts/42/").unwrap().as_str(),
            "https://example.com/api/v1/shifts/42/"
        );
    }

    #[test]
    fn bad_url_is_invalid_state() {
        assert!(HttpApiClient::new("not a url", None, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn rejection_message_prefers_detail() {
        assert_eq!(
            rejection_message(r#"{"detail": "Employee already clocked in"}"#),
            "Employee already clocked in"
        );
        assert_eq!(
            rejection_message(r#"{"end_time": ["Must be after start_time."]}"#),
            "end_time: Must be after start_time."
        );
        assert_eq!(rejection_message("Bad Gateway\n"), "Bad Gateway");
    }
}
