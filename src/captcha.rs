//! Optional CAPTCHA solving through an external service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{Result, SearchError};

/// Challenge families the solver understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaKind {
    HCaptcha,
    ReCaptchaV2,
}

impl CaptchaKind {
    /// Guesses the challenge family from the marker element's selector.
    pub fn detect(marker: &str) -> Self {
        if marker.contains("h-captcha") || marker.contains("hcaptcha") {
            Self::HCaptcha
        } else {
            Self::ReCaptchaV2
        }
    }

    /// Name of the textarea the page reads the solved token from.
    pub fn response_field(&self) -> &'static str {
        match self {
            Self::HCaptcha => "h-captcha-response",
            Self::ReCaptchaV2 => "g-recaptcha-response",
        }
    }
}

/// A challenge found on a result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaChallenge {
    pub kind: CaptchaKind,
    pub site_key: String,
    pub page_url: String,
}

impl CaptchaChallenge {
    /// Script that writes `token` into the response fields and submits the
    /// enclosing form.
    pub fn injection_script(&self, token: &str) -> String {
        let field = self.kind.response_field();
        // serde_json string encoding doubles as JS string escaping
        let token = serde_json::Value::String(token.to_string()).to_string();
        format!(
            r#"(() => {{
    const token = {token};
    document.querySelectorAll('[name="{field}"], #{field}').forEach((el) => {{
        el.value = token;
        el.innerHTML = token;
    }});
    const form = document.querySelector('[name="{field}"]')?.closest('form') || document.querySelector('form');
    if (form) {{ form.submit(); }}
}})()"#
        )
    }
}

/// Turns a challenge into a response token.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, challenge: &CaptchaChallenge) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: u8,
    request: String,
}

const NOT_READY: &str = "CAPCHA_NOT_READY";

/// Client for the 2captcha.com API.
pub struct TwoCaptcha {
    client: Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl TwoCaptcha {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://2captcha.com".to_string(),
            poll_interval: Duration::from_secs(5),
            max_polls: 24,
        }
    }

    /// Points the client at another API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls.max(1);
        self
    }

    async fn call(&self, path: &str, params: &[(&str, &str)]) -> Result<ApiResponse> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .query(&[("key", self.api_key.as_str()), ("json", "1")])
            .query(params)
            .send()
            .await
            .map_err(|e| SearchError::CaptchaSolver(e.to_string()))?;
        response
            .json::<ApiResponse>()
            .await
            .map_err(|e| SearchError::CaptchaSolver(format!("invalid response: {}", e)))
    }

    async fn submit(&self, challenge: &CaptchaChallenge) -> Result<String> {
        let (method, key_param) = match challenge.kind {
            CaptchaKind::HCaptcha => ("hcaptcha", "sitekey"),
            CaptchaKind::ReCaptchaV2 => ("userrecaptcha", "googlekey"),
        };
        let response = self
            .call(
                "in.php",
                &[
                    ("method", method),
                    (key_param, challenge.site_key.as_str()),
                    ("pageurl", challenge.page_url.as_str()),
                ],
            )
            .await?;
        if response.status != 1 {
            return Err(SearchError::CaptchaSolver(response.request));
        }
        Ok(response.request)
    }
}

#[async_trait]
impl CaptchaSolver for TwoCaptcha {
    async fn solve(&self, challenge: &CaptchaChallenge) -> Result<String> {
        let id = self.submit(challenge).await?;
        info!(id = %id, kind = ?challenge.kind, "Captcha submitted to solver");

        for attempt in 1..=self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            let response = self
                .call("res.php", &[("action", "get"), ("id", id.as_str())])
                .await?;
            match (response.status, response.request.as_str()) {
                (1, _) => return Ok(response.request),
                (_, NOT_READY) => debug!(attempt, "Captcha not ready yet"),
                _ => return Err(SearchError::CaptchaSolver(response.request)),
            }
        }
        Err(SearchError::CaptchaSolver(format!(
            "no solution after {} polls",
            self.max_polls
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn challenge() -> CaptchaChallenge {
        CaptchaChallenge {
            kind: CaptchaKind::HCaptcha,
            site_key: "site-123".to_string(),
            page_url: "https://search.brave.com/search?q=cat".to_string(),
        }
    }

    fn solver(server: &MockServer) -> TwoCaptcha {
        TwoCaptcha::new("secret")
            .with_base_url(server.uri())
            .with_polling(Duration::from_millis(10), 5)
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(CaptchaKind::detect("div.h-captcha"), CaptchaKind::HCaptcha);
        assert_eq!(CaptchaKind::detect("div#recaptcha"), CaptchaKind::ReCaptchaV2);
    }

    #[test]
    fn test_injection_script_escapes_token() {
        let script = challenge().injection_script(r#"abc"'</script>"#);
        assert!(script.contains(r#"const token = "abc\"'</script>";"#));
        assert!(script.contains("h-captcha-response"));
        assert!(script.contains("form.submit()"));
    }

    #[tokio::test]
    async fn test_solve_polls_until_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/in.php"))
            .and(query_param("method", "hcaptcha"))
            .and(query_param("sitekey", "site-123"))
            .and(query_param("key", "secret"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"status":1,"request":"42"}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/res.php"))
            .and(query_param("id", "42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"status":0,"request":"CAPCHA_NOT_READY"}"#),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/res.php"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"status":1,"request":"TOKEN"}"#),
            )
            .mount(&server)
            .await;

        let token = solver(&server).solve(&challenge()).await.unwrap();
        assert_eq!(token, "TOKEN");
    }

    #[tokio::test]
    async fn test_solve_rejected_submission() {
        let server = MockServer::start().await;
        Mock::given(path("/in.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"status":0,"request":"ERROR_WRONG_USER_KEY"}"#),
            )
            .mount(&server)
            .await;

        let err = solver(&server).solve(&challenge()).await.unwrap_err();
        match err {
            SearchError::CaptchaSolver(msg) => assert_eq!(msg, "ERROR_WRONG_USER_KEY"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_solve_gives_up() {
        let server = MockServer::start().await;
        Mock::given(path("/in.php"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"status":1,"request":"7"}"#),
            )
            .mount(&server)
            .await;
        Mock::given(path("/res.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"status":0,"request":"CAPCHA_NOT_READY"}"#),
            )
            .mount(&server)
            .await;

        let err = solver(&server).solve(&challenge()).await.unwrap_err();
        assert!(matches!(err, SearchError::CaptchaSolver(_)));
    }
}
