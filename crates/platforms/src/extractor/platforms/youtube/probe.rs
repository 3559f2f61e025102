use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::debug;

use crate::extractor::classifier::{Indicator, PatternClassifier};
use crate::extractor::error::DetectError;
use crate::extractor::platform_extractor::Extractor;
use crate::extractor::quota::{ProbeVerdict, UnmeteredProbe};
use crate::media::Platform;

macro_rules! regex_indicator {
    ($name:literal, $pattern:literal) => {{
        static RE: LazyLock<Regex> = LazyLock::new(|| Regex::new($pattern).unwrap());
        Indicator::new($name, |html: &str| RE.is_match(html))
    }};
}

/// Live markers found in a lowercased channel page.
pub fn channel_page_classifier(threshold: usize) -> PatternClassifier<str> {
    PatternClassifier::new(
        vec![
            regex_indicator!("badge_live", r#""isbadgelive":\s*true"#),
            regex_indicator!("style_live", r#""style":\s*"live""#),
            Indicator::contains("live_badge", "\"livebadge\""),
            regex_indicator!("is_live", r#""islive":\s*true"#),
            regex_indicator!("broadcast_content", r#""livebroadcastcontent":\s*"live""#),
            Indicator::contains("watching_now", "watching now"),
            Indicator::contains("started_streaming", "started streaming"),
        ],
        threshold,
    )
}

/// Scrapes the public channel page. Costs no API quota.
pub struct ChannelPageProbe {
    extractor: Extractor,
    classifier: PatternClassifier<str>,
}

impl ChannelPageProbe {
    pub fn new(client: Client, threshold: usize) -> Self {
        let mut extractor = Extractor::new(Platform::YouTube, client);
        extractor.add_header_owned(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("text/html,application/xhtml+xml"),
        );
        // Skip the EU consent interstitial.
        extractor.add_header_str("Cookie", "CONSENT=YES+1");

        Self {
            extractor,
            classifier: channel_page_classifier(threshold),
        }
    }

    fn candidate_urls(account_ref: &str) -> Vec<String> {
        let name = account_ref.trim().trim_start_matches('@');
        if name.starts_with("UC") && name.len() == 24 {
            return vec![format!("https://www.youtube.com/channel/{name}")];
        }
        vec![
            format!("https://www.youtube.com/@{name}"),
            format!("https://www.youtube.com/c/{name}"),
            format!("https://www.youtube.com/user/{name}"),
        ]
    }

    pub fn verdict_for(&self, html: &str) -> ProbeVerdict {
        let lowered = html.to_lowercase();
        let classification = self.classifier.classify(&lowered);
        debug!(matched = ?classification.matched, "YouTube channel page indicators");
        if classification.is_live {
            ProbeVerdict::PossiblyLive
        } else {
            ProbeVerdict::Offline
        }
    }
}

/// Fetch the first URL that exists.
///
/// Only a missing page moves on to the next URL form. Any other failure ends
/// the poll so a throttled or flaky site is not hit once per form.
async fn first_page<F, Fut>(urls: Vec<String>, mut fetch: F) -> Result<String, DetectError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<String, DetectError>>,
{
    let mut tried = Vec::with_capacity(urls.len());
    for url in urls {
        match fetch(url.clone()).await {
            Err(DetectError::NotFound(_)) => {
                debug!(url = %url, "Channel page not found, trying next form");
                tried.push(url);
            }
            other => return other,
        }
    }
    Err(DetectError::NotFound(format!(
        "no youtube channel page at {}",
        tried.join(", ")
    )))
}

#[async_trait]
impl UnmeteredProbe for ChannelPageProbe {
    async fn probe(&self, account_ref: &str) -> Result<ProbeVerdict, DetectError> {
        let html = first_page(Self::candidate_urls(account_ref), |url| {
            self.extractor.send_text(self.extractor.get(&url))
        })
        .await?;
        Ok(self.verdict_for(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::default_client;

    #[test]
    fn test_single_marker_is_offline() {
        let probe = ChannelPageProbe::new(default_client().unwrap(), 2);
        let html = r#"<script>var ytInitialData = {"isLive":true};</script>"#;
        assert_eq!(probe.verdict_for(html), ProbeVerdict::Offline);
    }

    #[test]
    fn test_two_markers_possibly_live() {
        let probe = ChannelPageProbe::new(default_client().unwrap(), 2);
        let html = r#"{"style": "LIVE", "isBadgeLive":true} 1.2K watching now"#;
        assert_eq!(probe.verdict_for(html), ProbeVerdict::PossiblyLive);
    }

    #[test]
    fn test_candidate_urls() {
        let urls = ChannelPageProbe::candidate_urls("@someone");
        assert_eq!(urls[0], "https://www.youtube.com/@someone");
        assert_eq!(urls.len(), 3);

        let urls = ChannelPageProbe::candidate_urls("UCabcdefghijklmnopqrstuv");
        assert_eq!(urls, vec!["https://www.youtube.com/channel/UCabcdefghijklmnopqrstuv"]);
    }

    /// Run the URL fallback against canned answers, recording each URL fetched.
    async fn scripted(
        answers: Vec<Result<String, DetectError>>,
    ) -> (Vec<String>, Result<String, DetectError>) {
        let mut answers: std::collections::VecDeque<_> = answers.into();
        let mut seen = Vec::new();
        let result = first_page(ChannelPageProbe::candidate_urls("someone"), |url| {
            seen.push(url);
            let answer = answers
                .pop_front()
                .unwrap_or_else(|| Err(DetectError::NotFound("missing".into())));
            async move { answer }
        })
        .await;
        (seen, result)
    }

    #[tokio::test]
    async fn test_rate_limit_stops_url_fallback() {
        let (seen, result) = scripted(vec![Err(DetectError::RateLimited { retry_after: None })]).await;
        assert_eq!(seen, vec!["https://www.youtube.com/@someone"]);
        assert_eq!(result.unwrap_err().kind(), crate::ErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn test_transient_error_stops_url_fallback() {
        let (seen, result) = scripted(vec![Err(DetectError::TransientNetwork("reset".into()))]).await;
        assert_eq!(seen.len(), 1);
        assert_eq!(result.unwrap_err().kind(), crate::ErrorKind::TransientNetwork);
    }

    #[tokio::test]
    async fn test_not_found_falls_through_to_next_form() {
        let (seen, result) = scripted(vec![
            Err(DetectError::NotFound("no handle".into())),
            Ok("<html>channel</html>".into()),
        ]).await;
        assert_eq!(
            seen,
            vec![
                "https://www.youtube.com/@someone",
                "https://www.youtube.com/c/someone",
            ]
        );
        assert_eq!(result.unwrap(), "<html>channel</html>");
    }

    #[tokio::test]
    async fn test_all_forms_missing_is_not_found() {
        let (seen, result) = scripted(vec![]).await;
        assert_eq!(seen.len(), 3);
        assert_eq!(result.unwrap_err().kind(), crate::ErrorKind::NotFound);
    }
}
