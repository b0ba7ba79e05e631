use serde::{Deserialize, Serialize};

use crate::common::types::RequestContext;
use crate::config::types::TrustConfig;

const BASELINE: f64 = 0.5;
const BOT_PENALTY: f64 = -0.5;
const HEADLESS_PENALTY: f64 = -0.4;
const HEADER_BONUS: f64 = 0.1;
const BEHAVIOR_BONUS: f64 = 0.1;
const MIN_SCROLL_DEPTH: f64 = 20.0;
const MIN_TIME_ON_PAGE_MS: u64 = 5_000;

/// User-agent fragments of known crawlers and scripted HTTP clients
const BOT_SIGNATURES: &[&str] = &[
    "bot",
    "crawl",
    "spider",
    "slurp",
    "facebookexternalhit",
    "curl/",
    "wget/",
    "python-requests",
    "python-urllib",
    "go-http-client",
    "scrapy",
    "libwww",
    "httpclient",
];

/// Fragments left by headless browsers and automation drivers
const HEADLESS_SIGNATURES: &[&str] = &[
    "headlesschrome",
    "headless",
    "phantomjs",
    "puppeteer",
    "playwright",
    "selenium",
    "webdriver",
    "slimerjs",
];

/// Gating decision derived from the trust score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustAction {
    Allow,
    Challenge,
    Block,
}

impl std::fmt::Display for TrustAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustAction::Allow => write!(f, "allow"),
            TrustAction::Challenge => write!(f, "challenge"),
            TrustAction::Block => write!(f, "block"),
        }
    }
}

/// Outcome of scoring one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustAssessment {
    /// Score in [0, 1]
    pub score: f64,
    pub action: TrustAction,
    /// Deltas that fired, in application order
    pub reasons: Vec<String>,
}

impl TrustAssessment {
    pub fn is_blocked(&self) -> bool {
        self.action == TrustAction::Block
    }
}

/// Individual facts the scorer recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrustSignal {
    BotSignature,
    HeadlessSignature,
    RateLimited,
    AcceptLanguage,
    ClientHints,
    ScrollDepth,
    TimeOnPage,
}

impl TrustSignal {
    fn describe(self) -> &'static str {
        match self {
            TrustSignal::BotSignature => "known bot or crawler signature in user agent",
            TrustSignal::HeadlessSignature => "headless automation signature",
            TrustSignal::RateLimited => "event rate limit exceeded",
            TrustSignal::AcceptLanguage => "well-formed accept-language header",
            TrustSignal::ClientHints => "well-formed client hint headers",
            TrustSignal::ScrollDepth => "scroll depth above 20%",
            TrustSignal::TimeOnPage => "time on page above 5s",
        }
    }
}

/// Pure request → trust assessment scorer
///
/// Starts from a neutral baseline and applies signed deltas for each fact it
/// recognizes. Missing headers or metrics contribute nothing, so the scorer
/// never fails.
#[derive(Debug, Clone)]
pub struct TrustScorer {
    block_threshold: f64,
    challenge_threshold: f64,
    rate_limit_penalty: f64,
}

impl Default for TrustScorer {
    fn default() -> Self {
        Self::new(&TrustConfig::default())
    }
}

impl TrustScorer {
    pub fn new(config: &TrustConfig) -> Self {
        Self {
            block_threshold: config.block_threshold,
            challenge_threshold: config.challenge_threshold,
            rate_limit_penalty: config.rate_limit_penalty,
        }
    }

    /// Score a request context
    pub fn score(&self, ctx: &RequestContext<'_>) -> TrustAssessment {
        let mut score = BASELINE;
        let mut reasons = Vec::new();

        for (signal, delta) in self.fired_signals(ctx) {
            score += delta;
            reasons.push(format!("{} ({:+.2})", signal.describe(), delta));
        }

        // Rounding keeps repeated 0.1 steps from drifting across a threshold
        let score = (score.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0;

        TrustAssessment {
            score,
            action: self.classify(score),
            reasons,
        }
    }

    /// Map a score onto the configured thresholds
    pub fn classify(&self, score: f64) -> TrustAction {
        if score < self.block_threshold {
            TrustAction::Block
        } else if score < self.challenge_threshold {
            TrustAction::Challenge
        } else {
            TrustAction::Allow
        }
    }

    fn fired_signals(&self, ctx: &RequestContext<'_>) -> Vec<(TrustSignal, f64)> {
        let mut fired = Vec::new();
        let user_agent = ctx.user_agent().map(str::to_lowercase);

        if let Some(ua) = user_agent.as_deref() {
            if BOT_SIGNATURES.iter().any(|sig| ua.contains(sig)) {
                fired.push((TrustSignal::BotSignature, BOT_PENALTY));
            }
        }

        let headless_hint = ctx
            .header("sec-ch-ua")
            .map(|v| v.to_lowercase().contains("headless"))
            .unwrap_or(false);
        let headless_ua = user_agent
            .as_deref()
            .map(|ua| HEADLESS_SIGNATURES.iter().any(|sig| ua.contains(sig)))
            .unwrap_or(false);
        if headless_ua || headless_hint || ctx.header("x-webdriver").is_some() {
            fired.push((TrustSignal::HeadlessSignature, HEADLESS_PENALTY));
        }

        if ctx.rate_limited && self.rate_limit_penalty > 0.0 {
            fired.push((TrustSignal::RateLimited, -self.rate_limit_penalty));
        }

        if ctx
            .header("accept-language")
            .map(is_well_formed_accept_language)
            .unwrap_or(false)
        {
            fired.push((TrustSignal::AcceptLanguage, HEADER_BONUS));
        }

        if ctx
            .header("sec-ch-ua")
            .map(is_well_formed_client_hint)
            .unwrap_or(false)
        {
            fired.push((TrustSignal::ClientHints, HEADER_BONUS));
        }

        let behavior = ctx.behavior;
        if behavior.scroll_depth.is_finite() && behavior.scroll_depth > MIN_SCROLL_DEPTH {
            fired.push((TrustSignal::ScrollDepth, BEHAVIOR_BONUS));
        }
        if behavior.time_on_page_ms > MIN_TIME_ON_PAGE_MS {
            fired.push((TrustSignal::TimeOnPage, BEHAVIOR_BONUS));
        }

        fired
    }
}

/// `en-US,en;q=0.9,*;q=0.1` style language lists
fn is_well_formed_accept_language(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.len() > 256 {
        return false;
    }

    value.split(',').all(|entry| {
        let mut parts = entry.split(';');
        let tag = parts.next().unwrap_or("").trim();
        let tag_ok = tag == "*" || is_language_tag(tag);
        let params_ok = parts.all(|param| {
            let param = param.trim();
            param
                .strip_prefix("q=")
                .and_then(|q| q.parse::<f64>().ok())
                .map(|q| (0.0..=1.0).contains(&q))
                .unwrap_or(false)
        });
        tag_ok && params_ok
    })
}

fn is_language_tag(tag: &str) -> bool {
    let mut subtags = tag.split('-');
    let primary_ok = subtags
        .next()
        .map(|s| (1..=8).contains(&s.len()) && s.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or(false);
    primary_ok && subtags.all(|s| (1..=8).contains(&s.len()) && s.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// `"Chromium";v="124", "Not-A.Brand";v="99"` style brand lists
fn is_well_formed_client_hint(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty()
        && value.split(',').all(|brand| {
            let brand = brand.trim();
            brand.starts_with('"') && brand.contains("\";v=\"") && brand.ends_with('"')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::BehaviorMetrics;
    use std::collections::BTreeMap;

    const CHROME_UA: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
    const CLIENT_HINT: &str = r#""Chromium";v="124", "Google Chrome";v="124", "Not-A.Brand";v="99""#;

    /// Facts that can be switched on independently
    #[derive(Debug, Clone, Copy, Default)]
    struct Facts {
        bot: bool,
        headless: bool,
        rate_limited: bool,
        language: bool,
        hints: bool,
        scroll: bool,
        time: bool,
    }

    impl Facts {
        fn from_bits(bits: u8) -> Self {
            Self {
                bot: bits & 1 != 0,
                headless: bits & 2 != 0,
                rate_limited: bits & 4 != 0,
                language: bits & 8 != 0,
                hints: bits & 16 != 0,
                scroll: bits & 32 != 0,
                time: bits & 64 != 0,
            }
        }

        fn score(&self, scorer: &TrustScorer) -> TrustAssessment {
            let mut ua = String::from(CHROME_UA);
            if self.bot {
                ua.push_str(" Googlebot/2.1");
            }
            if self.headless {
                ua = ua.replace("Chrome/", "HeadlessChrome/");
            }

            let mut headers = BTreeMap::new();
            headers.insert("user-agent".to_string(), ua);
            if self.language {
                headers.insert("accept-language".to_string(), "en-US,en;q=0.9".to_string());
            }
            if self.hints {
                headers.insert("sec-ch-ua".to_string(), CLIENT_HINT.to_string());
            }

            let behavior = BehaviorMetrics::new(
                if self.scroll { 45.0 } else { 5.0 },
                if self.time { 12_000 } else { 1_000 },
                0,
            );
            let ctx = RequestContext {
                headers: &headers,
                behavior: &behavior,
                rate_limited: self.rate_limited,
            };
            scorer.score(&ctx)
        }
    }

    #[test]
    fn test_empty_context_is_baseline_challenge() {
        let headers = BTreeMap::new();
        let behavior = BehaviorMetrics::default();
        let ctx = RequestContext {
            headers: &headers,
            behavior: &behavior,
            rate_limited: false,
        };
        let assessment = TrustScorer::default().score(&ctx);

        assert_eq!(assessment.score, 0.5);
        assert_eq!(assessment.action, TrustAction::Challenge);
        assert!(assessment.reasons.is_empty());
    }

    #[test]
    fn test_real_browser_is_allowed() {
        let facts = Facts {
            language: true,
            hints: true,
            scroll: true,
            time: true,
            ..Default::default()
        };
        let assessment = facts.score(&TrustScorer::default());

        assert_eq!(assessment.score, 0.9);
        assert_eq!(assessment.action, TrustAction::Allow);
        assert_eq!(assessment.reasons.len(), 4);
    }

    #[test]
    fn test_crawler_is_blocked() {
        let facts = Facts {
            bot: true,
            ..Default::default()
        };
        let assessment = facts.score(&TrustScorer::default());

        assert_eq!(assessment.score, 0.0);
        assert_eq!(assessment.action, TrustAction::Block);
        assert!(assessment.reasons[0].contains("bot"));
    }

    #[test]
    fn test_reasons_follow_application_order() {
        let facts = Facts {
            headless: true,
            language: true,
            time: true,
            ..Default::default()
        };
        let assessment = facts.score(&TrustScorer::default());

        assert_eq!(assessment.reasons.len(), 3);
        assert!(assessment.reasons[0].starts_with("headless"));
        assert!(assessment.reasons[1].contains("accept-language"));
        assert!(assessment.reasons[2].contains("time on page"));
        assert_eq!(assessment.score, 0.3);
        assert_eq!(assessment.action, TrustAction::Challenge);
    }

    #[test]
    fn test_score_bounded_and_action_consistent() {
        let scorer = TrustScorer::default();
        for bits in 0..128u8 {
            let assessment = Facts::from_bits(bits).score(&scorer);
            assert!((0.0..=1.0).contains(&assessment.score), "{:?}", assessment);

            let expected = if assessment.score < 0.3 {
                TrustAction::Block
            } else if assessment.score < 0.6 {
                TrustAction::Challenge
            } else {
                TrustAction::Allow
            };
            assert_eq!(assessment.action, expected, "facts bits {:07b}", bits);
        }
    }

    #[test]
    fn test_monotonic_in_every_fact() {
        let scorer = TrustScorer::default();
        let negative_bits = [1u8, 2, 4];
        let positive_bits = [8u8, 16, 32, 64];

        for bits in 0..128u8 {
            let base = Facts::from_bits(bits).score(&scorer).score;
            for flag in negative_bits {
                let with = Facts::from_bits(bits | flag).score(&scorer).score;
                assert!(with <= base, "negative fact {} raised {} -> {}", flag, base, with);
            }
            for flag in positive_bits {
                let with = Facts::from_bits(bits | flag).score(&scorer).score;
                assert!(with >= base, "positive fact {} lowered {} -> {}", flag, base, with);
            }
        }
    }

    #[test]
    fn test_accept_language_validation() {
        assert!(is_well_formed_accept_language("en-US,en;q=0.9"));
        assert!(is_well_formed_accept_language("de"));
        assert!(is_well_formed_accept_language("*"));
        assert!(!is_well_formed_accept_language(""));
        assert!(!is_well_formed_accept_language("en-US;q=high"));
        assert!(!is_well_formed_accept_language("123"));
    }

    #[test]
    fn test_client_hint_validation() {
        assert!(is_well_formed_client_hint(CLIENT_HINT));
        assert!(!is_well_formed_client_hint("Chromium 124"));
    }

    #[test]
    fn test_headless_client_hint_detected() {
        let mut headers = BTreeMap::new();
        headers.insert(
            "sec-ch-ua".to_string(),
            r#""HeadlessChrome";v="124""#.to_string(),
        );
        let behavior = BehaviorMetrics::default();
        let ctx = RequestContext {
            headers: &headers,
            behavior: &behavior,
            rate_limited: false,
        };
        let assessment = TrustScorer::default().score(&ctx);

        // headless penalty plus the well-formed hint bonus
        assert_eq!(assessment.score, 0.2);
        assert_eq!(assessment.action, TrustAction::Block);
    }
}
