//! Threshold voting over independent live indicators.
//!
//! Pages scraped from streaming sites carry many weak hints about live state,
//! none reliable on its own. A [`PatternClassifier`] runs a fixed set of
//! [`Indicator`]s over one payload and calls it live only when at least
//! `threshold` of them agree.

use std::fmt;

type Matcher<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// A named predicate over a payload.
pub struct Indicator<T: ?Sized> {
    name: &'static str,
    matcher: Matcher<T>,
}

impl<T: ?Sized> Indicator<T> {
    pub fn new(name: &'static str, matcher: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name,
            matcher: Box::new(matcher),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn matches(&self, payload: &T) -> bool {
        (self.matcher)(payload)
    }
}

impl Indicator<str> {
    /// Indicator that fires when `needle` occurs anywhere in the text.
    pub fn contains(name: &'static str, needle: &'static str) -> Self {
        Self::new(name, move |text: &str| text.contains(needle))
    }
}

impl<T: ?Sized> fmt::Debug for Indicator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Indicator").field(&self.name).finish()
    }
}

/// Outcome of a single classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub matched: Vec<&'static str>,
    pub is_live: bool,
}

impl Classification {
    pub fn match_count(&self) -> usize {
        self.matched.len()
    }
}

#[derive(Debug)]
pub struct PatternClassifier<T: ?Sized> {
    indicators: Vec<Indicator<T>>,
    threshold: usize,
}

impl<T: ?Sized> PatternClassifier<T> {
    /// `threshold` is clamped to at least 1 so an empty payload is never live.
    pub fn new(indicators: Vec<Indicator<T>>, threshold: usize) -> Self {
        Self {
            indicators,
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Evaluate every indicator. Indicators are independent, so all of them
    /// run even after the threshold is reached; the match list is useful in logs.
    pub fn classify(&self, payload: &T) -> Classification {
        let matched: Vec<&'static str> = self
            .indicators
            .iter()
            .filter(|indicator| indicator.matches(payload))
            .map(Indicator::name)
            .collect();

        Classification {
            is_live: matched.len() >= self.threshold,
            matched,
        }
    }
}
