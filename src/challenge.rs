use async_trait::async_trait;
use fantoccini::{Client, Locator};

/// XPath probe for challenge pages that only announce themselves in text
const CHALLENGE_TEXT_XPATH: &str = "//*[contains(text(), 'Suspicious activity') or contains(text(), 'confirm that you are not a bot')]";

/// Reports whether the current page is showing a bot challenge.
///
/// Implementations only read page state and may be polled at any rate.
#[async_trait]
pub trait ChallengeDetector: Send + Sync {
    async fn is_challenge_present(&self) -> bool;
}

/// Detector for runs with challenge checks switched off
#[derive(Debug, Default)]
pub struct NoChallenge;

#[async_trait]
impl ChallengeDetector for NoChallenge {
    async fn is_challenge_present(&self) -> bool {
        false
    }
}

/// Looks for visible challenge elements in the browser
pub struct WebChallengeDetector {
    client: Client,
    selectors: Vec<String>,
}

impl WebChallengeDetector {
    pub fn new(client: Client, selectors: Vec<String>) -> Self {
        Self { client, selectors }
    }

    async fn any_displayed(&self, locator: Locator<'_>) -> bool {
        let elements = match self.client.find_all(locator).await {
            Ok(elements) => elements,
            Err(e) => {
                ::log::trace!("Challenge probe failed: {}", e);
                return false;
            }
        };

        for element in elements {
            if element.is_displayed().await.unwrap_or(false) {
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl ChallengeDetector for WebChallengeDetector {
    async fn is_challenge_present(&self) -> bool {
        for selector in &self.selectors {
            if self.any_displayed(Locator::Css(selector)).await {
                ::log::debug!("Challenge element matched: {}", selector);
                return true;
            }
        }
        self.any_displayed(Locator::XPath(CHALLENGE_TEXT_XPATH)).await
    }
}

/// Tracks challenge episodes so each one is announced once.
///
/// An episode starts on the first "present" observation after an "absent"
/// one (or after construction) and ends on the next "absent".
#[derive(Debug, Default)]
pub struct ChallengeTracker {
    in_episode: bool,
    episodes: u64,
}

impl ChallengeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one detector reading. Returns true if it opens a new episode.
    pub fn observe(&mut self, present: bool) -> bool {
        match (present, self.in_episode) {
            (true, false) => {
                self.in_episode = true;
                self.episodes += 1;
                true
            }
            (false, true) => {
                self.in_episode = false;
                false
            }
            _ => false,
        }
    }

    pub fn in_episode(&self) -> bool {
        self.in_episode
    }

    /// Episodes seen so far
    pub fn episodes(&self) -> u64 {
        self.episodes
    }
}
