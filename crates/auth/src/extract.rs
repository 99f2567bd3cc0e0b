//! Challenge extraction from free-form signed messages.
//!
//! Wallets do not all render the challenge the same way, so extraction runs an
//! ordered list of [`NonceMatcher`] strategies and takes the first hit:
//!
//! 1. `Nonce: <token>` (case-sensitive label)
//! 2. `nonce: <token>` (label matched case-insensitively)
//! 3. `at <token>` where the token is the last 32 characters of the message
//! 4. any run of 32 word characters
//!
//! Token characters are ASCII word characters (`[A-Za-z0-9_]`).

use thiserror::Error;

/// Length of a bare (unlabeled) challenge token.
pub const BARE_TOKEN_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("nonce not found in message")]
    NotFound,
}

/// One strategy for locating a challenge token in a message.
pub trait NonceMatcher: Send + Sync {
    /// Attempt to extract a token. Returns `None` if this strategy does not
    /// match the message.
    fn extract<'a>(&self, message: &'a str) -> Option<&'a str>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Leading run of word characters in `s`.
fn word_run(s: &str) -> &str {
    let end = s
        .bytes()
        .position(|b| !is_word_byte(b))
        .unwrap_or(s.len());
    &s[..end]
}

/// Matches `<label><token>` anywhere in the message, e.g. `Nonce: abc123`.
pub struct LabeledMatcher {
    label: &'static str,
    case_sensitive: bool,
    name: &'static str,
}

impl LabeledMatcher {
    /// `Nonce: <token>` with the exact capitalization.
    pub fn exact() -> Self {
        Self {
            label: "Nonce: ",
            case_sensitive: true,
            name: "labeled",
        }
    }

    /// `nonce: <token>` in any capitalization.
    pub fn case_insensitive() -> Self {
        Self {
            label: "nonce: ",
            case_sensitive: false,
            name: "labeled-case-insensitive",
        }
    }
}

impl NonceMatcher for LabeledMatcher {
    fn extract<'a>(&self, message: &'a str) -> Option<&'a str> {
        // ASCII lowercasing keeps byte offsets identical to `message`.
        let lowered;
        let (haystack, label) = if self.case_sensitive {
            (message, self.label)
        } else {
            lowered = message.to_ascii_lowercase();
            (lowered.as_str(), self.label)
        };

        let mut from = 0;
        while let Some(pos) = haystack[from..].find(label) {
            let start = from + pos + label.len();
            let token = word_run(&message[start..]);
            if !token.is_empty() {
                return Some(token);
            }
            // Labels start with an ASCII byte, so `+ 1` stays on a char boundary.
            from += pos + 1;
        }
        None
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Matches a message ending in `at <32-char token>`.
pub struct TrailingAtMatcher;

impl NonceMatcher for TrailingAtMatcher {
    fn extract<'a>(&self, message: &'a str) -> Option<&'a str> {
        const PREFIX: &[u8] = b"at ";

        let bytes = message.as_bytes();
        if bytes.len() < PREFIX.len() + BARE_TOKEN_LEN {
            return None;
        }

        let token_start = bytes.len() - BARE_TOKEN_LEN;
        let token = &bytes[token_start..];
        if !token.iter().copied().all(is_word_byte) {
            return None;
        }
        if &bytes[token_start - PREFIX.len()..token_start] != PREFIX {
            return None;
        }

        Some(&message[token_start..])
    }

    fn name(&self) -> &'static str {
        "trailing-at"
    }
}

/// Matches the first run of 32 word characters anywhere in the message.
pub struct BareTokenMatcher;

impl NonceMatcher for BareTokenMatcher {
    fn extract<'a>(&self, message: &'a str) -> Option<&'a str> {
        let mut run_start = None;
        for (i, b) in message.bytes().enumerate() {
            if is_word_byte(b) {
                let start = *run_start.get_or_insert(i);
                if i + 1 - start == BARE_TOKEN_LEN {
                    return Some(&message[start..=i]);
                }
            } else {
                run_start = None;
            }
        }
        None
    }

    fn name(&self) -> &'static str {
        "bare"
    }
}

/// Ordered set of matchers; the first one that matches wins.
pub struct NonceExtractor {
    matchers: Vec<Box<dyn NonceMatcher>>,
}

impl NonceExtractor {
    /// Create an extractor with the standard matcher precedence.
    pub fn new() -> Self {
        Self {
            matchers: vec![
                Box::new(LabeledMatcher::exact()),
                Box::new(LabeledMatcher::case_insensitive()),
                Box::new(TrailingAtMatcher),
                Box::new(BareTokenMatcher),
            ],
        }
    }

    /// Create an extractor with a custom matcher list, tried in order.
    pub fn with_matchers(matchers: Vec<Box<dyn NonceMatcher>>) -> Self {
        Self { matchers }
    }

    /// Locate the challenge token in `message`.
    pub fn extract<'a>(&self, message: &'a str) -> Result<&'a str, ExtractError> {
        for matcher in &self.matchers {
            if let Some(token) = matcher.extract(message) {
                tracing::debug!(matcher = matcher.name(), "Extracted nonce from message");
                return Ok(token);
            }
        }
        Err(ExtractError::NotFound)
    }
}

impl Default for NonceExtractor {
    fn default() -> Self {
        Self::new()
    }
}
