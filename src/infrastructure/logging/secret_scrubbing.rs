use regex::Regex;
use std::fmt;

/// Masks credentials in text before it is written to a log.
///
/// Known token shapes (ClickUp personal tokens, GitHub tokens, bearer
/// headers, `secret=`/`token:` style fields) are matched by pattern.
/// Configured secrets are additionally masked verbatim wherever they occur.
#[derive(Clone)]
pub struct SecretScrubber {
    clickup_token_pattern: Regex,
    github_token_pattern: Regex,
    token_pattern: Regex,
    bearer_pattern: Regex,
    literals: Vec<String>,
}

impl SecretScrubber {
    /// Create a scrubber that also masks each of `secrets` literally.
    ///
    /// # Errors
    /// Returns an error if a built-in pattern fails to compile.
    pub fn new<I, S>(secrets: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut literals: Vec<String> = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.is_empty())
            .collect();
        // Longest first so a secret that contains another is masked whole.
        literals.sort_by_key(|s| std::cmp::Reverse(s.len()));

        Ok(Self {
            clickup_token_pattern: Regex::new(r"pk_[0-9]+_[A-Za-z0-9]{16,}")?,
            github_token_pattern: Regex::new(r"(?:gh[pousr]_[A-Za-z0-9]{20,}|github_pat_[A-Za-z0-9_]{20,})")?,
            token_pattern: Regex::new(
                r#"["']?(?:api_key|apikey|token|secret|webhook_secret)["']?\s*[:=]\s*["']?([a-zA-Z0-9-_\.]{8,})["']?"#,
            )?,
            bearer_pattern: Regex::new(r"Bearer\s+[a-zA-Z0-9-_\.]+")?,
            literals,
        })
    }

    /// Scrub a message of sensitive data
    pub fn scrub_message(&self, message: &str) -> String {
        let mut scrubbed = message.to_string();
        for literal in &self.literals {
            scrubbed = scrubbed.replace(literal.as_str(), "[REDACTED]");
        }
        scrubbed = self
            .clickup_token_pattern
            .replace_all(&scrubbed, "[API_KEY_REDACTED]")
            .to_string();
        scrubbed = self
            .github_token_pattern
            .replace_all(&scrubbed, "[TOKEN_REDACTED]")
            .to_string();
        scrubbed = self
            .bearer_pattern
            .replace_all(&scrubbed, "Bearer [TOKEN_REDACTED]")
            .to_string();
        self.token_pattern
            .replace_all(&scrubbed, |caps: &regex::Captures| {
                let full_match = &caps[0];
                if let Some(colon_pos) = full_match.find(':') {
                    format!("{}:[REDACTED]", &full_match[..colon_pos])
                } else if let Some(eq_pos) = full_match.find('=') {
                    format!("{}=[REDACTED]", &full_match[..eq_pos])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .to_string()
    }
}

impl fmt::Debug for SecretScrubber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretScrubber")
            .field("literals", &self.literals.len())
            .finish_non_exhaustive()
    }
}
