use regex::Regex;

/// Ordered allow/deny patterns over full type names.
///
/// A name is authorized when some allow pattern matches it and no deny pattern
/// does. Names no pattern allows are refused.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationPolicy {
    rules: Vec<(Regex, bool)>,
}

impl AuthorizationPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns the regex compile error for a malformed pattern.
    pub fn allow(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.rules.push((Regex::new(pattern)?, true));
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns the regex compile error for a malformed pattern.
    pub fn deny(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.rules.push((Regex::new(pattern)?, false));
        Ok(self)
    }

    #[must_use]
    pub fn is_authorized(&self, type_name: &str) -> bool {
        let mut authorized = false;
        for (pattern, allow) in &self.rules {
            if pattern.is_match(type_name) {
                if !allow {
                    return false;
                }
                authorized = true;
            }
        }
        authorized
    }
}
