use crate::credentials::Credentials;

const REDACTED: &str = "[REDACTED]";
const MIN_SECRET_LEN: usize = 4;

/// Replaces credential values in text destined for logs or error messages.
#[derive(Debug, Default, Clone)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    /// Redact every secret value of `credentials`.
    pub fn from_credentials(credentials: &Credentials) -> Self {
        let mut secrets: Vec<String> = credentials
            .secret_values()
            .filter(|v| v.len() >= MIN_SECRET_LEN)
            .map(str::to_string)
            .collect();
        // Longest first so a secret containing another is replaced whole.
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();
        Self { secrets }
    }

    /// Return `input` with every known secret replaced.
    pub fn redact(&self, input: &str) -> String {
        let mut out = input.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), REDACTED);
            }
        }
        out
    }

    /// Number of secrets this redactor knows.
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// `true` when there is nothing to redact.
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_query_key_in_url() {
        let creds = Credentials::from_fields([("apiKey", "abcd1234"), ("token", "tok-999")]);
        let redactor = Redactor::from_credentials(&creds);
        let out = redactor.redact(
            "error sending request for url (https://api.trello.com/1/boards?key=abcd1234&token=tok-999)",
        );
        assert!(!out.contains("abcd1234"));
        assert!(!out.contains("tok-999"));
        assert!(out.contains("key=[REDACTED]"));
    }

    #[test]
    fn test_short_values_are_ignored() {
        let creds = Credentials::from_fields([("region", "eu")]);
        let redactor = Redactor::from_credentials(&creds);
        assert!(redactor.is_empty());
        assert_eq!(redactor.redact("europe"), "europe");
    }

    #[test]
    fn test_longest_secret_wins() {
        let creds = Credentials::from_fields([("a", "secret"), ("b", "secret-extended")]);
        let redactor = Redactor::from_credentials(&creds);
        assert_eq!(redactor.redact("x secret-extended y"), "x [REDACTED] y");
    }
}
