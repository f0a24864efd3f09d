use super::{FeatureMap, FeatureSet, EMAIL_BASE_KEYS};
use crate::domain_utils::DomainUtils;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const PHISHING_KEYWORDS: &[&str] = &[
    "verify",
    "urgent",
    "immediately",
    "account",
    "password",
    "update",
    "click",
    "security",
    "bank",
    "login",
    "confirm",
    "reset",
    "locked",
    "attention",
    "alert",
    "suspend",
    "dear customer",
    "dear user",
    "action required",
];

const FREE_EMAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "aol.com",
    "icloud.com",
    "mail.com",
];

const RISKY_EXTENSIONS: &[&str] = &[".exe", ".scr", ".bat", ".zip", ".js", ".jar"];

const TRUSTED_TLDS: &[&str] = &["com", "org", "net", "edu", "gov"];

/// The parts of a message the email extractor looks at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
    pub sender: String,
    pub reply_to: Option<String>,
}

impl EmailMessage {
    pub fn new(subject: &str, body: &str, sender: &str, reply_to: Option<&str>) -> Self {
        Self {
            subject: subject.to_string(),
            body: body.to_string(),
            sender: sender.to_string(),
            reply_to: reply_to.map(str::to_string),
        }
    }

    /// Read subject, sender, reply-to and body out of a raw RFC 5322 message.
    /// Folded header lines are joined; MIME parts are left as-is in the body.
    pub fn from_raw(raw: &str) -> Self {
        let mut headers: HashMap<String, String> = HashMap::new();
        let mut body = String::new();
        let mut in_headers = true;
        let mut last_key: Option<String> = None;

        for line in raw.lines() {
            if !in_headers {
                body.push_str(line);
                body.push('\n');
                continue;
            }
            if line.trim().is_empty() {
                in_headers = false;
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some(value) = last_key.as_ref().and_then(|k| headers.get_mut(k)) {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim().to_lowercase();
                // First occurrence wins
                headers
                    .entry(key.clone())
                    .or_insert_with(|| value.trim().to_string());
                last_key = Some(key);
            }
        }

        let sender = headers
            .get("from")
            .or_else(|| headers.get("return-path"))
            .map(|v| Self::address_of(v))
            .unwrap_or_default();

        Self {
            subject: headers.remove("subject").unwrap_or_default(),
            body: body.trim_end().to_string(),
            sender,
            reply_to: headers.get("reply-to").map(|v| Self::address_of(v)),
        }
    }

    /// "Name <user@host>" -> "user@host"
    fn address_of(value: &str) -> String {
        match (value.rfind('<'), value.rfind('>')) {
            (Some(start), Some(end)) if start < end => value[start + 1..end].trim().to_string(),
            _ => value.trim().to_string(),
        }
    }
}

/// Textual signals for an email. Pure and deterministic.
pub struct EmailFeatureExtractor {
    link_regex: Regex,
    greeting_regex: Regex,
    html_tag_regex: Regex,
}

impl Default for EmailFeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EmailFeatureExtractor {
    pub fn new() -> Self {
        Self {
            link_regex: Regex::new(r"https?://\S+").unwrap(),
            greeting_regex: Regex::new(r"dear (user|customer|client|member)").unwrap(),
            html_tag_regex: Regex::new(r"<\w+").unwrap(),
        }
    }

    pub fn extract(&self, message: &EmailMessage) -> FeatureSet {
        let mut set = FeatureSet {
            features: FeatureMap::with_keys(EMAIL_BASE_KEYS),
            warnings: Vec::new(),
        };
        let features = &mut set.features;
        let mut warnings = Vec::new();

        let subject_lower = message.subject.to_lowercase();
        let body_lower = message.body.to_lowercase();

        let subject_keywords = Self::keyword_count(&subject_lower);
        let body_keywords = Self::keyword_count(&body_lower);
        features.set("subject_keywords", subject_keywords as f64);
        features.set("body_keywords", body_keywords as f64);
        if subject_keywords > 2 {
            warnings.push("Many suspicious keywords in subject");
        }
        if body_keywords > 3 {
            warnings.push("Multiple phishing-related words in email body");
        }

        let link_count = self.link_regex.find_iter(&message.body).count();
        features.set("link_count", link_count as f64);
        if link_count > 4 {
            warnings.push("Lots of links detected (common in phishing)");
        }

        let attach_count = RISKY_EXTENSIONS
            .iter()
            .filter(|ext| body_lower.contains(*ext))
            .count();
        features.set("suspicious_attach_count", attach_count as f64);
        if attach_count > 0 {
            warnings.push("Possible suspicious attachment type mentioned");
        }

        let sender_domain = DomainUtils::email_domain(&message.sender).unwrap_or_default();
        let from_free_domain = FREE_EMAIL_DOMAINS.contains(&sender_domain.as_str());
        let from_odd_tld = sender_domain.contains('.')
            && sender_domain
                .rsplit('.')
                .next()
                .is_some_and(|tld| !TRUSTED_TLDS.contains(&tld));
        features.set_flag("from_free_domain", from_free_domain);
        features.set_flag("from_odd_tld", from_odd_tld);
        if from_free_domain {
            warnings.push("Sender uses free/public email domain");
        }
        if from_odd_tld {
            warnings.push("Sender domain from suspicious TLD");
        }

        let reply_to_mismatch = match message.reply_to.as_deref().map(str::trim) {
            Some(reply_to) if !reply_to.is_empty() && !message.sender.is_empty() => {
                !reply_to.eq_ignore_ascii_case(message.sender.trim())
            }
            _ => false,
        };
        features.set_flag("reply_to_mismatch", reply_to_mismatch);
        if reply_to_mismatch {
            warnings.push("Reply-to address is different from sender (common phishing trick)");
        }

        let generic_greeting = self.greeting_regex.is_match(&body_lower);
        features.set_flag("generic_greeting", generic_greeting);
        if generic_greeting {
            warnings.push("Generic greeting detected");
        }

        let html_tag_count = self.html_tag_regex.find_iter(&message.body).count();
        features.set("html_tag_count", html_tag_count as f64);
        if html_tag_count > 25 {
            warnings.push("Excess HTML tags (hidden content)");
        }

        for warning in warnings {
            set.warn(warning);
        }
        set
    }

    fn keyword_count(text_lower: &str) -> usize {
        PHISHING_KEYWORDS
            .iter()
            .filter(|k| text_lower.contains(*k))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_message_has_zero_features() {
        let extractor = EmailFeatureExtractor::new();
        let message = EmailMessage::new(
            "Meeting notes",
            "See attached agenda.",
            "alice@company.com",
            Some(""),
        );
        let set = extractor.extract(&message);

        assert!(set.features.has_all(EMAIL_BASE_KEYS));
        assert!(set.features.iter().all(|(_, v)| v == 0.0));
        assert!(set.warnings.is_empty());
    }

    #[test]
    fn test_phishing_message() {
        let extractor = EmailFeatureExtractor::new();
        let body = "Dear customer, your account is locked. Click https://evil.example/a \
                    and https://evil.example/b to verify immediately. Open invoice.zip";
        let message = EmailMessage::new(
            "URGENT: verify your account",
            body,
            "security@paypa1-support.ru",
            Some("collect@gmail.com"),
        );
        let set = extractor.extract(&message);
        let f = &set.features;

        // urgent, verify, account
        assert_eq!(f.get("subject_keywords"), 3.0);
        // verify, immediately, account, click, locked, dear customer
        assert_eq!(f.get("body_keywords"), 6.0);
        assert_eq!(f.get("link_count"), 2.0);
        assert_eq!(f.get("suspicious_attach_count"), 1.0);
        assert_eq!(f.get("from_free_domain"), 0.0);
        assert_eq!(f.get("from_odd_tld"), 1.0);
        assert_eq!(f.get("reply_to_mismatch"), 1.0);
        assert_eq!(f.get("generic_greeting"), 1.0);

        assert_eq!(
            set.warnings,
            vec![
                "Many suspicious keywords in subject",
                "Multiple phishing-related words in email body",
                "Possible suspicious attachment type mentioned",
                "Sender domain from suspicious TLD",
                "Reply-to address is different from sender (common phishing trick)",
                "Generic greeting detected",
            ]
        );
    }

    #[test]
    fn test_reply_to_comparison_is_case_insensitive() {
        let extractor = EmailFeatureExtractor::new();
        let message = EmailMessage::new("Hi", "Hello", "Bob@Example.com", Some("bob@example.com"));
        assert_eq!(extractor.extract(&message).features.get("reply_to_mismatch"), 0.0);

        let message = EmailMessage::new("Hi", "Hello", "bob@example.com", None);
        assert_eq!(extractor.extract(&message).features.get("reply_to_mismatch"), 0.0);
    }

    #[test]
    fn test_from_raw_message() {
        let raw = "Return-Path: <bounce@mailer.example>\r\n\
                   From: \"PayPal Service\" <service@paypa1.top>\r\n\
                   Reply-To: Billing <billing@gmail.com>\r\n\
                   Subject: Your account has been\r\n\
                   \tlimited\r\n\
                   \r\n\
                   Dear customer,\r\n\
                   please confirm your details.\r\n";
        let message = EmailMessage::from_raw(raw);

        assert_eq!(message.sender, "service@paypa1.top");
        assert_eq!(message.reply_to.as_deref(), Some("billing@gmail.com"));
        assert_eq!(message.subject, "Your account has been limited");
        assert_eq!(message.body, "Dear customer,\nplease confirm your details.");
    }

    #[test]
    fn test_from_raw_without_from_header() {
        let message = EmailMessage::from_raw("Return-Path: <a@b.org>\n\nhello\n");
        assert_eq!(message.sender, "a@b.org");
        assert_eq!(message.subject, "");
        assert!(message.reply_to.is_none());
        assert_eq!(message.body, "hello");
    }

    #[test]
    fn test_free_domain_and_html() {
        let extractor = EmailFeatureExtractor::new();
        let body = "<div>".repeat(30);
        let message = EmailMessage::new("Hello", &body, "Someone <someone@Gmail.com>", None);
        let set = extractor.extract(&message);

        assert_eq!(set.features.get("from_free_domain"), 1.0);
        assert_eq!(set.features.get("from_odd_tld"), 0.0);
        assert_eq!(set.features.get("html_tag_count"), 30.0);
        assert!(set
            .warnings
            .contains(&"Excess HTML tags (hidden content)".to_string()));
    }
}
