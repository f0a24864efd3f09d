use std::net::IpAddr;

/// Two-label public suffixes that must not be mistaken for a registered domain.
const TWO_PART_SUFFIXES: &[&str] = &[
    "co.uk", "com.au", "co.jp", "co.kr", "com.br", "co.za", "com.mx", "co.in", "com.sg", "co.nz",
    "com.ar", "co.il", "org.uk", "net.au", "gov.uk", "ac.uk", "edu.au", "com.cn", "com.tr",
];

/// A host split into `subdomain.domain.suffix`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostParts {
    pub subdomain: String,
    pub domain: String,
    pub suffix: String,
}

impl HostParts {
    /// `domain.suffix`, or `None` when the host has no registrable part
    /// (IP literals, single-label hosts).
    pub fn registered_domain(&self) -> Option<String> {
        if self.domain.is_empty() || self.suffix.is_empty() {
            None
        } else {
            Some(format!("{}.{}", self.domain, self.suffix))
        }
    }

    pub fn subdomain_count(&self) -> usize {
        if self.subdomain.is_empty() {
            0
        } else {
            self.subdomain.split('.').count()
        }
    }
}

/// Minimal domain hierarchy utilities
pub struct DomainUtils;

impl DomainUtils {
    /// Extract the domain of an email address, dropping SMTP artifacts such as
    /// a trailing `>` or `;param=value`.
    pub fn email_domain(address: &str) -> Option<String> {
        let at_pos = address.rfind('@')?;
        if at_pos == 0 {
            return None;
        }

        let domain = address[at_pos + 1..]
            .split_whitespace()
            .next()?
            .split(['>', ',', ';'])
            .next()?
            .trim();

        if domain.is_empty() || domain.len() >= 255 {
            return None;
        }
        Some(domain.to_lowercase())
    }

    /// Check if domain matches any in list (with hierarchy support)
    pub fn matches_domain_list(domain: &str, domain_list: &[&str]) -> bool {
        let domain_lower = domain.to_lowercase();

        domain_list.iter().any(|pattern| {
            let pattern_lower = pattern.to_lowercase();
            domain_lower == pattern_lower || domain_lower.ends_with(&format!(".{}", pattern_lower))
        })
    }

    pub fn is_ip_literal(host: &str) -> bool {
        host.trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok()
    }

    /// Split a host into subdomain, registrable label and public suffix.
    /// e.g., "mail.example.co.uk" -> ("mail", "example", "co.uk")
    pub fn split_host(host: &str) -> HostParts {
        let host = host.trim_end_matches('.').to_lowercase();
        if host.is_empty() || Self::is_ip_literal(&host) {
            return HostParts::default();
        }

        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() < 2 {
            return HostParts {
                domain: host,
                ..HostParts::default()
            };
        }

        let last_two = format!("{}.{}", labels[labels.len() - 2], labels[labels.len() - 1]);
        let suffix_labels = if labels.len() >= 3 && TWO_PART_SUFFIXES.contains(&last_two.as_str())
        {
            2
        } else {
            1
        };

        if labels.len() <= suffix_labels {
            return HostParts {
                suffix: host,
                ..HostParts::default()
            };
        }

        let domain_idx = labels.len() - suffix_labels - 1;
        HostParts {
            subdomain: labels[..domain_idx].join("."),
            domain: labels[domain_idx].to_string(),
            suffix: labels[domain_idx + 1..].join("."),
        }
    }

    /// Reduce a host to its registered domain for WHOIS queries.
    /// e.g., "email.nationalgeographic.com" -> "nationalgeographic.com"
    pub fn root_domain(host: &str) -> String {
        Self::split_host(host)
            .registered_domain()
            .unwrap_or_else(|| host.to_lowercase())
    }
}
