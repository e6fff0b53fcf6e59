//! Host normalization, validation and tenant extraction.
//!
//! Pure functions, no state. Validation exists to reject junk before any
//! network round trip is paid: an invalid shape must fail without touching
//! the orchestrator, so a malformed host cannot probe tenant existence
//! through timing or error codes.

/// Normalize an inbound host string.
///
/// Lowercases, strips a trailing dot, strips a `:<digits>` port suffix,
/// then strips any trailing dot the port removal exposed. Idempotent:
/// `normalize(normalize(h)) == normalize(h)`.
pub fn normalize(host: &str) -> String {
    let mut h = host.to_ascii_lowercase();
    if h.ends_with('.') {
        h.pop();
    }
    if let Some(idx) = h.rfind(':') {
        let suffix = &h[idx + 1..];
        // Only a single `:<digits>` group is a port; stacked colon groups
        // stay intact so repeated passes cannot peel them one at a time.
        if !suffix.is_empty()
            && suffix.bytes().all(|b| b.is_ascii_digit())
            && !h[..idx].contains(':')
        {
            h.truncate(idx);
        }
    }
    while h.ends_with('.') {
        h.pop();
    }
    h
}

/// Shape-check an inbound host.
///
/// Rejects empty or whitespace-padded input, consecutive dots, residual
/// leading/trailing dots, `localhost`, `www.`-prefixed hosts, and IPv4 or
/// IPv6 literal shapes (shape only, no octet-range validation).
pub fn validate(host: &str) -> bool {
    if host.is_empty() || host.trim().len() != host.len() {
        return false;
    }
    if host.starts_with('[') || host.matches(':').count() > 1 {
        return false;
    }
    // Checked on the raw input: normalization strips trailing dots and
    // must not launder a consecutive-dot host into an acceptable one.
    if host.contains("..") || host.starts_with('.') {
        return false;
    }

    let h = normalize(host);
    if h.is_empty() || h == "localhost" || h.starts_with("www.") {
        return false;
    }
    // A colon surviving port stripping means an IPv6-ish literal.
    if h.contains(':') {
        return false;
    }
    if looks_like_ipv4(&h) {
        return false;
    }
    true
}

fn looks_like_ipv4(h: &str) -> bool {
    let parts: Vec<&str> = h.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

/// Derive the tenant label for a normalized host.
///
/// If the host sits under `base_domain`, the label is the first dot-separated
/// component of the remainder; otherwise it is the host's own first label.
/// Deterministic, no error path.
pub fn extract_tenant(host: &str, base_domain: &str) -> String {
    let suffix = format!(".{base_domain}");
    let candidate = host.strip_suffix(&suffix).unwrap_or(host);
    candidate.split('.').next().unwrap_or(candidate).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize("Studio.Shibari.Photo"), "studio.shibari.photo");
        assert_eq!(normalize("studio.shibari.photo."), "studio.shibari.photo");
        assert_eq!(normalize("studio.shibari.photo:8443"), "studio.shibari.photo");
        assert_eq!(normalize("studio.shibari.photo.:443"), "studio.shibari.photo");
    }

    #[test]
    fn test_normalize_idempotent() {
        for h in [
            "Studio.Shibari.Photo.",
            "a.b.c:80",
            "a.b.c:80:90",
            "x.y.",
            "HOST.example.com.:8080",
            "localhost",
            "::1",
            "",
        ] {
            let once = normalize(h);
            assert_eq!(normalize(&once), once, "not idempotent for {h:?}");
        }
    }

    #[test]
    fn test_normalize_strips_only_a_single_port_group() {
        assert_eq!(normalize("a.b.c:80:90"), "a.b.c:80:90");
        assert_eq!(normalize("a.b.c:80"), "a.b.c");
    }

    #[test]
    fn test_validate_rejections() {
        for h in [
            "",
            "   ",
            " studio.shibari.photo",
            "studio.shibari.photo ",
            "localhost",
            "LOCALHOST",
            "www.shibari.photo",
            "a..b.shibari.photo",
            ".shibari.photo",
            "shibari.photo..",
            "192.168.1.1",
            "10.0.0.1:8080",
            "[::1]",
            "::1",
            "fe80::1",
        ] {
            assert!(!validate(h), "expected rejection for {h:?}");
        }
    }

    #[test]
    fn test_validate_accepts_tenant_hosts() {
        for h in [
            "studio.shibari.photo",
            "Studio.Shibari.Photo.",
            "studio.shibari.photo:443",
            "customdomain.example",
        ] {
            assert!(validate(h), "expected acceptance for {h:?}");
        }
    }

    #[test]
    fn test_extract_tenant_under_base_domain() {
        assert_eq!(extract_tenant("studio.shibari.photo", "shibari.photo"), "studio");
        assert_eq!(extract_tenant("a.b.shibari.photo", "shibari.photo"), "a");
    }

    #[test]
    fn test_extract_tenant_foreign_domain() {
        assert_eq!(extract_tenant("gallery.example.com", "shibari.photo"), "gallery");
        assert_eq!(extract_tenant("shibari.photo", "shibari.photo"), "shibari");
    }
}
