//! Template to local directory name.

use sha2::{Digest, Sha256};

const SCHEMES: [&str; 2] = ["docker://", "oci://"];

/// Deterministic directory name for `template`.
///
/// The readable part is the last path segment without tag or digest; the
/// hash covers the full template, so `a/site:1` and `b/site:1` never collide.
pub fn internal_name(template: &str) -> String {
    let unschemed = SCHEMES
        .iter()
        .find_map(|scheme| template.strip_prefix(scheme))
        .unwrap_or(template);
    let last = unschemed
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let untagged = last.split(['@', ':']).next().unwrap_or_default();
    let readable: String = untagged
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    let readable = readable.trim_start_matches('.');

    let digest = Sha256::digest(template.as_bytes());
    if readable.is_empty() {
        format!("{:x}", digest)
    } else {
        format!("{}-{:x}", readable, digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readable(template: &str) -> String {
        let name = internal_name(template);
        name[..name.len() - 65].to_string()
    }

    #[test]
    fn test_readable_part() {
        assert_eq!(readable("oci://docker.io/library/image:example"), "image");
        assert_eq!(readable("docker://localhost:5000/team/site@sha256:abc"), "site");
        assert_eq!(readable("nginx:1.27"), "nginx");
        assert_eq!(readable("./image"), "image");
        assert_eq!(readable("/srv/sites/blog/"), "blog");
    }

    #[test]
    fn test_hash_covers_full_template() {
        assert_ne!(internal_name("a/site:1"), internal_name("b/site:1"));
        assert_ne!(internal_name("site:1"), internal_name("site:2"));
        assert_eq!(internal_name("site:1"), internal_name("site:1"));
        assert_eq!(internal_name("site:1").len(), "site-".len() + 64);
    }

    #[test]
    fn test_degenerate_template() {
        assert_eq!(internal_name("..").len(), 64);
    }
}
