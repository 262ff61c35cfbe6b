use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed image reference such as `gcr.io/distroless/static:nonroot`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageRef {
    /// Lenient parse; Docker Hub's `docker.io/library/` prefix is normalized away
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        if reference.is_empty() || reference.contains(char::is_whitespace) {
            return None;
        }

        let (rest, digest) = match reference.split_once('@') {
            Some((r, d)) => (r, Some(d.to_string())),
            None => (reference, None),
        };

        let last_slash = rest.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match rest[last_slash..].rfind(':') {
            Some(i) => (&rest[..last_slash + i], Some(rest[last_slash + i + 1..].to_string())),
            None => (rest, None),
        };

        let (registry, mut repository) = match name.split_once('/') {
            Some((first, remainder))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), remainder.to_string())
            }
            _ => (None, name.to_string()),
        };

        let registry = registry.filter(|r| r != "docker.io" && r != "index.docker.io");
        if registry.is_none() {
            if let Some(stripped) = repository.strip_prefix("library/") {
                repository = stripped.to_string();
            }
        }

        if repository.is_empty() {
            return None;
        }

        Some(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Registry and repository without tag or digest
    pub fn name(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry, self.repository),
            None => self.repository.clone(),
        }
    }

    /// Whether this image belongs to a base family like `alpine` or `gcr.io/distroless`
    ///
    /// A namespaced family (`gcr.io/distroless`) matches itself and anything
    /// under it. A bare family (`alpine`) only matches official library images:
    /// the family itself, or an official image whose tag variant is exactly the
    /// family with an optional version (`node:20-alpine`, `python:3.12-alpine3.19`).
    pub fn belongs_to_family(&self, family: &str) -> bool {
        let family = family.trim().trim_end_matches('/').to_lowercase();
        if family.is_empty() {
            return false;
        }

        let name = self.name().to_lowercase();
        if family.contains('/') {
            return name == family || name.starts_with(&format!("{}/", family));
        }

        if !self.is_official() {
            return false;
        }
        if name == family {
            return true;
        }

        self.tag
            .as_deref()
            .map(|tag| {
                tag.to_lowercase()
                    .split(['-', '_'])
                    .any(|token| is_family_variant(token, &family))
            })
            .unwrap_or(false)
    }

    /// Docker Hub library image, e.g. `alpine` but not `someone/alpine`
    pub fn is_official(&self) -> bool {
        self.registry.is_none() && !self.repository.contains('/')
    }
}

/// `alpine` or `alpine3.19`, but not `alpinefake`
fn is_family_variant(token: &str, family: &str) -> bool {
    match token.strip_prefix(family) {
        Some("") => true,
        Some(version) => version
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.')
            && version.starts_with(|c: char| c.is_ascii_digit()),
        None => false,
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[test]
    fn test_parse_components() {
        let image = ImageRef::parse("gcr.io/distroless/static-debian12:nonroot").unwrap();
        assert_eq!(image.registry.as_deref(), Some("gcr.io"));
        assert_eq!(image.repository, "distroless/static-debian12");
        assert_eq!(image.tag.as_deref(), Some("nonroot"));

        let image = ImageRef::parse("localhost:5000/app@sha256:abc").unwrap();
        assert_eq!(image.registry.as_deref(), Some("localhost:5000"));
        assert_eq!(image.repository, "app");
        assert_eq!(image.tag, None);
        assert_eq!(image.digest.as_deref(), Some("sha256:abc"));

        let image = ImageRef::parse("docker.io/library/alpine:3.20").unwrap();
        assert_eq!(image.registry, None);
        assert_eq!(image.repository, "alpine");
        assert_eq!(image.to_string(), "alpine:3.20");

        assert!(ImageRef::parse("").is_none());
        assert!(ImageRef::parse("two words").is_none());
    }

    #[parameterized(
        plain_alpine = { "alpine:3.20", "alpine", true },
        library_alpine = { "library/alpine", "alpine", true },
        node_alpine_variant = { "node:20-alpine", "alpine", true },
        python_alpine_version = { "python:3.12-alpine3.19", "alpine", true },
        distroless = { "gcr.io/distroless/nodejs20-debian12", "gcr.io/distroless", true },
        distroless_trailing_slash = { "gcr.io/distroless/static", "gcr.io/distroless/", true },
        chainguard = { "cgr.dev/chainguard/node:latest", "cgr.dev/chainguard", true },
        debian = { "debian:bookworm-slim", "alpine", false },
        node_full = { "node:20", "alpine", false },
        lookalike_registry = { "gcr.io/distroless-evil/app", "gcr.io/distroless", false },
        user_namespace = { "attacker/alpine:latest", "alpine", false },
        foreign_registry = { "evil.example.com/team/alpine", "alpine", false },
        lookalike_tag = { "ubuntu:22.04-alpinefake", "alpine", false },
        user_namespace_variant = { "attacker/node:20-alpine", "alpine", false },
        registry_with_port = { "localhost:5000/alpine:3.20", "alpine", false },
        hub_prefixed = { "docker.io/library/node:20-alpine", "alpine", true },
        ubuntu_vs_distroless = { "ubuntu:22.04", "gcr.io/distroless", false },
    )]
    fn test_family_matching(reference: &str, family: &str, expected: bool) {
        let image = ImageRef::parse(reference).unwrap();
        assert_eq!(image.belongs_to_family(family), expected);
    }
}
