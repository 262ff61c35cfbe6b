//! Ruby ecosystem (bundler)

use super::{EcosystemDefinition, ManifestPattern};

pub struct RubyEcosystem;

impl EcosystemDefinition for RubyEcosystem {
    fn name(&self) -> &str {
        "ruby"
    }

    fn extensions(&self) -> &[&str] {
        &["rb"]
    }

    fn manifest_files(&self) -> &[ManifestPattern] {
        &[
            ManifestPattern {
                filename: "Gemfile",
                package_manager: "bundler",
                priority: 10,
            },
            ManifestPattern {
                filename: "Gemfile.lock",
                package_manager: "bundler",
                priority: 12,
            },
        ]
    }

    fn entry_point_candidates(&self) -> &[&str] {
        &["config.ru", "app.rb", "main.rb", "server.rb", "bin/rails"]
    }

    fn port_patterns(&self) -> &[&str] {
        &[r"set\s+:port,\s*(\d{2,5})", r"port\s+(\d{2,5})"]
    }
}
