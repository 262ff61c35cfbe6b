//! Python ecosystem (pip, poetry, pipenv, uv)

use super::{EcosystemDefinition, ManifestPattern};

pub struct PythonEcosystem;

impl EcosystemDefinition for PythonEcosystem {
    fn name(&self) -> &str {
        "python"
    }

    fn extensions(&self) -> &[&str] {
        &["py"]
    }

    fn manifest_files(&self) -> &[ManifestPattern] {
        &[
            ManifestPattern {
                filename: "requirements.txt",
                package_manager: "pip",
                priority: 10,
            },
            ManifestPattern {
                filename: "setup.py",
                package_manager: "pip",
                priority: 8,
            },
            ManifestPattern {
                filename: "pyproject.toml",
                package_manager: "pip",
                priority: 9,
            },
            ManifestPattern {
                filename: "Pipfile",
                package_manager: "pipenv",
                priority: 12,
            },
            ManifestPattern {
                filename: "poetry.lock",
                package_manager: "poetry",
                priority: 15,
            },
            ManifestPattern {
                filename: "uv.lock",
                package_manager: "uv",
                priority: 15,
            },
        ]
    }

    fn entry_point_candidates(&self) -> &[&str] {
        &[
            "main.py",
            "app.py",
            "server.py",
            "run.py",
            "manage.py",
            "wsgi.py",
            "app/main.py",
            "src/main.py",
            "src/app.py",
        ]
    }

    fn port_patterns(&self) -> &[&str] {
        &[
            r"app\.run\(.*port\s*=\s*(\d{2,5})",
            r"uvicorn\.run\(.*port\s*=\s*(\d{2,5})",
            r"--port[\s=]+(\d{2,5})",
            r#"--bind[\s=]+["']?[\w.]*:(\d{2,5})"#,
        ]
    }
}
