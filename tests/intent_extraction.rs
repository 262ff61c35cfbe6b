//! Workspace scanning feeding intent extraction, from directories and archives

use flate2::write::GzEncoder;
use flate2::Compression;
use healbox::intent::IntentExtractor;
use healbox::workspace::{GitHubSource, Workspace};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use zip::write::SimpleFileOptions;

fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }
}

fn write_tar_gz(path: &Path, prefix: &str, files: &[(&str, &str)]) {
    let file = fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/{}", prefix, name), content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

#[test]
fn test_go_service_directory() {
    let dir = TempDir::new().unwrap();
    write_files(
        dir.path(),
        &[
            ("go.mod", "module example.com/api\n\ngo 1.22\n"),
            (
                "main.go",
                "package main\n\nimport \"net/http\"\n\nfunc main() {\n\thttp.ListenAndServe(\":8080\", nil)\n}\n",
            ),
        ],
    );

    let workspace = Workspace::open(dir.path()).unwrap();
    assert!(!workspace.is_temporary());
    let intent = IntentExtractor::new().extract(&workspace.listing().unwrap());

    assert_eq!(intent.language, "go");
    assert_eq!(intent.manifests, vec!["go.mod".to_string()]);
    assert_eq!(intent.entry_point.as_deref(), Some("main.go"));
    assert_eq!(intent.port, Some(8080));
}

#[test]
fn test_dependency_dirs_are_not_scanned() {
    let dir = TempDir::new().unwrap();
    write_files(
        dir.path(),
        &[
            ("package.json", r#"{"name":"web","main":"index.js"}"#),
            ("index.js", "require('http').createServer().listen(4000);\n"),
            ("node_modules/left-pad/package.json", r#"{"name":"left-pad"}"#),
        ],
    );

    let listing = Workspace::open(dir.path()).unwrap().listing().unwrap();
    assert!(listing.contains("package.json"));
    assert!(!listing.contains("node_modules/left-pad/package.json"));

    let intent = IntentExtractor::new().extract(&listing);
    assert_eq!(intent.language, "node");
    assert_eq!(intent.port, Some(4000));
}

#[test]
fn test_archive_with_single_top_level_directory() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("service.tar.gz");
    write_tar_gz(
        &archive,
        "service-1.0",
        &[
            ("requirements.txt", "flask==3.0.0\n"),
            (
                "app.py",
                "from flask import Flask\napp = Flask(__name__)\n\nif __name__ == '__main__':\n    app.run(host='0.0.0.0', port=5000)\n",
            ),
        ],
    );

    let workspace = Workspace::open(&archive).unwrap();
    assert!(workspace.is_temporary());
    assert!(workspace.root().join("app.py").is_file());

    let intent = IntentExtractor::new().extract(&workspace.listing().unwrap());
    assert_eq!(intent.language, "python");
    assert_eq!(intent.port, Some(5000));

    let root = workspace.root().to_path_buf();
    drop(workspace);
    assert!(!root.exists());
}

#[test]
fn test_kept_archive_workspace_survives() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("site.tgz");
    write_tar_gz(&archive, "site", &[("index.html", "<h1>hi</h1>\n")]);

    let kept = Workspace::open(&archive).unwrap().keep();
    assert!(kept.join("index.html").is_file());
    fs::remove_dir_all(kept.parent().unwrap_or(&kept)).unwrap();
}

#[test]
fn test_empty_directory_is_unknown() {
    let dir = TempDir::new().unwrap();
    let listing = Workspace::open(dir.path()).unwrap().listing().unwrap();
    let intent = IntentExtractor::new().extract(&listing);

    assert!(intent.is_unknown());
    assert_eq!(intent.entry_point, None);
    assert_eq!(intent.port, None);
}

#[test]
fn test_missing_source_is_rejected() {
    let dir = TempDir::new().unwrap();
    assert!(Workspace::open(&dir.path().join("nope")).is_err());
}

#[test]
fn test_zip_archive_like_the_original_input() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("my_project.zip");
    let mut zip = zip::ZipWriter::new(fs::File::create(&archive).unwrap());
    let options = SimpleFileOptions::default();
    zip.start_file("my_project/package.json", options).unwrap();
    zip.write_all(br#"{"name":"api","main":"server.js"}"#).unwrap();
    zip.start_file("my_project/server.js", options).unwrap();
    zip.write_all(b"require('http').createServer().listen(3000);\n").unwrap();
    zip.finish().unwrap();

    let workspace = Workspace::open(&archive).unwrap();
    assert!(workspace.is_temporary());
    assert!(workspace.root().join("server.js").is_file());

    let intent = IntentExtractor::new().extract(&workspace.listing().unwrap());
    assert_eq!(intent.language, "node");
    assert_eq!(intent.port, Some(3000));
}

/// Answers one request with `body`, handing back the request line
async fn serve_once(body: Vec<u8>, status: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let head = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/gzip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&request).lines().next().unwrap_or_default().to_string()
    });
    (base_url, handle)
}

#[tokio::test]
async fn test_github_repository_is_fetched_as_tarball() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("HEAD.tar.gz");
    write_tar_gz(
        &archive,
        "api-HEAD",
        &[
            ("go.mod", "module example.com/api\n\ngo 1.22\n"),
            ("main.go", "package main\n\nfunc main() {}\n"),
        ],
    );
    let (base_url, server) = serve_once(fs::read(&archive).unwrap(), "200 OK").await;

    let remote = GitHubSource::parse("https://github.com/acme/api.git")
        .unwrap()
        .with_base_url(base_url);
    let workspace = Workspace::fetch(&remote).await.unwrap();

    assert_eq!(server.await.unwrap(), "GET /acme/api/archive/HEAD.tar.gz HTTP/1.1");
    assert!(workspace.is_temporary());
    assert!(workspace.root().join("go.mod").is_file());
    let intent = IntentExtractor::new().extract(&workspace.listing().unwrap());
    assert_eq!(intent.language, "go");
}

#[tokio::test]
async fn test_missing_github_repository_is_a_download_error() {
    let (base_url, server) = serve_once(Vec::new(), "404 Not Found").await;

    let remote = GitHubSource::parse("https://github.com/acme/gone")
        .unwrap()
        .with_base_url(base_url);
    let err = Workspace::fetch(&remote).await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, healbox::workspace::WorkspaceError::Download { .. }));
    assert!(err.to_string().contains("404"));
}
