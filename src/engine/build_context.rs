use super::EngineError;
use flate2::write::GzEncoder;
use flate2::Compression;
use ignore::WalkBuilder;
use std::path::Path;
use tracing::debug;

/// Name of the generated definition inside the context; never collides with a user Dockerfile
pub const DEFINITION_FILE_NAME: &str = "Dockerfile.healbox";

/// Packs `context_dir` into a gzipped tarball with the definition added at its root
///
/// `.dockerignore` is honoured and `.git` is always left out.
pub fn pack_build_context(context_dir: &Path, dockerfile: &str) -> Result<Vec<u8>, EngineError> {
    let context_error = |message: String| EngineError::Context {
        path: context_dir.to_path_buf(),
        message,
    };

    let encoder = GzEncoder::new(Vec::new(), Compression::fast());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut files = 0usize;
    for result in WalkBuilder::new(context_dir)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .add_custom_ignore_filename(".dockerignore")
        .filter_entry(|entry| entry.file_name() != ".git")
        .build()
    {
        let entry = result.map_err(|e| context_error(e.to_string()))?;
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(context_dir) else {
            continue;
        };
        if rel.as_os_str().is_empty() || rel == Path::new(DEFINITION_FILE_NAME) {
            continue;
        }

        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            builder
                .append_dir(rel, path)
                .map_err(|e| context_error(e.to_string()))?;
        } else {
            builder
                .append_path_with_name(path, rel)
                .map_err(|e| context_error(e.to_string()))?;
            files += 1;
        }
    }

    let mut header = tar::Header::new_gnu();
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, DEFINITION_FILE_NAME, dockerfile.as_bytes())
        .map_err(|e| context_error(e.to_string()))?;

    let encoder = builder
        .into_inner()
        .map_err(|e| context_error(e.to_string()))?;
    let bytes = encoder
        .finish()
        .map_err(|e| context_error(e.to_string()))?;

    debug!(files, bytes = bytes.len(), "Packed build context");
    Ok(bytes)
}
