//! Static image checks, evaluated after the runtime check

use super::{ValidationOutcome, ValidationReason};
use crate::engine::{ContainerEngine, EngineError, ImageInfo};
use crate::heal::HealPolicy;
use tracing::debug;

const MIB: u64 = 1024 * 1024;

pub fn check_image_size(info: &ImageInfo, policy: &HealPolicy) -> Option<ValidationOutcome> {
    if info.size_bytes <= policy.max_image_size {
        return None;
    }
    Some(ValidationOutcome::fail(
        ValidationReason::OversizeImage,
        format!(
            "image is {} MiB, limit is {} MiB",
            info.size_bytes.div_ceil(MIB),
            policy.max_image_size / MIB
        ),
    ))
}

/// Checks the image's layers against allow-listed images in the local store
///
/// The definition text can name any base; what counts is which image the
/// engine actually built on. That is the allow-listed image whose full layer
/// list is a prefix of the built image's layers.
pub async fn check_base_family(
    engine: &dyn ContainerEngine,
    image_ref: &str,
    info: &ImageInfo,
    policy: &HealPolicy,
) -> Result<Option<ValidationOutcome>, EngineError> {
    let candidates = engine
        .list_image_refs()
        .await?
        .into_iter()
        .filter(|reference| reference != image_ref && policy.allows_base(reference));

    for candidate in candidates {
        let base = match engine.inspect_image(&candidate).await {
            Ok(base) => base,
            Err(EngineError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        };
        if !base.layers.is_empty() && info.layers.starts_with(&base.layers) {
            debug!(image = %image_ref, base = %candidate, "Base image verified");
            return Ok(None);
        }
    }

    Ok(Some(ValidationOutcome::fail(
        ValidationReason::DisallowedBaseImage,
        format!(
            "image layers do not extend any local image from the allowed families ({})",
            policy.allowed_base_families.join(", ")
        ),
    )))
}
