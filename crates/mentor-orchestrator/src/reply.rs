//! Parsing of model replies that are expected to carry one JSON object.
//!
//! Models often wrap JSON in a markdown code fence, sometimes forgetting the
//! closing marker. The fence is stripped before decoding; anything that then
//! fails to decode into the target type is rejected with the raw reply kept.

use serde::de::DeserializeOwned;

use crate::error::{GenerationStage, MentorError, Result};

const FENCE: &str = "```";

/// Removes a surrounding markdown code fence from a reply.
///
/// The opening fence (with an optional language tag such as `json`) is only
/// recognised at the very start of the trimmed reply. A missing closing fence
/// is tolerated, and text after the closing fence is dropped. Replies without
/// a fence are returned trimmed.
#[must_use]
pub fn strip_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(after_open) = trimmed.strip_prefix(FENCE) else {
        return trimmed;
    };

    // Drop the info string on the opening line ("json", "JSON", ...).
    let body = after_open
        .split_once('\n')
        .map_or(after_open, |(_, rest)| rest);

    // Anything after the first closing fence line is commentary.
    let end = std::iter::once(0)
        .chain(body.match_indices('\n').map(|(i, _)| i + 1))
        .find(|&start| body[start..].trim_start_matches([' ', '\t']).starts_with(FENCE))
        .unwrap_or(body.len());

    body[..end].trim()
}

/// Decodes a reply into `T` after stripping any code fence.
///
/// # Errors
///
/// Returns `MentorError::GenerationParse` carrying the unmodified reply if the
/// body is not valid JSON or does not match the shape of `T`.
pub fn decode<T: DeserializeOwned>(stage: GenerationStage, reply: &str) -> Result<T> {
    let body = strip_fences(reply);
    if body.is_empty() {
        return Err(MentorError::generation_parse(stage, "reply was empty", reply));
    }

    serde_json::from_str(body)
        .map_err(|e| MentorError::generation_parse(stage, e.to_string(), reply))
}
