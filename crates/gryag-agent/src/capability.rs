//! Model capability probing (spec.md §4.3): on initialization, the client
//! records which of `{function_calling, audio_input, video_input}` the
//! selected model advertises, so the context builder and request body
//! construction can filter unsupported parts before they ever leave the
//! process.

use crate::provider::ModelCapabilities;

/// Looks up capabilities for a known model family by substring match on
/// its name. Unknown models get the conservative default (text + function
/// calling only), so a misconfigured model name never silently sends media
/// the provider would reject.
pub fn probe(model: &str) -> ModelCapabilities {
    let lower = model.to_lowercase();
    if lower.contains("claude-3") || lower.contains("claude-opus") || lower.contains("claude-sonnet")
    {
        ModelCapabilities {
            function_calling: true,
            audio_input: false,
            video_input: false,
        }
    } else if lower.contains("gemini") {
        ModelCapabilities {
            function_calling: true,
            audio_input: true,
            video_input: true,
        }
    } else if lower.contains("gpt-4o") {
        ModelCapabilities {
            function_calling: true,
            audio_input: true,
            video_input: false,
        }
    } else {
        ModelCapabilities {
            function_calling: true,
            audio_input: false,
            video_input: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_models_advertise_audio_and_video() {
        let caps = probe("gemini-1.5-pro");
        assert!(caps.audio_input);
        assert!(caps.video_input);
    }

    #[test]
    fn unknown_model_gets_conservative_defaults() {
        let caps = probe("some-future-model");
        assert!(caps.function_calling);
        assert!(!caps.audio_input);
        assert!(!caps.video_input);
    }
}
