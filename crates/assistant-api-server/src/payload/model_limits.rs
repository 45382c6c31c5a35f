//! Static per-model limits table.
//!
//! Gateway models advertise a context window and a documented maximum for
//! `max_tokens`. Requesting more than the documented output maximum is a
//! hard API error, so every outbound payload caps the caller's value here.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Model context/output limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelLimits {
    /// Maximum context window size in tokens
    pub context: u32,
    /// Maximum output tokens per completion
    pub output: u32,
}

/// Conservative fallback for models missing from the table.
pub const DEFAULT_LIMITS: ModelLimits = ModelLimits {
    context: 8_192,
    output: 4_096,
};

static MODEL_LIMITS: Lazy<HashMap<&'static str, ModelLimits>> = Lazy::new(|| {
    HashMap::from([
        (
            "llama-3.3-70b-versatile",
            ModelLimits {
                context: 128_000,
                output: 32_768,
            },
        ),
        (
            "llama-3.1-8b-instant",
            ModelLimits {
                context: 128_000,
                output: 8_192,
            },
        ),
        (
            "llama3-70b-8192",
            ModelLimits {
                context: 8_192,
                output: 8_192,
            },
        ),
        (
            "llama3-8b-8192",
            ModelLimits {
                context: 8_192,
                output: 8_192,
            },
        ),
        (
            "mixtral-8x7b-32768",
            ModelLimits {
                context: 32_768,
                output: 32_768,
            },
        ),
        (
            "gemma2-9b-it",
            ModelLimits {
                context: 8_192,
                output: 8_192,
            },
        ),
        (
            "deepseek-r1-distill-llama-70b",
            ModelLimits {
                context: 128_000,
                output: 16_384,
            },
        ),
    ])
});

/// Look up the limits for a model, falling back to [`DEFAULT_LIMITS`] for
/// unknown names.
pub fn limits_for(model: &str) -> ModelLimits {
    MODEL_LIMITS.get(model).copied().unwrap_or_else(|| {
        tracing::debug!(model = model, "unknown model, using default limits");
        DEFAULT_LIMITS
    })
}

/// Cap a requested `max_tokens` value to the model's documented maximum.
pub fn cap_output_tokens(model: &str, requested: u32) -> u32 {
    let limits = limits_for(model);
    if requested > limits.output {
        tracing::debug!(
            model = model,
            requested = requested,
            cap = limits.output,
            "capping requested output tokens to model maximum"
        );
    }
    requested.min(limits.output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_caps_high_request() {
        // 100k requested against a 32,768 output ceiling.
        assert_eq!(cap_output_tokens("llama-3.3-70b-versatile", 100_000), 32_768);
    }

    #[test]
    fn test_request_under_cap_untouched() {
        assert_eq!(cap_output_tokens("llama-3.3-70b-versatile", 1_024), 1_024);
    }

    #[test]
    fn test_unknown_model_uses_default() {
        assert_eq!(limits_for("some-future-model"), DEFAULT_LIMITS);
        assert_eq!(cap_output_tokens("some-future-model", 1_000_000), DEFAULT_LIMITS.output);
    }

    #[test]
    fn test_exact_cap_allowed() {
        assert_eq!(cap_output_tokens("llama3-8b-8192", 8_192), 8_192);
    }
}
