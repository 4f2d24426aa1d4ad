//! Localized user-facing strings (spec.md §7 "User-visible behavior").
//! Resource loading itself is an external collaborator per spec.md §1
//! ("Locale/i18n resource loading ... is out of scope") — this module only
//! specifies the lookup interface and a built-in fallback table so the
//! handler never has nothing to say.

use std::collections::HashMap;

const FALLBACK_THROTTLE: &str = "I'm a bit busy right now, try again in a few minutes.";
const FALLBACK_CONTENT_BLOCKED: &str = "I can't respond to that.";
const FALLBACK_PROVIDER_UNAVAILABLE: &str = "Something went wrong on my end, please try again shortly.";

pub struct Localizer {
    default_language: String,
    messages: HashMap<String, HashMap<&'static str, String>>,
}

impl Localizer {
    /// Loads `{dir}/{lang}.json` (a flat string map) for `default_language`
    /// when present; falls back to the built-in English table otherwise.
    /// Never errors — a missing or malformed locale file degrades to
    /// defaults rather than blocking startup.
    pub fn load(dir: &str, default_language: &str) -> Self {
        let mut messages = HashMap::new();
        let path = format!("{dir}/{default_language}.json");
        if let Ok(contents) = std::fs::read_to_string(&path) {
            if let Ok(map) = serde_json::from_str::<HashMap<String, String>>(&contents) {
                let mut table = HashMap::new();
                for (key, value) in map {
                    if let Some(static_key) = known_key(&key) {
                        table.insert(static_key, value);
                    }
                }
                messages.insert(default_language.to_string(), table);
            }
        }
        Self {
            default_language: default_language.to_string(),
            messages,
        }
    }

    fn lookup(&self, key: &'static str, fallback: &str) -> String {
        self.messages
            .get(&self.default_language)
            .and_then(|table| table.get(key))
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn throttle_notice(&self) -> String {
        self.lookup("throttle_notice", FALLBACK_THROTTLE)
    }

    pub fn content_blocked(&self) -> String {
        self.lookup("content_blocked", FALLBACK_CONTENT_BLOCKED)
    }

    /// Apology message with a correlation-id suffix (spec.md §7 "Provider
    /// outage after retries").
    pub fn provider_unavailable(&self, correlation_id: &str) -> String {
        format!(
            "{} (ref: {correlation_id})",
            self.lookup("provider_unavailable", FALLBACK_PROVIDER_UNAVAILABLE)
        )
    }
}

fn known_key(key: &str) -> Option<&'static str> {
    match key {
        "throttle_notice" => Some("throttle_notice"),
        "content_blocked" => Some("content_blocked"),
        "provider_unavailable" => Some("provider_unavailable"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_locale_dir_falls_back_to_defaults() {
        let loc = Localizer::load("/nonexistent/dir", "uk");
        assert_eq!(loc.throttle_notice(), FALLBACK_THROTTLE);
        assert_eq!(loc.content_blocked(), FALLBACK_CONTENT_BLOCKED);
    }

    #[test]
    fn provider_unavailable_includes_correlation_id() {
        let loc = Localizer::load("/nonexistent/dir", "uk");
        let msg = loc.provider_unavailable("req-123");
        assert!(msg.contains("req-123"));
    }
}
