use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;
pub const DEFAULT_LOCALE: &str = "uk";
pub const DEFAULT_TIMEZONE: &str = "Europe/Kyiv";

/// Top-level config (gryag.toml + GRYAG_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub locale: LocaleConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub features: FeatureToggles,
    #[serde(default)]
    pub proactive: ProactiveConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            agent: AgentConfig {
                model: default_model(),
                api_key: String::new(),
                base_url: default_anthropic_base_url(),
                max_tool_turns: default_max_tool_turns(),
                max_output_tokens: default_max_output_tokens(),
                context_turns: default_context_turns(),
                multi_media_k: default_multi_media_k(),
                instruction_char_budget: default_instruction_char_budget(),
            },
            database: DatabaseConfig::default(),
            admission: AdmissionConfig::default(),
            tools: ToolsConfig::default(),
            locale: LocaleConfig::default(),
            retention: RetentionConfig::default(),
            features: FeatureToggles::default(),
            proactive: ProactiveConfig::default(),
            timeouts: TimeoutsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            auth_token: None,
        }
    }
}

/// Primary model identifier and credentials (spec.md §6 "model identifier
/// and credentials").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
    /// Bound on §4.6's tool-dispatch loop iterations per request.
    #[serde(default = "default_max_tool_turns")]
    pub max_tool_turns: u32,
    /// Max output tokens requested per LLM call.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Number of user+assistant turn pairs rendered in the immediate chat
    /// context block (§4.5 block 5 is `2*N` messages).
    #[serde(default = "default_context_turns")]
    pub context_turns: u32,
    /// K in the multi-media buffer block (§4.5 block 7).
    #[serde(default = "default_multi_media_k")]
    pub multi_media_k: u32,
    /// Soft character budget for the whole seven-block instruction, split
    /// across blocks per §4.5 (context 50%, summaries 20%, facts 15%,
    /// tools 10%, time 5%).
    #[serde(default = "default_instruction_char_budget")]
    pub instruction_char_budget: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
            redis_url: default_redis_url(),
        }
    }
}

/// Admission limits: chat/min, user/min (spec.md §6 "admission limits").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_chat_per_minute")]
    pub chat_per_minute: u32,
    #[serde(default = "default_user_per_minute")]
    pub user_per_minute: u32,
    /// Seconds a chat's exclusive processing lock may be held before it is
    /// considered stale and force-released.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    /// Width of the per-user notify-suppression window in seconds.
    #[serde(default = "default_notify_suppression_secs")]
    pub notify_suppression_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            chat_per_minute: default_chat_per_minute(),
            user_per_minute: default_user_per_minute(),
            lock_ttl_secs: default_lock_ttl_secs(),
            notify_suppression_secs: default_notify_suppression_secs(),
        }
    }
}

/// Per-tool quotas, cooldowns, and optional separate credentials
/// (spec.md §6: "per-tool quotas and cooldowns", "optional separate
/// credential for web-search and for image generation").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    pub web_search: Option<ToolCredential>,
    pub image_generation: Option<ToolCredential>,
    #[serde(default)]
    pub quotas: Vec<ToolQuotaConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCredential {
    pub api_key: String,
    pub base_url: Option<String>,
}

/// Hourly/daily quota override and cooldown for a single tool, keyed by tool
/// name. Only the dimension(s) a given tool actually enforces apply — e.g.
/// `calculator` only ever reads `hour_quota`, `run_python_code` only ever
/// reads `day_quota` (spec.md §4.4's tool table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolQuotaConfig {
    pub tool: String,
    #[serde(default = "default_tool_hour_quota")]
    pub hour_quota: u32,
    #[serde(default = "default_tool_day_quota")]
    pub day_quota: u32,
    #[serde(default)]
    pub cooldown_secs: u64,
}

/// Locale directory and default language (spec.md §6 "locale dir and
/// default language").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleConfig {
    #[serde(default = "default_locale_dir")]
    pub dir: String,
    #[serde(default = "default_locale")]
    pub default_language: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            dir: default_locale_dir(),
            default_language: default_locale(),
            timezone: default_timezone(),
        }
    }
}

/// Message retention (spec.md §6 "message retention days").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_days")]
    pub days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
        }
    }
}

/// Feature toggles (spec.md §6: "sandbox / image generation / proactive
/// messaging / web search / voice-to-text").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureToggles {
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default)]
    pub image_generation: bool,
    #[serde(default)]
    pub proactive_messaging: bool,
    #[serde(default)]
    pub web_search: bool,
    #[serde(default)]
    pub voice_to_text: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            sandbox: false,
            image_generation: false,
            proactive_messaging: false,
            web_search: false,
            voice_to_text: false,
        }
    }
}

/// Proactive-messaging cadence, active only when
/// `features.proactive_messaging` is set (spec.md §9 Open Question).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveConfig {
    #[serde(default = "default_proactive_idle_secs")]
    pub idle_secs: i64,
    #[serde(default = "default_proactive_check_interval_secs")]
    pub check_interval_secs: u64,
}

impl Default for ProactiveConfig {
    fn default() -> Self {
        Self {
            idle_secs: default_proactive_idle_secs(),
            check_interval_secs: default_proactive_check_interval_secs(),
        }
    }
}

fn default_proactive_idle_secs() -> i64 {
    6 * 3_600
}
fn default_proactive_check_interval_secs() -> u64 {
    900
}

/// Cancellation and timeout bounds (spec.md §5 "Cancellation & timeouts").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Bounded end-to-end budget for one admitted request.
    #[serde(default = "default_request_deadline_secs")]
    pub request_deadline_secs: u64,
    /// Per-LLM-call timeout, retried under the tool loop's backoff policy.
    #[serde(default = "default_llm_call_timeout_secs")]
    pub llm_call_timeout_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_deadline_secs: default_request_deadline_secs(),
            llm_call_timeout_secs: default_llm_call_timeout_secs(),
        }
    }
}

fn default_request_deadline_secs() -> u64 {
    120
}
fn default_llm_call_timeout_secs() -> u64 {
    45
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.gryag/gryag.db", home)
}
fn default_pool_size() -> u32 {
    8
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_chat_per_minute() -> u32 {
    10
}
fn default_user_per_minute() -> u32 {
    3
}
/// `max(request deadline, 90s)` at the respective defaults, so a crashed
/// worker cannot wedge a chat for longer than the request could legitimately
/// run (spec.md §5).
fn default_lock_ttl_secs() -> u64 {
    default_request_deadline_secs().max(90)
}
fn default_notify_suppression_secs() -> u64 {
    600
}
fn default_tool_hour_quota() -> u32 {
    20
}
fn default_tool_day_quota() -> u32 {
    20
}
fn default_locale_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.gryag/locales", home)
}
fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_retention_days() -> u32 {
    90
}
fn default_max_tool_turns() -> u32 {
    6
}
fn default_max_output_tokens() -> u32 {
    4096
}
fn default_context_turns() -> u32 {
    15
}
fn default_multi_media_k() -> u32 {
    10
}
fn default_instruction_char_budget() -> usize {
    24_000
}

impl Config {
    /// Load config from a TOML file with GRYAG_* env var overrides.
    ///
    /// Checks in order: explicit path argument, then `~/.gryag/gryag.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: Config = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("GRYAG_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::InvalidRequest(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.gryag/gryag.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_admission_limits() {
        let cfg = Config::default();
        assert_eq!(cfg.admission.chat_per_minute, 10);
        assert_eq!(cfg.admission.user_per_minute, 3);
        assert_eq!(cfg.retention.days, 90);
        assert_eq!(cfg.locale.timezone, "Europe/Kyiv");
    }

    #[test]
    fn feature_toggles_default_off() {
        let toggles = FeatureToggles::default();
        assert!(!toggles.sandbox);
        assert!(!toggles.proactive_messaging);
        assert!(!toggles.voice_to_text);
    }
}
