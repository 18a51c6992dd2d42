// Defaults for the advisor, loaded from the environment where it makes sense.

use std::env;
use std::time::Duration;

pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_P: f32 = 0.95;

/// Minimum spacing between two partial transcript emissions.
pub const EMIT_INTERVAL: Duration = Duration::from_millis(250);

/// How long the "preparing your assistant" screen stays up after the form is submitted.
pub const LOADING_DELAY: Duration = Duration::from_secs(1);

pub const APP_TITLE: &str = "Career Planner Bot";
pub const ADVISOR_NAME: &str = "Sophie";

// Use lazy_static to initialize static variables safely.
lazy_static::lazy_static! {
    // The key is not checked here; a missing key only surfaces when a completion is requested.
    pub static ref API_KEY: String = env::var("API_KEY").unwrap_or_default();
    pub static ref OPENAI_BASE_URL: String = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
    pub static ref MODEL_NAME: String = env::var("ADVISOR_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
}
