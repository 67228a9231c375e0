use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub server_port: u16,
    /// Fixed offset of the clinic's wall clock from UTC. Appointment dates and
    /// slot times are stored clinic-local.
    pub clinic_utc_offset_minutes: i32,
    pub default_slot_duration_minutes: u32,
    pub reminder_interval_seconds: u64,
    pub reminder_window_min_minutes: i64,
    pub reminder_window_max_minutes: i64,
    pub notification_webhook_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            server_port: parse_or("PORT", 3000),
            clinic_utc_offset_minutes: parse_or("CLINIC_UTC_OFFSET_MINUTES", 0),
            default_slot_duration_minutes: parse_or("DEFAULT_SLOT_DURATION_MINUTES", 30),
            reminder_interval_seconds: parse_or("REMINDER_INTERVAL_SECONDS", 300),
            reminder_window_min_minutes: parse_or("REMINDER_WINDOW_MIN_MINUTES", 50),
            reminder_window_max_minutes: parse_or("REMINDER_WINDOW_MAX_MINUTES", 70),
            notification_webhook_url: env::var("NOTIFICATION_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.is_empty()),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// Supabase persistence is only used when both the URL and the key are present;
    /// otherwise the process runs on in-memory stores.
    pub fn is_persistence_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            server_port: 3000,
            clinic_utc_offset_minutes: 0,
            default_slot_duration_minutes: 30,
            reminder_interval_seconds: 300,
            reminder_window_min_minutes: 50,
            reminder_window_max_minutes: 70,
            notification_webhook_url: None,
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
