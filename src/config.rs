use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use ipnet::IpNet;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: IpAddr,
    pub port: u16,
    pub base_url: String,
    pub trusted_proxies: Vec<IpNet>,
    pub cors_origin: Option<String>,
    pub intake_per_minute: u32,
    pub admin: Option<AdminBootstrap>,
    pub log_level: String,
    pub mail: MailConfig,
    pub smtp: Option<SmtpConfig>,
    pub sendgrid: Option<SendGridConfig>,
}

/// Admin account created at startup when no admin with that email exists.
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub from: String,
    pub admin_recipient: String,
    pub hourly_limit: u32,
    pub daily_limit: u32,
    pub send_delay: Duration,
    pub queue_tick: Duration,
    pub processor_interval: Duration,
    pub batch_delay: Duration,
    pub batch_limit: i64,
    pub max_retries: u32,
    pub transport_timeout: Duration,
    pub template_dir: PathBuf,
    pub template_fallback_dir: PathBuf,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: "noreply@localhost".to_string(),
            admin_recipient: "noreply@localhost".to_string(),
            hourly_limit: 50,
            daily_limit: 500,
            send_delay: Duration::from_millis(2000),
            queue_tick: Duration::from_secs(30),
            processor_interval: Duration::from_secs(5 * 60),
            batch_delay: Duration::from_millis(1000),
            batch_limit: 50,
            max_retries: 3,
            transport_timeout: Duration::from_secs(20),
            template_dir: PathBuf::from("templates/email"),
            template_fallback_dir: PathBuf::from("dist/templates/email"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

#[derive(Debug, Clone)]
pub struct SendGridConfig {
    pub api_key: String,
    pub api_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;
        let jwt_secret = env_required("JWT_SECRET")?;

        let host: IpAddr = env_or("LEADFLOW_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid LEADFLOW_HOST: {e}"))?;

        let port: u16 = parse_env("LEADFLOW_PORT", "3000")?;

        let base_url = env_or("LEADFLOW_BASE_URL", &format!("http://{host}:{port}"));

        let trusted_proxies: Vec<IpNet> = env_or("LEADFLOW_TRUSTED_PROXIES", "")
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.trim()
                    .parse()
                    .map_err(|e| format!("Invalid LEADFLOW_TRUSTED_PROXIES entry '{s}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let cors_origin = std::env::var("LEADFLOW_CORS_ORIGIN")
            .ok()
            .filter(|s| !s.is_empty());

        let intake_per_minute: u32 = parse_env("LEADFLOW_INTAKE_PER_MINUTE", "10")?;

        let admin = match (
            std::env::var("LEADFLOW_ADMIN_EMAIL").ok(),
            std::env::var("LEADFLOW_ADMIN_PASSWORD").ok(),
        ) {
            (Some(email), Some(password)) => Some(AdminBootstrap { email, password }),
            _ => None,
        };

        let log_level = env_or("LEADFLOW_LOG_LEVEL", "info");

        let mail = mail_from_env()?;

        let smtp = match (
            std::env::var("SMTP_HOST").ok(),
            std::env::var("SMTP_PORT").ok(),
            std::env::var("SMTP_USER").ok(),
            std::env::var("SMTP_PASS").ok(),
        ) {
            (Some(host), Some(port), Some(user), Some(pass)) => Some(SmtpConfig {
                host,
                port: port
                    .parse()
                    .map_err(|e| format!("Invalid SMTP_PORT: {e}"))?,
                user,
                pass,
            }),
            _ => None,
        };

        let sendgrid = std::env::var("SENDGRID_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(|api_key| SendGridConfig {
                api_key,
                api_url: env_or("SENDGRID_API_URL", "https://api.sendgrid.com/v3/mail/send"),
            });

        Ok(Config {
            database_url,
            jwt_secret,
            host,
            port,
            base_url,
            trusted_proxies,
            cors_origin,
            intake_per_minute,
            admin,
            log_level,
            mail,
            smtp,
            sendgrid,
        })
    }
}

fn mail_from_env() -> Result<MailConfig, String> {
    let from = env_or("EMAIL_FROM", "noreply@localhost");
    let admin_recipient = env_or("EMAIL_ADMIN_RECIPIENT", &from);

    let hourly_limit: u32 = parse_env("EMAIL_RATE_LIMIT_PER_HOUR", "50")?;
    let daily_limit: u32 = parse_env("EMAIL_RATE_LIMIT_PER_DAY", "500")?;
    let send_delay_ms: u64 = parse_env("EMAIL_DELAY_BETWEEN_SENDS", "2000")?;
    let queue_tick_secs: u64 = parse_env("EMAIL_QUEUE_TICK_SECS", "30")?;
    let interval_minutes: u64 = parse_env("EMAIL_PROCESSOR_INTERVAL_MINUTES", "5")?;
    let batch_delay_ms: u64 = parse_env("EMAIL_BATCH_DELAY_MS", "1000")?;
    let batch_limit: i64 = parse_env("EMAIL_BATCH_LIMIT", "50")?;
    let max_retries: u32 = parse_env("EMAIL_MAX_RETRIES", "3")?;
    let timeout_secs: u64 = parse_env("EMAIL_TRANSPORT_TIMEOUT_SECS", "20")?;

    if hourly_limit == 0 || daily_limit == 0 {
        return Err("Email rate limits must be greater than zero".to_string());
    }
    if max_retries == 0 {
        return Err("EMAIL_MAX_RETRIES must be at least 1".to_string());
    }

    Ok(MailConfig {
        from,
        admin_recipient,
        hourly_limit,
        daily_limit,
        send_delay: Duration::from_millis(send_delay_ms),
        queue_tick: Duration::from_secs(queue_tick_secs.max(1)),
        processor_interval: Duration::from_secs(interval_minutes.max(1) * 60),
        batch_delay: Duration::from_millis(batch_delay_ms),
        batch_limit: batch_limit.max(1),
        max_retries,
        transport_timeout: Duration::from_secs(timeout_secs.max(1)),
        template_dir: PathBuf::from(env_or("EMAIL_TEMPLATE_DIR", "templates/email")),
        template_fallback_dir: PathBuf::from(env_or(
            "EMAIL_TEMPLATE_FALLBACK_DIR",
            "dist/templates/email",
        )),
    })
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env_or(key, default)
        .parse()
        .map_err(|e| format!("Invalid {key}: {e}"))
}
