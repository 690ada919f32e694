use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityProviderConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentGatewayConfig {
    pub access_token: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_calls: u32,
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub session_cookie_name: String,
    /// Remote identity provider; `None` means local accounts only.
    pub identity: Option<IdentityProviderConfig>,
    /// Payment gateway; `None` disables preference creation.
    pub gateway: Option<PaymentGatewayConfig>,
    pub webhook_secret: Option<String>,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;

        let identity = std::env::var("IDP_API_KEY")
            .ok()
            .map(|api_key| IdentityProviderConfig {
                api_key,
                base_url: std::env::var("IDP_BASE_URL")
                    .unwrap_or_else(|_| "https://identitytoolkit.googleapis.com".into()),
            });

        let gateway =
            std::env::var("PAYMENT_ACCESS_TOKEN")
                .ok()
                .map(|access_token| PaymentGatewayConfig {
                    access_token,
                    base_url: std::env::var("PAYMENT_BASE_URL")
                        .unwrap_or_else(|_| "https://api.mercadopago.com".into()),
                });

        let rate_limit = RateLimitConfig {
            max_calls: std::env::var("RATE_LIMIT_MAX")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(10),
            window_secs: std::env::var("RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60),
        };

        Ok(Self {
            database_url,
            session_cookie_name: std::env::var("SESSION_COOKIE_NAME")
                .unwrap_or_else(|_| "playtime_session".into()),
            identity,
            gateway,
            webhook_secret: std::env::var("PAYMENT_WEBHOOK_SECRET").ok(),
            rate_limit,
        })
    }
}
