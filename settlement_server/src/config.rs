use std::env;

use chrono::Duration;
use log::*;
use psg_common::{parse_boolean_flag, CommissionRate, Secret};
use stripe_tools::StripeConfig;

use crate::errors::ServerError;

const DEFAULT_PSG_HOST: &str = "127.0.0.1";
const DEFAULT_PSG_PORT: u16 = 8460;
const DEFAULT_COMMISSION_RATE_BPS: i64 = 500;
const DEFAULT_STALE_CHECKOUT_TIMEOUT: Duration = Duration::hours(2);
const DEFAULT_SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The platform's cut of every order, applied at session creation time.
    pub commission_rate: CommissionRate,
    /// How long an unreferenced pending order may linger before the sweeper cancels it.
    pub stale_checkout_timeout: Duration,
    /// Maximum age of a webhook signature timestamp before the delivery is rejected as a possible replay.
    pub signature_tolerance_secs: i64,
    /// When false, incoming event signatures are not checked. Never disable this outside local development.
    pub signature_checks: bool,
    pub auth: AuthConfig,
    pub stripe: StripeConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PSG_HOST.to_string(),
            port: DEFAULT_PSG_PORT,
            database_url: String::default(),
            commission_rate: CommissionRate::from_basis_points(DEFAULT_COMMISSION_RATE_BPS)
                .expect("default commission rate is valid"),
            stale_checkout_timeout: DEFAULT_STALE_CHECKOUT_TIMEOUT,
            signature_tolerance_secs: DEFAULT_SIGNATURE_TOLERANCE_SECS,
            signature_checks: true,
            auth: AuthConfig::default(),
            stripe: StripeConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("PSG_HOST").ok().unwrap_or_else(|| DEFAULT_PSG_HOST.into());
        let port = env::var("PSG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for PSG_PORT. {e} Using the default, {DEFAULT_PSG_PORT}, instead."
                    );
                    DEFAULT_PSG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_PSG_PORT);
        let database_url = env::var("PSG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ PSG_DATABASE_URL is not set. Please set it to the URL for the settlement database.");
            String::default()
        });
        let commission_rate = configure_commission_rate();
        let stale_checkout_timeout = configure_stale_checkout_timeout();
        let signature_tolerance_secs = env::var("PSG_SIGNATURE_TOLERANCE_SECS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(DEFAULT_SIGNATURE_TOLERANCE_SECS);
        let signature_checks = parse_boolean_flag(env::var("PSG_SIGNATURE_CHECKS").ok(), true);
        if !signature_checks {
            warn!("🚨️ Webhook signature checks are DISABLED. Anyone can forge payment events. 🚨️");
        }
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to \
                 the default configuration."
            );
            AuthConfig::default()
        });
        let stripe = StripeConfig::from_env_or_default();
        Self {
            host,
            port,
            database_url,
            commission_rate,
            stale_checkout_timeout,
            signature_tolerance_secs,
            signature_checks,
            auth,
            stripe,
        }
    }
}

fn configure_commission_rate() -> CommissionRate {
    env::var("PSG_COMMISSION_RATE_BPS")
        .map_err(|_| {
            info!(
                "🪛️ PSG_COMMISSION_RATE_BPS is not set. Using the default of {DEFAULT_COMMISSION_RATE_BPS} basis \
                 points."
            )
        })
        .and_then(|s| s.parse::<i64>().map_err(|e| warn!("🪛️ Invalid value for PSG_COMMISSION_RATE_BPS. {e}")))
        .and_then(|bps| {
            CommissionRate::from_basis_points(bps).map_err(|e| warn!("🪛️ PSG_COMMISSION_RATE_BPS rejected. {e}"))
        })
        .unwrap_or_else(|()| {
            CommissionRate::from_basis_points(DEFAULT_COMMISSION_RATE_BPS).expect("default commission rate is valid")
        })
}

fn configure_stale_checkout_timeout() -> Duration {
    env::var("PSG_STALE_CHECKOUT_TIMEOUT")
        .map_err(|_| {
            info!(
                "🪛️ PSG_STALE_CHECKOUT_TIMEOUT is not set. Using the default value of {} hrs.",
                DEFAULT_STALE_CHECKOUT_TIMEOUT.num_hours()
            )
        })
        .and_then(|s| {
            s.parse::<i64>()
                .map(Duration::hours)
                .map_err(|e| warn!("🪛️ Invalid configuration value for PSG_STALE_CHECKOUT_TIMEOUT. {e}"))
        })
        .ok()
        .unwrap_or(DEFAULT_STALE_CHECKOUT_TIMEOUT)
}

//-------------------------------------------------  AuthConfig  ------------------------------------------------------
/// Buyer requests carry an HS256 bearer token issued by the identity service. This server only verifies; it never
/// issues tokens of its own (outside of tests).
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: Secret<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        warn!(
            "🚨️🚨️🚨️ The JWT verification secret has not been set. I'm using a random value for this session. No \
             externally issued token will validate against it, so every authenticated endpoint will reject its \
             callers. Set PSG_JWT_SECRET for production use. 🚨️🚨️🚨️"
        );
        let secret = format!("{:032x}{:032x}", rand::random::<u128>(), rand::random::<u128>());
        Self { jwt_secret: Secret::new(secret) }
    }
}

impl AuthConfig {
    pub fn try_from_env() -> Result<Self, ServerError> {
        let secret =
            env::var("PSG_JWT_SECRET").map_err(|e| ServerError::ConfigurationError(format!("{e} [PSG_JWT_SECRET]")))?;
        if secret.len() < 32 {
            return Err(ServerError::ConfigurationError(
                "PSG_JWT_SECRET must be at least 32 bytes long.".to_string(),
            ));
        }
        Ok(Self { jwt_secret: Secret::new(secret) })
    }
}

//-------------------------------------------------  ServerOptions  ---------------------------------------------------
/// A subset of the server configuration that handlers need at request time. Kept small, and free of secrets, so it
/// can be cheaply copied into application data.
#[derive(Clone, Copy, Debug)]
pub struct ServerOptions {
    pub commission_rate: CommissionRate,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { commission_rate: config.commission_rate }
    }
}
