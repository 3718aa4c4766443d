//! Server configuration from flags and environment

use std::path::PathBuf;

use chrono::{FixedOffset, NaiveTime};
use clap::Parser;

use crate::lifecycle::{LifecyclePolicy, ReassignPolicy};

#[derive(Parser, Debug, Clone)]
#[command(name = "fastfeet")]
#[command(about = "FastFeet server - package delivery management backend")]
#[command(version)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "FASTFEET_BIND", default_value = "0.0.0.0:3333")]
    pub bind: String,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:fastfeet.db?mode=rwc")]
    pub database_url: String,

    #[arg(long, env = "FASTFEET_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Directory signatures and avatars are written to
    #[arg(long, env = "FASTFEET_UPLOADS_DIR", default_value = "tmp/uploads")]
    pub uploads_dir: PathBuf,

    /// Base URL of the HTTP mail relay; notifications are only logged when unset
    #[arg(long, env = "MAIL_RELAY_URL")]
    pub mail_relay_url: Option<String>,

    #[arg(long, env = "MAIL_FROM", default_value = "FastFeet <noreply@fastfeet.com>")]
    pub mail_from: String,

    /// Earliest wall-clock time a delivery can be picked up (HH:MM)
    #[arg(long, env = "FASTFEET_PICKUP_OPENS", default_value = "08:00", value_parser = parse_time)]
    pub pickup_opens: NaiveTime,

    /// Latest wall-clock time a delivery can be picked up (HH:MM)
    #[arg(long, env = "FASTFEET_PICKUP_CLOSES", default_value = "18:00", value_parser = parse_time)]
    pub pickup_closes: NaiveTime,

    #[arg(long, env = "FASTFEET_DAILY_PICKUP_LIMIT", default_value_t = 5)]
    pub daily_pickup_limit: i64,

    /// Offset of the carrier's wall clock from UTC, in minutes
    #[arg(
        long,
        env = "FASTFEET_UTC_OFFSET_MINUTES",
        default_value_t = 0,
        allow_hyphen_values = true
    )]
    pub utc_offset_minutes: i32,

    #[arg(
        long,
        env = "FASTFEET_REASSIGN_POLICY",
        value_enum,
        default_value_t = ReassignPolicy::Any
    )]
    pub reassign_policy: ReassignPolicy,
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| format!("expected HH:MM: {}", e))
}

impl Config {
    pub fn lifecycle_policy(&self) -> Result<LifecyclePolicy, String> {
        if self.pickup_opens > self.pickup_closes {
            return Err(format!(
                "Pickup window opens ({}) after it closes ({})",
                self.pickup_opens, self.pickup_closes
            ));
        }
        if self.daily_pickup_limit < 0 {
            return Err("Daily pickup limit cannot be negative".to_string());
        }
        let utc_offset = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or_else(|| format!("Invalid UTC offset: {} minutes", self.utc_offset_minutes))?;

        Ok(LifecyclePolicy {
            pickup_opens: self.pickup_opens,
            pickup_closes: self.pickup_closes,
            daily_pickup_limit: self.daily_pickup_limit,
            utc_offset,
            reassign: self.reassign_policy,
        })
    }
}
