use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub node_env: String,
    pub db: DbConfig,
    pub webhooks: WebhookConfig,
    pub game_defaults: GameDefaults,
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub pool_min: u32,
    pub pool_max: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub workers: usize,
    pub queue_size: usize,
    pub timeout_secs: u64,
    pub queue_full_policy: QueueFullPolicy,
    pub queue_block_ms: u64,
}

/// What `dispatch` does when the job queue is at capacity. Neither
/// variant guarantees delivery: `Block` waits a bounded interval and
/// then drops the job as well.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueFullPolicy {
    Drop,
    Block,
}

/// Per-game policy values used when a game is created without overrides.
/// -1 disables a cooldown / makes pending invites unlimited.
#[derive(Clone, Debug)]
pub struct GameDefaults {
    pub max_members: i32,
    pub max_pending_invites: i32,
    pub cooldown_before_invite: i32,
    pub cooldown_before_apply: i32,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_or_parse("PORT", 8080),
            node_env: env_or("NODE_ENV", "development"),
            db: DbConfig {
                host: env_or("DB_HOST", "localhost"),
                port: env_or_parse("DB_PORT", 5432),
                database: env_or("DB_NAME", "clanhub"),
                user: env_or("DB_USER", "clanhub"),
                password: env_or("DB_PASSWORD", ""),
                pool_min: env_or_parse("DB_POOL_MIN", 5),
                pool_max: env_or_parse("DB_POOL_MAX", 50),
                acquire_timeout_secs: env_or_parse("DB_ACQUIRE_TIMEOUT_SECS", 10),
            },
            webhooks: WebhookConfig {
                workers: env_or_parse("WEBHOOK_WORKERS", 5),
                queue_size: env_or_parse("WEBHOOK_QUEUE_SIZE", 1000),
                timeout_secs: env_or_parse("WEBHOOK_TIMEOUT_SECS", 2),
                queue_full_policy: match env_or("WEBHOOK_QUEUE_POLICY", "drop").as_str() {
                    "block" => QueueFullPolicy::Block,
                    _ => QueueFullPolicy::Drop,
                },
                queue_block_ms: env_or_parse("WEBHOOK_QUEUE_BLOCK_MS", 50),
            },
            game_defaults: GameDefaults {
                max_members: env_or_parse("GAME_MAX_MEMBERS", -1),
                max_pending_invites: env_or_parse("GAME_MAX_PENDING_INVITES", -1),
                cooldown_before_invite: env_or_parse("GAME_COOLDOWN_BEFORE_INVITE", -1),
                cooldown_before_apply: env_or_parse("GAME_COOLDOWN_BEFORE_APPLY", -1),
            },
        }
    }

    pub fn database_url(&self) -> String {
        if let Ok(url) = env::var("DATABASE_URL") {
            return url;
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db.user, self.db.password, self.db.host, self.db.port, self.db.database
        )
    }
}
