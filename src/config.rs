/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Display name of the hosting participant
    pub host_name: String,
    /// Maximum combatants in the session (humans plus bots)
    pub room_capacity: usize,
    /// Active team count; below 2 runs free-for-all
    pub team_count: usize,
    /// Maximum human participants
    pub max_humans: usize,
    /// Whether the bot population manager runs
    pub bot_fill: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host_name: "Host".to_string(),
            room_capacity: 10,
            team_count: 2,
            max_humans: 10,
            bot_fill: true,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("HOST_NAME") {
            if !name.trim().is_empty() {
                config.host_name = name;
            } else {
                tracing::warn!("HOST_NAME is empty, using default");
            }
        }

        if let Ok(capacity) = std::env::var("ROOM_CAPACITY") {
            if let Ok(parsed) = capacity.parse::<usize>() {
                if parsed > 0 && parsed <= 64 {
                    config.room_capacity = parsed;
                } else {
                    tracing::warn!("ROOM_CAPACITY must be 1-64, using default");
                }
            } else {
                tracing::warn!("Invalid ROOM_CAPACITY '{}', using default", capacity);
            }
        }

        if let Ok(teams) = std::env::var("TEAM_COUNT") {
            if let Ok(parsed) = teams.parse::<usize>() {
                if parsed <= 4 {
                    config.team_count = parsed;
                } else {
                    tracing::warn!("TEAM_COUNT must be 0-4, using default");
                }
            } else {
                tracing::warn!("Invalid TEAM_COUNT '{}', using default", teams);
            }
        }

        if let Ok(max_humans) = std::env::var("MAX_HUMANS") {
            if let Ok(parsed) = max_humans.parse::<usize>() {
                if parsed > 0 {
                    config.max_humans = parsed;
                } else {
                    tracing::warn!("MAX_HUMANS must be > 0, using default");
                }
            } else {
                tracing::warn!("Invalid MAX_HUMANS '{}', using default", max_humans);
            }
        }

        if let Ok(fill) = std::env::var("BOT_FILL") {
            match fill.to_ascii_lowercase().as_str() {
                "true" | "1" | "on" => config.bot_fill = true,
                "false" | "0" | "off" => config.bot_fill = false,
                _ => tracing::warn!("Invalid BOT_FILL '{}', using default", fill),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.room_capacity == 0 {
            return Err("room_capacity must be at least 1".to_string());
        }
        if self.max_humans == 0 {
            return Err("max_humans must be at least 1".to_string());
        }
        if self.max_humans > self.room_capacity {
            return Err("max_humans cannot exceed room_capacity".to_string());
        }
        if self.team_count >= 2 && self.room_capacity < self.team_count {
            return Err("room_capacity must cover at least one combatant per team".to_string());
        }
        Ok(())
    }
}
