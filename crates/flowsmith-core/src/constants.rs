//! Shared constants

pub mod app {
    /// Directory under the home dir holding config and logs
    pub const CONFIG_DIR_NAME: &str = ".flowsmith";
    pub const CONFIG_FILE_NAME: &str = "config.toml";
    pub const CATALOG_DB_NAME: &str = "catalog.db";
}

pub mod ai {
    pub const DEFAULT_MODEL: &str = "gpt-5-mini";
    pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
    pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
}

pub mod limits {
    /// Resolver worker pool size
    pub const WORKER_POOL_SIZE: usize = 8;
    pub const COLLABORATOR_TIMEOUT_MS: u64 = 10_000;
    pub const MODEL_TIMEOUT_SECS: u64 = 60;
    pub const REQUEST_TIMEOUT_SECS: u64 = 120;
    /// Global agent iteration ceiling, independent of the plan budget
    pub const ITERATION_CEILING: usize = 25;
    pub const STREAM_EMIT_INTERVAL_MS: u64 = 500;
    pub const STREAM_IDLE_TIMEOUT_SECS: u64 = 60;
    pub const HISTORY_TURNS: usize = 8;
    pub const MAX_FAILED_LOOKUPS_PER_TERM: usize = 2;
    pub const SEMANTIC_TOP_K: usize = 4;
    /// Hard ceiling on any plan's tool budget
    pub const PLAN_TOOL_CALL_CEILING: usize = 6;
    pub const MAX_OPEN_QUESTIONS: usize = 3;
}

pub mod messages {
    /// Appended whenever an answer is known to be partial
    pub const LAST_RESORT: &str = "The information above is incomplete. Please check the \
        automation platform's interface directly to confirm the exact pieces, operations, \
        and fields available.";
}
