//! The operating prompt: the single system message every reasoning turn
//! opens with. Its wording may change, but it always carries the six
//! required slots (cwd, fs-root, db, cache, os, safe-mode) and the
//! tool-chaining rule.

use agentry_config::AppConfig;
use agentry_core::Role;

pub fn build_operating_prompt(config: &AppConfig, role: Role) -> String {
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!(
        "You are an autonomous coding and operations agent. Use the tools you are \
         given to ground every factual claim; never invent a result a tool would \
         have produced.\n\n\
         TOOL-CHAINING RULE: never nest one tool's output as a literal argument to \
         another tool call within the same turn — run the first tool, read its \
         result from the conversation, then decide the next call.\n\n\
         ENVIRONMENT:\n\
         - cwd: {cwd}\n\
         - fs-root: {fs_root}\n\
         - db: {db_host}:{db_port}/{db_name}\n\
         - cache: {cache_host}:{cache_port}\n\
         - os: {os}\n\
         - safe-mode: {safe_mode}\n\
         - caller-role: {role}",
        fs_root = config.fs_allowed_path,
        db_host = config.database.host,
        db_port = config.database.port,
        db_name = config.database.name,
        cache_host = config.redis.host,
        cache_port = config.redis.port,
        os = std::env::consts::OS,
        safe_mode = config.production_safe_mode,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operating_prompt_carries_every_required_slot() {
        let config = AppConfig::default();
        let prompt = build_operating_prompt(&config, Role::Dev);
        for slot in ["cwd:", "fs-root:", "db:", "cache:", "os:", "safe-mode:"] {
            assert!(prompt.contains(slot), "missing slot: {slot}");
        }
    }

    #[test]
    fn operating_prompt_states_the_tool_chaining_rule() {
        let config = AppConfig::default();
        let prompt = build_operating_prompt(&config, Role::Readonly);
        assert!(prompt.to_lowercase().contains("tool-chaining"));
    }
}
