// Configuration module
// Reads INI-style option files with environment variable overrides

use std::collections::HashMap;
use std::path::Path;

use configparser::ini::Ini;

/// Configuration file reader
/// Supports INI-style files with environment variable override.
/// Keys are matched case-insensitively; section headers only group keys.
pub struct Config {
    values: HashMap<String, String>,
    filename: String,
    env_prefix: String,
}

impl Config {
    pub fn new() -> Self {
        Config {
            values: HashMap::new(),
            filename: String::new(),
            env_prefix: String::new(),
        }
    }

    /// Create an empty config that still honours environment overrides
    pub fn with_env_prefix(env_prefix: &str) -> Self {
        Config {
            env_prefix: env_prefix.to_string(),
            ..Self::new()
        }
    }

    /// Load configuration from a file
    /// env_prefix is used to check environment variables (e.g., "MBCONV_")
    pub fn set_source(&mut self, filename: &str, env_prefix: &str) -> bool {
        self.filename = filename.to_string();
        self.env_prefix = env_prefix.to_string();
        self.reload()
    }

    /// Reload the configuration file
    pub fn reload(&mut self) -> bool {
        self.values.clear();

        if !Path::new(&self.filename).exists() {
            return false;
        }

        let mut ini = Ini::new();
        match ini.load(&self.filename) {
            Ok(sections) => {
                self.absorb(sections);
                true
            }
            Err(_) => false,
        }
    }

    /// Parse configuration from an in-memory string
    pub fn load_str(&mut self, content: &str) -> bool {
        self.values.clear();

        let mut ini = Ini::new();
        match ini.read(content.to_string()) {
            Ok(sections) => {
                self.absorb(sections);
                true
            }
            Err(_) => false,
        }
    }

    fn absorb(&mut self, sections: HashMap<String, HashMap<String, Option<String>>>) {
        for (_, entries) in sections {
            for (key, value) in entries {
                let Some(mut value) = value else { continue };

                // Strip quotes
                if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                    value = value[1..value.len() - 1].to_string();
                }

                self.values.insert(key.to_lowercase(), value);
            }
        }
    }

    /// Check if a key is set
    pub fn is_set(&self, key: &str) -> bool {
        self.get_env_or_config(key).is_some()
    }

    /// Get a string value with a default
    pub fn get_string_default(&self, key: &str, default: &str) -> String {
        self.get_env_or_config(key)
            .unwrap_or_else(|| default.to_string())
    }

    /// Get a string value (empty string default)
    pub fn get_string(&self, key: &str) -> String {
        self.get_string_default(key, "")
    }

    /// Get a boolean value with a default
    pub fn get_bool_default(&self, key: &str, default: bool) -> bool {
        match self.get_env_or_config(key) {
            Some(val) => {
                let lower = val.to_lowercase();
                matches!(lower.as_str(), "1" | "true" | "yes")
            }
            None => default,
        }
    }

    /// Get an integer value with a default
    pub fn get_int_default(&self, key: &str, default: i32) -> i32 {
        match self.get_env_or_config(key) {
            Some(val) => val.trim().parse().unwrap_or(default),
            None => default,
        }
    }

    /// Get a comma separated list; `None` when the key is absent
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        self.get_env_or_config(key).map(|val| {
            val.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    /// Try environment variable first, then config file
    fn get_env_or_config(&self, key: &str) -> Option<String> {
        // Convert key to env var name: replace '.' with '_', add prefix
        if !self.env_prefix.is_empty() {
            let env_key = format!("{}{}", self.env_prefix, key.replace('.', "_"));
            if let Ok(val) = std::env::var(&env_key) {
                return Some(val);
            }
        }

        self.values.get(&key.to_lowercase()).cloned()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.get_int_default("nonexistent", 42), 42);
        assert_eq!(config.get_string_default("nonexistent", "hello"), "hello");
        assert!(config.get_bool_default("nonexistent", true));
        assert!(config.get_list("nonexistent").is_none());
    }

    #[test]
    fn test_parse_sections_and_quotes() {
        let mut config = Config::new();
        assert!(config.load_str(
            "[Options]\nPreserveTrimmed = 0\nTablesDir = \"data/tables\"\n\n[Run]\nThreads = 6\nTargetEnvironments = BlueBay, RedIsland\n"
        ));
        assert!(!config.get_bool_default("PreserveTrimmed", true));
        assert_eq!(config.get_string("TablesDir"), "data/tables");
        assert_eq!(config.get_int_default("threads", 1), 6);
        assert_eq!(
            config.get_list("TargetEnvironments").unwrap(),
            vec!["BlueBay".to_string(), "RedIsland".to_string()]
        );
    }

    #[test]
    fn test_env_override() {
        let mut config = Config::with_env_prefix("MBCONV_CFGTEST_");
        config.load_str("Threads = 2\n");
        // SAFETY: the variable name is unique to this test
        unsafe { std::env::set_var("MBCONV_CFGTEST_Threads", "9") };
        assert_eq!(config.get_int_default("Threads", 1), 9);
        unsafe { std::env::remove_var("MBCONV_CFGTEST_Threads") };
        assert_eq!(config.get_int_default("Threads", 1), 2);
    }
}
