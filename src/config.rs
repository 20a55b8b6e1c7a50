use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_PROGRESS_DB_PATH: &str = ".data/progress.json";
pub const DEFAULT_SESSION_COOKIE: &str = "escape_session";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub progress_db_path: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub story_script_path: Option<PathBuf>,
    pub session_cookie: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            progress_db_path: PathBuf::from(DEFAULT_PROGRESS_DB_PATH),
            static_dir: None,
            story_script_path: None,
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();
        Self {
            port: read("PORT")
                .and_then(|value| value.parse::<u16>().ok())
                .unwrap_or(defaults.port),
            progress_db_path: read("PROGRESS_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.progress_db_path),
            static_dir: read("STATIC_DIR").map(PathBuf::from),
            story_script_path: read("STORY_SCRIPT_PATH").map(PathBuf::from),
            session_cookie: read("SESSION_COOKIE").unwrap_or(defaults.session_cookie),
        }
    }

    /// First directory holding an `index.html`, preferring `STATIC_DIR`.
    pub fn resolve_static_dir(&self) -> Option<PathBuf> {
        if let Some(path) = &self.static_dir {
            if path.join("index.html").is_file() {
                return Some(path.clone());
            }
        }
        [PathBuf::from("dist/client"), PathBuf::from("../../dist/client")]
            .into_iter()
            .find(|path| path.join("index.html").is_file())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(ServerConfig::from_lookup(lookup(&[])), ServerConfig::default());
    }

    #[test]
    fn values_are_read_and_invalid_port_falls_back() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "not-a-port"),
            ("PROGRESS_DB_PATH", "/tmp/escape/progress.json"),
            ("STORY_SCRIPT_PATH", "stories/samsung.json"),
            ("SESSION_COOKIE", "sid"),
            ("STATIC_DIR", "  "),
        ]));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.progress_db_path, PathBuf::from("/tmp/escape/progress.json"));
        assert_eq!(
            config.story_script_path,
            Some(PathBuf::from("stories/samsung.json"))
        );
        assert_eq!(config.session_cookie, "sid");
        assert_eq!(config.static_dir, None);

        let config = ServerConfig::from_lookup(lookup(&[("PORT", "3000")]));
        assert_eq!(config.port, 3000);
    }
}
