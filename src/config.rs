use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_ADMIN_TOKEN: &str = "admin123";

#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "Charades match server")]
pub struct ServerConfig {
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,
    /// JSON document holding teams and settings.
    #[arg(long, env = "DATA_PATH", default_value = ".data/store.json")]
    pub data_path: PathBuf,
    /// Optional `{characters, actions}` catalog; the built-in one is used otherwise.
    #[arg(long, env = "GAME_DATA_PATH")]
    pub game_data_path: Option<PathBuf>,
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<PathBuf>,
    #[arg(long, env = "ADMIN_TOKEN", default_value = DEFAULT_ADMIN_TOKEN)]
    pub admin_token: String,
    /// Fixed prompt seed, for reproducible matches.
    #[arg(long, env = "MATCH_SEED")]
    pub match_seed: Option<u32>,
}

impl ServerConfig {
    pub fn uses_default_admin_token(&self) -> bool {
        self.admin_token == DEFAULT_ADMIN_TOKEN
    }

    pub fn resolve_static_dir(&self) -> Option<PathBuf> {
        if let Some(path) = self.static_dir.as_ref() {
            if path.join("index.html").is_file() {
                return Some(path.clone());
            }
        }

        let candidates = [
            PathBuf::from("dist/client"),
            PathBuf::from("../frontend/dist"),
        ];
        candidates
            .into_iter()
            .find(|path| path.join("index.html").is_file())
    }
}
