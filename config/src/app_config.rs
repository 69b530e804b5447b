use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    env,
    path::PathBuf,
};

#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
pub(super) struct AppConfig {
    #[serde(default)]
    pub(super) config_dir: PathBuf,
}

lazy_static::lazy_static! {
    pub(crate) static ref PROJECT_NAME: String = "multi-sampler".to_string();
    pub(crate) static ref ENV_PREFIX: String = PROJECT_NAME.replace('-', "_").to_uppercase();
    static ref CONFIG_FOLDER: Option<PathBuf> = env::var(format!("{}_CONFIG_DIR", ENV_PREFIX.clone()))
        .ok()
        .map(PathBuf::from);
}

/// Directory holding the optional user `config.yaml`.
///
/// `MULTI_SAMPLER_CONFIG_DIR` takes precedence over the platform location.
pub fn get_config_dir() -> PathBuf {
    if let Some(dir) = CONFIG_FOLDER.clone() {
        dir
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.config_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".config")
    }
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "multi-sampler", &PROJECT_NAME)
}
