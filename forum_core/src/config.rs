use std::path::PathBuf;

use iroh::SecretKey;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::ids::BoardId;

static DATA_DIR_NAME: &str = "forum_next";
static FORUM_DB_NAME: &str = "forum_db.sqlite";
static CONFIG_FILE_NAME: &str = "config.json";

// data_dir_path
// |- forum_next
//    |- forum_db.sqlite
//    |- config.json

fn default_secret_key() -> SecretKey {
    SecretKey::generate(&mut rand::rng())
}

/// Knobs for the topic restructuring engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RestructureSettings {
    /// Board that receives removed topics. `None` disables recycling.
    pub recycle_board: Option<BoardId>,
    /// Subjects are cut to this many characters.
    pub subject_max_length: usize,
    /// Prepended to reply subjects when a subject is enforced on a whole topic.
    pub reply_prefix: String,
    /// How far below the newest message id "mark board read" rows are still
    /// carried onto moved topics.
    pub mark_read_window: i64,
    /// Page size of the merge candidate list.
    pub merge_page_size: u64,
    /// Rows written or deleted per statement in chunked steps.
    pub batch_size: usize,
    /// Seconds an RPC-driven call may spend before stopping between chunks.
    /// Zero means no limit.
    pub request_time_limit_secs: u64,
}

impl Default for RestructureSettings {
    fn default() -> Self {
        Self {
            recycle_board: None,
            subject_max_length: 100,
            reply_prefix: "Re: ".to_string(),
            mark_read_window: 5000,
            merge_page_size: 20,
            batch_size: 500,
            request_time_limit_secs: 30,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ForumConfig {
    /// Secret key for the local node/instance.
    #[serde(default = "default_secret_key")]
    pub(crate) secret_key: SecretKey,

    /// Secret key used for client-side identity/auth (separate from node secret).
    #[serde(default = "default_secret_key")]
    pub(crate) client_secret_key: SecretKey,

    pub(crate) database_path: PathBuf,

    /// `serde(default)` keeps older config.json files loading.
    #[serde(default)]
    pub restructure: RestructureSettings,
}

impl ForumConfig {
    /// Creates a new ForumConfig with generated secret keys and the specified data directory
    fn new(data_dir: PathBuf) -> Self {
        ForumConfig {
            secret_key: default_secret_key(),
            client_secret_key: default_secret_key(),
            database_path: data_dir.join(FORUM_DB_NAME),
            restructure: RestructureSettings::default(),
        }
    }
}

/// Gets the existing config or initializes a new one if it doesn't exist
pub async fn get_or_init() -> Result<ForumConfig, Box<dyn std::error::Error>> {
    let data_dir = dirs::data_dir().ok_or("failed to find a data directory on this platform")?;

    let forum_dir = data_dir.join(DATA_DIR_NAME);
    let config_path = forum_dir.join(CONFIG_FILE_NAME);

    fs::create_dir_all(&forum_dir).await?;

    if config_path.exists() {
        let mut file = fs::File::open(&config_path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        let config: ForumConfig = serde_json::from_str(&contents)?;
        Ok(config)
    } else {
        let config = ForumConfig::new(forum_dir.clone());

        let json = serde_json::to_string_pretty(&config)?;
        let mut file = fs::File::create(&config_path).await?;
        file.write_all(json.as_bytes()).await?;

        Ok(config)
    }
}
