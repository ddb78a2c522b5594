//! Configuration management
//!
//! 設定は以下の優先順位で読み込まれます:
//! 1. 環境変数
//! 2. carddav.toml 設定ファイル
//! 3. デフォルト値
//!
//! 設定ファイル内では `${VAR_NAME}` 形式で環境変数を展開できます。

use crate::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Local cache database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Addressbook identity; scopes the stored vendor labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressbookConfig {
    #[serde(default = "default_addressbook_id")]
    pub id: String,
}

impl Default for AddressbookConfig {
    fn default() -> Self {
        Self {
            id: default_addressbook_id(),
        }
    }
}

/// Photo handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoConfig {
    /// Maximum edge length of a cropped photo
    #[serde(default = "default_photo_max_size")]
    pub max_size: u32,

    /// Whether the crop capability is installed at all
    #[serde(default = "default_photo_crop")]
    pub crop: bool,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            max_size: default_photo_max_size(),
            crop: default_photo_crop(),
        }
    }
}

/// HTTP configuration used when dereferencing external photo URIs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Collection URL that relative resource URIs are resolved against
    pub base_url: Option<String>,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Main configuration for the CardDAV bridge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub addressbook: AddressbookConfig,

    #[serde(default)]
    pub photo: PhotoConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

fn default_db_path() -> String {
    "data/carddav.db".to_string()
}

fn default_addressbook_id() -> String {
    "default".to_string()
}

fn default_photo_max_size() -> u32 {
    256
}

fn default_photo_crop() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

/// 真偽値の環境変数を解釈する (true/1/yes/on, false/0/no/off)
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// TOML ファイルの生の構造 (全項目省略可能)
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    database: Option<TomlDatabase>,
    addressbook: Option<TomlAddressbook>,
    photo: Option<TomlPhoto>,
    http: Option<TomlHttp>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlDatabase {
    db_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlAddressbook {
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlPhoto {
    max_size: Option<u32>,
    crop: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlHttp {
    base_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    timeout_secs: Option<u64>,
}

impl Config {
    /// 設定ファイルから環境変数を展開する
    ///
    /// `${VAR_NAME}` 形式の文字列を環境変数の値に置換します。
    /// 環境変数が存在しない場合は空文字列になります。
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // '{' を消費

                let mut var_name = String::new();
                while let Some(c) = chars.next() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// TOML 文字列から設定を構築する (環境変数の上書きは行わない)
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded_content = Self::expand_env_vars(content);

        let toml: TomlConfig = toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        Ok(Self::from_toml_config(toml))
    }

    /// TOML 設定ファイルから設定を読み込む
    ///
    /// # 引数
    /// * `path` - TOML ファイルのパス
    ///
    /// # 環境変数展開
    /// 設定ファイル内の `${VAR_NAME}` は環境変数の値に置換されます。
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&toml_content)?;

        // 既存の環境変数で上書き（環境変数が優先）
        cfg.apply_env_overrides();

        Ok(cfg)
    }

    /// デフォルトパスから設定を読み込む
    ///
    /// `./carddav.toml` があればそれを使い、なければ環境変数とデフォルト値のみ。
    pub fn load() -> crate::Result<Self> {
        if Path::new("carddav.toml").exists() {
            return Self::from_toml_file("carddav.toml");
        }

        Ok(Self::from_env())
    }

    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg
    }

    fn from_toml_config(toml: TomlConfig) -> Self {
        let database = toml.database.unwrap_or_default();
        let addressbook = toml.addressbook.unwrap_or_default();
        let photo = toml.photo.unwrap_or_default();
        let http = toml.http.unwrap_or_default();

        Self {
            database: DatabaseConfig {
                db_path: database.db_path.unwrap_or_else(default_db_path),
            },
            addressbook: AddressbookConfig {
                id: addressbook.id.unwrap_or_else(default_addressbook_id),
            },
            photo: PhotoConfig {
                max_size: photo.max_size.unwrap_or_else(default_photo_max_size),
                crop: photo.crop.unwrap_or_else(default_photo_crop),
            },
            http: HttpConfig {
                base_url: http.base_url.filter(|s| !s.is_empty()),
                username: http.username.filter(|s| !s.is_empty()),
                password: http.password,
                timeout_secs: http.timeout_secs.unwrap_or_else(default_timeout_secs),
            },
        }
    }

    /// 環境変数で設定を上書きする
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CARDDAV_DB_PATH") {
            if !path.is_empty() {
                self.database.db_path = path;
            }
        }

        if let Ok(id) = std::env::var("CARDDAV_ADDRESSBOOK_ID") {
            if !id.is_empty() {
                self.addressbook.id = id;
            }
        }

        if let Ok(size) = std::env::var("CARDDAV_PHOTO_MAX_SIZE") {
            if let Ok(size) = size.parse() {
                self.photo.max_size = size;
            }
        }
        if let Ok(crop) = std::env::var("CARDDAV_PHOTO_CROP") {
            match parse_flag(&crop) {
                Some(crop) => self.photo.crop = crop,
                None => tracing::warn!("Ignoring invalid CARDDAV_PHOTO_CROP value: {}", crop),
            }
        }

        if let Ok(url) = std::env::var("CARDDAV_BASE_URL") {
            if !url.is_empty() {
                self.http.base_url = Some(url);
            }
        }
        if let Ok(user) = std::env::var("CARDDAV_USERNAME") {
            self.http.username = Some(user);
        }
        if let Ok(password) = std::env::var("CARDDAV_PASSWORD") {
            self.http.password = Some(password);
        }
        if let Ok(secs) = std::env::var("CARDDAV_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.http.timeout_secs = secs;
            }
        }
    }
}
