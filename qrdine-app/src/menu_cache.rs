//! MenuCache - 菜单快照缓存
//!
//! 每个餐厅一个 JSON 文件: `{cache_dir}/menu/{restaurant_id}.json`。
//! 只用于加快首屏展示，网络结果返回后覆盖；从不作为写入路径。

use std::path::{Path, PathBuf};

use shared::models::MenuSnapshot;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 缓存文件结构
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct CachedMenu {
    restaurant_id: String,
    /// 写入时间 (Unix millis)
    saved_at: i64,
    snapshot: MenuSnapshot,
}

/// 菜单快照缓存
#[derive(Debug, Clone)]
pub struct MenuCache {
    dir: PathBuf,
}

impl MenuCache {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            dir: cache_dir.join("menu"),
        }
    }

    fn file_path(&self, restaurant_id: &str) -> Result<PathBuf, CacheError> {
        // 餐厅 ID 直接作为文件名，拒绝路径分隔符
        if restaurant_id.is_empty()
            || restaurant_id.contains(['/', '\\'])
            || restaurant_id.starts_with('.')
        {
            return Err(CacheError::InvalidKey(restaurant_id.to_string()));
        }
        Ok(self.dir.join(format!("{restaurant_id}.json")))
    }

    /// 读取快照；不存在时返回 None
    pub fn load(&self, restaurant_id: &str) -> Result<Option<MenuSnapshot>, CacheError> {
        let path = self.file_path(restaurant_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let cached: CachedMenu = serde_json::from_str(&content)?;
        Ok(Some(cached.snapshot))
    }

    /// 覆盖写入快照
    pub fn save(&self, restaurant_id: &str, snapshot: &MenuSnapshot) -> Result<(), CacheError> {
        let path = self.file_path(restaurant_id)?;
        std::fs::create_dir_all(&self.dir)?;

        let cached = CachedMenu {
            restaurant_id: restaurant_id.to_string(),
            saved_at: chrono::Utc::now().timestamp_millis(),
            snapshot: snapshot.clone(),
        };
        let content = serde_json::to_string_pretty(&cached)?;

        // 先写临时文件再替换，避免读到半截内容
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn remove(&self, restaurant_id: &str) -> Result<(), CacheError> {
        let path = self.file_path(restaurant_id)?;
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
