//! MenuTree Config - 통합 설정
//!
//! 글로벌(`~/.config/menutree/`)과 프로젝트(`.menutree/`) 설정을 병합해서 사용

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// 설정 파일명
pub const MENUTREE_CONFIG_FILE: &str = "menutree.json";

/// 기본 DB 파일명
const DEFAULT_DB_FILE: &str = "menutree.db";

// ============================================================================
// MenuTree Config (통합)
// ============================================================================

/// MenuTree 통합 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuTreeConfig {
    /// 버전 (마이그레이션용)
    #[serde(default = "default_version")]
    pub version: u32,

    /// SQLite DB 경로 (없으면 데이터 디렉토리 사용)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// 최대 트리 깊이 (루트 = 1)
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// 쓰기 잠금 대기 시간 (ms)
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// code 검사를 건너뛰는 역할
    #[serde(default = "default_superuser_roles")]
    pub superuser_roles: BTreeSet<String>,

    /// 같은 부모 아래 동일한 name/chineseName 금지
    #[serde(default)]
    pub reject_duplicate_sibling_names: bool,
}

impl Default for MenuTreeConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            database_path: None,
            max_depth: default_max_depth(),
            busy_timeout_ms: default_busy_timeout_ms(),
            superuser_roles: default_superuser_roles(),
            reject_duplicate_sibling_names: false,
        }
    }
}

impl MenuTreeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        // 1. 글로벌 설정
        if let Ok(global) = JsonStore::global() {
            if let Some(global_config) =
                global.load_optional::<MenuTreeConfig>(MENUTREE_CONFIG_FILE)?
            {
                config.merge(global_config);
            }
        }

        // 2. 프로젝트 설정
        if let Ok(project) = JsonStore::current_project() {
            if let Some(project_config) =
                project.load_optional::<MenuTreeConfig>(MENUTREE_CONFIG_FILE)?
            {
                config.merge(project_config);
            }
        }

        Ok(config)
    }

    /// 특정 디렉토리에서만 로드
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        let mut config = Self::new();
        if let Some(loaded) = store.load_optional::<MenuTreeConfig>(MENUTREE_CONFIG_FILE)? {
            config.merge(loaded);
        }
        Ok(config)
    }

    /// 프로젝트 설정 저장
    pub fn save_project(&self) -> Result<()> {
        let store = JsonStore::current_project()?;
        store.save(MENUTREE_CONFIG_FILE, self)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// 다른 설정과 병합 (other가 우선)
    pub fn merge(&mut self, other: MenuTreeConfig) {
        if other.database_path.is_some() {
            self.database_path = other.database_path;
        }
        if other.max_depth != default_max_depth() {
            self.max_depth = other.max_depth;
        }
        if other.busy_timeout_ms != default_busy_timeout_ms() {
            self.busy_timeout_ms = other.busy_timeout_ms;
        }
        if other.superuser_roles != default_superuser_roles() {
            self.superuser_roles = other.superuser_roles;
        }
        if other.reject_duplicate_sibling_names {
            self.reject_duplicate_sibling_names = true;
        }
    }

    /// 실제 사용할 DB 경로
    pub fn resolved_database_path(&self) -> PathBuf {
        match &self.database_path {
            Some(path) => path.clone(),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("menutree")
                .join(DEFAULT_DB_FILE),
        }
    }

    /// 역할 집합에 슈퍼유저 역할이 포함되는지
    pub fn is_superuser<'a>(&self, roles: impl IntoIterator<Item = &'a String>) -> bool {
        roles.into_iter().any(|r| self.superuser_roles.contains(r))
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn busy_timeout_ms(mut self, ms: u64) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    pub fn superuser_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.superuser_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn reject_duplicate_sibling_names(mut self, reject: bool) -> Self {
        self.reject_duplicate_sibling_names = reject;
        self
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn default_version() -> u32 {
    1
}

fn default_max_depth() -> usize {
    8
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_superuser_roles() -> BTreeSet<String> {
    ["admin", "super_admin"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = MenuTreeConfig::new();
        assert_eq!(config.version, 1);
        assert_eq!(config.max_depth, 8);
        assert!(config.superuser_roles.contains("admin"));
        assert!(config.superuser_roles.contains("super_admin"));
        assert!(!config.reject_duplicate_sibling_names);
    }

    #[test]
    fn test_config_merge() {
        let mut base = MenuTreeConfig::new().database_path("/var/lib/menutree/a.db");

        let overlay = MenuTreeConfig::new()
            .max_depth(4)
            .reject_duplicate_sibling_names(true);

        base.merge(overlay);

        assert_eq!(base.database_path, Some(PathBuf::from("/var/lib/menutree/a.db")));
        assert_eq!(base.max_depth, 4);
        assert!(base.reject_duplicate_sibling_names);
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        store
            .save(
                MENUTREE_CONFIG_FILE,
                &serde_json::json!({ "superuserRoles": ["principal"], "busyTimeoutMs": 100 }),
            )
            .unwrap();

        let config = MenuTreeConfig::load_from(&store).unwrap();
        assert!(config.is_superuser(&["principal".to_string()]));
        assert!(!config.is_superuser(&["admin".to_string()]));
        assert_eq!(config.busy_timeout_ms, 100);
        assert_eq!(config.max_depth, 8);
    }
}
