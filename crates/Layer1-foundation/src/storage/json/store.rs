//! JSON 파일 저장소
//!
//! 설정 파일(`menutree.json`)과 배치 파일을 읽고 쓴다

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

/// JSON 설정 저장소
#[derive(Debug, Clone)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// 글로벌 설정 (~/.config/menutree/)
    pub fn global() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Cannot find config directory".to_string()))?
            .join("menutree");
        Ok(Self::new(dir))
    }

    /// 프로젝트 설정 (.menutree/)
    pub fn project(root: impl Into<PathBuf>) -> Self {
        Self::new(root.into().join(".menutree"))
    }

    /// 현재 디렉토리 프로젝트 설정
    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("Cannot get current directory: {}", e)))?;
        Ok(Self::project(cwd))
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    /// 설정 디렉토리의 JSON 로드 (실패는 모두 Config)
    pub fn load<T: DeserializeOwned>(&self, filename: &str) -> Result<T> {
        read_json(&self.file_path(filename), Error::Config)
    }

    /// 호출자가 넘긴 JSON 문서 로드 (배치 파일 등).
    /// 설정이 아니라 입력이므로 읽기/파싱 실패는 모두 Validation.
    pub fn load_path<T: DeserializeOwned>(path: &Path) -> Result<T> {
        read_json(path, Error::Validation)
    }

    /// 없으면 None
    pub fn load_optional<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        if !self.exists(filename) {
            return Ok(None);
        }
        self.load(filename).map(Some)
    }

    /// 설정 디렉토리에 JSON 저장 (디렉토리가 없으면 만든다)
    pub fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir).map_err(|e| {
            Error::Config(format!("Cannot create {}: {}", self.base_dir.display(), e))
        })?;

        let path = self.file_path(filename);
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| Error::Config(format!("Cannot serialize {}: {}", filename, e)))?;
        std::fs::write(&path, content)
            .map_err(|e| Error::Config(format!("Cannot write {}: {}", path.display(), e)))
    }

    /// 파일 존재 여부
    pub fn exists(&self, filename: &str) -> bool {
        self.file_path(filename).exists()
    }
}

/// 파일을 읽어 역직렬화. `fail`이 에러 종류를 정한다.
fn read_json<T: DeserializeOwned>(path: &Path, fail: fn(String) -> Error) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| fail(format!("Cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| fail(format!("Cannot parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("nested"));

        assert!(store.load_optional::<Sample>("sample.json").unwrap().is_none());
        store.save("sample.json", &Sample { value: 7 }).unwrap();
        assert!(store.exists("sample.json"));
        assert_eq!(store.load::<Sample>("sample.json").unwrap(), Sample { value: 7 });
    }

    #[test]
    fn test_error_kind_follows_file_role() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        std::fs::write(store.file_path("broken.json"), "{ not json").unwrap();

        // 설정 디렉토리의 파일: Config
        assert!(matches!(store.load::<Sample>("broken.json"), Err(Error::Config(_))));
        assert!(matches!(store.load::<Sample>("missing.json"), Err(Error::Config(_))));

        // 호출자가 넘긴 문서: Validation
        let broken = store.file_path("broken.json");
        assert!(matches!(JsonStore::load_path::<Sample>(&broken), Err(Error::Validation(_))));
        let missing = dir.path().join("missing.json");
        assert!(matches!(JsonStore::load_path::<Sample>(&missing), Err(Error::Validation(_))));
    }
}
