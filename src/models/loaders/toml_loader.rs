use crate::error::{AppError, AppResult, FileError};
use crate::models::account::{AccountRegistry, RegistryFile};
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载账号表并校验
pub async fn load_account_registry(path: &Path) -> AppResult<AccountRegistry> {
    if !path.exists() {
        return Err(FileError::NotFound {
            path: path.display().to_string(),
        }
        .into());
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::io(path, e))?;

    let registry = parse_account_registry(&content).map_err(|e| match e {
        AppError::File(FileError::TomlParseFailed { source, .. }) => {
            AppError::File(FileError::TomlParseFailed {
                path: path.display().to_string(),
                source,
            })
        }
        other => other,
    })?;

    tracing::info!(
        "成功加载 {} 个账号: {}",
        registry.len(),
        path.file_name().unwrap_or_default().to_string_lossy()
    );

    Ok(registry)
}

/// 解析账号表文本
pub fn parse_account_registry(content: &str) -> AppResult<AccountRegistry> {
    let file: RegistryFile = toml::from_str(content).map_err(|source| {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(),
            source,
        })
    })?;
    AccountRegistry::new(file.accounts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[accounts]]
profile = "Profile 59"
brand = "青鹤谷"
operation = true

[[accounts]]
profile = "Profile 41"
brand = "流杯酒肆"
cpc = true
"#;

    #[test]
    fn parses_sample_registry() {
        let registry = parse_account_registry(SAMPLE).unwrap();
        assert_eq!(registry.len(), 2);
        let first = registry.get("Profile 59").unwrap();
        assert!(!first.cpc);
        assert!(first.operation);
        // operation 缺省为开启
        assert!(registry.get("Profile 41").unwrap().operation);
    }

    #[test]
    fn missing_brand_is_a_parse_error() {
        let err = parse_account_registry("[[accounts]]\nprofile = \"Profile 1\"\n").unwrap_err();
        assert!(matches!(err, AppError::File(FileError::TomlParseFailed { .. })));
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = load_account_registry(Path::new("definitely/not/here.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::File(FileError::NotFound { .. })));
    }
}
