//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。
//! 两种格式都先解析为 `toml::Table`，以便叠加环境变量覆盖。

use contracts::{AppConfig, ContractError};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析 TOML 格式配置为原始表
pub fn parse_toml(content: &str) -> Result<toml::Table, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置为原始表
///
/// TOML 没有 `null`：值为 `null` 的字段视为未设置。
pub fn parse_json(content: &str) -> Result<toml::Table, ContractError> {
    let json_error = |e: serde_json::Error| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    };

    let mut value: serde_json::Value = serde_json::from_str(content).map_err(json_error)?;
    strip_nulls(&mut value);
    serde_json::from_value(value).map_err(json_error)
}

fn strip_nulls(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        serde_json::Value::Array(items) => {
            items.retain(|v| !v.is_null());
            items.iter_mut().for_each(strip_nulls);
        }
        _ => {}
    }
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<toml::Table, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

/// 将原始表转换为强类型配置 (拒绝未知字段)
pub fn into_config(table: toml::Table) -> Result<AppConfig, ContractError> {
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ContractError::ConfigParse {
            message: format!("invalid configuration: {e}"),
            source: Some(Box::new(e)),
        })
}
