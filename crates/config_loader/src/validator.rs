//! 配置校验模块
//!
//! 校验规则：
//! - 字段级约束 (validator derive)：events_count > 0、provider 名称非空等
//! - 时间间隔 > 0，reconnect_backoff_min <= reconnect_backoff_max
//! - topic 过滤项合法
//! - provider 名称唯一，必填参数齐全，external_labels 语法合法

use std::collections::HashSet;
use std::time::Duration;

use contracts::{AppConfig, ContractError, LabelSet, ProviderType, TopicFilter};
use validator::{Validate, ValidationErrors};

/// 校验 AppConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &AppConfig) -> Result<(), ContractError> {
    config.validate().map_err(|e| first_field_error(&e))?;
    validate_intervals(config)?;
    validate_topics(config)?;
    validate_providers(config)?;
    Ok(())
}

/// 将 validator 错误转换为第一条字段错误
fn first_field_error(errors: &ValidationErrors) -> ContractError {
    let mut rendered = errors.to_string();
    if let Some(first) = rendered.lines().next() {
        rendered = first.to_string();
    }
    let field = rendered
        .split(':')
        .next()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or("config")
        .to_string();
    ContractError::config_validation(field, rendered)
}

fn require_positive(field: &str, value: Duration) -> Result<(), ContractError> {
    if value.is_zero() {
        return Err(ContractError::config_validation(
            field,
            "duration must be > 0",
        ));
    }
    Ok(())
}

/// 校验时间间隔
fn validate_intervals(config: &AppConfig) -> Result<(), ContractError> {
    require_positive("app.commit_index_interval", config.app.commit_index_interval)?;
    require_positive("sinks.batch.idle_timeout", config.sinks.batch.idle_timeout)?;
    require_positive("sinks.batch.push_timeout", config.sinks.batch.push_timeout)?;
    require_positive(
        "stream.reconnect_backoff_min",
        config.stream.reconnect_backoff_min,
    )?;

    let stream = &config.stream;
    if stream.reconnect_backoff_min > stream.reconnect_backoff_max {
        return Err(ContractError::config_validation(
            "stream.reconnect_backoff_min / stream.reconnect_backoff_max",
            format!(
                "reconnect_backoff_min ({:?}) must be <= reconnect_backoff_max ({:?})",
                stream.reconnect_backoff_min, stream.reconnect_backoff_max
            ),
        ));
    }
    Ok(())
}

/// 校验 topic 过滤项
fn validate_topics(config: &AppConfig) -> Result<(), ContractError> {
    TopicFilter::parse(&config.stream.topics).map(|_| ())
}

/// 校验 provider 配置
fn validate_providers(config: &AppConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, provider) in config.sinks.providers.iter().enumerate() {
        if !seen.insert(provider.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks.providers[{idx}].name"),
                format!("duplicate provider name '{}'", provider.name),
            ));
        }

        let required: &[&str] = match provider.provider_type {
            ProviderType::Log => &[],
            ProviderType::File => &["path"],
            ProviderType::Http => &["root_url"],
        };
        for key in required {
            let present = provider
                .params
                .get(*key)
                .is_some_and(|v| !v.trim().is_empty());
            if !present {
                return Err(ContractError::config_validation(
                    format!("sinks.providers[{}].params.{key}", provider.name),
                    format!("'{key}' is required for {:?} providers", provider.provider_type),
                ));
            }
        }

        if let Some(raw) = provider.params.get("external_labels") {
            LabelSet::parse(raw).map_err(|e| {
                ContractError::config_validation(
                    format!("sinks.providers[{}].params.external_labels", provider.name),
                    e.to_string(),
                )
            })?;
        }
    }
    Ok(())
}
