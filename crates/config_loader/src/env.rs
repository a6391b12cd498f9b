//! 环境变量覆盖
//!
//! `NOMAD_EVENTS_SINK_SINKS__BATCH__EVENTS_COUNT=50` -> `sinks.batch.events_count = 50`
//!
//! 优先级 (低 -> 高)：配置文件 < `NOMAD_ADDR` / `NOMAD_TOKEN` < 前缀变量。

use contracts::ContractError;
use toml::{Table, Value};

/// 默认环境变量前缀
pub const ENV_PREFIX: &str = "NOMAD_EVENTS_SINK_";

/// 将环境变量叠加到原始配置表
pub fn apply_overrides<I>(table: &mut Table, vars: I, prefix: &str) -> Result<(), ContractError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut prefixed = Vec::new();
    for (name, raw) in vars {
        match name.as_str() {
            "NOMAD_ADDR" => set_path(table, &["stream", "nomad_addr"], Value::String(raw))?,
            "NOMAD_TOKEN" => set_path(table, &["stream", "nomad_token"], Value::String(raw))?,
            _ => {
                if let Some(key) = name.strip_prefix(prefix) {
                    prefixed.push((key.to_lowercase(), raw));
                }
            }
        }
    }

    // 前缀变量最后应用，保证其优先级最高
    prefixed.sort();
    for (key, raw) in prefixed {
        let path: Vec<&str> = key.split("__").collect();
        if path.iter().any(|segment| segment.is_empty()) {
            return Err(ContractError::config_parse(format!(
                "invalid environment override key '{prefix}{}'",
                key.to_uppercase()
            )));
        }
        set_path(table, &path, parse_scalar(&raw))?;
    }
    Ok(())
}

/// 尝试按 TOML 字面量解析，失败则视为字符串
fn parse_scalar(raw: &str) -> Value {
    let wrapped = format!("v = {raw}");
    match toml::from_str::<Table>(&wrapped) {
        Ok(mut parsed) => parsed.remove("v").unwrap_or_else(|| Value::String(raw.to_string())),
        Err(_) => Value::String(raw.to_string()),
    }
}

fn set_path(table: &mut Table, path: &[&str], value: Value) -> Result<(), ContractError> {
    let Some((last, parents)) = path.split_last() else {
        return Ok(());
    };

    let mut current = table;
    for segment in parents {
        let entry = current
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        current = match entry {
            Value::Table(inner) => inner,
            _ => {
                return Err(ContractError::config_parse(format!(
                    "environment override '{}' conflicts with non-table key '{segment}'",
                    path.join(".")
                )))
            }
        };
    }
    current.insert((*last).to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_nested_override_typed() {
        let mut table: Table = toml::from_str("[sinks.batch]\nevents_count = 10").unwrap();
        apply_overrides(
            &mut table,
            vars(&[
                ("NOMAD_EVENTS_SINK_SINKS__BATCH__EVENTS_COUNT", "50"),
                ("NOMAD_EVENTS_SINK_APP__DATA_DIR", "/tmp/data"),
                ("NOMAD_EVENTS_SINK_STREAM__TOPICS", r#"["Node", "Job"]"#),
                ("UNRELATED", "x"),
            ]),
            ENV_PREFIX,
        )
        .unwrap();

        assert_eq!(table["sinks"]["batch"]["events_count"].as_integer(), Some(50));
        assert_eq!(table["app"]["data_dir"].as_str(), Some("/tmp/data"));
        assert_eq!(table["stream"]["topics"].as_array().map(Vec::len), Some(2));
        assert!(!table.contains_key("unrelated"));
    }

    #[test]
    fn test_prefixed_beats_nomad_addr() {
        let mut table = Table::new();
        apply_overrides(
            &mut table,
            vars(&[
                ("NOMAD_EVENTS_SINK_STREAM__NOMAD_ADDR", "http://prefixed:4646"),
                ("NOMAD_ADDR", "http://plain:4646"),
            ]),
            ENV_PREFIX,
        )
        .unwrap();
        assert_eq!(
            table["stream"]["nomad_addr"].as_str(),
            Some("http://prefixed:4646")
        );
    }

    #[test]
    fn test_conflicting_path_rejected() {
        let mut table: Table = toml::from_str("app = 1").unwrap();
        let result = apply_overrides(
            &mut table,
            vars(&[("NOMAD_EVENTS_SINK_APP__DATA_DIR", "x")]),
            ENV_PREFIX,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_duration_strings_stay_strings() {
        assert_eq!(parse_scalar("5s"), Value::String("5s".into()));
        assert_eq!(parse_scalar("true"), Value::Boolean(true));
        assert_eq!(parse_scalar("./data"), Value::String("./data".into()));
    }
}
