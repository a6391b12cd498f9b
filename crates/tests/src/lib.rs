//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置到管道的契约测试
//! - Mock 事件流 e2e 场景（无需 Nomad）
//! - 随机序列下的不丢失 / 不乱序属性

#[cfg(test)]
mod support;

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use stream::ConsumerConfig;

    #[test]
    fn test_config_drives_consumer_and_worker() {
        let config = ConfigLoader::load_from_str(
            r#"
[app]
data_dir = "/var/lib/nes"

[stream]
topics = ["deployment", "Job:web"]
max_reconnect_attempts = 2

[sinks.batch]
events_count = 3
"#,
            ConfigFormat::Toml,
        )
        .unwrap();

        let consumer = ConsumerConfig::from_section(&config.stream).unwrap();
        assert_eq!(consumer.topics.entries().len(), 2);
        assert!(consumer.budget.is_exhausted(3));
        assert!(!consumer.budget.is_exhausted(2));
        assert_eq!(config.sinks.batch.events_count, 3);
    }
}

#[cfg(test)]
mod e2e_tests;

#[cfg(test)]
mod property_tests;
