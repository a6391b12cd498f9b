//! Topic selection for the event feed
//!
//! Entries are written as `Topic` or `Topic:Key`. Topic names are matched
//! case-insensitively and canonicalized to Nomad's spelling.

use std::fmt;

use crate::{ContractError, Event};

/// Wildcard matching every topic or every key
pub const WILDCARD: &str = "*";

/// Topics understood by the Nomad event stream
pub const KNOWN_TOPICS: &[&str] = &[
    WILDCARD,
    "ACLToken",
    "ACLPolicy",
    "ACLRole",
    "ACLAuthMethod",
    "ACLBindingRule",
    "Allocation",
    "CSIPlugin",
    "CSIVolume",
    "Deployment",
    "Evaluation",
    "HostVolume",
    "Job",
    "Node",
    "NodeDrain",
    "NodePool",
    "Operator",
    "Service",
];

/// A single `Topic:Key` subscription entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicSubscription {
    /// Canonical topic name
    pub topic: String,
    /// Filter key (`*` = all keys)
    pub key: String,
}

impl TopicSubscription {
    /// Parse `Topic` or `Topic:Key`
    pub fn parse(raw: &str) -> Result<Self, ContractError> {
        let raw = raw.trim();
        let (topic, key) = match raw.split_once(':') {
            Some((topic, key)) => (topic.trim(), key.trim()),
            None => (raw, WILDCARD),
        };

        if topic.is_empty() {
            return Err(ContractError::config_validation(
                "stream.topics",
                format!("empty topic in '{raw}'"),
            ));
        }
        if key.is_empty() || key.chars().any(char::is_whitespace) {
            return Err(ContractError::config_validation(
                "stream.topics",
                format!("invalid filter key in '{raw}'"),
            ));
        }

        let canonical = KNOWN_TOPICS
            .iter()
            .find(|known| known.eq_ignore_ascii_case(topic))
            .ok_or_else(|| {
                ContractError::config_validation(
                    "stream.topics",
                    format!("unknown topic '{topic}'"),
                )
            })?;

        Ok(Self {
            topic: (*canonical).to_string(),
            key: key.to_string(),
        })
    }

    /// Whether this entry selects the event
    pub fn matches(&self, event: &Event) -> bool {
        let topic_ok = self.topic == WILDCARD || self.topic.eq_ignore_ascii_case(&event.topic);
        if !topic_ok {
            return false;
        }
        if self.key == WILDCARD || self.key == event.key {
            return true;
        }
        event
            .filter_keys
            .as_ref()
            .is_some_and(|keys| keys.iter().any(|k| k == &self.key))
    }
}

impl fmt::Display for TopicSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.topic, self.key)
    }
}

/// Set of topic subscriptions; empty selects everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicFilter {
    entries: Vec<TopicSubscription>,
}

impl TopicFilter {
    /// Filter that selects every event
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a list of raw topic entries, dropping duplicates
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Result<Self, ContractError> {
        let mut entries: Vec<TopicSubscription> = Vec::with_capacity(raw.len());
        for item in raw {
            let entry = TopicSubscription::parse(item.as_ref())?;
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
        Ok(Self { entries })
    }

    /// Subscription entries
    pub fn entries(&self) -> &[TopicSubscription] {
        &self.entries
    }

    /// True when every topic is selected
    pub fn is_all(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the event passes the filter
    pub fn matches(&self, event: &Event) -> bool {
        self.is_all() || self.entries.iter().any(|entry| entry.matches(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonicalizes_topic() {
        let entry = TopicSubscription::parse("deployment").unwrap();
        assert_eq!(entry.topic, "Deployment");
        assert_eq!(entry.key, "*");

        let entry = TopicSubscription::parse("JOB:web").unwrap();
        assert_eq!(entry.to_string(), "Job:web");
    }

    #[test]
    fn test_parse_accepts_every_nomad_topic() {
        let topics = [
            "ACLToken",
            "ACLPolicy",
            "ACLRole",
            "ACLAuthMethod",
            "ACLBindingRule",
            "Allocation",
            "CSIPlugin",
            "CSIVolume",
            "Deployment",
            "Evaluation",
            "HostVolume",
            "Job",
            "Node",
            "NodeDrain",
            "NodePool",
            "Operator",
            "Service",
        ];
        for topic in topics {
            let entry = TopicSubscription::parse(topic).unwrap();
            assert_eq!(entry.topic, topic);
            let entry = TopicSubscription::parse(&topic.to_lowercase()).unwrap();
            assert_eq!(entry.topic, topic);
        }
    }

    #[test]
    fn test_parse_rejects_unknown_topic() {
        let err = TopicSubscription::parse("Deployments").unwrap_err();
        assert!(err.to_string().contains("unknown topic"));

        assert!(TopicSubscription::parse(":web").is_err());
        assert!(TopicSubscription::parse("Job:").is_err());
    }

    #[test]
    fn test_filter_matches_topic_and_key() {
        let filter = TopicFilter::parse(&["deployment", "Job:web"]).unwrap();

        assert!(filter.matches(&Event::new(1, "Deployment", "DeploymentStatusUpdate")));
        assert!(filter.matches(&Event::new(2, "Job", "JobRegistered").with_key("web")));
        assert!(!filter.matches(&Event::new(3, "Job", "JobRegistered").with_key("db")));
        assert!(!filter.matches(&Event::new(4, "Node", "NodeRegistration")));

        let mut keyed = Event::new(5, "Job", "JobRegistered").with_key("other");
        keyed.filter_keys = Some(vec!["web".to_string()]);
        assert!(filter.matches(&keyed));
    }

    #[test]
    fn test_empty_filter_selects_everything() {
        let filter = TopicFilter::parse::<&str>(&[]).unwrap();
        assert!(filter.is_all());
        assert!(filter.matches(&Event::new(1, "Node", "NodeDrain")));
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let filter = TopicFilter::parse(&["Node", "node", "NODE:*"]).unwrap();
        assert_eq!(filter.entries().len(), 1);
    }
}
