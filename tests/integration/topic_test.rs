//! Topic and webhook validation through the public API.

use hookdb::model::{derive_key, TopicConfig, WebhookConfig};
use hookdb::validation::{is_url, validate_topic_config, validate_webhook_set, ValidationError};

fn webhook(url: &str, subscription: &str, subscription_type: &str) -> WebhookConfig {
    let mut hook = WebhookConfig::new(url);
    hook.subscription = subscription.to_string();
    hook.subscription_type = subscription_type.to_string();
    hook
}

#[test]
fn test_url_checks() {
    assert!(is_url("https://example.com/hook"));
    assert!(!is_url("not-a-url"));
    assert!(!is_url(""));
}

#[test]
fn test_duplicate_exclusive_subscriptions_rejected() {
    let hooks = vec![
        webhook("https://a.example.com/hook", "sub1", "exclusive"),
        webhook("https://b.example.com/hook", "sub1", ""),
    ];
    assert_eq!(
        validate_webhook_set(&hooks),
        Err(ValidationError::DuplicateExclusiveSubscription(
            "sub1".to_string()
        ))
    );
}

#[test]
fn test_shared_and_exclusive_with_distinct_names_accepted() {
    let hooks = vec![
        webhook("https://a.example.com/hook", "sub1", "shared"),
        webhook("https://b.example.com/hook", "sub2", "exclusive"),
    ];
    assert_eq!(validate_webhook_set(&hooks), Ok(()));
}

#[test]
fn test_topic_key_derived_from_tenant_and_topic() {
    let mut topic = TopicConfig::new(
        "acme",
        "persistent://acme/ns/orders",
        "pulsar://localhost:6650",
        "",
    );
    topic.webhooks = vec![WebhookConfig::new("https://example.com/hook")];

    let key = validate_topic_config(&topic).unwrap();
    assert_eq!(key, derive_key("acme", "persistent://acme/ns/orders"));
    assert_eq!(key, topic.key);
}

#[test]
fn test_topic_with_bad_webhook_rejected() {
    let mut topic = TopicConfig::new("acme", "orders", "pulsar://localhost:6650", "");
    topic.webhooks = vec![webhook("not-a-url", "sub1", "exclusive")];
    assert_eq!(
        validate_topic_config(&topic),
        Err(ValidationError::InvalidUrl("not-a-url".to_string()))
    );
}
