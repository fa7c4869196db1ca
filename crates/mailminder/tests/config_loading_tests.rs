//! Table-driven tests for configuration loading and validation.

use mailminder::config::{load_config, load_config_from_str};

/// Represents a single config loading test case.
struct ConfigTestCase {
    /// Test case name for identification.
    name: &'static str,
    /// The config YAML content to test.
    config_yaml: &'static str,
    /// Whether loading should succeed.
    should_succeed: bool,
    /// Expected error substring (if should_succeed is false).
    expected_error: Option<&'static str>,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_yaml: "version: \"1.0\"\n",
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_yaml: r##"
version: "1.0"
database:
  path: /var/lib/mailminder/mailminder.db
mail:
  host: imap.example.edu
  port: 993
  username: student@example.edu
  password_env_var: SCHOOL_MAIL_PASSWORD
  folder: INBOX
  batch_size: 25
model:
  base_url: http://localhost:11434/v1
  model: qwen2
  timeout_secs: 60
archive:
  enabled: true
  database_id: 0123456789abcdef
  max_attempts: 5
reminder:
  important_days_before: [3, 1]
  important_hours_before: [2]
  normal_days_before: [1]
  utc_offset_minutes: 480
  colors:
    important: "#FF0000"
    normal: "#0000FF"
    unimportant: "#00FF00"
keywords:
  important: [exam, deadline]
  normal: [meeting]
  unimportant: [lecture]
pipeline:
  analyze_concurrency: 4
  lock_ttl_secs: 120
server:
  bind: 127.0.0.1:8080
logging:
  level: debug
  format: json
"##,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "unsupported_version",
        config_yaml: "version: \"0.9\"\n",
        should_succeed: false,
        expected_error: Some("Unsupported config version"),
    },
    ConfigTestCase {
        name: "missing_version",
        config_yaml: "mail:\n  host: imap.example.edu\n",
        should_succeed: false,
        expected_error: Some("version"),
    },
    ConfigTestCase {
        name: "zero_batch_size",
        config_yaml: "version: \"1.0\"\nmail:\n  batch_size: 0\n",
        should_succeed: false,
        expected_error: Some("mail.batch_size"),
    },
    ConfigTestCase {
        name: "zero_attempts",
        config_yaml: "version: \"1.0\"\narchive:\n  max_attempts: 0\n",
        should_succeed: false,
        expected_error: Some("archive.max_attempts"),
    },
    ConfigTestCase {
        name: "archive_without_database",
        config_yaml: "version: \"1.0\"\narchive:\n  enabled: true\n",
        should_succeed: false,
        expected_error: Some("archive.database_id"),
    },
    ConfigTestCase {
        name: "bad_color",
        config_yaml: "version: \"1.0\"\nreminder:\n  colors:\n    important: red\n",
        should_succeed: false,
        expected_error: Some("reminder.colors.important"),
    },
    ConfigTestCase {
        name: "offset_beyond_a_day",
        config_yaml: "version: \"1.0\"\nreminder:\n  utc_offset_minutes: 1440\n",
        should_succeed: false,
        expected_error: Some("utc_offset_minutes"),
    },
    ConfigTestCase {
        name: "empty_keyword",
        config_yaml: "version: \"1.0\"\nkeywords:\n  important: [\"\"]\n",
        should_succeed: false,
        expected_error: Some("keywords.important"),
    },
    ConfigTestCase {
        name: "zero_concurrency",
        config_yaml: "version: \"1.0\"\npipeline:\n  analyze_concurrency: 0\n",
        should_succeed: false,
        expected_error: Some("analyze_concurrency"),
    },
    ConfigTestCase {
        name: "unknown_log_format",
        config_yaml: "version: \"1.0\"\nlogging:\n  format: xml\n",
        should_succeed: false,
        expected_error: None,
    },
];

#[test]
fn test_config_table() {
    for case in CONFIG_TESTS {
        let result = load_config_from_str(case.config_yaml);
        match (case.should_succeed, &result) {
            (true, Ok(_)) => {}
            (true, Err(e)) => panic!("[{}] expected success, got: {}", case.name, e),
            (false, Ok(_)) => panic!("[{}] expected failure, got success", case.name),
            (false, Err(e)) => {
                if let Some(expected) = case.expected_error {
                    assert!(
                        e.to_string().contains(expected),
                        "[{}] error '{}' does not contain '{}'",
                        case.name,
                        e,
                        expected
                    );
                }
            }
        }
    }
}

#[test]
fn test_full_config_values() {
    let case = CONFIG_TESTS
        .iter()
        .find(|c| c.name == "valid_full")
        .unwrap();
    let config = load_config_from_str(case.config_yaml).unwrap();

    assert_eq!(config.mail.batch_size, 25);
    assert_eq!(
        config.model.endpoint(),
        "http://localhost:11434/v1/chat/completions"
    );
    assert_eq!(config.archive.max_attempts, 5);
    assert_eq!(config.reminder.important_hours_before, vec![2]);
    assert_eq!(config.pipeline.lock_ttl_secs, 120);
    assert_eq!(config.server.bind, "127.0.0.1:8080");
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "version: \"1.0\"\nmail:\n  folder: Courses\n").unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.mail.folder, "Courses");
    assert_eq!(config.reminder.colors.unimportant, "#44FF44");
}
