//! CLI command implementations
//!
//! Every command except `init` boots the same way:
//! 1. Configuration load and validation
//! 2. Log level applied
//! 3. Schema load from `schema_dir`
//! 4. Validator construction (eager compile when configured)

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::{FaultPolicy, ValidatorConfig};
use crate::observability::{log_event_with_fields, Event, Logger, Severity};
use crate::schema::{decode_message, SchemaFile, SchemaLoader};
use crate::validator::{ValidateError, Validator};
use crate::value::parse_timestamp;

use super::args::Command;
use super::errors::{CliError, CliErrorCode, CliResult};
use super::io::{error_response, ok_response, read_requests, write_line_to, write_response, Request};

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory of schema descriptor documents (required)
    pub schema_dir: String,

    /// "abort" or "report" (optional, default "abort")
    #[serde(default = "default_fault_policy")]
    pub fault_policy: String,

    /// Compile every type at startup (optional, default false)
    #[serde(default)]
    pub eager_compile: bool,

    /// Fixed RFC 3339 evaluation time (optional, default wall clock)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<String>,

    /// Minimum log severity (optional, default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_fault_policy() -> String {
    "abort".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Default configuration for a schema directory
    pub fn new(schema_dir: impl Into<String>) -> Self {
        Self {
            schema_dir: schema_dir.into(),
            fault_policy: default_fault_policy(),
            eager_compile: false,
            now: None,
            log_level: default_log_level(),
        }
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate field values
    pub fn validate(&self) -> CliResult<()> {
        if self.schema_dir.trim().is_empty() {
            return Err(CliError::config_error("schema_dir must not be empty"));
        }
        self.policy()?;
        self.severity()?;
        self.fixed_now()?;
        Ok(())
    }

    /// Get schema directory as Path
    pub fn schema_path(&self) -> &Path {
        Path::new(&self.schema_dir)
    }

    fn policy(&self) -> CliResult<FaultPolicy> {
        self.fault_policy.parse().map_err(CliError::config_error)
    }

    fn severity(&self) -> CliResult<Severity> {
        self.log_level.parse().map_err(CliError::config_error)
    }

    fn fixed_now(&self) -> CliResult<Option<chrono::DateTime<chrono::Utc>>> {
        match &self.now {
            None => Ok(None),
            Some(text) => parse_timestamp(text).map(Some).ok_or_else(|| {
                CliError::config_error(format!(
                    "Invalid now: '{}'. Must be an RFC 3339 timestamp.",
                    text
                ))
            }),
        }
    }

    /// Library settings described by this file
    pub fn to_validator_config(&self) -> CliResult<ValidatorConfig> {
        let mut config = ValidatorConfig::new().with_fault_policy(self.policy()?);
        if let Some(now) = self.fixed_now()? {
            config = config.with_now(now);
        }
        if self.eager_compile {
            config = config.eager();
        }
        Ok(config)
    }
}

const SAMPLE_SCHEMA: &str = r#"{
    "package": "example.v1",
    "messages": [
        {
            "name": "User",
            "fields": [
                {"name": "id", "type": "string", "rules": {"string": {"uuid": true}}},
                {"name": "email", "type": "string", "rules": {"string": {"email": true}}},
                {"name": "age", "type": "uint32", "rules": {"uint32": {"lte": 150}}}
            ],
            "rules": {"required": ["id", "email"]}
        }
    ]
}"#;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config } => init(&config),
        Command::Check { config } => check(&config),
        Command::Validate { config, type_name } => validate(&config, &type_name),
        Command::Explain { config, type_name } => explain(&config, &type_name),
    }
}

/// Write a default configuration and a schema directory holding a sample
/// descriptor
///
/// The schema directory is created next to the configuration file. An
/// existing configuration file is never overwritten.
pub fn init(config_path: &Path) -> CliResult<()> {
    if config_path.exists() {
        return Err(CliError::already_initialized(config_path));
    }

    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let schema_dir = base.join("schemas");
    let config = Config::new(schema_dir.display().to_string());

    let sample: SchemaFile = serde_json::from_str(SAMPLE_SCHEMA)?;
    let loader = SchemaLoader::new(&schema_dir);
    let sample_path = loader.save_file("example", &sample)?;

    fs::write(config_path, serde_json::to_string_pretty(&config)?)
        .map_err(|e| CliError::config_error(format!("Failed to write config: {}", e)))?;

    write_response(json!({
        "initialized": true,
        "config": config_path.display().to_string(),
        "schema_dir": config.schema_dir,
        "sample": sample_path.display().to_string(),
    }))
}

/// Load every schema and compile every type
pub fn check(config_path: &Path) -> CliResult<()> {
    let (validator, files) = boot(config_path)?;
    validator.compile_all()?;

    write_response(json!({
        "files": files,
        "messages": validator.schema().message_count(),
        "enums": validator.schema().enum_count(),
        "metrics": validator.metrics().snapshot(),
    }))
}

/// Validate one JSON instance of `type_name` per stdin line
///
/// Each line gets exactly one response line. Malformed JSON, decode
/// failures, violations and faults are responses; only I/O failures end the
/// loop, and they fail the command.
pub fn validate(config_path: &Path, type_name: &str) -> CliResult<()> {
    let (validator, _) = boot(config_path)?;
    validator.compiled(type_name)?;

    let mut out = io::stdout().lock();
    let outcome = validate_lines(&validator, type_name, read_requests(), &mut out);
    log_event_with_fields(
        Event::ValidateFinished,
        &[("type", type_name), ("metrics", &validator.metrics().to_json())],
    );
    outcome
}

/// Answer every request line on `out`
pub fn validate_lines<I, W>(
    validator: &Validator,
    type_name: &str,
    requests: I,
    out: &mut W,
) -> CliResult<()>
where
    I: IntoIterator<Item = io::Result<Request>>,
    W: Write,
{
    for request in requests {
        match request {
            Ok(Ok(instance)) => {
                write_line_to(out, &validate_instance(validator, type_name, &instance))?;
            }
            Ok(Err(e)) => {
                let response = error_response(CliErrorCode::InvalidJson.code(), &e.to_string());
                write_line_to(out, &with_request_id(response))?;
            }
            Err(e) => {
                let err = CliError::from(e);
                write_line_to(out, &error_response(err.code_str(), err.message()))?;
                return Err(err);
            }
        }
    }
    Ok(())
}

/// Response line for one instance
pub fn validate_instance(validator: &Validator, type_name: &str, instance: &Value) -> Value {
    let response = match decode_message(validator.schema(), type_name, instance) {
        Err(e) => error_response(e.code(), &e.to_string()),
        Ok(message) => match validator.validate(&message) {
            Ok(result) => ok_response(json!({
                "valid": result.is_valid(),
                "violations": result.violations,
                "faults": result.faults,
            })),
            Err(ValidateError::Fault(fault)) => {
                error_response("PROTOGUARD_EVALUATION_FAULT", &fault.to_string())
            }
            Err(e) => error_response(e.code(), &e.to_string()),
        },
    };
    with_request_id(response)
}

/// Tags a response line with a fresh request id
fn with_request_id(mut response: Value) -> Value {
    if let Value::Object(fields) = &mut response {
        fields.insert("request_id".to_string(), json!(Uuid::new_v4().to_string()));
    }
    response
}

/// Print the compiled rules of a type in evaluation order
pub fn explain(config_path: &Path, type_name: &str) -> CliResult<()> {
    let (validator, _) = boot(config_path)?;
    let rules = validator.explain(type_name)?;

    write_response(json!({
        "type": type_name,
        "rules": rules,
    }))
}

/// Load configuration and schemas, returning the validator and the number
/// of descriptor files read
fn boot(config_path: &Path) -> CliResult<(Validator, usize)> {
    let config = Config::load(config_path)?;
    Logger::set_min_severity(config.severity()?);
    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            ("path", &config_path.display().to_string()),
            ("schema_dir", &config.schema_dir),
            ("fault_policy", &config.fault_policy),
        ],
    );

    let mut loader = SchemaLoader::new(config.schema_path());
    loader.load_all()?;
    let files = loader.file_count();

    let validator = Validator::with_config(loader.into_schema(), config.to_validator_config()?)?;
    Ok((validator, files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::io::parse_lines;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("protoguard.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_config_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, r#"{"schema_dir": "./schemas"}"#);
        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::new("./schemas"));
        assert_eq!(config.to_validator_config().unwrap(), ValidatorConfig::default());
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let dir = TempDir::new().unwrap();

        let path = write_config(&dir, r#"{"schema_dir": "s", "fault_policy": "ignore"}"#);
        let err = Config::load(&path).unwrap_err();
        assert!(err.message().contains("fault_policy"));

        let path = write_config(&dir, r#"{"schema_dir": "s", "now": "yesterday"}"#);
        assert!(Config::load(&path).is_err());

        let path = write_config(&dir, r#"{"schema_dir": "s", "log_level": "loud"}"#);
        assert!(Config::load(&path).is_err());

        let path = write_config(&dir, r#"{"schema_dir": ""}"#);
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_config_to_validator_config() {
        let mut config = Config::new("s");
        config.fault_policy = "report".into();
        config.now = Some("2024-01-01T00:00:00Z".into());
        config.eager_compile = true;

        let vc = config.to_validator_config().unwrap();
        assert_eq!(vc.fault_policy, FaultPolicy::Report);
        assert_eq!(vc.now, parse_timestamp("2024-01-01T00:00:00Z"));
        assert!(vc.eager);
    }

    #[test]
    fn test_init_then_boot() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("protoguard.json");

        init(&config_path).unwrap();
        assert!(dir.path().join("schemas").join("example.json").exists());
        assert!(init(&config_path).is_err());

        let (validator, files) = boot(&config_path).unwrap();
        assert_eq!(files, 1);
        validator.compile_all().unwrap();
        assert!(validator.schema().message("example.v1.User").is_some());
    }

    #[test]
    fn test_validate_instance_responses() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("protoguard.json");
        init(&config_path).unwrap();
        let (validator, _) = boot(&config_path).unwrap();

        let ok = validate_instance(
            &validator,
            "example.v1.User",
            &json!({"id": "0b7b3f4e-5a49-4d2e-9f1a-6c1d2f3e4a5b", "email": "a@b.io", "age": 30}),
        );
        assert_eq!(ok["status"], "ok");
        assert_eq!(ok["data"]["valid"], true);

        let bad = validate_instance(&validator, "example.v1.User", &json!({"email": "nope", "age": 200}));
        assert_eq!(bad["data"]["valid"], false);
        let ids: Vec<&str> = bad["data"]["violations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["constraint_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["required", "string.email", "uint32.lte"]);

        let undecodable = validate_instance(&validator, "example.v1.User", &json!({"nickname": "x"}));
        assert_eq!(undecodable["status"], "error");
        assert_eq!(undecodable["code"], "PROTOGUARD_DECODE_UNKNOWN_FIELD");

        for response in [&ok, &bad, &undecodable] {
            assert!(Uuid::parse_str(response["request_id"].as_str().unwrap()).is_ok());
        }
        assert_ne!(ok["request_id"], bad["request_id"]);
    }

    #[test]
    fn test_fault_response_has_request_id() {
        let dir = TempDir::new().unwrap();
        let schema_dir = dir.path().join("schemas");
        fs::create_dir(&schema_dir).unwrap();
        fs::write(
            schema_dir.join("ratio.json"),
            r#"{"messages": [{"name": "a.Ratio", "fields": [{"name": "n", "type": "int64"}],
                "rules": {"cel": [{"id": "ratio", "expression": "10 / this.n > 1"}]}}]}"#,
        )
        .unwrap();
        let config_path = write_config(
            &dir,
            &json!({"schema_dir": schema_dir.display().to_string()}).to_string(),
        );
        let (validator, _) = boot(&config_path).unwrap();

        let fault = validate_instance(&validator, "a.Ratio", &json!({"n": 0}));
        assert_eq!(fault["status"], "error");
        assert_eq!(fault["code"], "PROTOGUARD_EVALUATION_FAULT");
        assert!(fault["request_id"].is_string());
    }

    #[test]
    fn test_bad_line_is_answered_and_skipped() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("protoguard.json");
        init(&config_path).unwrap();
        let (validator, _) = boot(&config_path).unwrap();

        let input = concat!(
            r#"{"id": "0b7b3f4e-5a49-4d2e-9f1a-6c1d2f3e4a5b", "email": "a@b.io"}"#,
            "\n{not json\n",
            r#"{"id": "0b7b3f4e-5a49-4d2e-9f1a-6c1d2f3e4a5b", "email": "bad"}"#,
            "\n",
        );
        let mut out = Vec::new();
        validate_lines(
            &validator,
            "example.v1.User",
            parse_lines(io::Cursor::new(input)),
            &mut out,
        )
        .unwrap();

        let lines: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["status"], "ok");
        assert_eq!(lines[0]["data"]["valid"], true);
        assert_eq!(lines[1]["status"], "error");
        assert_eq!(lines[1]["code"], "PROTOGUARD_CLI_INVALID_JSON");
        assert_eq!(lines[2]["status"], "ok");
        assert_eq!(lines[2]["data"]["valid"], false);
        assert!(lines.iter().all(|l| l["request_id"].is_string()));
    }

    #[test]
    fn test_read_failure_ends_validation() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("protoguard.json");
        init(&config_path).unwrap();
        let (validator, _) = boot(&config_path).unwrap();

        let requests = vec![
            Ok(Ok(json!({"email": "a@b.io"}))),
            Err(io::Error::new(io::ErrorKind::InvalidData, "stream did not contain valid UTF-8")),
            Ok(Ok(json!({"email": "c@d.io"}))),
        ];
        let mut out = Vec::new();
        let err = validate_lines(&validator, "example.v1.User", requests, &mut out).unwrap_err();
        assert_eq!(err.code_str(), "PROTOGUARD_CLI_IO_ERROR");

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("PROTOGUARD_CLI_IO_ERROR"));
    }
}
