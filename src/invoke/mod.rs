//! Run configurations — the immutable description of one local invocation.

pub mod runtime;
pub mod template;

pub use runtime::{Runtime, RuntimeFamily, SUPPORTED_RUNTIMES};
pub use template::SamTemplate;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

const DEFAULT_TIMEOUT_SECS: u64 = 900;

// ─── Validation report ───────────────────────────────────────────────────────

/// One rejected field and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

/// Outcome of `RunConfiguration::validate` — either clean or a list of field
/// errors. Returned, never thrown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn reject(&mut self, field: &str, reason: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            reason: reason.into(),
        });
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.errors.is_empty() {
            return f.write_str("ok");
        }
        let joined = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.reason))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

// ─── Run configuration ───────────────────────────────────────────────────────

/// Template-based invocation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateTarget {
    pub path: PathBuf,
    pub logical_id: String,
}

/// What to run and how. Immutable once built; `validate()` gates every
/// launch. Exactly one of `handler` / `template` must be set — both fields
/// exist so a half-edited configuration is representable and the validator
/// can say precisely what is wrong with it.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub handler: Option<String>,
    pub template: Option<TemplateTarget>,
    /// Raw input payload passed to the function.
    pub input: String,
    /// User environment variables; keys unique, insertion-independent order.
    pub env: BTreeMap<String, String>,
    /// Required for handler-based runs; template-based runs read the
    /// resource's declared runtime.
    pub runtime_id: Option<String>,
    pub region_id: String,
    pub credentials_id: Option<String>,
    pub timeout_secs: u64,
}

impl RunConfiguration {
    pub fn builder() -> RunConfigurationBuilder {
        RunConfigurationBuilder::default()
    }

    /// The effective runtime: the configured one, or the template resource's.
    /// Only meaningful after `validate()` passed.
    pub fn runtime(&self) -> Option<Runtime> {
        if let Some(ref id) = self.runtime_id {
            return Runtime::from_id(id);
        }
        let target = self.template.as_ref()?;
        let template = SamTemplate::load(&target.path).ok()?;
        let resource = template.function(&target.logical_id)?;
        Runtime::from_id(resource.properties.runtime.as_deref()?)
    }

    /// Validate the configuration. Pure aside from reading the template
    /// file; nothing is spawned and no network is touched.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::ok();

        match (&self.handler, &self.template) {
            (Some(_), Some(_)) => {
                report.reject(
                    "target",
                    "both a handler reference and a template target are set; pick one",
                );
            }
            (None, None) => {
                report.reject("target", "neither a handler reference nor a template target is set");
            }
            (Some(handler), None) => {
                if handler.trim().is_empty() {
                    report.reject("handler", "handler reference is empty");
                }
                match &self.runtime_id {
                    None => report.reject("runtime", "handler-based runs must set a runtime"),
                    Some(id) if Runtime::from_id(id).is_none() => {
                        report.reject("runtime", format!("unsupported runtime: {id}"));
                    }
                    Some(_) => {}
                }
            }
            (None, Some(target)) => self.validate_template(target, &mut report),
        }

        if self.timeout_secs == 0 {
            report.reject("timeout", "timeout must be greater than zero");
        }

        report
    }

    fn validate_template(&self, target: &TemplateTarget, report: &mut ValidationReport) {
        let template = match SamTemplate::load(&target.path) {
            Ok(template) => template,
            Err(e) => {
                report.reject("template", e.to_string());
                return;
            }
        };

        let Some(resource) = template.function(&target.logical_id) else {
            report.reject(
                "logical_id",
                format!(
                    "no invocable function resource '{}' in {}",
                    target.logical_id,
                    target.path.display()
                ),
            );
            return;
        };

        if resource.properties.handler.is_none() {
            report.reject(
                "logical_id",
                format!("resource '{}' declares no handler", target.logical_id),
            );
        }
        match resource.properties.runtime.as_deref() {
            None => report.reject(
                "logical_id",
                format!("resource '{}' declares no runtime", target.logical_id),
            ),
            Some(id) if Runtime::from_id(id).is_none() => {
                report.reject("runtime", format!("unsupported runtime: {id}"));
            }
            Some(_) => {}
        }
    }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RunConfigurationBuilder {
    handler: Option<String>,
    template: Option<TemplateTarget>,
    input: String,
    env: BTreeMap<String, String>,
    runtime_id: Option<String>,
    region_id: Option<String>,
    credentials_id: Option<String>,
    timeout_secs: Option<u64>,
}

impl RunConfigurationBuilder {
    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn template(mut self, path: impl Into<PathBuf>, logical_id: impl Into<String>) -> Self {
        self.template = Some(TemplateTarget {
            path: path.into(),
            logical_id: logical_id.into(),
        });
        self
    }

    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    /// Add one environment variable. Re-setting a key replaces its value.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn runtime(mut self, runtime_id: impl Into<String>) -> Self {
        self.runtime_id = Some(runtime_id.into());
        self
    }

    pub fn region(mut self, region_id: impl Into<String>) -> Self {
        self.region_id = Some(region_id.into());
        self
    }

    pub fn credentials(mut self, credentials_id: impl Into<String>) -> Self {
        self.credentials_id = Some(credentials_id.into());
        self
    }

    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn build(self) -> RunConfiguration {
        RunConfiguration {
            handler: self.handler,
            template: self.template,
            input: self.input,
            env: self.env,
            runtime_id: self.runtime_id,
            region_id: self.region_id.unwrap_or_else(|| "us-east-1".to_string()),
            credentials_id: self.credentials_id,
            timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_config_validates() {
        let config = RunConfiguration::builder()
            .handler("app.handler")
            .runtime("python3.12")
            .input("\"hello\"")
            .build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn dual_target_is_rejected() {
        let config = RunConfiguration::builder()
            .handler("app.handler")
            .template("template.yaml", "SomeFunction")
            .runtime("python3.12")
            .build();
        let report = config.validate();
        assert!(!report.is_ok());
        assert_eq!(report.errors[0].field, "target");
    }

    #[test]
    fn missing_target_is_rejected() {
        let report = RunConfiguration::builder().build().validate();
        assert!(report.errors.iter().any(|e| e.field == "target"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = RunConfiguration::builder()
            .handler("app.handler")
            .runtime("python3.12")
            .timeout_secs(0)
            .build();
        let report = config.validate();
        assert!(report.errors.iter().any(|e| e.field == "timeout"));
    }

    #[test]
    fn unsupported_runtime_is_rejected() {
        let config = RunConfiguration::builder()
            .handler("app.handler")
            .runtime("cobol85")
            .build();
        let report = config.validate();
        assert!(report
            .errors
            .iter()
            .any(|e| e.field == "runtime" && e.reason.contains("cobol85")));
    }

    #[test]
    fn env_keys_are_unique() {
        let config = RunConfiguration::builder()
            .handler("app.handler")
            .runtime("python3.12")
            .env("Foo", "Bar")
            .env("Foo", "Baz")
            .build();
        assert_eq!(config.env.len(), 1);
        assert_eq!(config.env["Foo"], "Baz");
    }

    #[test]
    fn template_validation_reads_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.yaml");
        std::fs::write(
            &path,
            r#"
Resources:
  SomeFunction:
    Type: AWS::Serverless::Function
    Properties:
      Handler: app.handler
      CodeUri: src
      Runtime: python3.12
      Timeout: 900
"#,
        )
        .unwrap();

        let good = RunConfiguration::builder()
            .template(&path, "SomeFunction")
            .build();
        assert!(good.validate().is_ok());
        assert_eq!(good.runtime().unwrap().id(), "python3.12");

        let bad_id = RunConfiguration::builder()
            .template(&path, "OtherFunction")
            .build();
        assert!(bad_id
            .validate()
            .errors
            .iter()
            .any(|e| e.field == "logical_id"));

        let missing_file = RunConfiguration::builder()
            .template(dir.path().join("nope.yaml"), "SomeFunction")
            .build();
        assert!(missing_file
            .validate()
            .errors
            .iter()
            .any(|e| e.field == "template"));
    }

    #[test]
    fn template_with_unsupported_runtime_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.yaml");
        std::fs::write(
            &path,
            r#"
Resources:
  SomeFunction:
    Type: AWS::Serverless::Function
    Properties:
      Handler: com.example.LambdaHandler::handleRequest
      CodeUri: main
      Runtime: java8
      Timeout: 900
"#,
        )
        .unwrap();

        let config = RunConfiguration::builder()
            .template(&path, "SomeFunction")
            .build();
        let report = config.validate();
        assert!(report
            .errors
            .iter()
            .any(|e| e.field == "runtime" && e.reason.contains("java8")));
    }
}
