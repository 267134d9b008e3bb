//! Run-configuration validation against real template fixtures.

use samrun::invoke::RunConfiguration;

fn write_template(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("template.yaml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn serverless_function_template_passes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_template(
        dir.path(),
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
    );

    let config = RunConfiguration::builder()
        .template(&path, "SomeFunction")
        .input("\"Hello World\"")
        .build();
    assert!(config.validate().is_ok());
}

#[test]
fn plain_lambda_function_template_passes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_template(
        dir.path(),
        r#"
Resources:
  SomeFunction:
    Type: AWS::Lambda::Function
    Properties:
      Handler: index.handler
      Code: lambda
      Runtime: nodejs20.x
      Timeout: 900
"#,
    );

    let config = RunConfiguration::builder()
        .template(&path, "SomeFunction")
        .build();
    assert!(config.validate().is_ok());
}

#[test]
fn resource_without_handler_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_template(
        dir.path(),
        r#"
Resources:
  SomeFunction:
    Type: AWS::Serverless::Function
    Properties:
      Runtime: python3.12
"#,
    );

    let config = RunConfiguration::builder()
        .template(&path, "SomeFunction")
        .build();
    let report = config.validate();
    assert!(report
        .errors
        .iter()
        .any(|e| e.reason.contains("declares no handler")));
}

#[test]
fn non_function_resource_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_template(
        dir.path(),
        r#"
Resources:
  Bucket:
    Type: AWS::S3::Bucket
"#,
    );

    let config = RunConfiguration::builder().template(&path, "Bucket").build();
    let report = config.validate();
    assert!(!report.is_ok());
}

#[test]
fn malformed_yaml_is_reported_not_thrown() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_template(dir.path(), "Resources: [not, a, mapping\n");

    let config = RunConfiguration::builder()
        .template(&path, "SomeFunction")
        .build();
    let report = config.validate();
    assert!(report.errors.iter().any(|e| e.field == "template"));
}

#[test]
fn validation_collects_every_field_error() {
    // Dual target AND a zero timeout: both must be reported in one pass.
    let config = RunConfiguration::builder()
        .handler("app.handler")
        .template("template.yaml", "SomeFunction")
        .timeout_secs(0)
        .build();
    let report = config.validate();
    let fields: Vec<&str> = report.errors.iter().map(|e| e.field.as_str()).collect();
    assert!(fields.contains(&"target"));
    assert!(fields.contains(&"timeout"));
}

#[test]
fn report_display_is_readable() {
    let config = RunConfiguration::builder().timeout_secs(0).build();
    let report = config.validate();
    let rendered = report.to_string();
    assert!(rendered.contains("target"));
    assert!(rendered.contains("timeout"));
}
