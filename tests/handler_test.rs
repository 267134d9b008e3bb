//! Handler resolution across the built-in resolvers, driven through the
//! registry the way the launcher drives it.

use samrun::handler::{ResolverRegistry, SourceLocation};
use samrun::invoke::RuntimeFamily;
use std::path::PathBuf;

fn dotnet_project(dir: &std::path::Path) {
    let src = dir.join("src").join("EchoLambda");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(src.join("EchoLambda.csproj"), "<Project/>").unwrap();
    std::fs::write(
        src.join("Function.cs"),
        r#"using Amazon.Lambda.Core;

namespace EchoLambda
{
    public class Function
    {
        public string FunctionHandler(string input, ILambdaContext context)
        {
            return input.ToUpper();
        }
    }
}
"#,
    )
    .unwrap();
}

#[test]
fn registry_dispatches_by_family() {
    let root = tempfile::tempdir().unwrap();
    dotnet_project(root.path());
    std::fs::write(
        root.path().join("app.py"),
        "def handler(event, context):\n    return event\n",
    )
    .unwrap();
    std::fs::write(root.path().join("index.js"), "exports.handler = () => {};\n").unwrap();

    let registry = ResolverRegistry::with_defaults();

    let dotnet = registry
        .resolve(
            RuntimeFamily::Dotnet,
            root.path(),
            "EchoLambda::EchoLambda.Function::FunctionHandler",
        )
        .unwrap();
    assert_eq!(dotnet.len(), 1);

    let python = registry
        .resolve(RuntimeFamily::Python, root.path(), "app.handler")
        .unwrap();
    assert_eq!(
        python,
        vec![SourceLocation {
            file: root.path().join("app.py"),
            line: 1
        }]
    );

    let node = registry
        .resolve(RuntimeFamily::NodeJs, root.path(), "index.handler")
        .unwrap();
    assert_eq!(node.len(), 1);
}

#[test]
fn absence_is_an_empty_result_not_an_error() {
    let root = tempfile::tempdir().unwrap();
    let registry = ResolverRegistry::with_defaults();

    for (family, handler) in [
        (RuntimeFamily::Dotnet, "A::B.C::D"),
        (RuntimeFamily::Python, "app.handler"),
        (RuntimeFamily::NodeJs, "index.handler"),
    ] {
        let located = registry.resolve(family, root.path(), handler).unwrap();
        assert!(located.is_empty(), "{family}: {handler}");
    }
}

#[test]
fn discovery_is_restartable_and_fresh() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(
        root.path().join("app.py"),
        "def handler(event, context):\n    return event\n",
    )
    .unwrap();

    let registry = ResolverRegistry::with_defaults();
    let resolver = registry.resolver(RuntimeFamily::Python).unwrap();

    assert_eq!(resolver.discover(root.path()), vec!["app.handler".to_string()]);

    // A file added between scans shows up on the next enumeration.
    std::fs::write(
        root.path().join("extra.py"),
        "def added_later(event, context):\n    return None\n",
    )
    .unwrap();
    assert_eq!(
        resolver.discover(root.path()),
        vec!["app.handler".to_string(), "extra.added_later".to_string()]
    );
}

#[test]
fn scan_skips_dependency_directories() {
    let root = tempfile::tempdir().unwrap();
    let vendored = root.path().join("node_modules").join("pkg");
    std::fs::create_dir_all(&vendored).unwrap();
    std::fs::write(vendored.join("index.js"), "exports.hidden = () => {};\n").unwrap();
    std::fs::write(root.path().join("index.js"), "exports.handler = () => {};\n").unwrap();

    let registry = ResolverRegistry::with_defaults();
    let resolver = registry.resolver(RuntimeFamily::NodeJs).unwrap();
    assert_eq!(
        resolver.discover(root.path()),
        vec!["index.handler".to_string()]
    );
}

#[test]
fn dotnet_discovery_uses_csproj_assembly_name() {
    let root = tempfile::tempdir().unwrap();
    dotnet_project(root.path());

    let registry = ResolverRegistry::with_defaults();
    let resolver = registry.resolver(RuntimeFamily::Dotnet).unwrap();
    assert_eq!(
        resolver.discover(root.path()),
        vec!["EchoLambda::EchoLambda.Function::FunctionHandler".to_string()]
    );

    // The discovered reference round-trips through validation.
    assert!(resolver.is_valid(
        root.path(),
        "EchoLambda::EchoLambda.Function::FunctionHandler"
    ));
}

#[test]
fn resolution_is_pure_given_root_and_handler() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(
        root.path().join("app.py"),
        "def handler(event, context):\n    return event\n",
    )
    .unwrap();
    let registry = ResolverRegistry::with_defaults();

    let first = registry
        .resolve(RuntimeFamily::Python, root.path(), "app.handler")
        .unwrap();
    let second = registry
        .resolve(RuntimeFamily::Python, root.path(), "app.handler")
        .unwrap();
    assert_eq!(first, second);

    let other_root = tempfile::tempdir().unwrap();
    let elsewhere = registry
        .resolve(RuntimeFamily::Python, other_root.path(), "app.handler")
        .unwrap();
    assert!(elsewhere.is_empty());
}

#[test]
fn ambiguous_python_handler_is_single_file_scoped() {
    // Two files with the same function name are distinct handlers, not an
    // ambiguity — the module path disambiguates.
    let root = tempfile::tempdir().unwrap();
    std::fs::write(
        root.path().join("a.py"),
        "def handler(event, context):\n    return 1\n",
    )
    .unwrap();
    std::fs::write(
        root.path().join("b.py"),
        "def handler(event, context):\n    return 2\n",
    )
    .unwrap();

    let registry = ResolverRegistry::with_defaults();
    let a = registry
        .resolve(RuntimeFamily::Python, root.path(), "a.handler")
        .unwrap();
    assert_eq!(a.len(), 1);
    assert!(a[0].file.ends_with("a.py"));
}
