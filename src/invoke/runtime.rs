use serde::{Deserialize, Serialize};

/// Language family a runtime belongs to; keys the handler-resolver registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeFamily {
    Dotnet,
    Python,
    NodeJs,
}

impl RuntimeFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dotnet => "dotnet",
            Self::Python => "python",
            Self::NodeJs => "node",
        }
    }
}

impl std::fmt::Display for RuntimeFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Lambda runtime identifier the local tool can sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Runtime {
    id: &'static str,
    family: RuntimeFamily,
}

/// The supported set. Identifiers match what the SAM CLI and the service
/// accept in `Runtime:` template properties.
pub const SUPPORTED_RUNTIMES: &[Runtime] = &[
    Runtime { id: "dotnetcore2.1", family: RuntimeFamily::Dotnet },
    Runtime { id: "dotnet6", family: RuntimeFamily::Dotnet },
    Runtime { id: "dotnet8", family: RuntimeFamily::Dotnet },
    Runtime { id: "python3.9", family: RuntimeFamily::Python },
    Runtime { id: "python3.10", family: RuntimeFamily::Python },
    Runtime { id: "python3.11", family: RuntimeFamily::Python },
    Runtime { id: "python3.12", family: RuntimeFamily::Python },
    Runtime { id: "nodejs18.x", family: RuntimeFamily::NodeJs },
    Runtime { id: "nodejs20.x", family: RuntimeFamily::NodeJs },
    Runtime { id: "nodejs22.x", family: RuntimeFamily::NodeJs },
];

impl Runtime {
    /// Look up a runtime by identifier. None = unsupported.
    pub fn from_id(id: &str) -> Option<Runtime> {
        SUPPORTED_RUNTIMES.iter().copied().find(|r| r.id == id)
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn family(&self) -> RuntimeFamily {
        self.family
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id)
    }
}
