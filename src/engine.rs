//! Engine selection and name resolution

use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Host platform family, as far as engine defaults are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Other
        }
    }
}

/// The transform backends known to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// libxslt linked into the process
    Embedded,
    /// libxml2/libxslt compiled to WebAssembly
    WasmEmbedded,
    /// PowerShell + .NET XslCompiledTransform
    ExternalToolkit,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [
        EngineKind::Embedded,
        EngineKind::WasmEmbedded,
        EngineKind::ExternalToolkit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EngineKind::Embedded => "embedded",
            EngineKind::WasmEmbedded => "wasm-embedded",
            EngineKind::ExternalToolkit => "external-toolkit",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            EngineKind::Embedded => &["xslt-processor", "libxslt"],
            EngineKind::WasmEmbedded => &["libxml2-wasm", "wasm"],
            EngineKind::ExternalToolkit => &["dotnet", "ps", "powershell"],
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        EngineKind::ALL
            .into_iter()
            .find(|kind| {
                kind.name().eq_ignore_ascii_case(wanted)
                    || kind.aliases().iter().any(|a| a.eq_ignore_ascii_case(wanted))
            })
            .ok_or_else(|| EngineError::UnknownEngine(s.to_string()))
    }
}

/// Pick the engine name for a run.
///
/// An explicit request is returned untouched, even when it names no known
/// engine; that is reported per file at dispatch. Otherwise Windows gets the
/// .NET toolkit and every other platform the in-process engine.
pub fn choose_engine(requested: Option<&str>, platform: Platform) -> String {
    if let Some(requested) = requested {
        return requested.to_string();
    }
    match platform {
        Platform::Windows => EngineKind::ExternalToolkit.name().to_string(),
        Platform::Other => EngineKind::Embedded.name().to_string(),
    }
}
