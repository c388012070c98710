//! PowerShell driving the .NET `XslCompiledTransform`

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::{TransformBackend, persist_temp, reserve_temp};
use crate::error::{EngineError, EngineResult};

/// Quote a value for a single-quoted PowerShell string literal
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn ps_path(path: &Path) -> String {
    ps_quote(&path.to_string_lossy())
}

/// Script that transforms `xml` with `xslt` into `out`.
///
/// Reader, stream and writer are disposed on every path.
pub fn build_script(xslt: &Path, xml: &Path, out: &Path) -> String {
    let xslt = ps_path(xslt);
    let xml = ps_path(xml);
    let out = ps_path(out);

    [
        "$ErrorActionPreference='Stop';".to_string(),
        "$xslt = New-Object System.Xml.Xsl.XslCompiledTransform;".to_string(),
        format!("$xslt.Load({xslt});"),
        format!("$reader = [System.Xml.XmlReader]::Create({xml});"),
        "$settings = New-Object System.Xml.XmlWriterSettings;".to_string(),
        "$settings.OmitXmlDeclaration = $true;".to_string(),
        "$settings.ConformanceLevel = [System.Xml.ConformanceLevel]::Auto;".to_string(),
        "$settings.Encoding = [System.Text.Encoding]::UTF8;".to_string(),
        format!("[System.IO.Directory]::CreateDirectory((Split-Path {out} -Parent)) | Out-Null;"),
        format!("$outStream = [System.IO.File]::Create({out});"),
        "try { $writer = [System.Xml.XmlWriter]::Create($outStream, $settings); \
         try { $xslt.Transform($reader, $writer) } finally { $writer.Dispose() } } \
         finally { $outStream.Dispose(); $reader.Dispose() }"
            .to_string(),
    ]
    .join(" ")
}

/// Transforms by running a PowerShell child process per file
#[derive(Debug, Clone)]
pub struct ExternalToolkitBackend {
    program: String,
}

impl ExternalToolkitBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl TransformBackend for ExternalToolkitBackend {
    fn name(&self) -> &'static str {
        "external-toolkit"
    }

    async fn transform(&self, input: &Path, stylesheet: &Path, output: &Path) -> EngineResult<()> {
        // The script writes to a sibling temp file; a failed run never
        // touches `output`.
        let temp = reserve_temp(output)?;
        let script = build_script(stylesheet, input, &temp);
        log::debug!("{} script: {}", self.program, script);

        let status = Command::new(&self.program)
            .args(["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command"])
            .arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(EngineError::ExternalExit {
                engine: "dotnet".to_string(),
                code: status.code(),
            });
        }

        persist_temp(temp, output)?;
        Ok(())
    }
}
