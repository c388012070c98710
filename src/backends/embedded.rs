//! In-process engine backed by libxslt

use async_trait::async_trait;
use std::path::Path;

use super::{TransformBackend, read_input, write_atomic};
use crate::error::{EngineError, EngineResult, XsltError};
use crate::libxslt::{Stylesheet, XmlDocument, XsltProcessor};

/// Ways of turning a result tree into output text, tried in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStrategy {
    /// Serialize as the stylesheet's `xsl:output` says
    Stylesheet,
    /// Text content of the result tree
    TextContent,
    /// Plain XML serialization
    Document,
}

pub const OUTPUT_STRATEGIES: [OutputStrategy; 3] = [
    OutputStrategy::Stylesheet,
    OutputStrategy::TextContent,
    OutputStrategy::Document,
];

impl OutputStrategy {
    fn extract(self, result: &XmlDocument, stylesheet: &Stylesheet) -> Option<String> {
        match self {
            OutputStrategy::Stylesheet => result.serialize_with(stylesheet),
            OutputStrategy::TextContent => result.text_content(),
            OutputStrategy::Document => result.dump(),
        }
    }
}

/// Transform in memory; the paths only serve as base URIs and in errors.
pub fn transform_text(
    xml: &[u8],
    xml_path: &Path,
    xslt: &[u8],
    xslt_path: &Path,
) -> EngineResult<String> {
    let processor = XsltProcessor::new();

    let stylesheet = processor
        .parse_stylesheet(xslt, xslt_path)
        .map_err(|e| EngineError::Stylesheet {
            path: xslt_path.to_path_buf(),
            details: details(e),
        })?;
    let doc = processor
        .parse_document(xml, xml_path)
        .map_err(|e| EngineError::Parse {
            path: xml_path.to_path_buf(),
            details: details(e),
        })?;
    let result = processor
        .apply(&stylesheet, &doc)
        .map_err(|e| EngineError::Transform {
            path: xml_path.to_path_buf(),
            details: details(e),
        })?;

    for strategy in OUTPUT_STRATEGIES {
        if let Some(text) = strategy.extract(&result, &stylesheet) {
            log::debug!("{}: output via {:?}", xml_path.display(), strategy);
            return Ok(text);
        }
    }

    Err(EngineError::Transform {
        path: xml_path.to_path_buf(),
        details: "result tree could not be serialized".to_string(),
    })
}

fn details(err: XsltError) -> String {
    match err {
        XsltError::InvalidInput { details }
        | XsltError::DocumentParse { details }
        | XsltError::StylesheetParse { details }
        | XsltError::TransformFailed { details } => details,
    }
}

/// libxslt linked into the process
#[derive(Debug, Default)]
pub struct EmbeddedBackend;

impl EmbeddedBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransformBackend for EmbeddedBackend {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn transform(&self, input: &Path, stylesheet: &Path, output: &Path) -> EngineResult<()> {
        let xml = read_input(input).await?;
        let xslt = read_input(stylesheet).await?;

        let text = transform_text(&xml, input, &xslt, stylesheet)?;
        write_atomic(output, text.as_bytes())
    }
}
