#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Stylesheet shipped at the repository root
pub fn bundled_stylesheet() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("xform-md.xslt")
}

/// Small text-output stylesheet with predictable results
pub const TITLE_XSLT: &str = r#"<?xml version="1.0"?>
<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:output method="text" encoding="UTF-8"/>
  <xsl:template match="/">
    <xsl:text># </xsl:text><xsl:value-of select="normalize-space(/*/title)"/>
    <xsl:text>&#10;</xsl:text>
  </xsl:template>
</xsl:stylesheet>"#;

pub fn topic(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<topic id="{id}"><title>{title}</title><body><p>About {title}.</p></body></topic>"#,
        id = title.to_lowercase().replace(' ', "-"),
        title = title
    )
}

/// Scratch workspace: `docs/` input tree, `out/` output root, isolated
/// data and config directories.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::create_dir_all(dir.path().join("home/data")).unwrap();
        std::fs::create_dir_all(dir.path().join("home/config")).unwrap();
        Self { dir }
    }

    /// docs/{a.xml,b.xml,readme.txt,sub/c.xml}
    pub fn with_docs() -> Self {
        let ws = Self::new();
        ws.write("docs/a.xml", &topic("Alpha"));
        ws.write("docs/b.xml", &topic("Beta"));
        ws.write("docs/readme.txt", "not a document");
        ws.write("docs/sub/c.xml", &topic("Gamma"));
        ws
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).unwrap()
    }

    /// Run the built binary from inside the workspace
    pub fn run(&self, args: &[&str]) -> Output {
        xml2md_command(self.dir.path())
            .args(args)
            .output()
            .expect("Failed to execute xml2md")
    }
}

/// The binary, isolated from the user's environment and configuration
pub fn xml2md_command(cwd: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_xml2md"));
    command
        .current_dir(cwd)
        .env("XDG_DATA_HOME", cwd.join("home/data"))
        .env("XDG_CONFIG_HOME", cwd.join("home/config"))
        .env_remove("RUST_LOG");
    for key in [
        "XML2MD_INPUT_EXTENSION",
        "XML2MD_STYLESHEET",
        "XML2MD_STYLESHEET_DIR",
        "XML2MD_EXTERNAL_PROGRAM",
        "XML2MD_WASM_MODULE",
        "XML2MD_STRICT",
    ] {
        command.env_remove(key);
    }
    command
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
