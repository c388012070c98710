mod common;

use common::test_helpers::{TITLE_XSLT, Workspace, stderr, stdout, topic, xml2md_command};

#[test]
fn test_cli_help_output() {
    let ws = Workspace::new();
    let output = ws.run(&["--help"]);

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("Convert XML docs to Markdown via XSLT"));
    assert!(stdout.contains("--out"));
    assert!(stdout.contains("--recurse"));
    assert!(stdout.contains("--xslt"));
    assert!(stdout.contains("--engine"));
    assert!(stdout.contains("--ps"));
    assert!(stdout.contains("Examples:"));
}

#[test]
fn test_cli_version_output() {
    let ws = Workspace::new();
    let output = ws.run(&["--version"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains(&format!("xml2md {}", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn test_cli_without_input_prints_usage_and_fails() {
    let ws = Workspace::new();
    let output = ws.run(&[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Examples:"));
}

#[test]
fn test_cli_unknown_option() {
    let ws = Workspace::with_docs();
    let output = ws.run(&["docs", "-o", "out", "--bogus"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("[xml2md] Error: Unknown option: --bogus"));
    assert!(!ws.path("out").exists());
}

#[test]
fn test_cli_missing_output_dir() {
    let ws = Workspace::with_docs();
    ws.write("xform-md.xslt", TITLE_XSLT);
    let output = ws.run(&["docs"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Missing required -o/--out output directory"));
}

#[test]
fn test_cli_explicit_stylesheet_has_no_fallback() {
    let ws = Workspace::with_docs();
    ws.write("xform-md.xslt", TITLE_XSLT);
    let output = ws.run(&["docs", "-o", "out", "--xslt", "custom.xslt"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr(&output);
    assert!(stderr.contains("XSLT not found at --xslt path:"));
    assert!(stderr.contains("custom.xslt"));
    assert!(!ws.path("out").exists());
}

#[test]
fn test_cli_no_stylesheet_anywhere() {
    let ws = Workspace::with_docs();
    let output = ws.run(&["docs", "-o", "out", "-r"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr(&output);
    assert!(stderr.contains("XSLT not found."));
    assert!(stderr.contains("xform-md.xslt"));
    assert!(!ws.path("out").exists());
}

#[test]
fn test_cli_input_not_found() {
    let ws = Workspace::new();
    ws.write("xform-md.xslt", TITLE_XSLT);
    let output = ws.run(&["missing", "-o", "out"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Input not found:"));
}

#[test]
fn test_cli_input_file_with_wrong_suffix() {
    let ws = Workspace::with_docs();
    ws.write("xform-md.xslt", TITLE_XSLT);
    let output = ws.run(&["docs/readme.txt", "-o", "out"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Input file is not .xml:"));
}

#[test]
fn test_cli_recursive_conversion() {
    let ws = Workspace::with_docs();
    ws.write("xform-md.xslt", TITLE_XSLT);
    let output = ws.run(&["docs", "-o", "out", "--recurse", "--engine", "embedded"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let stdout = stdout(&output);
    assert!(stdout.contains("Engine: embedded"));
    assert!(stdout.contains("Input base:"));
    assert!(stdout.contains("Output dir:"));
    assert!(!stdout.contains("XSLT:"));
    assert!(stdout.contains("→ a.xml -> a.md"));
    assert!(stdout.contains("Done. Wrote 3 file(s)."));

    assert_eq!(ws.read("out/a.md"), "# Alpha\n");
    assert_eq!(ws.read("out/b.md"), "# Beta\n");
    assert_eq!(ws.read("out/sub/c.md"), "# Gamma\n");
    assert!(!ws.path("out/readme.md").exists());
}

#[test]
fn test_cli_non_recursive_conversion() {
    let ws = Workspace::with_docs();
    ws.write("xform-md.xslt", TITLE_XSLT);
    let output = ws.run(&["docs", "-o", "out", "--engine", "embedded"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("Done. Wrote 2 file(s)."));
    assert!(ws.path("out/a.md").is_file());
    assert!(ws.path("out/b.md").is_file());
    assert!(!ws.path("out/sub").exists());
}

#[test]
fn test_cli_verbose_shows_stylesheet() {
    let ws = Workspace::with_docs();
    ws.write("xform-md.xslt", TITLE_XSLT);
    let output = ws.run(&["docs", "-o", "out", "-v", "--engine", "embedded"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("XSLT:"));
}

#[test]
fn test_cli_malformed_file_does_not_stop_batch() {
    let ws = Workspace::with_docs();
    ws.write("xform-md.xslt", TITLE_XSLT);
    ws.write("docs/broken.xml", "<topic><title>Oops</topic>");

    let output = ws.run(&["docs", "-o", "out", "-r", "--engine", "embedded"]);

    assert!(output.status.success());
    assert!(stderr(&output).contains("[xml2md] Failed: broken.xml"));
    assert!(stdout(&output).contains("Done. Wrote 4 file(s)."));
    assert!(!ws.path("out/broken.md").exists());
    assert_eq!(ws.read("out/sub/c.md"), "# Gamma\n");
}

#[test]
fn test_cli_library_diagnostics_only_in_failure_report() {
    let ws = Workspace::new();
    ws.write("xform-md.xslt", "<html><body/></html>");
    ws.write("docs/broken.xml", "<topic><title>Oops</topic>");
    ws.write("docs/fine.xml", &topic("Fine"));

    let output = ws.run(&["docs", "-o", "out", "--engine", "embedded"]);

    assert!(output.status.success());
    let stderr = stderr(&output);
    assert!(stderr.starts_with("[xml2md] Failed:"), "stderr: {}", stderr);
    assert!(!stderr.contains("parser error :"));
    assert_eq!(stderr.matches("[xml2md] Failed:").count(), 2);
    assert!(stderr.contains("document is not a stylesheet"));
    for line in stderr.lines().filter(|l| l.contains("compilation error")) {
        assert!(line.starts_with("  "), "unreported line: {}", line);
    }
}

#[test]
fn test_cli_strict_mode_fails_on_file_errors() {
    let ws = Workspace::with_docs();
    ws.write("xform-md.xslt", TITLE_XSLT);
    ws.write("docs/broken.xml", "<topic>");

    let output = ws.run(&["docs", "-o", "out", "--strict", "--engine", "embedded"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(ws.path("out/a.md").is_file());
}

#[test]
fn test_cli_unknown_engine_reported_per_file() {
    let ws = Workspace::with_docs();
    ws.write("xform-md.xslt", TITLE_XSLT);
    let output = ws.run(&["docs", "-o", "out", "-r", "--engine", "foo"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("Engine: foo"));
    assert_eq!(stderr(&output).matches("Unknown engine: foo").count(), 3);
    assert!(!ws.path("out/a.md").exists());
}

#[test]
fn test_cli_empty_directory() {
    let ws = Workspace::new();
    ws.write("xform-md.xslt", TITLE_XSLT);
    let output = ws.run(&["docs", "-o", "out"]);

    assert!(output.status.success());
    assert!(stderr(&output).contains("No XML files found to process."));
    assert!(ws.path("out").is_dir());
}

#[test]
fn test_cli_single_file() {
    let ws = Workspace::with_docs();
    ws.write("xform-md.xslt", TITLE_XSLT);
    let output = ws.run(&["docs/sub/c.xml", "-o", "out", "--engine", "embedded"]);

    assert!(output.status.success());
    assert_eq!(ws.read("out/c.md"), "# Gamma\n");
}

#[test]
fn test_cli_uppercase_suffix() {
    let ws = Workspace::new();
    ws.write("xform-md.xslt", TITLE_XSLT);
    ws.write("docs/LOUD.XML", &topic("Loud"));
    let output = ws.run(&["docs", "-o", "out", "--engine", "embedded"]);

    assert!(output.status.success());
    assert_eq!(ws.read("out/LOUD.md"), "# Loud\n");
}

#[test]
fn test_cli_config_file_output_extension() {
    let ws = Workspace::with_docs();
    ws.write("xform-md.xslt", TITLE_XSLT);
    ws.write("xml2md.toml", "[conversion]\noutput_extension = \"markdown\"\n");

    let output = ws.run(&["docs", "-o", "out", "--engine", "embedded"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(ws.read("out/a.markdown"), "# Alpha\n");
}

#[test]
fn test_cli_invalid_config_is_setup_error() {
    let ws = Workspace::with_docs();
    ws.write("xform-md.xslt", TITLE_XSLT);
    ws.write("settings.yaml", "conversion: {}");

    let output = ws.run(&["docs", "-o", "out", "--config", "settings.yaml"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Unsupported configuration file format: yaml"));
}

#[test]
fn test_cli_stylesheet_dir_from_environment() {
    let ws = Workspace::with_docs();
    ws.write("share/styles/xform-md.xslt", TITLE_XSLT);

    let output = xml2md_command(ws.dir.path())
        .env("XML2MD_STYLESHEET_DIR", ws.path("share/styles"))
        .args(["docs", "-o", "out", "--engine", "embedded"])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(ws.read("out/b.md"), "# Beta\n");
}

#[test]
fn test_cli_wasm_engine_without_module() {
    let ws = Workspace::with_docs();
    ws.write("xform-md.xslt", TITLE_XSLT);

    let output = xml2md_command(ws.dir.path())
        .env("XML2MD_WASM_MODULE", ws.path("missing.wasm"))
        .args(["docs", "-o", "out", "--engine", "libxml2-wasm"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(stderr(&output).matches("WASM module unavailable").count(), 2);
    assert!(!ws.path("out/a.md").exists());
}

#[test]
fn test_cli_ps_flag_selects_external_toolkit() {
    let ws = Workspace::with_docs();
    ws.write("xform-md.xslt", TITLE_XSLT);

    let output = xml2md_command(ws.dir.path())
        .env("XML2MD_EXTERNAL_PROGRAM", "xml2md-no-such-shell")
        .args(["docs", "-o", "out", "--ps"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(stdout(&output).contains("Engine: dotnet"));
    assert!(stderr(&output).contains("Could not start xml2md-no-such-shell"));
}
