//! WebAssembly engine: libxml2/libxslt compiled to wasm, run under wasmtime
//!
//! Builds of the library differ in what they export, so each instance is
//! checked for a known API shape before anything is called. An instance lives
//! for one file; its linear memory is discarded afterwards, so only the
//! libxml2 shape frees what it allocates.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use wasmtime::{Engine, Instance, Linker, Memory, Module, Store, TypedFunc};

use super::{TransformBackend, read_input, write_atomic};
use crate::error::{EngineError, EngineResult};
use crate::libxslt::XSLT_PARSE_OPTIONS;

/// Module file name looked up when no path is configured
pub const DEFAULT_MODULE: &str = "xml2md-xslt.wasm";

pub const UNSUPPORTED_API: &str =
    "wasm module API not recognized. Try --engine embedded or --engine external-toolkit";

fn unsupported() -> EngineError {
    EngineError::UnsupportedApi(UNSUPPORTED_API.to_string())
}

/// Allocation export of the module
#[derive(Clone)]
enum Allocator {
    Malloc(TypedFunc<i32, i32>),
    Alloc(TypedFunc<i32, i32>),
}

/// Entry points a module build may expose, in lookup order
#[derive(Clone)]
enum Api {
    /// `xml2md_transform(xml, xsl) -> text`, all NUL-terminated
    Direct {
        transform: TypedFunc<(i32, i32), i32>,
    },
    /// The plain libxml2/libxslt C API
    LibXml {
        read_memory: TypedFunc<(i32, i32, i32, i32, i32), i32>,
        parse_stylesheet: TypedFunc<i32, i32>,
        apply: TypedFunc<(i32, i32, i32), i32>,
        save_result: TypedFunc<(i32, i32, i32, i32), i32>,
        free_doc: TypedFunc<i32, ()>,
        free_stylesheet: TypedFunc<i32, ()>,
    },
    /// `parse_xml(ptr, len)`, `parse_xslt(doc)`, `apply(style, doc) -> text`
    Staged {
        parse_xml: TypedFunc<(i32, i32), i32>,
        parse_xslt: TypedFunc<i32, i32>,
        apply: TypedFunc<(i32, i32), i32>,
    },
}

impl Api {
    fn label(&self) -> &'static str {
        match self {
            Api::Direct { .. } => "direct",
            Api::LibXml { .. } => "libxml2 C API",
            Api::Staged { .. } => "staged",
        }
    }
}

fn direct_api(instance: &Instance, store: &mut Store<()>) -> wasmtime::Result<Api> {
    Ok(Api::Direct {
        transform: instance.get_typed_func(&mut *store, "xml2md_transform")?,
    })
}

fn libxml_api(instance: &Instance, store: &mut Store<()>) -> wasmtime::Result<Api> {
    Ok(Api::LibXml {
        read_memory: instance.get_typed_func(&mut *store, "xmlReadMemory")?,
        parse_stylesheet: instance.get_typed_func(&mut *store, "xsltParseStylesheetDoc")?,
        apply: instance.get_typed_func(&mut *store, "xsltApplyStylesheet")?,
        save_result: instance.get_typed_func(&mut *store, "xsltSaveResultToString")?,
        free_doc: instance.get_typed_func(&mut *store, "xmlFreeDoc")?,
        free_stylesheet: instance.get_typed_func(&mut *store, "xsltFreeStylesheet")?,
    })
}

fn staged_api(instance: &Instance, store: &mut Store<()>) -> wasmtime::Result<Api> {
    Ok(Api::Staged {
        parse_xml: instance.get_typed_func(&mut *store, "parse_xml")?,
        parse_xslt: instance.get_typed_func(&mut *store, "parse_xslt")?,
        apply: instance.get_typed_func(&mut *store, "apply")?,
    })
}

/// One instantiated module, used for a single file
struct Session {
    store: Store<()>,
    instance: Instance,
}

impl Session {
    fn start(engine: &Engine, module: &Module) -> EngineResult<Self> {
        let mut store = Store::new(engine, ());
        let mut linker: Linker<()> = Linker::new(engine);
        linker.define_unknown_imports_as_traps(module)?;
        let instance = linker.instantiate(&mut store, module)?;
        Ok(Self { store, instance })
    }

    /// Run the reactor initializer and honour an exported readiness flag.
    fn wait_ready(&mut self) -> EngineResult<()> {
        if let Ok(init) = self
            .instance
            .get_typed_func::<(), ()>(&mut self.store, "_initialize")
        {
            init.call(&mut self.store, ())?;
        }

        for name in ["ready", "xml2md_ready"] {
            if let Ok(ready) = self.instance.get_typed_func::<(), i32>(&mut self.store, name) {
                if ready.call(&mut self.store, ())? == 0 {
                    return Err(EngineError::ModuleUnavailable(format!(
                        "module reports it is not ready ({name})"
                    )));
                }
                break;
            }
        }
        Ok(())
    }

    fn memory(&mut self) -> EngineResult<Memory> {
        self.instance
            .get_memory(&mut self.store, "memory")
            .ok_or_else(unsupported)
    }

    fn allocator(&mut self) -> Option<Allocator> {
        if let Ok(malloc) = self.instance.get_typed_func(&mut self.store, "malloc") {
            return Some(Allocator::Malloc(malloc));
        }
        if let Ok(alloc) = self.instance.get_typed_func(&mut self.store, "alloc") {
            return Some(Allocator::Alloc(alloc));
        }
        None
    }

    fn api(&mut self) -> Option<Api> {
        let instance = self.instance;
        let store = &mut self.store;
        if let Ok(api) = direct_api(&instance, store) {
            return Some(api);
        }
        if let Ok(api) = libxml_api(&instance, store) {
            return Some(api);
        }
        staged_api(&instance, store).ok()
    }

    fn bind(mut self) -> EngineResult<Bound> {
        let memory = self.memory()?;
        let allocator = self.allocator().ok_or_else(unsupported)?;
        let api = self.api().ok_or_else(unsupported)?;
        Ok(Bound {
            store: self.store,
            memory,
            allocator,
            api,
        })
    }
}

/// A session whose memory, allocator and API have been found
struct Bound {
    store: Store<()>,
    memory: Memory,
    allocator: Allocator,
    api: Api,
}

impl Bound {
    fn alloc(&mut self, len: usize) -> EngineResult<i32> {
        let size = i32::try_from(len)
            .map_err(|_| anyhow!("allocation of {len} bytes exceeds wasm32 memory"))?;
        let ptr = match &self.allocator {
            Allocator::Malloc(f) | Allocator::Alloc(f) => f.call(&mut self.store, size)?,
        };
        if ptr == 0 {
            return Err(EngineError::Wasm(anyhow!(
                "module allocator returned null for {len} bytes"
            )));
        }
        Ok(ptr)
    }

    fn write_cstr(&mut self, bytes: &[u8]) -> EngineResult<i32> {
        let ptr = self.alloc(bytes.len() + 1)?;
        let at = offset(ptr);
        self.memory
            .write(&mut self.store, at, bytes)
            .context("writing into module memory")?;
        self.memory
            .write(&mut self.store, at + bytes.len(), &[0])
            .context("writing into module memory")?;
        Ok(ptr)
    }

    fn read_cstr(&self, ptr: i32) -> EngineResult<Vec<u8>> {
        let start = offset(ptr);
        let tail = self
            .memory
            .data(&self.store)
            .get(start..)
            .ok_or_else(|| anyhow!("string at {start:#x} is outside module memory"))?;
        let len = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| anyhow!("string at {start:#x} is not terminated"))?;
        Ok(tail[..len].to_vec())
    }

    fn read_bytes(&self, ptr: i32, len: i32) -> EngineResult<Vec<u8>> {
        let start = offset(ptr);
        let end = start + offset(len);
        let bytes = self
            .memory
            .data(&self.store)
            .get(start..end)
            .ok_or_else(|| anyhow!("buffer {start:#x}..{end:#x} is outside module memory"))?;
        Ok(bytes.to_vec())
    }

    fn read_i32(&self, ptr: i32) -> EngineResult<i32> {
        let mut buf = [0u8; 4];
        self.memory
            .read(&self.store, offset(ptr), &mut buf)
            .context("reading module memory")?;
        Ok(i32::from_le_bytes(buf))
    }

    fn transform(
        &mut self,
        xml: &[u8],
        input: &Path,
        xslt: &[u8],
        stylesheet: &Path,
    ) -> EngineResult<Vec<u8>> {
        log::debug!("{}: wasm API {}", input.display(), self.api.label());

        let failed = |details: &str| EngineError::Transform {
            path: input.to_path_buf(),
            details: details.to_string(),
        };
        let parse_failed = || EngineError::Parse {
            path: input.to_path_buf(),
            details: "module could not parse the document".to_string(),
        };
        let stylesheet_failed = || EngineError::Stylesheet {
            path: stylesheet.to_path_buf(),
            details: "module could not compile the stylesheet".to_string(),
        };

        match self.api.clone() {
            Api::Direct { transform } => {
                let xml_ptr = self.write_cstr(xml)?;
                let xsl_ptr = self.write_cstr(xslt)?;
                let out = transform.call(&mut self.store, (xml_ptr, xsl_ptr))?;
                if out == 0 {
                    return Err(failed("module returned no result"));
                }
                self.read_cstr(out)
            }
            Api::LibXml {
                read_memory,
                parse_stylesheet,
                apply,
                save_result,
                free_doc,
                free_stylesheet,
            } => {
                let xml_ptr = self.write_cstr(xml)?;
                let xml_url = self.write_cstr(input.to_string_lossy().as_bytes())?;
                let xsl_ptr = self.write_cstr(xslt)?;
                let xsl_url = self.write_cstr(stylesheet.to_string_lossy().as_bytes())?;
                let xml_len = i32::try_from(xml.len()).map_err(|_| parse_failed())?;
                let xsl_len = i32::try_from(xslt.len()).map_err(|_| stylesheet_failed())?;

                let doc = read_memory.call(&mut self.store, (xml_ptr, xml_len, xml_url, 0, 0))?;
                if doc == 0 {
                    return Err(parse_failed());
                }
                let style_doc = read_memory.call(
                    &mut self.store,
                    (xsl_ptr, xsl_len, xsl_url, 0, XSLT_PARSE_OPTIONS),
                )?;
                if style_doc == 0 {
                    return Err(stylesheet_failed());
                }
                let style = parse_stylesheet.call(&mut self.store, style_doc)?;
                if style == 0 {
                    return Err(stylesheet_failed());
                }
                let result = apply.call(&mut self.store, (style, doc, 0))?;
                if result == 0 {
                    return Err(failed("xsltApplyStylesheet returned no result"));
                }

                // Out-parameters: the string pointer, then its length.
                let slots = self.alloc(8)?;
                let rc = save_result.call(&mut self.store, (slots, slots + 4, result, style))?;
                let out = self.read_i32(slots)?;
                let out_len = self.read_i32(slots + 4)?;
                let text = if rc == 0 && out != 0 {
                    self.read_bytes(out, out_len)?
                } else if rc == 0 {
                    Vec::new()
                } else {
                    return Err(failed("xsltSaveResultToString failed"));
                };

                free_doc.call(&mut self.store, result)?;
                free_doc.call(&mut self.store, doc)?;
                free_stylesheet.call(&mut self.store, style)?;
                Ok(text)
            }
            Api::Staged {
                parse_xml,
                parse_xslt,
                apply,
            } => {
                let xml_ptr = self.write_cstr(xml)?;
                let xml_len = i32::try_from(xml.len()).map_err(|_| parse_failed())?;
                let doc = parse_xml.call(&mut self.store, (xml_ptr, xml_len))?;
                if doc == 0 {
                    return Err(parse_failed());
                }

                let xsl_ptr = self.write_cstr(xslt)?;
                let xsl_len = i32::try_from(xslt.len()).map_err(|_| stylesheet_failed())?;
                let style_doc = parse_xml.call(&mut self.store, (xsl_ptr, xsl_len))?;
                if style_doc == 0 {
                    return Err(stylesheet_failed());
                }
                let style = parse_xslt.call(&mut self.store, style_doc)?;
                if style == 0 {
                    return Err(stylesheet_failed());
                }

                let out = apply.call(&mut self.store, (style, doc))?;
                if out == 0 {
                    return Err(failed("module returned no result"));
                }
                self.read_cstr(out)
            }
        }
    }
}

fn offset(value: i32) -> usize {
    value as u32 as usize
}

/// libxml2/libxslt compiled to WebAssembly
pub struct WasmBackend {
    module_path: Option<PathBuf>,
    engine: Engine,
    module: OnceCell<Module>,
}

impl WasmBackend {
    pub fn new(module_path: Option<PathBuf>) -> Self {
        Self {
            module_path,
            engine: Engine::default(),
            module: OnceCell::new(),
        }
    }

    /// Where the module is looked for, first hit wins
    pub fn module_candidates(&self) -> Vec<PathBuf> {
        if let Some(path) = &self.module_path {
            return vec![path.clone()];
        }

        let mut candidates = Vec::new();
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            candidates.push(exe_dir.join(DEFAULT_MODULE));
        }
        if let Some(data_dir) = dirs::data_dir() {
            candidates.push(data_dir.join("xml2md").join(DEFAULT_MODULE));
        }
        candidates
    }

    async fn locate_module(&self) -> EngineResult<PathBuf> {
        let candidates = self.module_candidates();
        for candidate in &candidates {
            if tokio::fs::metadata(candidate)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
            {
                return Ok(candidate.clone());
            }
        }

        let searched = candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(EngineError::ModuleUnavailable(format!(
            "no module found (searched: {searched})"
        )))
    }

    /// Compiled module, built on first use
    async fn module(&self) -> EngineResult<&Module> {
        self.module
            .get_or_try_init(|| async {
                let path = self.locate_module().await?;
                log::debug!("compiling wasm module {}", path.display());
                Module::from_file(&self.engine, &path)
                    .with_context(|| format!("failed to compile {}", path.display()))
                    .map_err(EngineError::from)
            })
            .await
    }
}

#[async_trait]
impl TransformBackend for WasmBackend {
    fn name(&self) -> &'static str {
        "wasm-embedded"
    }

    async fn transform(&self, input: &Path, stylesheet: &Path, output: &Path) -> EngineResult<()> {
        let module = self.module().await?;
        let xml = read_input(input).await?;
        let xslt = read_input(stylesheet).await?;

        let bytes = {
            let mut session = Session::start(&self.engine, module)?;
            session.wait_ready()?;
            session.bind()?.transform(&xml, input, &xslt, stylesheet)?
        };

        let text = String::from_utf8_lossy(&bytes);
        write_atomic(output, text.as_bytes())
    }
}
