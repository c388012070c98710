//! LibXSLT FFI Wrapper Module
//!
//! Safe wrappers around the handful of libxml2 and libxslt calls the embedded
//! engine needs: parse a document from memory, compile a stylesheet, apply it,
//! and turn the result tree back into text.
//!
//! ## Resource management
//!
//! Every pointer handed out by the C libraries is owned by exactly one RAII
//! wrapper:
//!
//! - [`XmlDocument`] frees its tree with `xmlFreeDoc`
//! - [`Stylesheet`] frees itself (and the document it was compiled from) with
//!   `xsltFreeStylesheet`
//! - strings returned by libxml2 are copied into Rust and released with
//!   `xmlFree` immediately
//!
//! The wrappers are `!Send`. The engine is driven from a single task and no
//! handle is ever kept across an `.await`.
//!
//! ## Diagnostics
//!
//! Left alone, both libraries print errors straight to stderr. Each parse,
//! compile and apply call runs inside an [`ErrorCapture`], which collects
//! libxml2 errors through its structured handler and points libxslt's
//! default `vfprintf` handler at a temporary file. The collected text becomes
//! the `details` of the returned error.

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, Once, PoisonError};

use libc::{c_char, c_int, c_void};

use crate::error::{XsltError, XsltResult};

/// Global initialization flag for libxml2
static LIBXML2_INIT: Once = Once::new();

/// libxslt's error sink is process-wide, so captures take turns
static CAPTURE_LOCK: Mutex<()> = Mutex::new(());

/// Parser options libxslt itself uses for stylesheets (`XSLT_PARSE_OPTIONS`):
/// substitute entities, load and default DTD attributes, merge CDATA.
pub const XSLT_PARSE_OPTIONS: c_int = 2 | 4 | 8 | 16384;

/// ## Opaque libxml2/libxslt structures
#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlNode {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XsltStylesheet {
    _private: [u8; 0],
}

#[allow(non_camel_case_types)]
#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlFreeFunc = Option<unsafe extern "C" fn(mem: *mut c_void)>;

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *const xmlError)>;

/// `xmlGenericErrorFunc`; only ever passed as `None` to select the default
/// handler, which writes to the context as a `FILE *`.
pub type XmlGenericErrorFunc =
    Option<unsafe extern "C" fn(ctx: *mut c_void, msg: *const c_char, ...)>;

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();

    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);

    pub fn xmlNodeGetContent(node: *const XmlNode) -> *mut u8;
    pub fn xmlDocDumpMemory(doc: *mut XmlDoc, mem: *mut *mut u8, size: *mut c_int);

    pub fn xmlSetStructuredErrorFunc(ctx: *mut c_void, handler: XmlStructuredErrorFunc);

    #[allow(non_upper_case_globals)]
    pub static xmlFree: XmlFreeFunc;
}

// External libxslt FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxslt"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xslt"))]
unsafe extern "C" {
    pub fn xsltParseStylesheetDoc(doc: *mut XmlDoc) -> *mut XsltStylesheet;
    pub fn xsltFreeStylesheet(style: *mut XsltStylesheet);
    pub fn xsltApplyStylesheet(
        style: *mut XsltStylesheet,
        doc: *mut XmlDoc,
        params: *const *const c_char,
    ) -> *mut XmlDoc;
    pub fn xsltSaveResultToString(
        doc_txt_ptr: *mut *mut u8,
        doc_txt_len: *mut c_int,
        result: *mut XmlDoc,
        style: *mut XsltStylesheet,
    ) -> c_int;

    pub fn xsltSetGenericErrorFunc(ctx: *mut c_void, handler: XmlGenericErrorFunc);
}

/// Copy a libxml2-owned string into Rust and release it.
///
/// # Safety
///
/// `ptr` must be null or a buffer allocated by libxml2; when `len` is `None`
/// it must be NUL-terminated.
unsafe fn take_xml_string(ptr: *mut u8, len: Option<usize>) -> Option<String> {
    if ptr.is_null() {
        return None;
    }

    let text = unsafe {
        match len {
            Some(len) => String::from_utf8_lossy(std::slice::from_raw_parts(ptr, len)).into_owned(),
            None => CStr::from_ptr(ptr as *const c_char)
                .to_string_lossy()
                .into_owned(),
        }
    };

    unsafe {
        if let Some(free) = xmlFree {
            free(ptr as *mut c_void);
        }
    }

    Some(text)
}

/// One libxml2 error as `line N: message`
///
/// # Safety
///
/// `error` must be null or point to a live `xmlError`.
unsafe fn format_error(error: *const xmlError) -> Option<String> {
    if error.is_null() || unsafe { (*error).message.is_null() } {
        return None;
    }
    let message = unsafe { CStr::from_ptr((*error).message) }.to_string_lossy();
    let message = message.trim();
    if message.is_empty() {
        return None;
    }
    let line = unsafe { (*error).line };
    Some(if line > 0 {
        format!("line {line}: {message}")
    } else {
        message.to_string()
    })
}

/// Structured handler: `user_data` is the capture's message list
unsafe extern "C" fn collect_error(user_data: *mut c_void, error: *const xmlError) {
    let messages = unsafe { &mut *(user_data as *mut Vec<String>) };
    if let Some(message) = unsafe { format_error(error) } {
        messages.push(message);
    }
}

/// Diagnostics of both libraries, redirected away from stderr while alive.
struct ErrorCapture {
    messages: Box<Vec<String>>,
    sink: *mut libc::FILE,
    _lock: MutexGuard<'static, ()>,
}

impl ErrorCapture {
    fn start() -> Self {
        let lock = CAPTURE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let mut messages: Box<Vec<String>> = Box::default();
        // A null sink leaves libxslt writing to stderr
        let sink = unsafe { libc::tmpfile() };

        unsafe {
            xmlSetStructuredErrorFunc(
                &mut *messages as *mut Vec<String> as *mut c_void,
                Some(collect_error),
            );
            xsltSetGenericErrorFunc(sink as *mut c_void, None);
        }

        Self {
            messages,
            sink,
            _lock: lock,
        }
    }

    /// Everything reported so far, joined on one line, or `fallback`.
    fn details(&mut self, fallback: &str) -> String {
        let mut messages = std::mem::take(&mut *self.messages);
        messages.extend(
            self.drain_sink()
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from),
        );

        if messages.is_empty() {
            fallback.to_string()
        } else {
            messages.join("; ")
        }
    }

    fn drain_sink(&mut self) -> String {
        if self.sink.is_null() {
            return String::new();
        }

        let mut bytes = Vec::new();
        let mut chunk = [0u8; 4096];
        unsafe {
            libc::fflush(self.sink);
            libc::rewind(self.sink);
            loop {
                let n = libc::fread(chunk.as_mut_ptr() as *mut c_void, 1, chunk.len(), self.sink);
                if n == 0 {
                    break;
                }
                bytes.extend_from_slice(&chunk[..n]);
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Drop for ErrorCapture {
    fn drop(&mut self) {
        unsafe {
            xmlSetStructuredErrorFunc(std::ptr::null_mut(), None);
            xsltSetGenericErrorFunc(std::ptr::null_mut(), None);
            if !self.sink.is_null() {
                libc::fclose(self.sink);
            }
        }
    }
}

/// Parsed XML tree owned by libxml2
#[derive(Debug)]
pub struct XmlDocument {
    ptr: NonNull<XmlDoc>,
    _phantom: PhantomData<*mut XmlDoc>,
}

impl XmlDocument {
    /// # Safety
    ///
    /// `ptr` must come from libxml2 and not be freed by anyone else.
    unsafe fn from_raw(ptr: *mut XmlDoc) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self {
            ptr,
            _phantom: PhantomData,
        })
    }

    fn as_ptr(&self) -> *mut XmlDoc {
        self.ptr.as_ptr()
    }

    /// Give up ownership; the caller becomes responsible for freeing the tree.
    fn into_raw(self) -> *mut XmlDoc {
        let ptr = self.ptr.as_ptr();
        std::mem::forget(self);
        ptr
    }

    /// Serialize this result tree as its stylesheet's `xsl:output` directs.
    ///
    /// `None` when libxslt reports failure.
    pub fn serialize_with(&self, stylesheet: &Stylesheet) -> Option<String> {
        let mut out: *mut u8 = std::ptr::null_mut();
        let mut len: c_int = 0;

        let rc = unsafe {
            xsltSaveResultToString(&mut out, &mut len, self.as_ptr(), stylesheet.as_ptr())
        };
        if rc != 0 {
            unsafe { take_xml_string(out, Some(0)) };
            return None;
        }

        // An empty result leaves the buffer null; that is still a success
        let len = usize::try_from(len).unwrap_or(0);
        Some(unsafe { take_xml_string(out, Some(len)) }.unwrap_or_default())
    }

    /// Concatenated text content of the whole tree; `None` when empty.
    pub fn text_content(&self) -> Option<String> {
        let content = unsafe { xmlNodeGetContent(self.as_ptr() as *const XmlNode) };
        unsafe { take_xml_string(content, None) }.filter(|text| !text.is_empty())
    }

    /// Plain XML serialization of the tree.
    pub fn dump(&self) -> Option<String> {
        let mut out: *mut u8 = std::ptr::null_mut();
        let mut len: c_int = 0;
        unsafe {
            xmlDocDumpMemory(self.as_ptr(), &mut out, &mut len);
            take_xml_string(out, Some(usize::try_from(len).unwrap_or(0)))
        }
    }
}

impl Drop for XmlDocument {
    fn drop(&mut self) {
        unsafe { xmlFreeDoc(self.ptr.as_ptr()) };
    }
}

/// Compiled XSLT stylesheet
#[derive(Debug)]
pub struct Stylesheet {
    ptr: NonNull<XsltStylesheet>,
    _phantom: PhantomData<*mut XsltStylesheet>,
}

impl Stylesheet {
    fn as_ptr(&self) -> *mut XsltStylesheet {
        self.ptr.as_ptr()
    }
}

impl Drop for Stylesheet {
    fn drop(&mut self) {
        // Also frees the document the stylesheet was compiled from
        unsafe { xsltFreeStylesheet(self.ptr.as_ptr()) };
    }
}

/// Entry point for in-process XSLT.
///
/// Creating one initializes libxml2 exactly once per process; instances are
/// cheap and carry no state.
pub struct XsltProcessor {
    _phantom: PhantomData<()>,
}

impl XsltProcessor {
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
        });

        XsltProcessor {
            _phantom: PhantomData,
        }
    }

    /// Parse a document held in memory.
    ///
    /// `url` becomes the document's base URI so relative `xsl:include`,
    /// `xsl:import` and `document()` references resolve next to the file.
    pub fn parse_document(
        &self,
        content: impl AsRef<[u8]>,
        url: &Path,
    ) -> XsltResult<XmlDocument> {
        let mut capture = ErrorCapture::start();
        read_document(content.as_ref(), url).map_err(|e| match e {
            ReadError::Input(e) => e,
            ReadError::Parse => XsltError::DocumentParse {
                details: capture.details("document is not well-formed XML"),
            },
        })
    }

    /// Parse and compile a stylesheet held in memory.
    pub fn parse_stylesheet(
        &self,
        content: impl AsRef<[u8]>,
        url: &Path,
    ) -> XsltResult<Stylesheet> {
        let mut capture = ErrorCapture::start();
        let doc = read_document(content.as_ref(), url).map_err(|e| match e {
            ReadError::Input(e) => e,
            ReadError::Parse => XsltError::StylesheetParse {
                details: capture.details("stylesheet is not well-formed XML"),
            },
        })?;

        unsafe {
            let raw_doc = doc.into_raw();
            let style = xsltParseStylesheetDoc(raw_doc);

            match NonNull::new(style) {
                Some(ptr) => Ok(Stylesheet {
                    ptr,
                    _phantom: PhantomData,
                }),
                None => {
                    // On failure the document is still ours to free
                    xmlFreeDoc(raw_doc);
                    Err(XsltError::StylesheetParse {
                        details: capture.details("not a valid XSLT stylesheet"),
                    })
                }
            }
        }
    }

    /// Apply a compiled stylesheet to a document.
    pub fn apply(&self, stylesheet: &Stylesheet, doc: &XmlDocument) -> XsltResult<XmlDocument> {
        let mut capture = ErrorCapture::start();
        let result =
            unsafe { xsltApplyStylesheet(stylesheet.as_ptr(), doc.as_ptr(), std::ptr::null()) };

        match unsafe { XmlDocument::from_raw(result) } {
            Some(result) => {
                let details = capture.details("");
                if !details.is_empty() {
                    log::debug!("xslt: {}", details);
                }
                Ok(result)
            }
            None => Err(XsltError::TransformFailed {
                details: capture.details("xsltApplyStylesheet produced no result"),
            }),
        }
    }
}

/// Why `read_document` produced no tree
enum ReadError {
    Input(XsltError),
    Parse,
}

/// `xmlReadMemory` without any error capture of its own
fn read_document(content: &[u8], url: &Path) -> Result<XmlDocument, ReadError> {
    let size = c_int::try_from(content.len()).map_err(|_| {
        ReadError::Input(XsltError::InvalidInput {
            details: format!("document too large ({} bytes)", content.len()),
        })
    })?;
    let c_url = CString::new(url.to_string_lossy().as_bytes()).map_err(|_| {
        ReadError::Input(XsltError::InvalidInput {
            details: format!("path contains a NUL byte: {}", url.display()),
        })
    })?;

    unsafe {
        let doc = xmlReadMemory(
            content.as_ptr() as *const c_char,
            size,
            c_url.as_ptr(),
            std::ptr::null(),
            XSLT_PARSE_OPTIONS,
        );
        XmlDocument::from_raw(doc).ok_or(ReadError::Parse)
    }
}

impl Default for XsltProcessor {
    fn default() -> Self {
        Self::new()
    }
}
