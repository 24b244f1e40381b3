// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maps a faulting instruction address to a module, symbol and offset.
//!
//! Test children are forked from the harness without an `exec`, so they share the harness's
//! executable and library mappings. An instruction pointer read out of a child can therefore be
//! resolved against the address space of the harness itself.
//!
//! Resolution combines three sources, none of which is required to succeed:
//!
//! 1. the C runtime's frame description (`backtrace_symbols` on glibc), parsed by
//!    [`FrameDescription::parse`];
//! 2. the dynamic loader's symbol table (`dladdr`), which also provides the module load base;
//! 3. debug info, for symbols that were not exported to the dynamic symbol table.
//!
//! If none of them names a symbol, the diagnostic asks for a rebuild with symbols exported.

use owo_colors::{OwoColorize, Style};
use std::{
    ffi::{CStr, c_char, c_void},
    fmt,
    mem::MaybeUninit,
};

/// Produces a diagnostic line for a fault at the given address.
///
/// Implementations never fail: missing information degrades to a fallback message.
pub trait ResolveFault {
    /// Returns a diagnostic for a fault at `address`, or at an unknown address if `None`.
    fn describe_fault(&self, address: Option<usize>) -> String;
}

/// Resolves fault addresses against the current process.
#[derive(Clone, Debug, Default)]
pub struct SymbolResolver {
    styles: Styles,
}

impl SymbolResolver {
    /// Creates a new resolver that produces uncolored output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Colorizes the diagnostics produced by this resolver.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Gathers everything known about `address`.
    pub fn locate(&self, address: usize) -> FaultLocation {
        let description = frame_description(address);
        let mut location = FaultLocation::assemble(
            Some(address),
            description.as_deref(),
            query_loader(address),
            query_debug_info(address),
        );
        location.in_library = location
            .module
            .as_deref()
            .is_some_and(|module| !is_current_exe(module));
        location
    }
}

impl ResolveFault for SymbolResolver {
    fn describe_fault(&self, address: Option<usize>) -> String {
        let location = match address {
            Some(address) => self.locate(address),
            None => FaultLocation::assemble(None, None, None, None),
        };
        DisplayFault::new(&location, &self.styles).to_string()
    }
}

/// A parsed frame description of the form `module(symbol+0xoffset) [0xaddress]`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameDescription<'a> {
    /// The path of the executable or shared object containing the frame.
    pub module: &'a str,
    /// The raw (possibly mangled) symbol name, if the runtime knew one.
    pub symbol: Option<&'a str>,
    /// The signed offset of the address from `symbol`, or from the module if there's no symbol.
    pub offset: Option<i64>,
}

impl<'a> FrameDescription<'a> {
    /// Parses a frame description.
    ///
    /// Accepts the forms produced by glibc:
    ///
    /// * `/path/module(symbol+0x1a) [0x55d0c0de]`
    /// * `/path/module(+0x1a) [0x55d0c0de]`
    /// * `/path/module [0x55d0c0de]`
    ///
    /// Returns `None` if no module path can be extracted.
    pub fn parse(input: &'a str) -> Option<Self> {
        let input = input.trim();
        let head = match input.rfind(" [") {
            Some(idx) => &input[..idx],
            None => input,
        };

        let (module, inner) = match head.strip_suffix(')') {
            Some(rest) => {
                let open = rest.rfind('(')?;
                (&rest[..open], Some(&rest[open + 1..]))
            }
            None => (head, None),
        };
        let module = module.trim_end();
        if module.is_empty() || module.starts_with('[') {
            return None;
        }

        let (symbol, offset) = match inner {
            None => (None, None),
            Some(inner) => match inner.rfind(['+', '-']) {
                Some(idx) => {
                    let negative = inner[idx..].starts_with('-');
                    let offset = parse_hex(&inner[idx + 1..])
                        .and_then(|offset| i64::try_from(offset).ok())
                        .map(|offset| if negative { -offset } else { offset });
                    (non_empty(&inner[..idx]), offset)
                }
                None => (non_empty(inner), None),
            },
        };

        Some(Self {
            module,
            symbol,
            offset,
        })
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

fn parse_hex(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    u64::from_str_radix(digits, 16).ok()
}

/// Demangles a Rust symbol name, returning it unchanged if it isn't mangled.
pub fn demangle_symbol(name: &str) -> String {
    match rustc_demangle::try_demangle(name) {
        // The alternate form drops the trailing hash.
        Ok(demangled) => format!("{demangled:#}"),
        Err(_) => name.to_owned(),
    }
}

/// What the dynamic loader knows about an address.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LoaderInfo {
    /// The path of the containing module.
    pub module: Option<String>,
    /// The address at which the module is loaded.
    pub module_base: usize,
    /// The nearest exported symbol at or below the address.
    pub symbol: Option<String>,
    /// The start address of `symbol`.
    pub symbol_address: Option<usize>,
}

/// What debug info knows about an address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DebugInfoSymbol {
    /// The demangled name of the innermost (possibly inlined) function.
    pub name: String,
    /// The source file and line, if known.
    pub source: Option<(String, u32)>,
}

/// Everything known about a fault location.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FaultLocation {
    /// The faulting instruction address.
    pub address: Option<usize>,
    /// The path of the module containing the address.
    pub module: Option<String>,
    /// The load base of the module.
    pub module_base: Option<usize>,
    /// The demangled symbol name.
    pub symbol: Option<String>,
    /// The start address of the symbol.
    pub symbol_address: Option<usize>,
    /// The offset of the address from the start of the symbol.
    pub offset: Option<i64>,
    /// The source file and line of the address.
    pub source: Option<(String, u32)>,
    /// True if the module is a shared library rather than the harness executable.
    pub in_library: bool,
}

impl FaultLocation {
    /// Combines the individual sources of information about a fault address.
    pub fn assemble(
        address: Option<usize>,
        description: Option<&str>,
        loader: Option<LoaderInfo>,
        debug_info: Option<DebugInfoSymbol>,
    ) -> Self {
        let parsed = description.and_then(FrameDescription::parse);
        let loader = loader.unwrap_or_default();

        let (symbol, described_offset) = match parsed.and_then(|p| p.symbol.map(|s| (s, p.offset)))
        {
            Some((symbol, offset)) => (Some(demangle_symbol(symbol)), offset),
            None => (loader.symbol.as_deref().map(demangle_symbol), None),
        };
        // Debug info names the function but not where it starts, so the start address only
        // comes from the loader.
        let (symbol, symbol_address, source) = match (symbol, debug_info) {
            (Some(symbol), debug_info) => (
                Some(symbol),
                loader.symbol_address,
                debug_info.and_then(|d| d.source),
            ),
            (None, Some(debug_info)) => (Some(debug_info.name), None, debug_info.source),
            (None, None) => (None, None, None),
        };

        let offset = described_offset.or_else(|| {
            let address = i64::try_from(address?).ok()?;
            let start = i64::try_from(symbol_address?).ok()?;
            Some(address - start)
        });

        let module = loader
            .module
            .filter(|module| !module.is_empty())
            .or_else(|| parsed.map(|p| p.module.to_owned()))
            .or_else(current_exe);
        let module_base = (loader.module_base != 0).then_some(loader.module_base);

        Self {
            address,
            module,
            module_base,
            symbol,
            symbol_address,
            offset,
            source,
            in_library: false,
        }
    }

    /// Returns true if a symbol was found for the address.
    pub fn is_resolved(&self) -> bool {
        self.symbol.is_some()
    }
}

/// Returns true if `module` names the running executable. Paths that can't be resolved count
/// as the executable.
fn is_current_exe(module: &str) -> bool {
    let exe = std::env::current_exe().and_then(|path| path.canonicalize());
    match (exe, std::fs::canonicalize(module)) {
        (Ok(exe), Ok(module)) => exe == module,
        _ => true,
    }
}

fn current_exe() -> Option<String> {
    std::env::current_exe()
        .ok()
        .map(|path| path.display().to_string())
}

/// Formats a [`FaultLocation`] as a diagnostic line.
pub struct DisplayFault<'a> {
    location: &'a FaultLocation,
    styles: &'a Styles,
}

impl<'a> DisplayFault<'a> {
    pub(crate) fn new(location: &'a FaultLocation, styles: &'a Styles) -> Self {
        Self { location, styles }
    }
}

impl fmt::Display for DisplayFault<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = self.location;
        let module = location.module.as_deref().unwrap_or("<unknown module>");

        let Some(symbol) = &location.symbol else {
            if location.in_library {
                return writeln!(
                    f,
                    "\tProgram error in file {}. Unable to determine context! The library has \
                     no symbol information for this address.",
                    module.style(self.styles.module),
                );
            }
            return writeln!(
                f,
                "\tProgram error in file {}. Unable to determine context! Please recompile \
                 with symbols exported ({}) or with debug info!",
                module.style(self.styles.module),
                "-C link-arg=-rdynamic".style(self.styles.module),
            );
        };

        write!(f, "\tProgram error in file {}", module.style(self.styles.module))?;
        match (location.module_base, location.symbol_address) {
            (Some(base), Some(start)) => write!(
                f,
                " at address {base:#x}+{:#x} [{start:#x}]",
                start.wrapping_sub(base),
            )?,
            (None, Some(start)) => write!(f, " at address [{start:#x}]")?,
            (Some(base), None) => {
                if let Some(address) = location.address {
                    write!(f, " at address {base:#x}+{:#x}", address.wrapping_sub(base))?;
                }
            }
            (None, None) => {
                if let Some(address) = location.address {
                    write!(f, " at address {address:#x}")?;
                }
            }
        }
        write!(f, " in {}", symbol.style(self.styles.symbol))?;
        match location.offset {
            Some(offset) if offset < 0 => write!(f, "-{:#x}", offset.unsigned_abs())?,
            Some(offset) => write!(f, "+{offset:#x}")?,
            None => {}
        }
        writeln!(f)?;

        if let Some((file, line)) = &location.source {
            writeln!(f, "\t  at {file}:{line}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Styles {
    module: Style,
    symbol: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.module = Style::new().yellow().bold();
        self.symbol = Style::new().cyan().bold();
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn frame_description(address: usize) -> Option<String> {
    unsafe extern "C" {
        fn backtrace_symbols(buffer: *const *mut c_void, size: libc::c_int) -> *mut *mut c_char;
    }

    let frames = [address as *mut c_void];
    // SAFETY: `frames` holds exactly one entry. glibc returns either null or a single malloc'd
    // block holding one pointer to a NUL-terminated string.
    let symbols = unsafe { backtrace_symbols(frames.as_ptr(), 1) };
    if symbols.is_null() {
        return None;
    }
    // SAFETY: the block is non-null, so its first entry is a valid C string.
    let description = unsafe { c_str_to_string(*symbols) };
    // SAFETY: the block was allocated by glibc with malloc and is not used past this point.
    unsafe { libc::free(symbols.cast()) };
    description
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn frame_description(_address: usize) -> Option<String> {
    None
}

fn query_loader(address: usize) -> Option<LoaderInfo> {
    let mut info = MaybeUninit::<libc::Dl_info>::zeroed();
    // SAFETY: dladdr only reads `address` as a lookup key and writes into `info`.
    let found = unsafe { libc::dladdr(address as *const c_void, info.as_mut_ptr()) };
    if found == 0 {
        return None;
    }
    // SAFETY: dladdr succeeded, so `info` was filled in (and it was zeroed beforehand).
    let info = unsafe { info.assume_init() };

    Some(LoaderInfo {
        // SAFETY: dladdr returns null or NUL-terminated strings that live as long as the
        // module stays loaded.
        module: unsafe { c_str_to_string(info.dli_fname) },
        module_base: info.dli_fbase as usize,
        symbol: unsafe { c_str_to_string(info.dli_sname) },
        symbol_address: (!info.dli_saddr.is_null()).then_some(info.dli_saddr as usize),
    })
}

fn query_debug_info(address: usize) -> Option<DebugInfoSymbol> {
    let mut found = None;
    backtrace::resolve(address as *mut c_void, |symbol| {
        // The first symbol reported is the innermost inlined function.
        if found.is_some() {
            return;
        }
        let Some(name) = symbol.name() else {
            return;
        };
        found = Some(DebugInfoSymbol {
            name: format!("{name:#}"),
            source: symbol
                .filename()
                .zip(symbol.lineno())
                .map(|(file, line)| (file.display().to_string(), line)),
        });
    });
    found
}

/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn c_str_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: upheld by the caller.
    let s = unsafe { CStr::from_ptr(ptr) };
    Some(s.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(
        "/usr/lib/libc.so.6(abort+0x12) [0x7f00deadbeef]"
        => Some(FrameDescription { module: "/usr/lib/libc.so.6", symbol: Some("abort"), offset: Some(0x12) });
        "symbol and offset"
    )]
    #[test_case(
        "/tmp/harness(+0x4a20) [0x55d0c0de]"
        => Some(FrameDescription { module: "/tmp/harness", symbol: None, offset: Some(0x4a20) });
        "offset only"
    )]
    #[test_case(
        "/tmp/harness(_ZN7harness4main17h0123456789abcdefE-0x8) [0x55d0c0de]"
        => Some(FrameDescription {
            module: "/tmp/harness",
            symbol: Some("_ZN7harness4main17h0123456789abcdefE"),
            offset: Some(-8),
        });
        "negative offset"
    )]
    #[test_case(
        "/tmp/harness() [0x55d0c0de]"
        => Some(FrameDescription { module: "/tmp/harness", symbol: None, offset: None });
        "empty parens"
    )]
    #[test_case(
        "/tmp/harness [0x55d0c0de]"
        => Some(FrameDescription { module: "/tmp/harness", symbol: None, offset: None });
        "no parens"
    )]
    #[test_case(
        "/tmp/dir (copy)/harness(main+0x1) [0x1]"
        => Some(FrameDescription { module: "/tmp/dir (copy)/harness", symbol: Some("main"), offset: Some(1) });
        "parens in module path"
    )]
    #[test_case("[0x55d0c0de]" => None; "address only")]
    #[test_case("" => None; "empty")]
    #[test_case("(main+0x1) [0x1]" => None; "missing module")]
    fn parse_frame_description(input: &str) -> Option<FrameDescription<'_>> {
        FrameDescription::parse(input)
    }

    #[test_case("_ZN7harness4main17h0123456789abcdefE" => "harness::main"; "legacy mangling")]
    #[test_case("_RNvCs1234_7harness4main" => "harness::main"; "v0 mangling")]
    #[test_case("abort" => "abort"; "plain name")]
    #[test_case("_ZN3foo" => "_ZN3foo"; "truncated mangling falls back to raw name")]
    fn demangle(name: &str) -> String {
        demangle_symbol(name)
    }

    #[test]
    fn assemble_prefers_frame_description_symbol() {
        let location = FaultLocation::assemble(
            Some(0x5000_1010),
            Some("/tmp/harness(_ZN7harness4main17h0123456789abcdefE+0x10) [0x50001010]"),
            Some(LoaderInfo {
                module: Some("/tmp/harness".to_owned()),
                module_base: 0x5000_0000,
                symbol: Some("_ZN7harness4main17h0123456789abcdefE".to_owned()),
                symbol_address: Some(0x5000_1000),
            }),
            None,
        );

        assert_eq!(
            location,
            FaultLocation {
                address: Some(0x5000_1010),
                module: Some("/tmp/harness".to_owned()),
                module_base: Some(0x5000_0000),
                symbol: Some("harness::main".to_owned()),
                symbol_address: Some(0x5000_1000),
                offset: Some(0x10),
                source: None,
                in_library: false,
            }
        );

        let display = DisplayFault::new(&location, &Styles::default()).to_string();
        assert_eq!(
            display,
            "\tProgram error in file /tmp/harness at address 0x50000000+0x1000 [0x50001000] \
             in harness::main+0x10\n"
        );
    }

    #[test]
    fn assemble_uses_debug_info_when_loader_has_no_symbol() {
        let location = FaultLocation::assemble(
            Some(0x5000_1024),
            Some("/tmp/harness(+0x1024) [0x50001024]"),
            Some(LoaderInfo {
                module: Some("/tmp/harness".to_owned()),
                module_base: 0x5000_0000,
                symbol: None,
                symbol_address: None,
            }),
            Some(DebugInfoSymbol {
                name: "fixtures::crash_null".to_owned(),
                source: Some(("src/main.rs".to_owned(), 12)),
            }),
        );

        assert!(location.is_resolved());
        assert_eq!(location.symbol_address, None);
        assert_eq!(location.offset, None);

        let display = DisplayFault::new(&location, &Styles::default()).to_string();
        assert_eq!(
            display,
            "\tProgram error in file /tmp/harness at address 0x50000000+0x1024 \
             in fixtures::crash_null\n\t  at src/main.rs:12\n"
        );
    }

    #[test]
    fn debug_info_keeps_loader_symbol_start() {
        let location = FaultLocation::assemble(
            Some(0x5000_1008),
            None,
            Some(LoaderInfo {
                module: Some("/tmp/harness".to_owned()),
                module_base: 0x5000_0000,
                symbol: Some("crash_null".to_owned()),
                symbol_address: Some(0x5000_1000),
            }),
            Some(DebugInfoSymbol {
                name: "fixtures::crash_null".to_owned(),
                source: Some(("src/main.rs".to_owned(), 12)),
            }),
        );

        assert_eq!(location.symbol.as_deref(), Some("crash_null"));
        assert_eq!(location.symbol_address, Some(0x5000_1000));
        assert_eq!(location.offset, Some(8));
        assert_eq!(location.source, Some(("src/main.rs".to_owned(), 12)));
    }

    #[test]
    fn fallback_names_module() {
        let location = FaultLocation::assemble(
            Some(0x10),
            Some("/tmp/harness(+0x10) [0x10]"),
            None,
            None,
        );
        assert!(!location.is_resolved());

        let display = DisplayFault::new(&location, &Styles::default()).to_string();
        assert_eq!(
            display,
            "\tProgram error in file /tmp/harness. Unable to determine context! Please \
             recompile with symbols exported (-C link-arg=-rdynamic) or with debug info!\n"
        );
    }

    #[test]
    fn fallback_in_library_has_no_rebuild_hint() {
        let mut location = FaultLocation::assemble(
            Some(0x7f00_0000_1234),
            Some("/usr/lib/libc.so.6(+0x1234) [0x7f0000001234]"),
            None,
            None,
        );
        location.in_library = true;

        let display = DisplayFault::new(&location, &Styles::default()).to_string();
        assert_eq!(
            display,
            "\tProgram error in file /usr/lib/libc.so.6. Unable to determine context! The \
             library has no symbol information for this address.\n"
        );
    }

    #[test]
    fn libc_is_a_library() {
        let abort = libc::abort as unsafe extern "C" fn() -> !;
        let location = SymbolResolver::new().locate(abort as usize);
        // A non-PIE build may hand out the executable's PLT stub instead of libc's address.
        let module = location.module.clone().unwrap_or_default();
        assert_eq!(location.in_library, module.contains("libc.so"), "{location:?}");

        let own = SymbolResolver::new().locate(libc_is_a_library as fn() as usize);
        assert!(!own.in_library, "{own:?}");
    }

    #[test]
    fn unknown_address_falls_back() {
        let diagnostic = SymbolResolver::new().describe_fault(None);
        assert!(
            diagnostic.starts_with("\tProgram error in file "),
            "{diagnostic:?}"
        );
        assert!(diagnostic.contains("Unable to determine context!"));
    }

    #[test]
    fn resolves_own_function() {
        // The address of a function in this test binary: the loader always knows the module.
        let address = resolves_own_function as fn() as usize;
        let location = SymbolResolver::new().locate(address);
        assert!(location.module.is_some(), "{location:?}");

        let diagnostic = SymbolResolver::new().describe_fault(Some(address));
        assert!(!diagnostic.trim().is_empty());
    }

    #[inline(never)]
    fn fault_target() -> usize {
        std::hint::black_box(4)
    }

    #[test]
    fn offset_within_own_function() {
        let start = fault_target as fn() -> usize as usize;
        let location = SymbolResolver::new().locate(start + 4);

        assert!(location.is_resolved(), "{location:?}");
        let base = location.module_base.expect("loader knows the test binary");
        assert!(base <= start, "{location:?}");
        match location.symbol_address {
            // Exported symbol: the loader knows where it starts.
            Some(symbol_address) => {
                assert_eq!(symbol_address, start, "{location:?}");
                assert_eq!(location.offset, Some(4), "{location:?}");
            }
            // Debug info only: no start address, and no made-up offset.
            None => assert_eq!(location.offset, None, "{location:?}"),
        }

        let diagnostic = SymbolResolver::new().describe_fault(Some(start + 4));
        assert!(
            diagnostic.contains(&format!("at address {base:#x}+")),
            "{diagnostic:?}"
        );
        assert!(diagnostic.contains("fault_target"), "{diagnostic:?}");
        assert!(!diagnostic.contains("0xffff"), "{diagnostic:?}");
    }

    proptest! {
        #[test]
        fn parse_never_panics(input in ".*") {
            let _ = FrameDescription::parse(&input);
        }

        #[test]
        fn parse_synthesized_descriptions(
            module in "/[a-z0-9_/.]{1,24}",
            symbol in "[A-Za-z_][A-Za-z0-9_$.]{0,24}",
            offset in 0u32..,
            address in any::<u64>(),
        ) {
            let input = format!("{module}({symbol}+{offset:#x}) [{address:#x}]");
            let parsed = FrameDescription::parse(&input);
            prop_assert_eq!(
                parsed,
                Some(FrameDescription {
                    module: &module,
                    symbol: Some(&symbol),
                    offset: Some(i64::from(offset)),
                })
            );
        }
    }
}
