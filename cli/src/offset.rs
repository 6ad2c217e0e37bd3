//! Locate glibc's hidden `write_gmon` relative to `moncontrol`.
//!
//! `write_gmon` is a static function emitted directly before `moncontrol`,
//! so its offset is the distance back to the start of the preceding
//! function. With a full `.symtab` that is the nearest preceding code
//! symbol. Stripped libraries only keep `.dynsym`, where the static routine
//! is absent, so on x86 we scan backwards for a function prologue instead.

use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use object::{Architecture, Object, ObjectSection, ObjectSymbol, SymbolKind};

/// Exported routine the offset is measured from.
pub const DEFAULT_ANCHOR: &str = "moncontrol";

/// How far back from the anchor the prologue scan looks.
const SCAN_WINDOW: u64 = 64 * 1024;

/// Function entry alignment used by glibc's x86 builds.
const FUNCTION_ALIGN: u64 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// Nearest preceding `.symtab` entry.
    Symbol(String),
    /// Backward scan for an aligned prologue.
    Prologue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetReport {
    pub anchor: String,
    pub anchor_address: u64,
    pub routine_address: u64,
    pub method: Method,
}

impl OffsetReport {
    pub fn offset(&self) -> i64 {
        self.routine_address as i64 - self.anchor_address as i64
    }
}

impl fmt::Display for OffsetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let how = match &self.method {
            Method::Symbol(name) => format!("symbol {}", name),
            Method::Prologue => "prologue scan".to_string(),
        };
        writeln!(
            f,
            "{} at {:#x}, write_gmon at {:#x} ({})",
            self.anchor, self.anchor_address, self.routine_address, how
        )?;
        writeln!(f, "decimal offset: {}", self.offset())?;
        writeln!(f, "export IPR_GMONOFFSET={}", self.offset())
    }
}

/// Find the offset from `anchor` to the function right before it.
pub fn find_offset(data: &[u8], anchor: &str) -> Result<OffsetReport> {
    let file = object::File::parse(data).context("Not a recognized object file")?;

    let anchor_address = file
        .symbols()
        .chain(file.dynamic_symbols())
        .find(|s| s.address() != 0 && s.name().is_ok_and(|n| n == anchor))
        .map(|s| s.address())
        .ok_or_else(|| anyhow!("Symbol {} not found", anchor))?;
    debug!("{} at {:#x}", anchor, anchor_address);

    if let Some((address, name)) = preceding_symbol(&file, anchor_address) {
        return Ok(OffsetReport {
            anchor: anchor.to_string(),
            anchor_address,
            routine_address: address,
            method: Method::Symbol(name),
        });
    }

    let arch = file.architecture();
    if !matches!(arch, Architecture::X86_64 | Architecture::I386) {
        bail!(
            "No .symtab entry before {} and no prologue scanner for {:?}; measure the offset by hand",
            anchor,
            arch
        );
    }

    let section = file
        .sections()
        .find(|s| s.address() <= anchor_address && anchor_address < s.address() + s.size())
        .ok_or_else(|| anyhow!("No section contains {:#x}", anchor_address))?;
    let bytes = section.data().context("Failed to read code section")?;

    let routine_address = scan_for_prologue(bytes, section.address(), anchor_address, arch)
        .ok_or_else(|| anyhow!("No function prologue found before {}", anchor))?;

    Ok(OffsetReport {
        anchor: anchor.to_string(),
        anchor_address,
        routine_address,
        method: Method::Prologue,
    })
}

/// C library mapped into this process. A child spawned from here goes
/// through the same loader and search path, so it maps the same file.
pub fn mapped_libc() -> Result<PathBuf> {
    let maps = std::fs::read_to_string("/proc/self/maps")
        .context("Failed to read /proc/self/maps")?;
    libc_from_maps(&maps).ok_or_else(|| anyhow!("No C library in /proc/self/maps"))
}

/// First mapping in `maps` whose file is a glibc shared object.
fn libc_from_maps(maps: &str) -> Option<PathBuf> {
    maps.lines()
        .filter_map(|line| line.split_ascii_whitespace().nth(5))
        .map(PathBuf::from)
        .find(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("libc.so") || (n.starts_with("libc-") && n.ends_with(".so")))
        })
}

/// Nearest code symbol strictly before `address` in the full symbol table.
fn preceding_symbol(file: &object::File<'_>, address: u64) -> Option<(u64, String)> {
    file.symbols()
        .filter(|s| s.kind() == SymbolKind::Text && s.address() != 0 && s.address() < address)
        .filter_map(|s| Some((s.address(), s.name().ok()?.to_string())))
        .filter(|(_, name)| !name.is_empty())
        .max_by_key(|(addr, _)| *addr)
}

/// Search backwards from `anchor` for an aligned function entry that
/// follows padding or a `ret`. `base` is the address of `bytes[0]`.
pub fn scan_for_prologue(bytes: &[u8], base: u64, anchor: u64, arch: Architecture) -> Option<u64> {
    let end = anchor.checked_sub(base)?;
    if end > bytes.len() as u64 {
        return None;
    }
    let start = end.saturating_sub(SCAN_WINDOW);

    let mut addr = (base + end).checked_sub(1)? / FUNCTION_ALIGN * FUNCTION_ALIGN;
    while addr > base + start {
        let pos = (addr - base) as usize;
        if follows_boundary(bytes[pos - 1]) && is_prologue(&bytes[pos..], arch) {
            return Some(addr);
        }
        addr -= FUNCTION_ALIGN;
    }
    None
}

/// Last byte of inter-function padding: `nop`, `int3`, the zero tail of a
/// multi-byte `nop`, or the previous function's `ret`.
fn follows_boundary(byte: u8) -> bool {
    matches!(byte, 0x90 | 0xcc | 0x00 | 0xc3)
}

fn is_prologue(code: &[u8], arch: Architecture) -> bool {
    const ENDBR64: &[u8] = &[0xf3, 0x0f, 0x1e, 0xfa];
    const ENDBR32: &[u8] = &[0xf3, 0x0f, 0x1e, 0xfb];

    match arch {
        Architecture::X86_64 => {
            code.starts_with(ENDBR64)
                || code.starts_with(&[0x55]) // push %rbp
                || code.starts_with(&[0x53]) // push %rbx
                || matches!(code, [0x41, 0x54..=0x57, ..]) // push %r12..%r15
        }
        Architecture::I386 => {
            code.starts_with(ENDBR32)
                || code.starts_with(&[0x55]) // push %ebp
                || matches!(code, [0x53 | 0x56 | 0x57, ..]) // push %ebx/%esi/%edi
        }
        _ => false,
    }
}
