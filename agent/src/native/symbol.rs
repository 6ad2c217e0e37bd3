//! Symbol resolution against the modules already loaded in the process.

use std::ffi::{CStr, CString};

/// Resolve a symbol globally (across all loaded modules) using
/// `dlsym(RTLD_DEFAULT, ...)`.
pub fn find_global_export(symbol: &str) -> Result<usize, String> {
    let cstr = CString::new(symbol).map_err(|_| format!("invalid symbol name: {:?}", symbol))?;
    let p = unsafe { libc::dlsym(libc::RTLD_DEFAULT, cstr.as_ptr()) };
    if p.is_null() {
        Err(format!("{} not found in any loaded module", symbol))
    } else {
        Ok(p as usize)
    }
}

/// Describe an address as `module(symbol+0xoff)` for diagnostics.
pub fn describe_address(address: usize) -> Option<String> {
    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    let found = unsafe { libc::dladdr(address as *const libc::c_void, &mut info) };
    if found == 0 || info.dli_fname.is_null() {
        return None;
    }

    let module = unsafe { CStr::from_ptr(info.dli_fname) }.to_string_lossy();
    let module = module.rsplit('/').next().unwrap_or(&module).to_string();

    if info.dli_sname.is_null() || info.dli_saddr.is_null() {
        return Some(module);
    }
    let sym = unsafe { CStr::from_ptr(info.dli_sname) }.to_string_lossy();
    let off = address.wrapping_sub(info.dli_saddr as usize);
    Some(format!("{}({}+{:#x})", module, sym, off))
}
