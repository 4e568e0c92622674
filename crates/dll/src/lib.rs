//! tint injectable module.
//!
//! Loading the module reads `tint.toml`, sets up logging and installs the Direct3D hooks
//! on a separate thread. The Vulkan layer entry points are exported from the same module.

#![cfg(windows)]

#[cfg(debug_assertions)]
mod dbg;

extern crate tint_vulkan_layer;

use std::{path::PathBuf, thread};

use tint::Config;
use tracing::{debug, error};
use windows::Win32::{
    Foundation::{HINSTANCE, HMODULE},
    System::{LibraryLoader::GetModuleFileNameW, SystemServices::DLL_PROCESS_ATTACH},
};

/// Directory holding this module, where `tint.toml` is looked up.
fn module_dir(module: HINSTANCE) -> Option<PathBuf> {
    let mut buf = vec![0u16; 1024];
    loop {
        let len = unsafe { GetModuleFileNameW(Some(HMODULE(module.0)), &mut buf) } as usize;
        if len == 0 {
            return None;
        }
        // truncated
        if len == buf.len() {
            buf.resize(buf.len() * 2, 0);
            continue;
        }

        let path = PathBuf::from(String::from_utf16_lossy(&buf[..len]));
        return path.parent().map(PathBuf::from);
    }
}

#[cfg(debug_assertions)]
fn setup_tracing(config: &tint::config::LogConfig) {
    use std::{fs::File, sync::Mutex};

    use tracing::warn;
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    use crate::dbg::WinDbgMakeWriter;

    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (file, file_err) = match config.file.as_ref().map(File::create).transpose() {
        Ok(file) => (file, None),
        Err(err) => (None, Some(err)),
    };

    let res = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_thread_ids(true)
                .with_writer(WinDbgMakeWriter::new()),
        )
        .with(file.map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_thread_ids(true)
                .with_writer(Mutex::new(file))
        }))
        .try_init();
    if res.is_err() {
        return;
    }

    if let Some(err) = file_err {
        warn!("cannot open log file. err: {err:?}");
    }
}

#[unsafe(no_mangle)]
#[allow(non_snake_case)]
/// # Safety
/// Can be called by loader only. Must not be called manually.
pub unsafe extern "system" fn DllMain(dll_module: HINSTANCE, fdw_reason: u32, _: *mut ()) -> bool {
    if fdw_reason != DLL_PROCESS_ATTACH {
        return true;
    }

    let config = Config::load(module_dir(dll_module).as_deref());

    #[cfg(debug_assertions)]
    setup_tracing(&config.log);

    if let Err(err) = tint::configure(config) {
        error!("cannot store configuration. err: {err:?}");
        return false;
    }

    // device creation is not allowed under the loader lock
    thread::spawn(|| match tint::install_hooks() {
        Ok(()) => debug!("hooks installed"),
        Err(err) => error!("hook installation failed. err: {err:?}"),
    });
    true
}
