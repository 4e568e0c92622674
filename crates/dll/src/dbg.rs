//! Debugger output for injected processes.
//!
//! Host applications rarely have a console, so log lines go to `OutputDebugStringW`
//! where DebugView or an attached debugger picks them up.

use std::io::{self, Write};

use parking_lot::{Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use windows::{Win32::System::Diagnostics::Debug::OutputDebugStringW, core::PCWSTR};

/// Hands out writers sharing one UTF-16 line buffer.
pub struct WinDbgMakeWriter {
    line: Mutex<Vec<u16>>,
}

impl WinDbgMakeWriter {
    pub fn new() -> Self {
        Self {
            line: Mutex::new(Vec::with_capacity(256)),
        }
    }
}

impl<'a> MakeWriter<'a> for WinDbgMakeWriter {
    type Writer = WinDbgWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        WinDbgWriter {
            line: self.line.lock(),
        }
    }
}

/// Collects one formatted event, sent to the debugger on drop.
pub struct WinDbgWriter<'a> {
    line: MutexGuard<'a, Vec<u16>>,
}

impl Write for WinDbgWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.line.extend(String::from_utf8_lossy(buf).encode_utf16());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for WinDbgWriter<'_> {
    fn drop(&mut self) {
        if self.line.is_empty() {
            return;
        }

        self.line.push(0);
        unsafe { OutputDebugStringW(PCWSTR(self.line.as_ptr())) };
        self.line.clear();
    }
}
