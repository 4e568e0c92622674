//! Vtable slot hooking for COM interfaces.
//!
//! This crate is intended to be used only as `tint`'s internal dependency.
//! Every object of a COM class shares one vtable, so replacing a slot intercepts
//! the method for all of them.

use tracing::debug;

use core::{
    error::Error,
    ffi::c_void,
    fmt::{self, Display, Formatter},
    mem,
    sync::atomic::{AtomicUsize, Ordering},
};

/// A hooked vtable slot.
#[derive(Debug)]
pub struct VtableHook<F> {
    slot: *mut usize,
    original: F,
    detour: F,
}

// Only touches the slot through atomics
unsafe impl<F: Send> Send for VtableHook<F> {}
unsafe impl<F: Sync> Sync for VtableHook<F> {}

impl<F: Copy> VtableHook<F> {
    /// Replace the function in `slot` with `detour`.
    ///
    /// # Safety
    /// slot must point to a live vtable entry holding a function pointer with the same signature as `detour`.
    #[tracing::instrument(skip(detour))]
    pub unsafe fn attach(slot: *mut F, detour: F) -> HookResult<Self> {
        if mem::size_of::<F>() != mem::size_of::<usize>() {
            return Err(HookError::NotAFunctionPointer);
        }
        if slot.is_null() {
            return Err(HookError::NullSlot);
        }

        let slot = slot.cast::<usize>();
        let detour_addr = unsafe { mem::transmute_copy::<F, usize>(&detour) };
        let original_addr = unsafe { swap_slot(slot, detour_addr)? };
        if original_addr == detour_addr {
            return Err(HookError::AlreadyHooked);
        }

        debug!("hook attached");
        Ok(Self {
            slot,
            original: unsafe { mem::transmute_copy::<usize, F>(&original_addr) },
            detour,
        })
    }

    /// Get the original function pointer.
    #[inline(always)]
    pub fn original_fn(&self) -> F {
        self.original
    }

    /// Put the original function back, unless someone else hooked the slot after us.
    ///
    /// # Safety
    /// The vtable must still be alive.
    pub unsafe fn detach(self) -> HookResult<()> {
        let detour_addr = unsafe { mem::transmute_copy::<F, usize>(&self.detour) };
        let original_addr = unsafe { mem::transmute_copy::<F, usize>(&self.original) };

        let current = unsafe { AtomicUsize::from_ptr(self.slot) }.load(Ordering::Acquire);
        if current != detour_addr {
            return Err(HookError::SlotChanged);
        }

        unsafe { swap_slot(self.slot, original_addr)? };
        debug!("hook detached");
        Ok(())
    }
}

/// Pointer to entry `index` of the vtable of a COM object.
///
/// # Safety
/// object must be a live COM interface pointer whose vtable has more than `index` entries.
pub unsafe fn vtable_slot<F>(object: *mut c_void, index: usize) -> *mut F {
    unsafe {
        let vtable = *object.cast::<*mut usize>();
        vtable.add(index).cast()
    }
}

/// Atomically write `value` into a possibly read-only slot, returning the previous value.
unsafe fn swap_slot(slot: *mut usize, value: usize) -> HookResult<usize> {
    let _protect = unsafe { Unprotect::new(slot.cast())? };
    Ok(unsafe { AtomicUsize::from_ptr(slot) }.swap(value, Ordering::AcqRel))
}

#[cfg(windows)]
struct Unprotect {
    addr: *const c_void,
    old: windows::Win32::System::Memory::PAGE_PROTECTION_FLAGS,
}

#[cfg(windows)]
impl Unprotect {
    unsafe fn new(addr: *const c_void) -> HookResult<Self> {
        use windows::Win32::System::Memory::{
            PAGE_EXECUTE_READWRITE, PAGE_PROTECTION_FLAGS, VirtualProtect,
        };

        let mut old = PAGE_PROTECTION_FLAGS::default();
        unsafe {
            VirtualProtect(
                addr,
                mem::size_of::<usize>(),
                PAGE_EXECUTE_READWRITE,
                &mut old,
            )
        }
        .map_err(|err| HookError::Protect(err.code().0))?;

        Ok(Self { addr, old })
    }
}

#[cfg(windows)]
impl Drop for Unprotect {
    fn drop(&mut self) {
        let mut old = Default::default();
        unsafe {
            _ = windows::Win32::System::Memory::VirtualProtect(
                self.addr,
                mem::size_of::<usize>(),
                self.old,
                &mut old,
            );
        }
    }
}

// Vtables outside Windows only exist in tests, living in writable memory
#[cfg(not(windows))]
struct Unprotect;

#[cfg(not(windows))]
impl Unprotect {
    unsafe fn new(_addr: *const c_void) -> HookResult<Self> {
        Ok(Self)
    }
}

pub type HookResult<T> = Result<T, HookError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookError {
    NotAFunctionPointer,
    NullSlot,
    AlreadyHooked,
    SlotChanged,
    Protect(i32),
}

impl Display for HookError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAFunctionPointer => write!(f, "hook type is not a function pointer"),
            Self::NullSlot => write!(f, "vtable slot is null"),
            Self::AlreadyHooked => write!(f, "vtable slot is already hooked"),
            Self::SlotChanged => write!(f, "vtable slot was changed by someone else"),
            Self::Protect(code) => write!(f, "cannot change page protection: {code:#x}"),
        }
    }
}

impl Error for HookError {}

#[cfg(test)]
mod tests {
    use super::*;

    type AddFn = extern "system" fn(*mut c_void, u32) -> u32;

    extern "system" fn add_one(_this: *mut c_void, value: u32) -> u32 {
        value + 1
    }

    extern "system" fn add_two(_this: *mut c_void, value: u32) -> u32 {
        value + 2
    }

    #[repr(C)]
    struct Object {
        vtable: *mut [AddFn; 2],
    }

    #[test]
    fn attach_and_detach() {
        let mut vtable: [AddFn; 2] = [add_one, add_one];
        let mut object = Object {
            vtable: &raw mut vtable,
        };
        let this = (&raw mut object).cast::<c_void>();

        let hook = unsafe {
            let slot = vtable_slot::<AddFn>(this, 1);
            VtableHook::attach(slot, add_two as AddFn).unwrap()
        };

        let call = |index: usize| unsafe { (*object.vtable)[index](this, 1) };
        assert_eq!(call(0), 2);
        assert_eq!(call(1), 3);
        assert_eq!(hook.original_fn()(this, 1), 2);

        unsafe { hook.detach().unwrap() };
        assert_eq!(call(1), 2);
    }

    #[test]
    fn rejects_double_hook() {
        let mut vtable: [AddFn; 1] = [add_two];
        let slot = (&raw mut vtable).cast::<AddFn>();

        let err = unsafe { VtableHook::attach(slot, add_two as AddFn) }.unwrap_err();
        assert_eq!(err, HookError::AlreadyHooked);
    }
}
