//! COM references of the Direct3D backends.

use core::ffi::c_void;

use windows::core::Interface;

/// Native object, created by tint or borrowed from the application.
pub(crate) enum Com<T> {
    Owned(T),
    /// Application object. tint holds no reference to it.
    Borrowed(*mut c_void),
}

// Native objects are only touched from the application's render threads
unsafe impl<T> Send for Com<T> {}
unsafe impl<T> Sync for Com<T> {}

impl<T: Interface> Com<T> {
    #[inline]
    pub fn as_raw(&self) -> *mut c_void {
        match self {
            Self::Owned(object) => object.as_raw(),
            Self::Borrowed(raw) => *raw,
        }
    }

    #[inline]
    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Owned(object) => Some(object),
            Self::Borrowed(raw) => unsafe { T::from_raw_borrowed(raw) },
        }
    }

    /// New reference to the object.
    #[inline]
    pub fn cloned(&self) -> Option<T> {
        self.get().cloned()
    }
}
