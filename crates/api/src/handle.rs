//! Opaque handles of the unified model.
//!
//! A handle is a native pointer or API handle widened to `u64`.
//! Each category gets its own newtype so handles of different kinds can't be mixed up.

use bytemuck::{Pod, Zeroable};

macro_rules! handles {
    ($($(#[$meta:meta])* $name:ident,)*) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Pod, Zeroable)]
            #[repr(transparent)]
            pub struct $name(u64);

            impl $name {
                pub const NULL: Self = Self(0);

                #[inline]
                pub const fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }

                #[inline]
                pub const fn raw(self) -> u64 {
                    self.0
                }

                #[inline]
                pub const fn is_null(self) -> bool {
                    self.0 == 0
                }
            }

            impl ::core::fmt::Debug for $name {
                fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                    write!(f, concat!(stringify!($name), "({:#x})"), self.0)
                }
            }
        )*

        /// A handle of any category.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::From)]
        pub enum AnyHandle {
            $($name($name),)*
        }

        impl AnyHandle {
            pub const fn raw(self) -> u64 {
                match self {
                    $(Self::$name(handle) => handle.0,)*
                }
            }
        }
    };
}

handles! {
    /// Buffer or texture.
    Resource,
    ResourceView,
    /// Full pipeline or one partial pipeline state object.
    Pipeline,
    PipelineLayout,
    DescriptorSet,
    DescriptorSetLayout,
    Sampler,
    QueryPool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handles() {
        assert!(Resource::NULL.is_null());
        assert!(Resource::default().is_null());
        assert!(!Sampler::from_raw(0x10).is_null());
        assert_eq!(Pipeline::from_raw(0xabc).raw(), 0xabc);
    }

    #[test]
    fn any_handle_keeps_category() {
        let a = AnyHandle::from(Resource::from_raw(5));
        let b = AnyHandle::from(ResourceView::from_raw(5));
        assert_ne!(a, b);
        assert_eq!(a.raw(), b.raw());
        assert_eq!(format!("{:?}", Resource::from_raw(0x20)), "Resource(0x20)");
    }
}
