//! Unified graphics model shared by every tint backend.
//!
//! Backends translate their native objects into the types of this crate and
//! implement [`Device`], [`CommandList`] and [`CommandQueue`] on top of the native API.
//! Add-ons only ever see this model.

pub mod caps;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod format;
pub mod handle;
pub mod pipeline;
pub mod resource;
pub mod sampler;

pub use caps::DeviceCaps;
pub use device::{CommandList, CommandQueue, Device, DeviceApi};
pub use error::{Error, Result};
pub use format::Format;
pub use handle::*;
