//! tint core.
//!
//! Holds what every backend shares: the add-on [`Registry`], configuration, object tables,
//! creation event helpers and the effect runtime. The Direct3D 9 and 11 backends live here too.
//! The Vulkan backend is the separate `tint-vulkan-layer` crate.

#[cfg(windows)]
pub(crate) mod com;
pub mod config;
pub mod d3d11;
pub mod d3d9;
pub mod dispatch;
pub mod map;
pub mod passthrough;
pub mod runtime;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::bail;
use once_cell::sync::{Lazy, OnceCell};
use tint_event::Registry;

pub use config::Config;
use runtime::compiler::EffectCompiler;

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static CONFIG: OnceCell<Config> = OnceCell::new();

static COMPILER: OnceCell<Arc<dyn EffectCompiler>> = OnceCell::new();

/// Listener table every hook dispatches to.
#[inline]
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Active configuration, the defaults until [`configure`] runs.
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}

/// Install the compiler every effect runtime created from now on uses.
pub fn set_effect_compiler(compiler: Arc<dyn EffectCompiler>) -> anyhow::Result<()> {
    if COMPILER.set(compiler).is_err() {
        bail!("Effect compiler already set");
    }

    Ok(())
}

pub fn effect_compiler() -> Option<Arc<dyn EffectCompiler>> {
    COMPILER.get().cloned()
}

/// Store the configuration every backend reads. Only the first call succeeds.
pub fn configure(config: Config) -> anyhow::Result<()> {
    if CONFIG.set(config).is_err() {
        bail!("Already configured");
    }

    Ok(())
}

/// Install the Direct3D hooks the configuration enables.
pub fn install_hooks() -> anyhow::Result<()> {
    #[cfg(windows)]
    {
        use anyhow::Context;

        let hooks = &config().hooks;
        if hooks.d3d9 {
            d3d9::hook::install().context("Direct3D 9 hook initialization failed")?;
        }
        if hooks.d3d11 {
            d3d11::hook::install().context("Direct3D 11 hook initialization failed")?;
        }
    }

    Ok(())
}

/// [`configure`] followed by [`install_hooks`].
pub fn initialize(config: Config) -> anyhow::Result<()> {
    configure(config)?;
    install_hooks()
}
