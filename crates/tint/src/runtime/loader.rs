//! Effect file discovery, preprocessing and parallel compilation.

use core::sync::atomic::{AtomicBool, Ordering};
use std::{
    fs,
    path::{Path, PathBuf},
    thread,
};

use anyhow::{Context, bail};
use parking_lot::Mutex;
use tint_api::pipeline::ShaderStage;
use tracing::{debug, error, warn};

use super::{
    Effect, Technique, Texture,
    cache::{EffectCache, preprocessor_hash},
    compiler::{EffectCompiler, EffectModule, ShaderFormat},
};

const EFFECT_EXTENSION: &str = "fx";
const MAX_INCLUDE_DEPTH: usize = 16;

/// Effect files directly inside the search paths, sorted by path.
pub fn find_effect_files(search_paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for dir in search_paths {
        let Ok(entries) = fs::read_dir(dir) else {
            debug!("skipping effect search path {}", dir.display());
            continue;
        };

        files.extend(entries.filter_map(|entry| {
            let path = entry.ok()?.path();
            (path.extension()? == EFFECT_EXTENSION && path.is_file()).then_some(path)
        }));
    }

    files.sort();
    files.dedup();
    files
}

/// Expands `#include "file"` directives and prepends the definitions as `#define` lines.
///
/// Each definition is `NAME=VALUE` or a bare `NAME`.
pub fn preprocess(path: &Path, definitions: &[String]) -> anyhow::Result<String> {
    let mut output = String::new();
    for definition in definitions {
        let (name, value) = definition
            .split_once('=')
            .unwrap_or((definition.as_str(), "1"));
        output.push_str(&format!("#define {} {}\n", name.trim(), value.trim()));
    }

    expand(path, &mut output, 0)?;
    Ok(output)
}

fn expand(path: &Path, output: &mut String, depth: usize) -> anyhow::Result<()> {
    if depth > MAX_INCLUDE_DEPTH {
        bail!("include depth exceeded at {}", path.display());
    }

    let source = fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    output.push_str(&format!("#line 1 \"{}\"\n", path.display()));

    for (index, line) in source.lines().enumerate() {
        let Some(include) = include_target(line) else {
            output.push_str(line);
            output.push('\n');
            continue;
        };

        let dir = path.parent().unwrap_or(Path::new("."));
        expand(&dir.join(include), output, depth + 1)?;
        output.push_str(&format!("#line {} \"{}\"\n", index + 2, path.display()));
    }

    Ok(())
}

fn include_target(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start();
    let rest = rest.strip_prefix("include")?.trim();
    rest.strip_prefix('"')?.strip_suffix('"')
}

/// Shared inputs of the compile workers.
pub struct LoadContext<'a> {
    pub compiler: &'a dyn EffectCompiler,
    pub format: ShaderFormat,
    pub definitions: &'a [String],
    pub cache: Option<&'a EffectCache>,
    pub abort: &'a AtomicBool,
}

/// Textures and techniques found while loading, appended as workers finish.
#[derive(Default)]
pub struct Discovered {
    pub textures: Vec<Texture>,
    pub techniques: Vec<Technique>,
}

impl Discovered {
    fn append(&mut self, effect_index: usize, module: &EffectModule) {
        for info in &module.textures {
            let existing = self
                .textures
                .iter_mut()
                .find(|texture| texture.info.unique_name == info.unique_name);
            match existing {
                Some(texture) if texture.info.shared && info.shared => {
                    if !texture.shared_by.contains(&effect_index) {
                        texture.shared_by.push(effect_index);
                    }
                }
                Some(texture) => warn!(
                    "texture {} redeclared by effect {effect_index}, keeping the one of effect {}",
                    info.unique_name, texture.effect_index
                ),
                None => self.textures.push(Texture::new(effect_index, info.clone())),
            }
        }

        self.techniques.extend(
            module
                .techniques
                .iter()
                .map(|info| Technique::new(effect_index, info)),
        );
    }
}

/// Loads `files` into effect slots `offset..`, using up to `workers` threads.
///
/// Every worker fills a disjoint run of the output. Loading stops between files once `abort` is set,
/// leaving the remaining slots `None`.
pub fn load_effects(
    ctx: &LoadContext<'_>,
    files: &[PathBuf],
    offset: usize,
    workers: usize,
    discovered: &Mutex<Discovered>,
) -> Vec<Option<Effect>> {
    let mut slots: Vec<Option<Effect>> = (0..files.len()).map(|_| None).collect();
    if files.is_empty() {
        return slots;
    }

    let chunk = files.len().div_ceil(workers.clamp(1, files.len()));
    thread::scope(|scope| {
        for (shard, (outputs, paths)) in slots.chunks_mut(chunk).zip(files.chunks(chunk)).enumerate() {
            let first = offset + shard * chunk;
            scope.spawn(move || {
                for (i, (output, path)) in outputs.iter_mut().zip(paths).enumerate() {
                    if ctx.abort.load(Ordering::Acquire) {
                        debug!("effect loading aborted");
                        break;
                    }

                    let effect = load_effect(ctx, path);
                    if effect.compiled {
                        discovered.lock().append(first + i, &effect.module);
                    }
                    *output = Some(effect);
                }
            });
        }
    });

    slots
}

/// Preprocesses and compiles one file. Failures are kept in the effect's error text.
pub fn load_effect(ctx: &LoadContext<'_>, path: &Path) -> Effect {
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut effect = Effect::new(name, path.to_path_buf());

    let source = match preprocess(path, ctx.definitions) {
        Ok(source) => source,
        Err(err) => {
            error!("failed to preprocess {}. err: {err:?}", path.display());
            effect.errors = format!("{err:#}");
            return effect;
        }
    };
    effect.hash = preprocessor_hash(&source, ctx.definitions);

    if let Some(cache) = ctx.cache
        && cache.load_source(&effect.name, effect.hash).is_none()
        && let Err(err) = cache.save_source(&effect.name, effect.hash, &source)
    {
        warn!("failed to cache {}. err: {err:?}", effect.name);
    }

    let mut module = match ctx.compiler.compile(&source, ShaderStage::ALL, ctx.format) {
        Ok(module) => module,
        Err(err) => {
            error!("failed to compile {}. err: {err}", path.display());
            effect.errors = err.to_string();
            return effect;
        }
    };

    for entry in &mut module.entry_points {
        let Some(cache) = ctx.cache else {
            continue;
        };

        if entry.code.is_empty() {
            match cache.load_entry_point(&effect.name, &entry.name, effect.hash) {
                Some((code, disassembly)) => {
                    entry.code = code;
                    entry.disassembly = disassembly;
                }
                None => {
                    effect.errors = format!("no binary for entry point {}", entry.name);
                    return effect;
                }
            }
        } else if let Err(err) = cache.save_entry_point(
            &effect.name,
            &entry.name,
            effect.hash,
            &entry.code,
            &entry.disassembly,
        ) {
            warn!("failed to cache entry point {}. err: {err:?}", entry.name);
        }
    }

    effect.module = module;
    effect.compiled = true;
    effect
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::compiler::{CompileError, TechniqueInfo};

    /// Compiles every source to one technique and raises `abort` after the first.
    struct AbortingCompiler<'a> {
        abort: &'a AtomicBool,
    }

    impl EffectCompiler for AbortingCompiler<'_> {
        fn compile(
            &self,
            _source: &str,
            _stages: ShaderStage,
            _format: ShaderFormat,
        ) -> Result<EffectModule, CompileError> {
            self.abort.store(true, Ordering::Release);
            Ok(EffectModule {
                techniques: vec![TechniqueInfo {
                    name: "Main".to_string(),
                    enabled_by_default: true,
                    passes: Vec::new(),
                }],
                ..EffectModule::default()
            })
        }
    }

    fn effect_files(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                fs::write(&path, "technique Main {}\n").unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn abort_stops_between_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = effect_files(dir.path(), &["a.fx", "b.fx", "c.fx"]);
        let abort = AtomicBool::new(false);
        let compiler = AbortingCompiler { abort: &abort };
        let ctx = LoadContext {
            compiler: &compiler,
            format: ShaderFormat::SpirV,
            definitions: &[],
            cache: None,
            abort: &abort,
        };

        let discovered = Mutex::new(Discovered::default());
        let slots = load_effects(&ctx, &files, 4, 1, &discovered);
        assert_eq!(slots.len(), 3);
        assert!(slots[0].as_ref().is_some_and(|effect| effect.compiled));
        assert!(slots[1..].iter().all(Option::is_none));

        let discovered = discovered.into_inner();
        assert_eq!(discovered.techniques.len(), 1);
        assert_eq!(discovered.techniques[0].effect_index, 4);
    }

    #[test]
    fn abort_before_load_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let files = effect_files(dir.path(), &["a.fx", "b.fx", "c.fx", "d.fx"]);
        let abort = AtomicBool::new(true);
        let compiler = AbortingCompiler { abort: &abort };
        let ctx = LoadContext {
            compiler: &compiler,
            format: ShaderFormat::SpirV,
            definitions: &[],
            cache: None,
            abort: &abort,
        };

        let discovered = Mutex::new(Discovered::default());
        let slots = load_effects(&ctx, &files, 0, 2, &discovered);
        assert_eq!(slots.len(), 4);
        assert!(slots.iter().all(Option::is_none));

        let discovered = discovered.into_inner();
        assert!(discovered.techniques.is_empty());
        assert!(discovered.textures.is_empty());
    }

    #[test]
    fn includes_expand_in_place() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("common.fxh"), "float4 Tint;\n").unwrap();
        fs::write(
            dir.path().join("Main.fx"),
            "#include \"common.fxh\"\nfloat4 main() { return Tint; }\n",
        )
        .unwrap();

        let source = preprocess(
            &dir.path().join("Main.fx"),
            &["QUALITY=2".to_string(), "HDR".to_string()],
        )
        .unwrap();

        let lines: Vec<&str> = source.lines().filter(|line| !line.starts_with("#line")).collect();
        assert_eq!(
            lines,
            [
                "#define QUALITY 2",
                "#define HDR 1",
                "float4 Tint;",
                "float4 main() { return Tint; }"
            ]
        );
    }

    #[test]
    fn recursive_include_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Loop.fx"), "#include \"Loop.fx\"\n").unwrap();
        assert!(preprocess(&dir.path().join("Loop.fx"), &[]).is_err());
    }

    #[test]
    fn only_effect_files_are_found() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.fx", "a.fx", "shared.fxh", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let files = find_effect_files(&[dir.path().to_path_buf(), dir.path().join("missing")]);
        let names: Vec<_> = files
            .iter()
            .filter_map(|path| path.file_name()?.to_str())
            .collect();
        assert_eq!(names, ["a.fx", "b.fx"]);
    }
}
