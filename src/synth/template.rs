//! Stage Template Environment
//!
//! WGSL stage templates are rendered with minijinja using the engine's custom
//! syntax:
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `{$ ... $}` | block tags (`if`, `for`, `include`) |
//! | `{{ ... }}` | expressions |
//! | `$$ ...`    | line statements |
//!
//! Templates form a closed set: the two stage skeletons at the root and shared
//! chunks under `chunks/`. `include "lighting"` resolves to
//! `chunks/lighting.wgsl` from any template, including another chunk. Names that
//! escape the shader folder are rejected.
//!
//! In debug builds templates are read from the crate's shader folder first so
//! they can be edited without rebuilding; otherwise they come from the embedded
//! assets.

use std::borrow::Cow;
use std::sync::OnceLock;

use minijinja::{Environment, Error, ErrorKind, syntax::SyntaxConfig};
use rust_embed::RustEmbed;
use xxhash_rust::xxh3::Xxh3;

const CHUNK_DIR: &str = "chunks/";
const EXTENSION: &str = ".wgsl";

static ENV: OnceLock<Environment<'static>> = OnceLock::new();

#[derive(RustEmbed)]
#[folder = "src/shaders"]
struct ShaderAssets;

/// The shared template environment.
pub fn environment() -> &'static Environment<'static> {
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.set_syntax(
            SyntaxConfig::builder()
                .block_delimiters("{$", "$}")
                .variable_delimiters("{{", "}}")
                .line_statement_prefix("$$")
                .build()
                .expect("Failed to configure template syntax"),
        );
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(minijinja::UndefinedBehavior::SemiStrict);
        env.set_path_join_callback(|name, _parent| chunk_name(name));
        env.set_loader(load);
        env
    })
}

/// Maps an include target to its template name under `chunks/`.
fn chunk_name(name: &str) -> Cow<'_, str> {
    if name.starts_with(CHUNK_DIR) {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{CHUNK_DIR}{name}"))
    }
}

/// Relative file path of template `name`, or `None` if it leaves the folder.
fn asset_path(name: &str) -> Option<Cow<'_, str>> {
    let escapes = name.starts_with('/')
        || name.contains('\\')
        || name.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if escapes {
        return None;
    }
    Some(if name.ends_with(EXTENSION) {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}{EXTENSION}"))
    })
}

fn load(name: &str) -> Result<Option<String>, Error> {
    let Some(path) = asset_path(name) else {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("template name `{name}` leaves the shader folder"),
        ));
    };

    #[cfg(debug_assertions)]
    {
        let on_disk = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("src/shaders")
            .join(path.as_ref());
        if on_disk.is_file() {
            return std::fs::read_to_string(&on_disk).map(Some).map_err(|e| {
                Error::new(
                    ErrorKind::TemplateNotFound,
                    format!("failed to read {}: {e}", on_disk.display()),
                )
            });
        }
    }

    match ShaderAssets::get(&path) {
        Some(file) => String::from_utf8(file.data.into_owned())
            .map(Some)
            .map_err(|e| Error::new(ErrorKind::BadEncoding, format!("{path}: {e}"))),
        None => {
            log::trace!("Template `{path}` is not embedded");
            Ok(None)
        }
    }
}

/// xxh3-64 over the names and contents of all embedded templates.
///
/// Part of the default build id, so persisted variants are invalidated whenever
/// a template changes.
#[must_use]
pub fn revision() -> u64 {
    let mut names: Vec<_> = ShaderAssets::iter().collect();
    names.sort();

    let mut hasher = Xxh3::new();
    for name in names {
        hasher.update(name.as_bytes());
        if let Some(file) = ShaderAssets::get(&name) {
            hasher.update(&file.data);
        }
    }
    hasher.digest()
}
