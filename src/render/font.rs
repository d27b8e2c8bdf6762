//! Font registration for plot text.
//!
//! Text goes through plotters' `ab_glyph` backend, which only knows fonts
//! registered at runtime. Without one the plot is drawn without text.

use anyhow::{anyhow, Result};
use plotters::style::{register_font, FontStyle};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Family name every text style in the renderer uses.
pub const FAMILY: &str = "sans-serif";

const CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Last font request and whether it gave usable text.
struct FontCache {
    requested: Option<Option<PathBuf>>,
    ready: bool,
}

impl FontCache {
    const fn new() -> Self {
        Self {
            requested: None,
            ready: false,
        }
    }

    /// Run `load` only when `explicit` differs from the previous request.
    fn ensure<F>(&mut self, explicit: Option<&Path>, load: F) -> bool
    where
        F: FnOnce(Option<&Path>) -> Result<PathBuf>,
    {
        let wanted = explicit.map(Path::to_path_buf);
        if self.requested.as_ref() == Some(&wanted) {
            return self.ready;
        }

        self.ready = match load(explicit) {
            Ok(path) => {
                tracing::debug!(font = ?path, "Plot font registered");
                true
            }
            Err(e) => {
                tracing::warn!("No usable font, plot will have no text: {}", e);
                false
            }
        };
        self.requested = Some(wanted);
        self.ready
    }
}

static FONT_CACHE: Mutex<FontCache> = Mutex::new(FontCache::new());

/// Register the font for `explicit` (or a system default). Repeated calls with
/// the same request reuse the earlier result; a different request registers
/// its font in place of the previous one. Returns whether text can be drawn.
pub fn ensure_font(explicit: Option<&Path>) -> bool {
    let mut cache = FONT_CACHE.lock().unwrap_or_else(|e| e.into_inner());
    cache.ensure(explicit, load_font)
}

fn load_font(explicit: Option<&Path>) -> Result<PathBuf> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
            .ok_or_else(|| anyhow!("none of the known font paths exist"))?,
    };

    let bytes = std::fs::read(&path)
        .map_err(|e| anyhow!("Failed to read font {}: {}", path.display(), e))?;

    // Registered fonts must outlive the process; one leak per distinct request.
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    register_font(FAMILY, FontStyle::Normal, bytes)
        .map_err(|_| anyhow!("Invalid font file {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_cache_keys_on_requested_path() {
        let mut cache = FontCache::new();
        let loads = Cell::new(0);
        let load = |explicit: Option<&Path>| {
            loads.set(loads.get() + 1);
            explicit
                .map(Path::to_path_buf)
                .ok_or_else(|| anyhow!("no default font"))
        };

        assert!(!cache.ensure(None, load));
        assert!(!cache.ensure(None, load));
        assert_eq!(loads.get(), 1);

        let custom = Path::new("/fonts/custom.ttf");
        assert!(cache.ensure(Some(custom), load));
        assert!(cache.ensure(Some(custom), load));
        assert_eq!(loads.get(), 2);

        assert!(cache.ensure(Some(Path::new("/fonts/other.ttf")), load));
        assert_eq!(loads.get(), 3);
    }

    #[test]
    fn test_missing_explicit_font_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_font(Some(&dir.path().join("none.ttf"))).unwrap_err();
        assert!(err.to_string().contains("none.ttf"));
    }
}
