use std::{path::PathBuf, sync::Arc};

use parking_lot::Mutex;

use crate::{
    asset::{AtlasSettings, FontAsset, SpriteAsset},
    font_storage::{FontError, FontStorage, TextSettings},
    glyph_id::{FontAssetId, SpriteAssetId},
    text::{TextData, TextGenerator, TextLayout, TextLayoutConfig},
};

/// High-level entry point for the text system.
///
/// This struct coordinates the `FontStorage` and a pool of `TextGenerator`s.
/// It provides a unified interface for loading fonts, creating assets and
/// laying out text from several threads.
///
/// Use `Mutex` to allow shared mutable access, which is common in UI frameworks.
///
/// The fields are public to allow direct access to the underlying storage when necessary
/// (e.g. for performance reasons or zero-allocation access).
pub struct FontSystem {
    /// The underlying font storage.
    pub font_storage: Mutex<FontStorage>,
    /// Idle layout engines. Each call checks one out, so concurrent callers
    /// never share scratch state.
    generators: Mutex<Vec<TextGenerator>>,
}

impl Default for FontSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FontSystem {
    /// Creates a new font system with default storage and an empty pool.
    pub fn new() -> Self {
        Self::with_storage(FontStorage::new())
    }

    /// Wraps an already populated storage.
    pub fn with_storage(font_storage: FontStorage) -> Self {
        Self {
            font_storage: Mutex::new(font_storage),
            generators: Mutex::new(Vec::new()),
        }
    }
}

/// font storage initialization
impl FontSystem {
    /// Loads the system fonts into the storage.
    pub fn load_system_fonts(&self) {
        self.font_storage.lock().load_system_fonts();
    }

    /// Loads a font from binary data.
    pub fn load_font_binary(&self, data: impl Into<Vec<u8>>) {
        self.font_storage.lock().load_font_binary(data);
    }

    /// Loads a font from a file path.
    pub fn load_font_file(&self, path: PathBuf) -> Result<(), FontError> {
        self.font_storage.lock().load_font_file(path)
    }

    /// Loads all fonts from a directory.
    pub fn load_fonts_dir(&self, dir: PathBuf) {
        self.font_storage.lock().load_fonts_dir(dir)
    }

    /// Checks if the storage holds no faces.
    pub fn is_empty(&self) -> bool {
        self.font_storage.lock().is_empty()
    }

    /// Returns the number of loaded faces.
    pub fn len(&self) -> usize {
        self.font_storage.lock().len()
    }

    /// Sets the family name for the "sans-serif" generic family.
    pub fn set_sans_serif_family(&self, family: impl Into<String>) {
        self.font_storage.lock().set_sans_serif_family(family);
    }

    /// Sets the family name for the "monospace" generic family.
    pub fn set_monospace_family(&self, family: impl Into<String>) {
        self.font_storage.lock().set_monospace_family(family);
    }

    /// Returns a vec over all available faces.
    ///
    /// # Performance
    /// This method clones all face info to avoid holding a lock on the storage.
    /// If you need to iterate without allocation, lock `font_storage` directly.
    pub fn faces(&self) -> Vec<fontdb::FaceInfo> {
        self.font_storage.lock().faces().cloned().collect()
    }

    /// Queries for a font matching the description.
    pub fn query(&self, query: &fontdb::Query) -> Option<(fontdb::ID, Arc<fontdue::Font>)> {
        self.font_storage.lock().query(query)
    }
}

/// assets
impl FontSystem {
    /// Creates a dynamic font asset from the best face of `family`.
    pub fn create_font_asset_from_family(
        &self,
        family: &str,
        settings: AtlasSettings,
    ) -> Result<FontAssetId, FontError> {
        self.font_storage
            .lock()
            .create_font_asset_from_family(family, settings)
    }

    pub fn add_font_asset(&self, asset: FontAsset) -> FontAssetId {
        self.font_storage.lock().add_font_asset(asset)
    }

    pub fn add_sprite_asset(&self, asset: SpriteAsset) -> SpriteAssetId {
        self.font_storage.lock().add_sprite_asset(asset)
    }

    /// Edits the global text settings.
    pub fn update_settings(&self, f: impl FnOnce(&mut TextSettings)) {
        f(self.font_storage.lock().settings_mut());
    }
}

/// text layout
impl FontSystem {
    /// Takes an idle generator from the pool, or makes a new one.
    pub fn checkout_generator(&self) -> TextGenerator {
        self.generators.lock().pop().unwrap_or_default()
    }

    /// Returns a generator to the pool.
    pub fn checkin_generator(&self, generator: TextGenerator) {
        self.generators.lock().push(generator);
    }

    /// Number of idle generators in the pool.
    pub fn pooled_generators(&self) -> usize {
        self.generators.lock().len()
    }

    /// Performs text layout using the assets in this system.
    pub fn layout_text(&self, text: &str, config: &TextLayoutConfig) -> TextLayout {
        let data = TextData::new(text, config.parse_escape_sequences);
        self.layout_data(&data, config)
    }

    /// Performs text layout of a prepared buffer.
    ///
    /// The storage stays locked for the whole call; the generator is only
    /// held by this call.
    pub fn layout_data(&self, text: &TextData, config: &TextLayoutConfig) -> TextLayout {
        let mut generator = self.checkout_generator();
        let layout = {
            let mut font_storage = self.font_storage.lock();
            generator.generate(text, config, &mut font_storage)
        };
        self.checkin_generator(generator);
        layout
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::testing::storage_with_font;

    fn system() -> (FontSystem, FontAssetId) {
        let (storage, font) = storage_with_font("abcdefgh");
        (FontSystem::with_storage(storage), font)
    }

    #[test]
    fn generators_return_to_the_pool() {
        let (system, _) = system();
        assert_eq!(system.pooled_generators(), 0);

        let layout = system.layout_text("abc", &TextLayoutConfig::default());
        assert_eq!(layout.character_count, 3);
        assert_eq!(system.pooled_generators(), 1);

        let first = system.checkout_generator();
        let second = system.checkout_generator();
        assert_eq!(system.pooled_generators(), 0);
        system.checkin_generator(first);
        system.checkin_generator(second);
        assert_eq!(system.pooled_generators(), 2);
    }

    #[test]
    fn concurrent_layouts_match_sequential_ones() {
        let (system, font) = system();
        let config = TextLayoutConfig {
            font_asset: Some(font),
            font_size: 10.0,
            width: Some(30.0),
            ..Default::default()
        };
        let texts = ["abc def", "gh ab cd ef", "hgfedcba", "a b c d e f g h"];
        let expected: Vec<TextLayout> = texts
            .iter()
            .map(|text| system.layout_text(text, &config))
            .collect();

        thread::scope(|scope| {
            let handles: Vec<_> = texts
                .iter()
                .map(|text| scope.spawn(|| system.layout_text(text, &config)))
                .collect();
            for (handle, expected) in handles.into_iter().zip(&expected) {
                let layout = handle.join().unwrap();
                assert_eq!(layout.elements, expected.elements);
                assert_eq!(layout.lines, expected.lines);
            }
        });
    }

    #[test]
    fn settings_are_shared() {
        let (system, font) = system();
        system.update_settings(|settings| settings.default_font_asset = None);
        let layout = system.layout_text("abc", &TextLayoutConfig::default());
        assert!(layout.warnings.contains(&crate::text::LayoutWarning::NoFontAsset));

        system.update_settings(|settings| settings.default_font_asset = Some(font));
        let layout = system.layout_text("abc", &TextLayoutConfig::default());
        assert!(layout.warnings.is_empty());
    }
}
