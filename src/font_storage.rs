use std::{collections::HashMap, path::PathBuf, sync::Arc};

use fxhash::{FxHashMap, FxHashSet};

use crate::{
    asset::{AtlasSettings, ColorGradient, FontAsset, Material, SpriteAsset},
    atlas::AtlasUpdate,
    glyph_id::{ColorGradientId, FontAssetId, MaterialId, SpriteAssetId},
    rasterizer::FontdueRasterizer,
    text::markup::name_hash,
};

/// Errors raised while turning font data into a font asset.
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("font face {0:?} is not in the database")]
    FaceNotFound(fontdb::ID),
    #[error("no face matches family `{0}`")]
    NoMatchingFace(String),
    #[error("failed to parse font face: {0}")]
    Parse(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Resolves resource names that are not registered yet.
///
/// Called when markup names a font, sprite asset, material or gradient the
/// storage has not seen. Names arrive lowercased. A returned resource is
/// registered under its name and found by hash from then on.
pub trait ResourceProvider: Send {
    fn load_font_asset(&mut self, _name: &str) -> Option<FontAsset> {
        None
    }

    fn load_sprite_asset(&mut self, _name: &str) -> Option<SpriteAsset> {
        None
    }

    fn load_material(&mut self, _name: &str) -> Option<Material> {
        None
    }

    fn load_color_gradient(&mut self, _name: &str) -> Option<ColorGradient> {
        None
    }
}

/// Global settings consulted by every layout.
#[derive(Clone, Debug)]
pub struct TextSettings {
    /// Searched after an asset's own fallback chain.
    pub fallback_font_assets: Vec<FontAssetId>,
    pub default_font_asset: Option<FontAssetId>,
    pub default_sprite_asset: Option<SpriteAssetId>,
    /// Shown in place of code points no asset covers.
    pub missing_glyph: char,
    /// Characters that may not start a line (closing punctuation).
    pub leading_characters: FxHashSet<char>,
    /// Characters that may not end a line (opening punctuation).
    pub following_characters: FxHashSet<char>,
    pub warnings_enabled: bool,
    /// Used for font assets created on demand from the font database.
    pub default_atlas_settings: AtlasSettings,
}

const LEADING_CHARACTERS: &str = "!%),.:;?]}¢°·'\"†‡›℃∶、。〃〆〕〗〞﹚﹜！＂％＇），．：；？］｝～」』】〉》";
const FOLLOWING_CHARACTERS: &str = "$(£¥·'\"〈《「『【〔〖〝﹙﹛＄（．［｛￡￥";

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            fallback_font_assets: Vec::new(),
            default_font_asset: None,
            default_sprite_asset: None,
            missing_glyph: '\u{25A1}',
            leading_characters: LEADING_CHARACTERS.chars().collect(),
            following_characters: FOLLOWING_CHARACTERS.chars().collect(),
            warnings_enabled: true,
            default_atlas_settings: AtlasSettings::default(),
        }
    }
}

/// Owns font data and every asset the layout engine can reference.
///
/// Faces are discovered through `fontdb` and loaded lazily into `fontdue`.
/// Assets live in arenas and are addressed by id; named resources are
/// additionally indexed by the case-insensitive hash markup tags use.
pub struct FontStorage {
    /// This is the font set that has been loaded by fontdb.
    font_db: fontdb::Database,
    /// This is the font that has been loaded by fontdue.
    /// Not all fonts in fontdb are necessarily loaded here.
    loaded_font: HashMap<fontdb::ID, Arc<fontdue::Font>, fxhash::FxBuildHasher>,

    font_assets: Vec<FontAsset>,
    sprite_assets: Vec<SpriteAsset>,
    materials: Vec<Material>,
    gradients: Vec<ColorGradient>,

    font_asset_names: FxHashMap<u32, FontAssetId>,
    sprite_asset_names: FxHashMap<u32, SpriteAssetId>,
    material_names: FxHashMap<u32, MaterialId>,
    gradient_names: FxHashMap<u32, ColorGradientId>,
    /// Font names no provider or family query could resolve.
    unresolved_font_names: FxHashSet<u32>,

    provider: Option<Box<dyn ResourceProvider>>,
    settings: TextSettings,
}

impl Default for FontStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl FontStorage {
    /// Creates a new empty font storage.
    pub fn new() -> Self {
        Self {
            font_db: fontdb::Database::new(),
            loaded_font: HashMap::with_hasher(fxhash::FxBuildHasher::default()),
            font_assets: Vec::new(),
            sprite_assets: Vec::new(),
            materials: Vec::new(),
            gradients: Vec::new(),
            font_asset_names: FxHashMap::default(),
            sprite_asset_names: FxHashMap::default(),
            material_names: FxHashMap::default(),
            gradient_names: FxHashMap::default(),
            unresolved_font_names: FxHashSet::default(),
            provider: None,
            settings: TextSettings::default(),
        }
    }

    pub fn settings(&self) -> &TextSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut TextSettings {
        &mut self.settings
    }

    pub fn set_resource_provider(&mut self, provider: impl ResourceProvider + 'static) {
        self.provider = Some(Box::new(provider));
        self.unresolved_font_names.clear();
    }
}

/// Loading fonts into fontdb and setting up fontdb.
impl FontStorage {
    /// Loads a font from binary data.
    pub fn load_font_binary(&mut self, data: impl Into<Vec<u8>>) {
        self.font_db.load_font_data(data.into());
        self.unresolved_font_names.clear();
    }

    /// Loads a font from a file path.
    pub fn load_font_file(&mut self, path: PathBuf) -> Result<(), FontError> {
        self.font_db.load_font_file(path)?;
        self.unresolved_font_names.clear();
        Ok(())
    }

    /// Loads all fonts from a directory.
    pub fn load_fonts_dir(&mut self, dir: PathBuf) {
        self.font_db.load_fonts_dir(dir);
        self.unresolved_font_names.clear();
    }

    /// Loads the system fonts.
    pub fn load_system_fonts(&mut self) {
        self.font_db.load_system_fonts();
        self.unresolved_font_names.clear();
    }

    /// Checks if the database holds no faces.
    pub fn is_empty(&self) -> bool {
        self.font_db.is_empty()
    }

    /// Returns the number of faces in the database.
    pub fn len(&self) -> usize {
        self.font_db.len()
    }

    /// Sets the family name for the "sans-serif" generic family.
    pub fn set_sans_serif_family(&mut self, family: impl Into<String>) {
        self.font_db.set_sans_serif_family(family);
    }

    /// Sets the family name for the "monospace" generic family.
    pub fn set_monospace_family(&mut self, family: impl Into<String>) {
        self.font_db.set_monospace_family(family);
    }

    /// Returns an iterator over all available faces.
    pub fn faces(&self) -> impl Iterator<Item = &fontdb::FaceInfo> {
        self.font_db.faces()
    }
}

/// Get `Font`
impl FontStorage {
    /// Queries for a font matching the description.
    ///
    /// Returns the ID and the loaded font if found.
    pub fn query(&mut self, query: &fontdb::Query) -> Option<(fontdb::ID, Arc<fontdue::Font>)> {
        let id = self.font_db.query(query)?;
        self.font(id).ok().map(|font| (id, font))
    }

    /// Retrieves a loaded font by ID, loading it if necessary.
    pub fn font(&mut self, id: fontdb::ID) -> Result<Arc<fontdue::Font>, FontError> {
        use std::collections::hash_map::Entry;

        match self.loaded_font.entry(id) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let font_result = self
                    .font_db
                    .with_face_data(id, |data, index| {
                        fontdue::Font::from_bytes(
                            data,
                            fontdue::FontSettings {
                                collection_index: index,
                                scale: 40.0,
                                load_substitutions: true,
                            },
                        )
                    })
                    .ok_or(FontError::FaceNotFound(id))?;

                match font_result {
                    Ok(font) => {
                        let r: &mut Arc<fontdue::Font> = entry.insert(Arc::new(font));
                        Ok(Arc::clone(r))
                    }
                    Err(e) => {
                        log::error!("Failed to load font (id: {:?}): {}", id, e);
                        Err(FontError::Parse(e))
                    }
                }
            }
        }
    }
}

/// Asset registration
impl FontStorage {
    /// Registers a font asset and indexes it by name.
    pub fn add_font_asset(&mut self, mut asset: FontAsset) -> FontAssetId {
        let id = FontAssetId::from_index(self.font_assets.len());
        asset.id = id;
        self.font_asset_names.insert(asset.name_hash(), id);
        self.font_assets.push(asset);
        id
    }

    /// Creates a dynamic font asset backed by a face of the database.
    pub fn create_font_asset_from_face(
        &mut self,
        name: impl Into<String>,
        face: fontdb::ID,
        settings: AtlasSettings,
    ) -> Result<FontAssetId, FontError> {
        let font = self.font(face)?;
        let asset = FontAsset::new(name, Arc::new(FontdueRasterizer::new(font)), settings);
        Ok(self.add_font_asset(asset))
    }

    /// Creates a font asset from the best face of `family`.
    pub fn create_font_asset_from_family(
        &mut self,
        family: &str,
        settings: AtlasSettings,
    ) -> Result<FontAssetId, FontError> {
        let query = fontdb::Query {
            families: &[fontdb::Family::Name(family)],
            ..Default::default()
        };
        let face = self
            .font_db
            .query(&query)
            .ok_or_else(|| FontError::NoMatchingFace(family.to_string()))?;
        self.create_font_asset_from_face(family, face, settings)
    }

    pub fn add_sprite_asset(&mut self, mut asset: SpriteAsset) -> SpriteAssetId {
        let id = SpriteAssetId::from_index(self.sprite_assets.len());
        asset.id = id;
        self.sprite_asset_names.insert(asset.name_hash(), id);
        self.sprite_assets.push(asset);
        id
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let id = MaterialId::from_index(self.materials.len());
        self.material_names.insert(material.name_hash, id);
        self.materials.push(material);
        id
    }

    pub fn add_color_gradient(&mut self, gradient: ColorGradient) -> ColorGradientId {
        let id = ColorGradientId::from_index(self.gradients.len());
        self.gradient_names.insert(gradient.name_hash, id);
        self.gradients.push(gradient);
        id
    }

    pub fn font_asset(&self, id: FontAssetId) -> Option<&FontAsset> {
        self.font_assets.get(id.index())
    }

    pub fn font_asset_mut(&mut self, id: FontAssetId) -> Option<&mut FontAsset> {
        self.font_assets.get_mut(id.index())
    }

    pub fn font_assets(&self) -> impl Iterator<Item = &FontAsset> {
        self.font_assets.iter()
    }

    pub fn sprite_asset(&self, id: SpriteAssetId) -> Option<&SpriteAsset> {
        self.sprite_assets.get(id.index())
    }

    pub fn sprite_asset_mut(&mut self, id: SpriteAssetId) -> Option<&mut SpriteAsset> {
        self.sprite_assets.get_mut(id.index())
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.index())
    }

    pub fn color_gradient(&self, id: ColorGradientId) -> Option<&ColorGradient> {
        self.gradients.get(id.index())
    }

    /// Rasterizes the pending glyphs of every font asset.
    pub fn render_pending_glyphs(&mut self) -> Vec<AtlasUpdate> {
        self.font_assets
            .iter_mut()
            .flat_map(|asset| asset.render_pending_glyphs())
            .collect()
    }
}

/// Name resolution
///
/// Each lookup checks the hash index first, then the resource provider.
/// Font names finally fall back to a family query against the database.
impl FontStorage {
    pub fn find_font_asset(&mut self, name: &str) -> Option<FontAssetId> {
        let hash = name_hash(name);
        if let Some(id) = self.font_asset_names.get(&hash) {
            return Some(*id);
        }
        if self.unresolved_font_names.contains(&hash) {
            return None;
        }

        let key = name.to_ascii_lowercase();
        if let Some(asset) = self.provider.as_mut().and_then(|p| p.load_font_asset(&key)) {
            let id = self.add_font_asset(asset);
            self.font_asset_names.insert(hash, id);
            return Some(id);
        }

        let settings = self.settings.default_atlas_settings;
        match self.create_font_asset_from_family(name, settings) {
            Ok(id) => {
                self.font_asset_names.insert(hash, id);
                Some(id)
            }
            Err(e) => {
                log::debug!("Font asset `{}` not resolved: {}", name, e);
                self.unresolved_font_names.insert(hash);
                None
            }
        }
    }

    pub fn find_sprite_asset(&mut self, name: &str) -> Option<SpriteAssetId> {
        let hash = name_hash(name);
        if let Some(id) = self.sprite_asset_names.get(&hash) {
            return Some(*id);
        }
        let asset = self.provider.as_mut()?.load_sprite_asset(&name.to_ascii_lowercase())?;
        let id = self.add_sprite_asset(asset);
        self.sprite_asset_names.insert(hash, id);
        Some(id)
    }

    pub fn find_material(&mut self, name: &str) -> Option<MaterialId> {
        let hash = name_hash(name);
        if let Some(id) = self.material_names.get(&hash) {
            return Some(*id);
        }
        let material = self.provider.as_mut()?.load_material(&name.to_ascii_lowercase())?;
        let id = self.add_material(material);
        self.material_names.insert(hash, id);
        Some(id)
    }

    pub fn find_color_gradient(&mut self, name: &str) -> Option<ColorGradientId> {
        let hash = name_hash(name);
        if let Some(id) = self.gradient_names.get(&hash) {
            return Some(*id);
        }
        let gradient = self.provider.as_mut()?.load_color_gradient(&name.to_ascii_lowercase())?;
        let id = self.add_color_gradient(gradient);
        self.gradient_names.insert(hash, id);
        Some(id)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing::{BoxRasterizer, test_atlas_settings},
        text::style::{Color32, VertexGradient},
    };

    struct Provider;

    impl ResourceProvider for Provider {
        fn load_color_gradient(&mut self, name: &str) -> Option<ColorGradient> {
            (name == "sunset").then(|| {
                ColorGradient::new(
                    name,
                    VertexGradient::vertical(Color32::ORANGE, Color32::PURPLE),
                )
            })
        }
    }

    #[test]
    fn names_resolve_case_insensitively() {
        let mut storage = FontStorage::new();
        let asset = FontAsset::new(
            "Body",
            Arc::new(BoxRasterizer::new("a")),
            test_atlas_settings(),
        );
        let id = storage.add_font_asset(asset);
        assert_eq!(storage.find_font_asset("BODY"), Some(id));
        assert_eq!(storage.font_asset(id).unwrap().id(), id);
    }

    #[test]
    fn unknown_font_names_fail_without_panicking() {
        let mut storage = FontStorage::new();
        assert_eq!(storage.find_font_asset("Nope"), None);
        assert!(matches!(
            storage.create_font_asset_from_family("Nope", AtlasSettings::default()),
            Err(FontError::NoMatchingFace(_))
        ));
    }

    #[test]
    fn provider_results_are_cached() {
        let mut storage = FontStorage::new();
        storage.set_resource_provider(Provider);
        let first = storage.find_color_gradient("Sunset").unwrap();
        let second = storage.find_color_gradient("sunset").unwrap();
        assert_eq!(first, second);
        assert_eq!(storage.gradients.len(), 1);
        assert!(storage.find_color_gradient("dawn").is_none());
    }

    #[test]
    fn unresolved_font_names_are_remembered() {
        struct Counting(std::sync::Arc<std::sync::atomic::AtomicUsize>);

        impl ResourceProvider for Counting {
            fn load_font_asset(&mut self, _name: &str) -> Option<FontAsset> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                None
            }
        }

        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut storage = FontStorage::new();
        storage.set_resource_provider(Counting(calls.clone()));
        assert_eq!(storage.find_font_asset("Nope"), None);
        assert_eq!(storage.find_font_asset("NOPE"), None);
        assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 1);

        // new faces may resolve it
        storage.load_font_binary(Vec::new());
        assert_eq!(storage.find_font_asset("nope"), None);
        assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 2);

        // registering the name wins over the remembered miss
        let asset = FontAsset::new("nope", Arc::new(BoxRasterizer::new("a")), test_atlas_settings());
        let id = storage.add_font_asset(asset);
        assert_eq!(storage.find_font_asset("Nope"), Some(id));
    }

    #[test]
    fn default_line_breaking_tables() {
        let settings = TextSettings::default();
        assert!(settings.leading_characters.contains(&'。'));
        assert!(settings.following_characters.contains(&'「'));
    }
}
