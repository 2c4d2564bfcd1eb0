use rustc_hash::FxHashMap;

/// Normalized atlas rectangle: `offset` is the lower-left corner in UV
/// space, `repeat` the extent of one tile.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct UvRect {
    pub offset: [f32; 2],
    pub repeat: [f32; 2],
}

/// Name → UV-rect lookup for a packed texture atlas. The mesher consumes
/// this as an opaque service; a miss means the face is skipped, it is never
/// a hard error.
#[derive(Clone, Debug, Default)]
pub struct AtlasMapping {
    rects: FxHashMap<String, UvRect>,
}

impl AtlasMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, rect: UvRect) {
        self.rects.insert(name.to_string(), rect);
    }

    pub fn uv_rect(&self, name: &str) -> Option<UvRect> {
        self.rects.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Lays the given names out on a uniform tile grid, row-major. This is
    /// how the packed atlases used by the probe tool and the tests are built.
    pub fn uniform_grid<'a>(names: impl IntoIterator<Item = &'a str>, tiles_per_row: u32) -> Self {
        let tiles_per_row = tiles_per_row.max(1);
        let tile = 1.0 / tiles_per_row as f32;
        let mut mapping = Self::new();
        for (index, name) in names.into_iter().enumerate() {
            let col = index as u32 % tiles_per_row;
            let row = index as u32 / tiles_per_row;
            mapping.insert(
                name,
                UvRect {
                    offset: [col as f32 * tile, row as f32 * tile],
                    repeat: [tile, tile],
                },
            );
        }
        mapping
    }
}
