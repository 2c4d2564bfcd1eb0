use glam::IVec3;
use rustc_hash::FxHashMap;
use tracing::trace;

use tephra_shared::block::{BlockId, BlockRegistry};
use tephra_shared::chunk::BlockGrid;
use tephra_shared::coords::{chunk_to_world, ChunkPos, LocalPos};

use crate::atlas::{AtlasMapping, UvRect};
use crate::material::{FaceGroup, MaterialCatalog};

/// Render bucket for one draw call. Faces land in exactly one class; tinted
/// textures get their own bucket per RGB value so the renderer can apply the
/// color as a uniform instead of per-vertex data.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MaterialClass {
    Opaque,
    MultiSided,
    Liquid,
    Cross,
    Tinted([u8; 3]),
}

/// Interleaved-free vertex streams for one material class of one chunk.
/// Positions are world-space. `*_bytes` views are what gets uploaded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeometryBuffer {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub uvs: Vec<f32>,
    pub indices: Vec<u32>,
}

impl GeometryBuffer {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    pub fn uv_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.uvs)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    fn push_quad(
        &mut self,
        base: [f32; 3],
        normal: [f32; 3],
        corners: &[[f32; 3]; 4],
        uv_corners: &[[f32; 2]; 4],
        rect: UvRect,
    ) {
        let first = self.vertex_count() as u32;
        for (corner, uv) in corners.iter().zip(uv_corners) {
            self.positions.extend_from_slice(&[
                base[0] + corner[0],
                base[1] + corner[1],
                base[2] + corner[2],
            ]);
            self.normals.extend_from_slice(&normal);
            self.uvs.extend_from_slice(&[
                rect.offset[0] + uv[0] * rect.repeat[0],
                rect.offset[1] + uv[1] * rect.repeat[1],
            ]);
        }
        self.indices
            .extend_from_slice(&[first, first + 1, first + 2, first + 2, first + 3, first]);
    }
}

struct FaceSpec {
    offset: [i32; 3],
    normal: [f32; 3],
    corners: [[f32; 3]; 4],
    uvs: [[f32; 2]; 4],
    group: FaceGroup,
}

const SIDE_UVS: [[f32; 2]; 4] = [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]];

// Unit-cube faces, counter-clockwise when viewed from outside.
const FACES: [FaceSpec; 6] = [
    FaceSpec {
        offset: [0, 1, 0],
        normal: [0.0, 1.0, 0.0],
        corners: [
            [0.0, 1.0, 0.0],
            [0.0, 1.0, 1.0],
            [1.0, 1.0, 1.0],
            [1.0, 1.0, 0.0],
        ],
        uvs: SIDE_UVS,
        group: FaceGroup::Top,
    },
    FaceSpec {
        offset: [0, -1, 0],
        normal: [0.0, -1.0, 0.0],
        corners: [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 0.0, 1.0],
            [0.0, 0.0, 1.0],
        ],
        uvs: SIDE_UVS,
        group: FaceGroup::Bottom,
    },
    FaceSpec {
        offset: [1, 0, 0],
        normal: [1.0, 0.0, 0.0],
        corners: [
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [1.0, 1.0, 1.0],
            [1.0, 0.0, 1.0],
        ],
        uvs: SIDE_UVS,
        group: FaceGroup::Sides,
    },
    FaceSpec {
        offset: [-1, 0, 0],
        normal: [-1.0, 0.0, 0.0],
        corners: [
            [0.0, 0.0, 1.0],
            [0.0, 1.0, 1.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0],
        ],
        uvs: SIDE_UVS,
        group: FaceGroup::Sides,
    },
    FaceSpec {
        offset: [0, 0, 1],
        normal: [0.0, 0.0, 1.0],
        corners: [
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
            [0.0, 0.0, 1.0],
        ],
        uvs: SIDE_UVS,
        group: FaceGroup::Sides,
    },
    FaceSpec {
        offset: [0, 0, -1],
        normal: [0.0, 0.0, -1.0],
        corners: [
            [0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [1.0, 0.0, 0.0],
        ],
        uvs: SIDE_UVS,
        group: FaceGroup::Sides,
    },
];

const CROSS_NORM: f32 = std::f32::consts::FRAC_1_SQRT_2;

// Two diagonal quads spanning the cell, drawn without backface culling.
const CROSS_QUADS: [([f32; 3], [[f32; 3]; 4]); 2] = [
    (
        [-CROSS_NORM, 0.0, CROSS_NORM],
        [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 0.0],
        ],
    ),
    (
        [CROSS_NORM, 0.0, CROSS_NORM],
        [
            [1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 1.0, 1.0],
            [1.0, 1.0, 0.0],
        ],
    ),
];

const CROSS_UVS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

/// Representative texture for every liquid face. Liquids render from a single
/// animated sheet regardless of which liquid block produced the face.
const LIQUID_TEXTURE: &str = "water";

/// Turns one chunk grid into per-class vertex buffers using per-block face
/// culling. Borrows its lookup tables; building a mesh never mutates state,
/// so meshing the same grid twice yields identical buffers.
pub struct ChunkMesher<'a> {
    registry: &'a BlockRegistry,
    catalog: &'a MaterialCatalog,
    atlas: &'a AtlasMapping,
}

impl<'a> ChunkMesher<'a> {
    pub fn new(
        registry: &'a BlockRegistry,
        catalog: &'a MaterialCatalog,
        atlas: &'a AtlasMapping,
    ) -> Self {
        Self {
            registry,
            catalog,
            atlas,
        }
    }

    /// Class used for the cull comparison. Faces are skipped only between two
    /// non-special blocks of the same class; everything special keeps all of
    /// its faces and never hides a neighbor's.
    fn block_class(&self, block: BlockId) -> MaterialClass {
        let name = self.registry.name_of(block);
        if self.catalog.is_liquid(block) {
            MaterialClass::Liquid
        } else if self.catalog.is_cross(block) {
            MaterialClass::Cross
        } else if self.catalog.is_multi_sided(name) {
            MaterialClass::MultiSided
        } else if let Some(rgb) = self.catalog.tint_color_of(name) {
            MaterialClass::Tinted(rgb)
        } else {
            MaterialClass::Opaque
        }
    }

    /// Class the emitted face is bucketed under. Differs from the cull class
    /// in that tinting is per-texture: a multi-sided block can send its top
    /// face to a tint bucket while its sides stay in the multi-sided one.
    fn face_class(&self, block: BlockId, name: &str, texture: &str) -> MaterialClass {
        if self.catalog.is_liquid(block) {
            MaterialClass::Liquid
        } else if let Some(rgb) = self.catalog.tint_color_of(texture) {
            MaterialClass::Tinted(rgb)
        } else if self.catalog.is_cross(block) {
            MaterialClass::Cross
        } else if self.catalog.is_multi_sided(name) {
            MaterialClass::MultiSided
        } else {
            MaterialClass::Opaque
        }
    }

    pub fn build_mesh(
        &self,
        chunk_pos: ChunkPos,
        grid: &BlockGrid,
        neighbor: impl Fn(IVec3) -> Option<BlockId>,
    ) -> FxHashMap<MaterialClass, GeometryBuffer> {
        let size = grid.size();
        let mut buffers: FxHashMap<MaterialClass, GeometryBuffer> = FxHashMap::default();

        for (local, block) in grid.iter() {
            if block == BlockId::AIR {
                continue;
            }

            let detail = grid.detail(local);
            let name = detail
                .map(|d| d.name.as_str())
                .unwrap_or_else(|| self.registry.name_of(block));
            let world = chunk_to_world(chunk_pos, local, size);
            let base = [world.x as f32, world.y as f32, world.z as f32];

            if self.catalog.is_cross(block) {
                let texture = detail.and_then(|d| d.texture.as_deref()).unwrap_or(name);
                let Some(rect) = self.atlas.uv_rect(texture) else {
                    trace!(texture, "skipping cross block without atlas entry");
                    continue;
                };
                let class = self.face_class(block, name, texture);
                let buffer = buffers.entry(class).or_default();
                for (normal, corners) in &CROSS_QUADS {
                    buffer.push_quad(base, *normal, corners, &CROSS_UVS, rect);
                }
                continue;
            }

            // Culling compares both sides of a face by registry identity.
            // Detail renames affect texture resolution only; the neighbor
            // lookup surfaces bare ids, so letting a rename change the cull
            // class would make the comparison asymmetric.
            let current_special = self
                .catalog
                .is_special(block, self.registry.name_of(block));
            let current_class = self.block_class(block);

            for face in &FACES {
                let lx = i32::from(local.x) + face.offset[0];
                let ly = i32::from(local.y) + face.offset[1];
                let lz = i32::from(local.z) + face.offset[2];
                let adjacent = if grid.contains(lx, ly, lz) {
                    Some(grid.get(LocalPos {
                        x: lx as u8,
                        y: ly as u8,
                        z: lz as u8,
                    }))
                } else {
                    neighbor(world + IVec3::new(face.offset[0], face.offset[1], face.offset[2]))
                };

                if let Some(other) = adjacent {
                    let culled = other != BlockId::AIR
                        && !current_special
                        && !self.catalog.is_special(other, self.registry.name_of(other))
                        && self.block_class(other) == current_class;
                    if culled {
                        continue;
                    }
                }

                let texture = if self.catalog.is_liquid(block) {
                    // Liquids fall through to the shared sheet when their own
                    // texture is not packed.
                    let requested = detail.and_then(|d| d.texture.as_deref()).unwrap_or(name);
                    if self.atlas.uv_rect(requested).is_some() {
                        requested
                    } else {
                        LIQUID_TEXTURE
                    }
                } else {
                    detail
                        .and_then(|d| d.texture.as_deref())
                        .unwrap_or_else(|| self.catalog.face_texture(name, face.group))
                };
                let Some(rect) = self.atlas.uv_rect(texture) else {
                    trace!(texture, "skipping face without atlas entry");
                    continue;
                };

                let class = self.face_class(block, name, texture);
                buffers
                    .entry(class)
                    .or_default()
                    .push_quad(base, face.normal, &face.corners, &face.uvs, rect);
            }
        }

        buffers
    }
}

#[cfg(test)]
mod tests {
    use glam::IVec3;

    use super::{ChunkMesher, MaterialClass};
    use crate::atlas::AtlasMapping;
    use crate::material::default_catalog;
    use tephra_shared::block::{register_default_blocks, BlockId, BlockRegistry};
    use tephra_shared::chunk::{BlockDetail, BlockGrid};
    use tephra_shared::coords::{ChunkPos, LocalPos};

    use crate::material::MaterialCatalog;

    fn test_atlas() -> AtlasMapping {
        AtlasMapping::uniform_grid(
            [
                "stone",
                "dirt",
                "sand",
                "water",
                "grass_top",
                "grass_side",
                "log_top",
                "log_side",
                "snow_top",
                "snow_side",
                "canopy_leaves",
                "tall_grass",
                "fern",
                "wildflower_red",
                "wildflower_yellow",
            ],
            4,
        )
    }

    struct Fixture {
        registry: BlockRegistry,
        catalog: MaterialCatalog,
        atlas: AtlasMapping,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: register_default_blocks(),
                catalog: default_catalog(),
                atlas: test_atlas(),
            }
        }

        fn mesher(&self) -> ChunkMesher<'_> {
            ChunkMesher::new(&self.registry, &self.catalog, &self.atlas)
        }
    }

    const ORIGIN: ChunkPos = ChunkPos { x: 0, z: 0 };

    #[test]
    fn slab_culls_interior_faces_only() {
        let fixture = Fixture::new();
        let mut grid = BlockGrid::new(4);
        for z in 0..4u8 {
            for x in 0..4u8 {
                grid.set(LocalPos { x, y: 0, z }, BlockId::STONE);
                grid.set(LocalPos { x, y: 1, z }, BlockId::STONE);
            }
        }

        let buffers = fixture.mesher().build_mesh(ORIGIN, &grid, |_| None);
        assert_eq!(buffers.len(), 1);
        let opaque = &buffers[&MaterialClass::Opaque];

        // 16 top + 16 bottom + 4 sides of 4x2 cells = 64 quads.
        assert_eq!(opaque.indices.len(), 64 * 6);
        assert_eq!(opaque.vertex_count(), 64 * 4);
        assert_eq!(opaque.normals.len(), opaque.positions.len());
        assert_eq!(opaque.uvs.len() / 2, opaque.vertex_count());
    }

    #[test]
    fn adjacent_same_class_blocks_cull_their_shared_face() {
        let fixture = Fixture::new();
        let mut grid = BlockGrid::new(4);
        grid.set(LocalPos { x: 1, y: 5, z: 1 }, BlockId::STONE);
        grid.set(LocalPos { x: 2, y: 5, z: 1 }, BlockId::DIRT);

        let buffers = fixture.mesher().build_mesh(ORIGIN, &grid, |_| None);
        let opaque = &buffers[&MaterialClass::Opaque];
        // Two cubes sharing one face: 12 - 2 = 10 quads.
        assert_eq!(opaque.indices.len(), 10 * 6);
    }

    #[test]
    fn cross_blocks_emit_two_quads_and_are_never_culled() {
        let fixture = Fixture::new();
        let mut grid = BlockGrid::new(4);
        let pos = LocalPos { x: 1, y: 5, z: 1 };
        grid.set(pos, BlockId::FERN);
        // Bury the fern completely.
        for (dx, dy, dz) in [
            (1, 0, 0),
            (-1, 0, 0),
            (0, 1, 0),
            (0, -1, 0),
            (0, 0, 1),
            (0, 0, -1),
        ] {
            grid.set(
                LocalPos {
                    x: (i32::from(pos.x) + dx) as u8,
                    y: (i32::from(pos.y) + dy) as u8,
                    z: (i32::from(pos.z) + dz) as u8,
                },
                BlockId::STONE,
            );
        }

        let buffers = fixture.mesher().build_mesh(ORIGIN, &grid, |_| None);

        // Fern is tinted, so its quads land in the tint bucket.
        let tinted = &buffers[&MaterialClass::Tinted([73, 136, 50])];
        assert_eq!(tinted.vertex_count(), 8);
        assert_eq!(tinted.indices.len(), 12);

        // The stone shell keeps the faces facing the fern.
        let opaque = &buffers[&MaterialClass::Opaque];
        assert_eq!(opaque.indices.len(), 6 * 6 * 6);
    }

    #[test]
    fn detail_texture_overrides_the_block_texture() {
        let fixture = Fixture::new();
        let mut grid = BlockGrid::new(4);
        let pos = LocalPos { x: 0, y: 3, z: 0 };
        grid.set(pos, BlockId::WILDFLOWER);
        grid.set_detail(
            pos,
            BlockDetail::textured("wildflower", "wildflower_yellow"),
        );

        let buffers = fixture.mesher().build_mesh(ORIGIN, &grid, |_| None);
        // wildflower itself has no atlas entry; the override does, and it is
        // untinted so the quads land in the plain cross bucket.
        let cross = &buffers[&MaterialClass::Cross];
        assert_eq!(cross.vertex_count(), 8);
        assert!(!buffers.contains_key(&MaterialClass::Opaque));
    }

    #[test]
    fn missing_atlas_entries_omit_faces_instead_of_failing() {
        let fixture = Fixture::new();
        let mut grid = BlockGrid::new(4);
        // gravel has no tile in the test atlas.
        grid.set(LocalPos { x: 0, y: 0, z: 0 }, BlockId::GRAVEL);
        grid.set(LocalPos { x: 2, y: 0, z: 2 }, BlockId::STONE);

        let buffers = fixture.mesher().build_mesh(ORIGIN, &grid, |_| None);
        let opaque = &buffers[&MaterialClass::Opaque];
        // Only the stone cube contributes.
        assert_eq!(opaque.indices.len(), 6 * 6);
    }

    #[test]
    fn multi_sided_top_routes_to_its_tint_bucket() {
        let fixture = Fixture::new();
        let mut grid = BlockGrid::new(4);
        grid.set(LocalPos { x: 1, y: 8, z: 1 }, BlockId::GRASS);

        let buffers = fixture.mesher().build_mesh(ORIGIN, &grid, |_| None);

        let tinted = &buffers[&MaterialClass::Tinted([95, 159, 53])];
        assert_eq!(tinted.indices.len(), 6); // the grass_top face

        let multi = &buffers[&MaterialClass::MultiSided];
        assert_eq!(multi.indices.len(), 5 * 6); // bottom + four sides
    }

    #[test]
    fn liquids_use_the_shared_water_sheet_and_never_cull() {
        let fixture = Fixture::new();
        let mut grid = BlockGrid::new(4);
        grid.set(LocalPos { x: 1, y: 4, z: 1 }, BlockId::WATER);
        grid.set(LocalPos { x: 2, y: 4, z: 1 }, BlockId::WATER);

        let buffers = fixture.mesher().build_mesh(ORIGIN, &grid, |_| None);
        let liquid = &buffers[&MaterialClass::Liquid];
        // Both cells keep all six faces, including the shared pair.
        assert_eq!(liquid.indices.len(), 2 * 6 * 6);
    }

    #[test]
    fn chunk_boundary_faces_respect_the_neighbor_lookup() {
        let fixture = Fixture::new();
        let mut grid = BlockGrid::new(4);
        grid.set(LocalPos { x: 0, y: 2, z: 0 }, BlockId::STONE);

        let solid_west = |world: IVec3| {
            (world == IVec3::new(-1, 2, 0)).then_some(BlockId::STONE)
        };
        let buffers = fixture.mesher().build_mesh(ORIGIN, &grid, solid_west);
        assert_eq!(buffers[&MaterialClass::Opaque].indices.len(), 5 * 6);

        let buffers = fixture.mesher().build_mesh(ORIGIN, &grid, |_| None);
        assert_eq!(buffers[&MaterialClass::Opaque].indices.len(), 6 * 6);
    }

    #[test]
    fn detail_renames_do_not_change_the_cull_class() {
        let fixture = Fixture::new();
        let mut grid = BlockGrid::new(4);
        let renamed = LocalPos { x: 1, y: 5, z: 1 };
        grid.set(renamed, BlockId::STONE);
        grid.set_detail(renamed, BlockDetail::named("timber_log"));
        grid.set(LocalPos { x: 2, y: 5, z: 1 }, BlockId::STONE);

        let buffers = fixture.mesher().build_mesh(ORIGIN, &grid, |_| None);

        // Both cells cull by their stone identity, so the shared face is
        // skipped on each side; the rename still routes the surviving faces
        // through the multi-sided texture table.
        let multi = &buffers[&MaterialClass::MultiSided];
        assert_eq!(multi.indices.len(), 5 * 6);
        let opaque = &buffers[&MaterialClass::Opaque];
        assert_eq!(opaque.indices.len(), 5 * 6);
    }

    #[test]
    fn remeshing_the_same_grid_is_deterministic() {
        let fixture = Fixture::new();
        let mut grid = BlockGrid::new(8);
        for z in 0..8u8 {
            for x in 0..8u8 {
                grid.set(LocalPos { x, y: 0, z }, BlockId::STONE);
                grid.set(LocalPos { x, y: 1, z }, BlockId::GRASS);
            }
        }
        grid.set(LocalPos { x: 3, y: 2, z: 3 }, BlockId::TALL_GRASS);
        grid.set(LocalPos { x: 5, y: 2, z: 5 }, BlockId::WATER);

        let mesher = fixture.mesher();
        let first = mesher.build_mesh(ORIGIN, &grid, |_| None);
        let second = mesher.build_mesh(ORIGIN, &grid, |_| None);
        assert_eq!(first, second);
    }
}
