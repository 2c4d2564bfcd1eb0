use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::BlockId;
use crate::chunk::{BlockDetail, BlockGrid};
use crate::coords::{LocalPos, MAX_CHUNK_SIZE, WORLD_HEIGHT};
use crate::noise::{fractal2d, fractal_max_amplitude, NoiseError, NoiseField};

// Decorrelated noise channels derived from the world seed.
const WARP_CHANNEL: u32 = 11;
const MOISTURE_CHANNEL: u32 = 7;
const CAVE_CHANNEL: u32 = 2000;
const FOLIAGE_CHANNEL: u32 = 101;

// Moisture is sampled at shifted coordinates so it never shares lattice
// points with the height signal even under aggressive frequency tuning.
const MOISTURE_OFFSET_X: f64 = 512.7;
const MOISTURE_OFFSET_Z: f64 = -317.3;

// Sampling offsets for the cave tunnel pair.
const CAVE_PAIR_OFFSET: f64 = 500.0;

const SALT_FOLIAGE_ROLL: u64 = 40_001;
const SALT_FOLIAGE_KIND: u64 = 40_002;
const SALT_TREE: u64 = 50_001;
const SALT_TREE_HEIGHT: u64 = 50_002;

/// Horizontal inset that keeps a stamped canopy inside its own chunk.
const TREE_MARGIN: usize = 2;
const CANOPY_RADIUS: i32 = 2;

#[derive(Debug)]
pub enum TerrainError {
    InvalidChunkSize(usize),
    InvalidParams(String),
    Noise(NoiseError),
}

impl fmt::Display for TerrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChunkSize(size) => {
                write!(f, "chunk size must be in 1..={MAX_CHUNK_SIZE}, got {size}")
            }
            Self::InvalidParams(reason) => write!(f, "invalid terrain params: {reason}"),
            Self::Noise(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for TerrainError {}

impl From<NoiseError> for TerrainError {
    fn from(err: NoiseError) -> Self {
        Self::Noise(err)
    }
}

/// Flat record of every terrain shaping knob, supplied once at generator
/// construction. Field-level defaults let a config file override any subset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    pub seed: f64,
    pub sea_level: i32,
    pub max_height: i32,
    /// Land bias added on top of `sea_level` before the shaped signal.
    pub height_offset: f64,
    pub amplitude: f64,
    pub height_frequency: f64,
    pub height_octaves: u32,
    pub height_persistence: f64,
    /// Sign-preserving power curve exponent; >1 flattens lowlands and
    /// sharpens peaks.
    pub height_sharpness: f64,
    pub warp_frequency: f64,
    pub warp_amplitude: f64,
    pub moisture_frequency: f64,
    pub moisture_octaves: u32,
    pub moisture_persistence: f64,
    pub cave_frequency: f64,
    pub cave_threshold: f64,
    pub base_soil_depth: i32,
    pub variable_soil_depth: i32,
    pub snow_line: i32,
    pub foliage_frequency: f64,
    pub foliage_threshold: f64,
    /// Base placement probability before the moisture bell modifier.
    /// Zero disables the foliage pass.
    pub foliage_probability: f64,
    pub foliage_target_moisture: f64,
    pub foliage_steepness: f64,
    pub foliage_min_factor: f64,
    /// One tree per this many eligible columns on average. Zero disables
    /// the tree pass.
    pub tree_spacing: u64,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 1337.0,
            sea_level: 20,
            max_height: 126,
            height_offset: 4.0,
            amplitude: 24.0,
            height_frequency: 0.0045,
            height_octaves: 4,
            height_persistence: 0.5,
            height_sharpness: 1.35,
            warp_frequency: 0.008,
            warp_amplitude: 9.0,
            moisture_frequency: 0.0021,
            moisture_octaves: 3,
            moisture_persistence: 0.55,
            cave_frequency: 0.02,
            cave_threshold: 0.006,
            base_soil_depth: 2,
            variable_soil_depth: 3,
            snow_line: 46,
            foliage_frequency: 0.09,
            foliage_threshold: 0.2,
            foliage_probability: 0.4,
            foliage_target_moisture: 0.6,
            foliage_steepness: 2.5,
            foliage_min_factor: 0.08,
            tree_spacing: 48,
        }
    }
}

impl TerrainParams {
    fn validate(&self) -> Result<(), TerrainError> {
        if !(2..=WORLD_HEIGHT as i32).contains(&self.max_height) {
            return Err(TerrainError::InvalidParams(format!(
                "max_height must be in 2..={WORLD_HEIGHT}, got {}",
                self.max_height
            )));
        }
        if !(1..self.max_height).contains(&self.sea_level) {
            return Err(TerrainError::InvalidParams(format!(
                "sea_level must be in 1..{}, got {}",
                self.max_height, self.sea_level
            )));
        }
        if self.height_octaves == 0 || self.moisture_octaves == 0 {
            return Err(TerrainError::InvalidParams(
                "octave counts must be at least 1".to_string(),
            ));
        }
        if !self.amplitude.is_finite() || !self.height_sharpness.is_finite() {
            return Err(TerrainError::InvalidParams(
                "amplitude and sharpness must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Hash seed for the deterministic placement rolls, shared with the
    /// noise lattice seed derivation.
    fn seed_hash(&self) -> u64 {
        self.seed.to_bits()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BiomeHint {
    Arid,
    Temperate,
    Lush,
}

impl BiomeHint {
    fn from_moisture(moisture: f64) -> Self {
        if moisture < 0.25 {
            Self::Arid
        } else if moisture < 0.65 {
            Self::Temperate
        } else {
            Self::Lush
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ColumnProfile {
    pub surface_height: i32,
    pub moisture: f64,
    pub biome: BiomeHint,
}

/// Maps world (x, z) to a column profile: clamped surface height, moisture
/// in [0, 1] and a coarse biome hint. Pure over (seed, params, coordinates).
#[derive(Clone, Debug)]
pub struct TerrainColumnGenerator {
    params: TerrainParams,
    height: NoiseField,
    warp: NoiseField,
    moisture: NoiseField,
}

impl TerrainColumnGenerator {
    pub fn new(params: TerrainParams) -> Result<Self, TerrainError> {
        params.validate()?;
        let height = NoiseField::new(params.seed)?;
        let warp = height.channel(WARP_CHANNEL);
        let moisture = height.channel(MOISTURE_CHANNEL);
        Ok(Self {
            params,
            height,
            warp,
            moisture,
        })
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    pub fn column_at(&self, world_x: i32, world_z: i32) -> ColumnProfile {
        let p = &self.params;
        let wx = world_x as f64;
        let wz = world_z as f64;

        // Small-amplitude domain warp breaks up axis-aligned artifacts in the
        // height signal; offsets keep the two warp components uncorrelated.
        let warp_x = self
            .warp
            .sample2d(wx * p.warp_frequency + 91.0, wz * p.warp_frequency - 47.0)
            * p.warp_amplitude;
        let warp_z = self
            .warp
            .sample2d(wx * p.warp_frequency - 77.0, wz * p.warp_frequency + 113.0)
            * p.warp_amplitude;

        let raw = fractal2d(
            &self.height,
            wx + warp_x,
            wz + warp_z,
            p.height_frequency,
            p.height_octaves,
            p.height_persistence,
        ) / fractal_max_amplitude(p.height_octaves, p.height_persistence);

        let shaped = raw.signum() * raw.abs().powf(p.height_sharpness);
        let height = (p.sea_level as f64 + p.height_offset + p.amplitude * shaped).round() as i32;
        let surface_height = height.clamp(1, p.max_height - 1);

        let moisture_raw = fractal2d(
            &self.moisture,
            wx + MOISTURE_OFFSET_X,
            wz + MOISTURE_OFFSET_Z,
            p.moisture_frequency,
            p.moisture_octaves,
            p.moisture_persistence,
        ) / fractal_max_amplitude(p.moisture_octaves, p.moisture_persistence);
        let moisture = ((moisture_raw + 1.0) * 0.5).clamp(0.0, 1.0);

        ColumnProfile {
            surface_height,
            moisture,
            biome: BiomeHint::from_moisture(moisture),
        }
    }
}

/// Assembles whole chunks: base column fill, cave carving, then the
/// chunk-local decoration passes. Pure over (seed, params, chunk coords,
/// chunk size) — identical inputs always yield an identical grid.
#[derive(Clone, Debug)]
pub struct ChunkGenerator {
    columns: TerrainColumnGenerator,
    cave: NoiseField,
    foliage: NoiseField,
    seed_hash: u64,
}

impl ChunkGenerator {
    pub fn new(params: TerrainParams) -> Result<Self, TerrainError> {
        let seed_hash = params.seed_hash();
        let columns = TerrainColumnGenerator::new(params)?;
        let cave = columns.height.channel(CAVE_CHANNEL);
        let foliage = columns.height.channel(FOLIAGE_CHANNEL);
        Ok(Self {
            columns,
            cave,
            foliage,
            seed_hash,
        })
    }

    pub fn columns(&self) -> &TerrainColumnGenerator {
        &self.columns
    }

    pub fn params(&self) -> &TerrainParams {
        self.columns.params()
    }

    pub fn generate(
        &self,
        chunk_x: i32,
        chunk_z: i32,
        chunk_size: usize,
    ) -> Result<BlockGrid, TerrainError> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(TerrainError::InvalidChunkSize(chunk_size));
        }

        let mut grid = BlockGrid::new(chunk_size);
        let size = chunk_size as i32;

        let mut profiles = Vec::with_capacity(chunk_size * chunk_size);
        for z in 0..size {
            for x in 0..size {
                profiles.push(
                    self.columns
                        .column_at(chunk_x * size + x, chunk_z * size + z),
                );
            }
        }

        for z in 0..size {
            for x in 0..size {
                let profile = profiles[(z * size + x) as usize];
                self.fill_column(&mut grid, chunk_x, chunk_z, x, z, &profile);
            }
        }

        self.stamp_trees(&mut grid, chunk_x, chunk_z, &profiles);
        self.scatter_foliage(&mut grid, chunk_x, chunk_z, &profiles);

        debug!(
            chunk_x,
            chunk_z, chunk_size, "generated chunk column grid"
        );
        Ok(grid)
    }

    fn fill_column(
        &self,
        grid: &mut BlockGrid,
        chunk_x: i32,
        chunk_z: i32,
        x: i32,
        z: i32,
        profile: &ColumnProfile,
    ) {
        let p = self.params();
        let size = grid.size() as i32;
        let world_x = chunk_x * size + x;
        let world_z = chunk_z * size + z;
        let surface = profile.surface_height;

        let depth_band =
            p.base_soil_depth + (profile.moisture * p.variable_soil_depth as f64).floor() as i32;
        let underwater = surface < p.sea_level;

        let top_block = if surface >= p.snow_line {
            BlockId::SNOWCAP
        } else if underwater {
            BlockId::SAND
        } else {
            BlockId::GRASS
        };
        let soil_block = if underwater {
            BlockId::SAND
        } else {
            BlockId::DIRT
        };

        for y in 0..WORLD_HEIGHT as i32 {
            let block = if y == 0 {
                // Floor layer is never carved so every column keeps at least
                // one solid block.
                BlockId::STONE
            } else if y == surface {
                top_block
            } else if y < surface && y >= surface - depth_band {
                soil_block
            } else if y < surface {
                if y <= surface - 3 && self.is_cave(world_x, y, world_z) {
                    BlockId::AIR
                } else {
                    BlockId::STONE
                }
            } else if y <= p.sea_level {
                BlockId::WATER
            } else {
                BlockId::AIR
            };

            grid.set(
                LocalPos {
                    x: x as u8,
                    y: y as u8,
                    z: z as u8,
                },
                block,
            );
        }
    }

    /// Two offset 3D samples; a tunnel exists where both are near zero, which
    /// squaring turns into thin worm-like intersections.
    fn is_cave(&self, world_x: i32, world_y: i32, world_z: i32) -> bool {
        let p = self.params();
        let wx = world_x as f64;
        let wy = world_y as f64;
        let wz = world_z as f64;

        let n1 = self
            .cave
            .sample3d(wx * p.cave_frequency, wy * p.cave_frequency * 1.5, wz * p.cave_frequency);
        let n2 = self.cave.sample3d(
            wx * p.cave_frequency + CAVE_PAIR_OFFSET,
            wy * p.cave_frequency + CAVE_PAIR_OFFSET,
            wz * p.cave_frequency + CAVE_PAIR_OFFSET,
        );

        n1 * n1 + n2 * n2 < p.cave_threshold
    }

    fn stamp_trees(
        &self,
        grid: &mut BlockGrid,
        chunk_x: i32,
        chunk_z: i32,
        profiles: &[ColumnProfile],
    ) {
        let p = self.params();
        if p.tree_spacing == 0 {
            return;
        }
        let size = grid.size();
        if size <= TREE_MARGIN * 2 {
            return;
        }

        for z in TREE_MARGIN..size - TREE_MARGIN {
            for x in TREE_MARGIN..size - TREE_MARGIN {
                let profile = &profiles[z * size + x];
                if profile.biome == BiomeHint::Arid {
                    continue;
                }

                let surface = profile.surface_height;
                if surface <= p.sea_level || surface >= p.snow_line {
                    continue;
                }

                let world_x = chunk_x * size as i32 + x as i32;
                let world_z = chunk_z * size as i32 + z as i32;
                let roll = column_hash(self.seed_hash, SALT_TREE, world_x, world_z);
                if (roll >> 8) % p.tree_spacing != 0 {
                    continue;
                }

                let top = LocalPos {
                    x: x as u8,
                    y: surface as u8,
                    z: z as u8,
                };
                if grid.get(top) != BlockId::GRASS {
                    continue;
                }

                let height_roll =
                    column_hash(self.seed_hash, SALT_TREE_HEIGHT, world_x, world_z);
                let trunk_height = 4 + ((height_roll >> 16) % 3) as i32;
                let canopy_center = surface + trunk_height;
                if canopy_center + CANOPY_RADIUS >= WORLD_HEIGHT as i32 {
                    continue;
                }

                for dy in 1..=trunk_height {
                    grid.set(
                        LocalPos {
                            x: x as u8,
                            y: (surface + dy) as u8,
                            z: z as u8,
                        },
                        BlockId::TIMBER_LOG,
                    );
                }

                for dy in -CANOPY_RADIUS..=CANOPY_RADIUS {
                    for dz in -CANOPY_RADIUS..=CANOPY_RADIUS {
                        for dx in -CANOPY_RADIUS..=CANOPY_RADIUS {
                            if dx * dx + dy * dy + dz * dz > CANOPY_RADIUS * CANOPY_RADIUS + 1 {
                                continue;
                            }
                            let lx = x as i32 + dx;
                            let ly = canopy_center + dy;
                            let lz = z as i32 + dz;
                            if !grid.contains(lx, ly, lz) {
                                continue;
                            }
                            let local = LocalPos {
                                x: lx as u8,
                                y: ly as u8,
                                z: lz as u8,
                            };
                            if grid.get(local) == BlockId::AIR {
                                grid.set(local, BlockId::CANOPY_LEAVES);
                            }
                        }
                    }
                }
            }
        }
    }

    fn scatter_foliage(
        &self,
        grid: &mut BlockGrid,
        chunk_x: i32,
        chunk_z: i32,
        profiles: &[ColumnProfile],
    ) {
        let p = self.params();
        if p.foliage_probability <= 0.0 {
            return;
        }
        let size = grid.size();

        for z in 0..size {
            for x in 0..size {
                let profile = &profiles[z * size + x];
                let surface = profile.surface_height;
                if surface <= p.sea_level || surface + 1 >= WORLD_HEIGHT as i32 {
                    continue;
                }

                let top = LocalPos {
                    x: x as u8,
                    y: surface as u8,
                    z: z as u8,
                };
                if grid.get(top) != BlockId::GRASS {
                    continue;
                }
                let above = LocalPos {
                    x: x as u8,
                    y: (surface + 1) as u8,
                    z: z as u8,
                };
                if grid.get(above) != BlockId::AIR {
                    continue;
                }

                let world_x = chunk_x * size as i32 + x as i32;
                let world_z = chunk_z * size as i32 + z as i32;

                // Stage one: a deterministic noise pattern gates candidate
                // cells into coherent patches.
                let pattern = self.foliage.sample2d(
                    world_x as f64 * p.foliage_frequency,
                    world_z as f64 * p.foliage_frequency,
                );
                if pattern <= p.foliage_threshold {
                    continue;
                }

                // Stage two: a probabilistic roll, peaked around the target
                // moisture band, thins the patches into organic clumps.
                let peak_factor = (1.0
                    - (profile.moisture - p.foliage_target_moisture).abs() * p.foliage_steepness)
                    .max(p.foliage_min_factor);
                let roll = hash_unit(column_hash(
                    self.seed_hash,
                    SALT_FOLIAGE_ROLL,
                    world_x,
                    world_z,
                ));
                if roll >= p.foliage_probability * peak_factor {
                    continue;
                }

                let kind = column_hash(self.seed_hash, SALT_FOLIAGE_KIND, world_x, world_z) >> 16;
                match kind % 4 {
                    0 => {
                        grid.set(above, BlockId::WILDFLOWER);
                        let texture = if (kind >> 8) % 2 == 0 {
                            "wildflower_red"
                        } else {
                            "wildflower_yellow"
                        };
                        grid.set_detail(above, BlockDetail::textured("wildflower", texture));
                    }
                    1 => grid.set(above, BlockId::FERN),
                    _ => grid.set(above, BlockId::TALL_GRASS),
                }
            }
        }
    }
}

fn column_hash(seed: u64, salt: u64, x: i32, z: i32) -> u64 {
    seed.wrapping_add(salt)
        .wrapping_mul(6364136223846793005)
        .wrapping_add((x as i64 as u64).wrapping_mul(2654435761))
        .wrapping_add((z as i64 as u64).wrapping_mul(40503))
}

fn hash_unit(hash: u64) -> f64 {
    ((hash >> 11) & 0xffff) as f64 / 65535.0
}
