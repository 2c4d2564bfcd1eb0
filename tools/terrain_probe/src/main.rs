use std::collections::BTreeMap;
use std::env;
use std::error::Error;
use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use tephra_core::events::channel;
use tephra_core::jobs::JobSystem;
use tephra_engine::atlas::AtlasMapping;
use tephra_engine::material::default_catalog;
use tephra_engine::mesh::{ChunkMesher, MaterialClass};
use tephra_engine::store::ChunkStore;
use tephra_engine::worker::{GenResponse, GenerationPool};
use tephra_shared::block::register_default_blocks;
use tephra_shared::coords::{ChunkPos, DEFAULT_CHUNK_SIZE};
use tephra_shared::worldgen::TerrainParams;

const INIT_TIMEOUT: Duration = Duration::from_secs(10);
const CHUNK_TIMEOUT: Duration = Duration::from_secs(60);

const ATLAS_TILES: [&str; 17] = [
    "stone",
    "dirt",
    "sand",
    "water",
    "gravel",
    "clay",
    "grass_top",
    "grass_side",
    "snow_top",
    "snow_side",
    "log_top",
    "log_side",
    "canopy_leaves",
    "tall_grass",
    "fern",
    "wildflower_red",
    "wildflower_yellow",
];

fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let Some(radius) = env::args().nth(1).and_then(|arg| arg.parse::<i32>().ok()) else {
        eprintln!("Usage: terrain_probe <chunk-radius> [config.toml]");
        std::process::exit(2);
    };

    let params = match env::args().nth(2) {
        Some(path) => match tephra_engine::config::load_params(Path::new(&path)) {
            Ok(params) => params,
            Err(err) => {
                eprintln!("terrain_probe error: {err}");
                std::process::exit(1);
            }
        },
        None => TerrainParams::default(),
    };

    if let Err(err) = run(radius, params) {
        eprintln!("terrain_probe error: {err}");
        std::process::exit(1);
    }
}

fn run(radius: i32, params: TerrainParams) -> Result<(), Box<dyn Error>> {
    let workers = std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4);

    let mut pool = GenerationPool::new(workers)?;
    pool.initialize(params, INIT_TIMEOUT)?;

    let mut store = ChunkStore::new(DEFAULT_CHUNK_SIZE)?;
    let mut submitted = 0usize;
    for z in -radius..=radius {
        for x in -radius..=radius {
            pool.submit(ChunkPos { x, z }, DEFAULT_CHUNK_SIZE)?;
            submitted += 1;
        }
    }
    info!(submitted, workers, "generating chunk region");

    let mut failed = 0usize;
    while pool.pending() > 0 {
        match pool.wait(CHUNK_TIMEOUT)? {
            Some(GenResponse::Generated { pos, grid, .. }) => {
                store.insert(pos, *grid)?;
            }
            Some(GenResponse::Failed { pos, message, .. }) => {
                warn!(chunk_x = pos.x, chunk_z = pos.z, message, "chunk failed");
                failed += 1;
            }
            None => return Err("timed out waiting for chunk generation".into()),
        }
    }
    info!(generated = store.len(), failed, "generation complete");

    let registry = register_default_blocks();
    let catalog = default_catalog();
    let atlas = AtlasMapping::uniform_grid(ATLAS_TILES, 5);
    let mesher = ChunkMesher::new(&registry, &catalog, &atlas);
    let lookup = store.neighbor_lookup();

    let jobs = JobSystem::new(None)?;
    let (mesh_tx, mesh_rx) = channel();
    jobs.scope(|scope| {
        for pos in store.positions() {
            let mesher = &mesher;
            let lookup = &lookup;
            let store = &store;
            let mesh_tx = mesh_tx.clone();
            scope.spawn(move |_| {
                if let Some(grid) = store.get(pos) {
                    let buffers = mesher.build_mesh(pos, grid, lookup);
                    let _ = mesh_tx.send((pos, buffers));
                }
            });
        }
    });
    drop(mesh_tx);

    let mut quads_by_class: BTreeMap<String, usize> = BTreeMap::new();
    let mut meshed = 0usize;
    for (_, buffers) in mesh_rx.drain() {
        meshed += 1;
        for (class, buffer) in &buffers {
            let label = match class {
                MaterialClass::Opaque => "opaque".to_string(),
                MaterialClass::MultiSided => "multi_sided".to_string(),
                MaterialClass::Liquid => "liquid".to_string(),
                MaterialClass::Cross => "cross".to_string(),
                MaterialClass::Tinted([r, g, b]) => format!("tinted #{r:02x}{g:02x}{b:02x}"),
            };
            *quads_by_class.entry(label).or_default() += buffer.indices.len() / 6;
        }
    }
    info!(meshed, "meshing complete");

    println!("chunks generated: {} ({} failed)", store.len(), failed);
    println!("chunks meshed:    {meshed}");
    for (label, quads) in &quads_by_class {
        println!("  {label:<16} {quads} quads");
    }

    Ok(())
}
