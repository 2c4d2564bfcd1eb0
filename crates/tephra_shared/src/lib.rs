pub mod block;
pub mod chunk;
pub mod coords;
pub mod noise;
pub mod worldgen;
