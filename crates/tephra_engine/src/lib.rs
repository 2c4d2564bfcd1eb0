pub mod atlas;
pub mod config;
pub mod material;
pub mod mesh;
pub mod store;
pub mod worker;
