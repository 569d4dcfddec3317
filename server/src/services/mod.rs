pub mod cache_evictor;
pub mod cache_warmer;
