pub mod blob;
pub mod conversion;
pub mod engine;
pub mod ids;
pub mod stt;
