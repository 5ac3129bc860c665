pub mod overlay;
pub mod pipeline;
pub mod segment;
pub mod text;
