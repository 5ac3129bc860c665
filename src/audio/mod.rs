pub mod decode;
pub mod energy;
pub mod features;
