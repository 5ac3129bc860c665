pub mod crop;
#[cfg(feature = "faces")]
pub mod face;
pub mod subject;
