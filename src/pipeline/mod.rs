pub mod audio;
pub mod batch;
pub mod builder;
pub mod defaults;
pub mod emission;
pub mod progress;
pub mod runtime;
pub mod traits;
