pub mod client;
pub mod models;
pub mod status;
pub mod sync;
pub mod transform;
pub mod window;
