pub mod conf;
pub mod error;
pub mod opaque;
pub mod ref_id;
