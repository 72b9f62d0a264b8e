pub mod origin;

pub use origin::{check_origin, OriginPolicy};
