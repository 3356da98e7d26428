pub mod cors;
pub mod request_id;

pub use cors::{build_cors_layer, CorsConfigError};
pub use request_id::request_id_middleware;
