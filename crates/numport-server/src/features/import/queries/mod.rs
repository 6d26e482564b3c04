pub mod status;

pub use status::{ImportStatusQuery, ImportStatusResponse};
